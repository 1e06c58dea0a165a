//! Typed representations of the two wire message shapes.

use crate::coerce::{coerce, CoerceEnv, CoerceError};
use crate::is_valid_identifier;
use crate::protocol::WireError;
use crate::value::{EnumRegistry, TypeDesc, Value};

/// Outcome classification carried by every [`InvokeResult`].
///
/// `ReturnType`/`ReturnValue` are only meaningful for `SuccessAndReturn`;
/// `ExceptionMessage` only for statuses below `Success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum StatusCode {
    Unknown = 0,
    Timeout = 1,
    Failed = 2,
    Success = 3,
    SuccessAndReturn = 4,
}

impl StatusCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(n: i32) -> Option<StatusCode> {
        let code = match n {
            0 => StatusCode::Unknown,
            1 => StatusCode::Timeout,
            2 => StatusCode::Failed,
            3 => StatusCode::Success,
            4 => StatusCode::SuccessAndReturn,
            _ => return None,
        };
        Some(code)
    }

    /// `true` for `Success` and `SuccessAndReturn`.
    pub fn is_success(self) -> bool {
        matches!(self, StatusCode::Success | StatusCode::SuccessAndReturn)
    }
}

/// One positional parameter as carried on the wire.
///
/// `text` is the string-encoded value (`None` when the wire carried a null
/// parameter); `hint` is the optional declared type.  When the hint is
/// absent the value is treated as a raw string and resolved later against
/// the dispatch target's declared parameter type.
#[derive(Debug, Clone, PartialEq)]
pub struct WireParam {
    pub text: Option<String>,
    pub hint: Option<TypeDesc>,
}

impl WireParam {
    /// An untyped raw-string parameter.
    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            hint: None,
        }
    }

    /// A parameter with an explicit type hint.
    pub fn typed(text: impl Into<String>, hint: TypeDesc) -> Self {
        Self {
            text: Some(text.into()),
            hint: Some(hint),
        }
    }

    /// A null parameter (converts to the target's zero value).
    pub fn null() -> Self {
        Self {
            text: None,
            hint: None,
        }
    }

    /// `true` when this argument is array-shaped, i.e. its hint declares an
    /// array type.  Unhinted values are scalar-or-string.
    pub fn is_array(&self) -> bool {
        matches!(self.hint, Some(TypeDesc::Array(_)))
    }
}

/// The client-to-server message naming an object, a method, and arguments.
///
/// Immutable once built; consumed once by the dispatch engine.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeRequest {
    pub object_name: String,
    pub method_name: String,
    pub parameters: Vec<WireParam>,
    /// When `true` the server posts the invocation to the execution context
    /// without waiting; any return value is discarded.
    pub asynchronous: bool,
    pub comment: Option<String>,
}

impl InvokeRequest {
    /// Builds a request, validating both identifiers.
    pub fn new(
        object_name: impl Into<String>,
        method_name: impl Into<String>,
    ) -> Result<Self, WireError> {
        let object_name = object_name.into();
        let method_name = method_name.into();
        if !is_valid_identifier(&object_name) {
            return Err(WireError::InvalidIdentifier {
                field: "ObjectName".to_string(),
                value: object_name,
            });
        }
        if !is_valid_identifier(&method_name) {
            return Err(WireError::InvalidIdentifier {
                field: "MethodName".to_string(),
                value: method_name,
            });
        }
        Ok(Self {
            object_name,
            method_name,
            parameters: Vec::new(),
            asynchronous: false,
            comment: None,
        })
    }

    pub fn with_param(mut self, param: WireParam) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn with_asynchronous(mut self, asynchronous: bool) -> Self {
        self.asynchronous = asynchronous;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// The `Object.Method` form used in result messages and logs.
    pub fn object_method(&self) -> String {
        format!("{}.{}", self.object_name, self.method_name)
    }
}

/// The server-to-client message carrying status, return value, or error.
///
/// Produced exactly once per request.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeResult {
    pub status: StatusCode,
    pub object_method: String,
    pub return_type: Option<TypeDesc>,
    /// String-encoded return value, present only for `SuccessAndReturn`.
    pub return_value: Option<String>,
    /// Human-readable failure description, present only below `Success`.
    pub exception_message: Option<String>,
}

impl InvokeResult {
    pub fn success(object_method: impl Into<String>) -> Self {
        Self {
            status: StatusCode::Success,
            object_method: object_method.into(),
            return_type: None,
            return_value: None,
            exception_message: None,
        }
    }

    pub fn success_with_return(
        object_method: impl Into<String>,
        return_type: TypeDesc,
        return_value: impl Into<String>,
    ) -> Self {
        Self {
            status: StatusCode::SuccessAndReturn,
            object_method: object_method.into(),
            return_type: Some(return_type),
            return_value: Some(return_value.into()),
            exception_message: None,
        }
    }

    pub fn failed(object_method: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::Failed,
            object_method: object_method.into(),
            return_type: None,
            return_value: None,
            exception_message: Some(message.into()),
        }
    }

    pub fn timeout(object_method: impl Into<String>) -> Self {
        Self {
            status: StatusCode::Timeout,
            object_method: object_method.into(),
            return_type: None,
            return_value: None,
            exception_message: Some("no response within the configured window".to_string()),
        }
    }

    /// Decodes the string-encoded return value against the declared return
    /// type.  Returns `None` unless the status is `SuccessAndReturn` with
    /// both fields present.
    pub fn typed_return(&self, enums: &EnumRegistry) -> Option<Result<Value, CoerceError>> {
        if self.status != StatusCode::SuccessAndReturn {
            return None;
        }
        let ty = self.return_type.as_ref()?;
        let text = self.return_value.as_deref()?;
        Some(coerce(Some(text), ty, &CoerceEnv::new(enums)))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_int_mapping_round_trips() {
        for code in [
            StatusCode::Unknown,
            StatusCode::Timeout,
            StatusCode::Failed,
            StatusCode::Success,
            StatusCode::SuccessAndReturn,
        ] {
            assert_eq!(StatusCode::from_i32(code.as_i32()), Some(code));
        }
        assert_eq!(StatusCode::from_i32(99), None);
    }

    #[test]
    fn test_request_builder_validates_identifiers() {
        assert!(InvokeRequest::new("Calc", "Add").is_ok());
        assert!(matches!(
            InvokeRequest::new("2Calc", "Add"),
            Err(WireError::InvalidIdentifier { .. })
        ));
        assert!(matches!(
            InvokeRequest::new("Calc", "Add Two"),
            Err(WireError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_object_method_joins_with_dot() {
        let req = InvokeRequest::new("Calc", "Add").unwrap();
        assert_eq!(req.object_method(), "Calc.Add");
    }

    #[test]
    fn test_typed_return_only_for_success_and_return() {
        let enums = EnumRegistry::new();
        let failed = InvokeResult::failed("Calc.Add", "boom");
        assert!(failed.typed_return(&enums).is_none());

        let ok = InvokeResult::success_with_return("Calc.Add", TypeDesc::I32, "5");
        assert_eq!(ok.typed_return(&enums), Some(Ok(Value::Int(5))));
    }

    #[test]
    fn test_param_array_shape_follows_hint() {
        assert!(WireParam::typed("1,2", TypeDesc::Array(Box::new(TypeDesc::I32))).is_array());
        assert!(!WireParam::typed("1", TypeDesc::I32).is_array());
        assert!(!WireParam::raw("1,2").is_array());
    }
}
