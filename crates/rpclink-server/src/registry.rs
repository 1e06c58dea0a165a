//! The registered-object table: named objects, their invocable methods, and
//! the method-name denylist.
//!
//! Reflection in the reference system is replaced by an explicit registry:
//! each method is a type-erased closure built at registration time, keyed by
//! object name, method name, and parameter shape.  Extension-style methods
//! (free functions operating on an object) capture their receiver at
//! registration and surface with the same wire arity as instance methods.
//!
//! The registry is populated at server configuration time and is read-only
//! afterwards, so every dispatch can share it without locking.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use rpclink_core::coerce::LastResortConverter;
use rpclink_core::{is_valid_identifier, EnumRegistry, TypeDesc, Value};

/// Error returned by an invoked method body, the analogue of a thrown
/// exception.  It is carried back to the caller inside a `Failed` result and
/// never unwinds across the dispatch boundary.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct InvokeFault(pub String);

impl InvokeFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Type-erased invocation closure.  Arguments arrive already coerced to the
/// declared parameter types.
pub type MethodHandler = Arc<dyn Fn(&[Value]) -> Result<Value, InvokeFault> + Send + Sync>;

/// Whether a method was registered as an instance method or as an
/// extension-style free function with a captured receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Instance,
    Extension,
}

/// One registered method: declared parameter types, optional return type,
/// and the closure to run.
pub struct MethodDef {
    pub object: String,
    pub name: String,
    pub kind: MethodKind,
    /// Declared parameter types, excluding the implicit receiver of an
    /// extension method.
    pub params: Vec<TypeDesc>,
    pub return_type: Option<TypeDesc>,
    handler: MethodHandler,
}

impl MethodDef {
    /// Number of wire arguments this method consumes.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Parameter count as declared, counting the implicit receiver of an
    /// extension method (wire arity + 1 for extensions).
    pub fn declared_param_count(&self) -> usize {
        match self.kind {
            MethodKind::Instance => self.params.len(),
            MethodKind::Extension => self.params.len() + 1,
        }
    }

    pub fn handler(&self) -> MethodHandler {
        Arc::clone(&self.handler)
    }

    pub fn object_method(&self) -> String {
        format!("{}.{}", self.object, self.name)
    }
}

impl std::fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDef")
            .field("object", &self.object)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("params", &self.params)
            .field("return_type", &self.return_type)
            .finish_non_exhaustive()
    }
}

/// Errors raised while configuring the registry.
#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("invalid identifier in {field}: {value:?}")]
    InvalidIdentifier { field: String, value: String },

    /// A denylist pattern must be `Object.Method` or `*.Method`.
    #[error("invalid denylist pattern: {0:?}")]
    BadDenyPattern(String),
}

/// One parsed denylist entry.
#[derive(Debug, Clone, PartialEq)]
struct DenyEntry {
    /// `None` means the `*` wildcard object segment.
    object: Option<String>,
    method: String,
}

/// Server-owned mapping from object names to their registered methods.
#[derive(Default)]
pub struct ObjectRegistry {
    objects: HashMap<String, Vec<Arc<MethodDef>>>,
    denylist: Vec<DenyEntry>,
    enums: EnumRegistry,
    last_resort: Option<Box<LastResortConverter>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an instance method on `object`.
    pub fn register_method<F>(
        &mut self,
        object: &str,
        name: &str,
        params: Vec<TypeDesc>,
        return_type: Option<TypeDesc>,
        handler: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&[Value]) -> Result<Value, InvokeFault> + Send + Sync + 'static,
    {
        self.register(object, name, MethodKind::Instance, params, return_type, handler)
    }

    /// Registers an extension-style method on `object`.  The receiver is
    /// captured by the closure; `params` lists only the wire-visible
    /// parameters.
    pub fn register_extension<F>(
        &mut self,
        object: &str,
        name: &str,
        params: Vec<TypeDesc>,
        return_type: Option<TypeDesc>,
        handler: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&[Value]) -> Result<Value, InvokeFault> + Send + Sync + 'static,
    {
        self.register(object, name, MethodKind::Extension, params, return_type, handler)
    }

    fn register<F>(
        &mut self,
        object: &str,
        name: &str,
        kind: MethodKind,
        params: Vec<TypeDesc>,
        return_type: Option<TypeDesc>,
        handler: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&[Value]) -> Result<Value, InvokeFault> + Send + Sync + 'static,
    {
        if !is_valid_identifier(object) {
            return Err(RegistryError::InvalidIdentifier {
                field: "object".to_string(),
                value: object.to_string(),
            });
        }
        if !is_valid_identifier(name) {
            return Err(RegistryError::InvalidIdentifier {
                field: "method".to_string(),
                value: name.to_string(),
            });
        }
        let def = Arc::new(MethodDef {
            object: object.to_string(),
            name: name.to_string(),
            kind,
            params,
            return_type,
            handler: Arc::new(handler),
        });
        self.objects.entry(object.to_string()).or_default().push(def);
        Ok(())
    }

    /// Registers a named enum usable as a parameter or return type.
    pub fn register_enum<I, S>(&mut self, name: &str, variants: I)
    where
        I: IntoIterator<Item = (S, i64)>,
        S: AsRef<str>,
    {
        self.enums.register(name, variants);
    }

    /// Installs the last-resort converter hook consulted when every built-in
    /// coercion rule fails.
    pub fn set_last_resort<F>(&mut self, hook: F)
    where
        F: Fn(&str, &TypeDesc) -> Option<Value> + Send + Sync + 'static,
    {
        self.last_resort = Some(Box::new(hook));
    }

    /// Adds a denylist pattern: `Object.Method` or `*.Method`.
    pub fn deny(&mut self, pattern: &str) -> Result<(), RegistryError> {
        let Some((object, method)) = pattern.split_once('.') else {
            return Err(RegistryError::BadDenyPattern(pattern.to_string()));
        };
        if !is_valid_identifier(method) {
            return Err(RegistryError::BadDenyPattern(pattern.to_string()));
        }
        let object = match object {
            "*" => None,
            o if is_valid_identifier(o) => Some(o.to_string()),
            _ => return Err(RegistryError::BadDenyPattern(pattern.to_string())),
        };
        self.denylist.push(DenyEntry {
            object,
            method: method.to_string(),
        });
        Ok(())
    }

    /// `true` when `object.method` matches a denylist entry.
    pub fn is_denied(&self, object: &str, method: &str) -> bool {
        self.denylist.iter().any(|entry| {
            entry.method == method
                && entry.object.as_deref().map_or(true, |o| o == object)
        })
    }

    /// `true` when an object with this name is registered.
    pub fn has_object(&self, object: &str) -> bool {
        self.objects.contains_key(object)
    }

    /// All methods on `object` named `method` consuming `argc` wire
    /// arguments (instance and extension candidates together, per the
    /// resolution rules).  `None` when the object itself is unknown.
    pub fn candidates(
        &self,
        object: &str,
        method: &str,
        argc: usize,
    ) -> Option<Vec<Arc<MethodDef>>> {
        let methods = self.objects.get(object)?;
        Some(
            methods
                .iter()
                .filter(|def| def.name == method && def.arity() == argc)
                .cloned()
                .collect(),
        )
    }

    pub fn enums(&self) -> &EnumRegistry {
        &self.enums
    }

    pub fn last_resort(&self) -> Option<&LastResortConverter> {
        self.last_resort.as_deref()
    }

    /// Registered object names, for startup logging.
    pub fn object_names(&self) -> impl Iterator<Item = &String> {
        self.objects.keys()
    }
}

impl std::fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("objects", &self.objects.keys())
            .field("denylist", &self.denylist)
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_registry() -> ObjectRegistry {
        let mut reg = ObjectRegistry::new();
        reg.register_method("Calc", "Add", vec![TypeDesc::I32, TypeDesc::I32], Some(TypeDesc::I32), |args| {
            match (&args[0], &args[1]) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
                _ => Err(InvokeFault::new("bad arguments")),
            }
        })
        .unwrap();
        reg
    }

    #[test]
    fn test_register_and_find_candidates() {
        let reg = sample_registry();
        let found = reg.candidates("Calc", "Add", 2).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].arity(), 2);
        assert_eq!(found[0].object_method(), "Calc.Add");
    }

    #[test]
    fn test_candidates_for_unknown_object_is_none() {
        let reg = sample_registry();
        assert!(reg.candidates("Nope", "Add", 2).is_none());
    }

    #[test]
    fn test_candidates_filters_by_arity() {
        let reg = sample_registry();
        assert!(reg.candidates("Calc", "Add", 3).unwrap().is_empty());
    }

    #[test]
    fn test_extension_declared_param_count_includes_receiver() {
        let mut reg = ObjectRegistry::new();
        reg.register_extension("Calc", "Describe", vec![], Some(TypeDesc::Str), |_| {
            Ok(Value::Str("a calculator".to_string()))
        })
        .unwrap();
        let found = reg.candidates("Calc", "Describe", 0).unwrap();
        assert_eq!(found[0].arity(), 0);
        assert_eq!(found[0].declared_param_count(), 1);
        assert_eq!(found[0].kind, MethodKind::Extension);
    }

    #[test]
    fn test_invalid_names_are_rejected_at_registration() {
        let mut reg = ObjectRegistry::new();
        let err = reg.register_method("bad name", "M", vec![], None, |_| Ok(Value::Null));
        assert!(matches!(err, Err(RegistryError::InvalidIdentifier { .. })));
    }

    #[test]
    fn test_denylist_exact_and_wildcard() {
        let mut reg = sample_registry();
        reg.deny("*.Dispose").unwrap();
        reg.deny("Calc.Reset").unwrap();

        assert!(reg.is_denied("Anything", "Dispose"));
        assert!(reg.is_denied("Calc", "Dispose"));
        assert!(reg.is_denied("Calc", "Reset"));
        assert!(!reg.is_denied("Other", "Reset"));
        assert!(!reg.is_denied("Calc", "Add"));
    }

    #[test]
    fn test_bad_denylist_patterns_are_rejected() {
        let mut reg = ObjectRegistry::new();
        for pattern in ["NoDot", "a.b.c", "*.*", ".M", "Obj."] {
            assert!(
                matches!(reg.deny(pattern), Err(RegistryError::BadDenyPattern(_))),
                "pattern {pattern:?} must be rejected"
            );
        }
    }
}
