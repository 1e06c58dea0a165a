//! Method resolution and dispatch.
//!
//! A request resolves to exactly one registered method or fails: the
//! denylist is consulted first, then candidates are gathered by object,
//! method name, and argument count, then shape narrowing (array-typed
//! parameters must receive array-shaped arguments, scalar value-type
//! parameters must not) trims the overload set.  Anything other than a
//! single survivor is an error carried back as a `Failed` result.
//!
//! Successful resolutions are cached by `(object, method, argc)` so repeat
//! calls skip the narrowing walk entirely.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{debug, warn};

use rpclink_core::coerce::{coerce, CoerceEnv};
use rpclink_core::{InvokeRequest, InvokeResult, TypeDesc, Value, WireParam};

use crate::invoker::Invoker;
use crate::registry::{MethodDef, ObjectRegistry};

/// Why a request could not be resolved to a method.
#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
    #[error("method {object_method} is not remotely invocable")]
    Denied { object_method: String },

    #[error("no object named {object} is registered")]
    UnknownObject { object: String },

    #[error("{object_method} has no overload taking {argc} argument(s)")]
    NotFound { object_method: String, argc: usize },

    #[error("{object_method} is ambiguous: {count} overloads match")]
    Ambiguous { object_method: String, count: usize },
}

type CacheKey = (String, String, usize);

/// Resolves and executes invoke requests against a fixed registry.
pub struct Dispatcher {
    registry: Arc<ObjectRegistry>,
    invoker: Invoker,
    cache: RwLock<HashMap<CacheKey, Arc<MethodDef>>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ObjectRegistry>) -> Self {
        Self {
            registry,
            invoker: Invoker::start(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    /// Resolves the request to a single method, consulting and feeding the
    /// resolution cache.
    pub fn resolve(&self, request: &InvokeRequest) -> Result<Arc<MethodDef>, ResolveError> {
        if self
            .registry
            .is_denied(&request.object_name, &request.method_name)
        {
            return Err(ResolveError::Denied {
                object_method: request.object_method(),
            });
        }

        let key = (
            request.object_name.clone(),
            request.method_name.clone(),
            request.parameters.len(),
        );
        if let Some(def) = self.cache.read().expect("cache lock").get(&key) {
            return Ok(Arc::clone(def));
        }

        let def = self.resolve_uncached(request)?;
        self.cache
            .write()
            .expect("cache lock")
            .insert(key, Arc::clone(&def));
        Ok(def)
    }

    fn resolve_uncached(&self, request: &InvokeRequest) -> Result<Arc<MethodDef>, ResolveError> {
        let argc = request.parameters.len();
        let candidates = self
            .registry
            .candidates(&request.object_name, &request.method_name, argc)
            .ok_or_else(|| ResolveError::UnknownObject {
                object: request.object_name.clone(),
            })?;
        if candidates.is_empty() {
            return Err(ResolveError::NotFound {
                object_method: request.object_method(),
                argc,
            });
        }

        // Shape narrowing applies even when a single candidate remains: a
        // lone overload with an incompatible shape is a not-found, not a
        // match.
        let survivors: Vec<Arc<MethodDef>> = candidates
            .into_iter()
            .filter(|def| {
                def.params
                    .iter()
                    .zip(&request.parameters)
                    .all(|(param, arg)| shape_compatible(param, arg))
            })
            .collect();
        match survivors.len() {
            1 => Ok(survivors.into_iter().next().expect("one survivor")),
            0 => Err(ResolveError::NotFound {
                object_method: request.object_method(),
                argc,
            }),
            count => Err(ResolveError::Ambiguous {
                object_method: request.object_method(),
                count,
            }),
        }
    }

    /// Runs one request end to end and produces its result message.
    ///
    /// Resolution and coercion failures become `Failed` results; a posted
    /// (`Asynchronous`) request is queued to the execution context and
    /// answered with a plain `Success` immediately, discarding any return.
    pub async fn dispatch(&self, request: &InvokeRequest) -> InvokeResult {
        let object_method = request.object_method();
        if let Some(comment) = &request.comment {
            debug!("invoke {object_method}: {comment}");
        }

        let def = match self.resolve(request) {
            Ok(def) => def,
            Err(e) => {
                warn!("resolution failed for {object_method}: {e}");
                return InvokeResult::failed(object_method, e.to_string());
            }
        };

        let env = CoerceEnv {
            enums: self.registry.enums(),
            last_resort: self.registry.last_resort(),
        };
        let mut args = Vec::with_capacity(def.params.len());
        for (index, (param, arg)) in def.params.iter().zip(&request.parameters).enumerate() {
            match coerce(arg.text.as_deref(), param, &env) {
                Ok(value) => args.push(value),
                Err(e) => {
                    warn!("argument {index} of {object_method} failed to convert: {e}");
                    return InvokeResult::failed(
                        object_method,
                        format!("argument {index}: {e}"),
                    );
                }
            }
        }

        if request.asynchronous {
            debug!("posting {object_method} to the execution context");
            if self.invoker.post(def.handler(), args) {
                return InvokeResult::success(object_method);
            }
            return InvokeResult::failed(object_method, "execution context unavailable");
        }

        match self.invoker.call(def.handler(), args).await {
            Ok(Value::Null) => InvokeResult::success(object_method),
            Ok(value) => match &def.return_type {
                Some(ty) => {
                    InvokeResult::success_with_return(object_method, ty.clone(), value.encode_wire())
                }
                None => InvokeResult::success(object_method),
            },
            Err(fault) => {
                warn!("{object_method} raised: {fault}");
                InvokeResult::failed(object_method, fault.to_string())
            }
        }
    }
}

/// Shape compatibility between one declared parameter and one wire argument.
///
/// Array parameters need array-shaped arguments and vice versa; scalar
/// value-type parameters accept scalar-or-string arguments only.  Unhinted
/// arguments count as scalar-or-string.
fn shape_compatible(param: &TypeDesc, arg: &WireParam) -> bool {
    if param.is_array() || arg.is_array() {
        return param.is_array() && arg.is_array();
    }
    if param.is_scalar_value_type() {
        return !arg.is_array();
    }
    true
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rpclink_core::StatusCode;

    use crate::registry::InvokeFault;

    fn calc_registry() -> ObjectRegistry {
        let mut reg = ObjectRegistry::new();
        reg.register_method(
            "Calc",
            "Add",
            vec![TypeDesc::I32, TypeDesc::I32],
            Some(TypeDesc::I32),
            |args| match (&args[0], &args[1]) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
                _ => Err(InvokeFault::new("bad arguments")),
            },
        )
        .unwrap();
        reg.register_method(
            "Calc",
            "Sum",
            vec![TypeDesc::Array(Box::new(TypeDesc::I32))],
            Some(TypeDesc::I32),
            |args| match &args[0] {
                Value::Array(items) => {
                    let mut total = 0i64;
                    for item in items {
                        match item {
                            Value::Int(n) => total += n,
                            _ => return Err(InvokeFault::new("bad element")),
                        }
                    }
                    Ok(Value::Int(total))
                }
                _ => Err(InvokeFault::new("bad arguments")),
            },
        )
        .unwrap();
        // Same name and arity as Sum, scalar shape.
        reg.register_method(
            "Calc",
            "Sum",
            vec![TypeDesc::I32],
            Some(TypeDesc::I32),
            |args| match &args[0] {
                Value::Int(n) => Ok(Value::Int(*n)),
                _ => Err(InvokeFault::new("bad arguments")),
            },
        )
        .unwrap();
        reg.register_method("Calc", "Reset", vec![], None, |_| Ok(Value::Null))
            .unwrap();
        reg.register_method("Calc", "Fail", vec![], None, |_| {
            Err(InvokeFault::new("deliberate failure"))
        })
        .unwrap();
        reg
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(calc_registry()))
    }

    fn add_request(a: &str, b: &str) -> InvokeRequest {
        InvokeRequest::new("Calc", "Add")
            .unwrap()
            .with_param(WireParam::typed(a, TypeDesc::I32))
            .with_param(WireParam::typed(b, TypeDesc::I32))
    }

    #[tokio::test]
    async fn test_dispatch_returns_typed_value() {
        let d = dispatcher();
        let result = d.dispatch(&add_request("2", "3")).await;
        assert_eq!(result.status, StatusCode::SuccessAndReturn);
        assert_eq!(result.object_method, "Calc.Add");
        assert_eq!(result.return_type, Some(TypeDesc::I32));
        assert_eq!(result.return_value.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn test_dispatch_coerces_base_prefixed_arguments() {
        let d = dispatcher();
        let result = d.dispatch(&add_request("0x10", "0B100")).await;
        assert_eq!(result.return_value.as_deref(), Some("20"));
    }

    #[tokio::test]
    async fn test_void_method_reports_plain_success() {
        let d = dispatcher();
        let request = InvokeRequest::new("Calc", "Reset").unwrap();
        let result = d.dispatch(&request).await;
        assert_eq!(result.status, StatusCode::Success);
        assert!(result.return_value.is_none());
    }

    #[tokio::test]
    async fn test_handler_fault_becomes_failed_result() {
        let d = dispatcher();
        let request = InvokeRequest::new("Calc", "Fail").unwrap();
        let result = d.dispatch(&request).await;
        assert_eq!(result.status, StatusCode::Failed);
        assert!(result
            .exception_message
            .as_deref()
            .unwrap()
            .contains("deliberate failure"));
    }

    #[tokio::test]
    async fn test_unknown_object_and_method_fail() {
        let d = dispatcher();
        let request = InvokeRequest::new("Nope", "Add").unwrap();
        assert_eq!(d.dispatch(&request).await.status, StatusCode::Failed);

        let request = InvokeRequest::new("Calc", "Missing").unwrap();
        assert_eq!(d.dispatch(&request).await.status, StatusCode::Failed);
    }

    #[tokio::test]
    async fn test_wrong_arity_fails() {
        let d = dispatcher();
        let request = InvokeRequest::new("Calc", "Add")
            .unwrap()
            .with_param(WireParam::typed("1", TypeDesc::I32));
        let result = d.dispatch(&request).await;
        assert_eq!(result.status, StatusCode::Failed);
    }

    #[tokio::test]
    async fn test_coercion_failure_names_the_argument() {
        let d = dispatcher();
        let result = d.dispatch(&add_request("1", "not a number")).await;
        assert_eq!(result.status, StatusCode::Failed);
        assert!(result
            .exception_message
            .as_deref()
            .unwrap()
            .starts_with("argument 1"));
    }

    #[tokio::test]
    async fn test_denied_method_fails_before_resolution() {
        let mut reg = calc_registry();
        reg.deny("Calc.Add").unwrap();
        let d = Dispatcher::new(Arc::new(reg));
        let result = d.dispatch(&add_request("2", "3")).await;
        assert_eq!(result.status, StatusCode::Failed);
        assert!(result
            .exception_message
            .as_deref()
            .unwrap()
            .contains("not remotely invocable"));
    }

    #[tokio::test]
    async fn test_overload_narrowed_by_array_shape() {
        let d = dispatcher();
        let array_arg = WireParam::typed("1,2,3", TypeDesc::Array(Box::new(TypeDesc::I32)));
        let request = InvokeRequest::new("Calc", "Sum").unwrap().with_param(array_arg);
        let result = d.dispatch(&request).await;
        assert_eq!(result.status, StatusCode::SuccessAndReturn);
        assert_eq!(result.return_value.as_deref(), Some("6"));
    }

    #[tokio::test]
    async fn test_overload_narrowed_by_scalar_shape() {
        let d = dispatcher();
        let request = InvokeRequest::new("Calc", "Sum")
            .unwrap()
            .with_param(WireParam::typed("7", TypeDesc::I32));
        let result = d.dispatch(&request).await;
        assert_eq!(result.return_value.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_lone_array_overload_rejects_scalar_argument() {
        let mut reg = ObjectRegistry::new();
        reg.register_method(
            "Calc",
            "Total",
            vec![TypeDesc::Array(Box::new(TypeDesc::I32))],
            Some(TypeDesc::I32),
            |_| Ok(Value::Int(0)),
        )
        .unwrap();
        let d = Dispatcher::new(Arc::new(reg));

        // A scalar-hinted argument must not resolve to the array overload,
        // even though comma-splitting could coerce it into one element.
        let request = InvokeRequest::new("Calc", "Total")
            .unwrap()
            .with_param(WireParam::typed("5", TypeDesc::I32));
        let result = d.dispatch(&request).await;
        assert_eq!(result.status, StatusCode::Failed);
        assert!(result
            .exception_message
            .as_deref()
            .unwrap()
            .contains("no overload"));
    }

    #[tokio::test]
    async fn test_lone_scalar_overload_rejects_array_argument() {
        let mut reg = ObjectRegistry::new();
        reg.register_method("Calc", "Double", vec![TypeDesc::I32], Some(TypeDesc::I32), |args| {
            match &args[0] {
                Value::Int(n) => Ok(Value::Int(n * 2)),
                _ => Err(InvokeFault::new("bad arguments")),
            }
        })
        .unwrap();
        let d = Dispatcher::new(Arc::new(reg));

        let request = InvokeRequest::new("Calc", "Double")
            .unwrap()
            .with_param(WireParam::typed("1,2", TypeDesc::Array(Box::new(TypeDesc::I32))));
        let result = d.dispatch(&request).await;
        assert_eq!(result.status, StatusCode::Failed);
    }

    #[tokio::test]
    async fn test_resolution_is_cached() {
        let d = dispatcher();
        let request = add_request("1", "1");
        d.resolve(&request).unwrap();
        assert!(d
            .cache
            .read()
            .unwrap()
            .contains_key(&("Calc".to_string(), "Add".to_string(), 2)));
        // A second resolve hits the cache and agrees with the first.
        let def = d.resolve(&request).unwrap();
        assert_eq!(def.object_method(), "Calc.Add");
    }

    #[tokio::test]
    async fn test_posted_request_answers_success_immediately() {
        let d = dispatcher();
        // Posted call to a returning method still answers plain Success.
        let request = add_request("2", "3").with_asynchronous(true);
        let result = d.dispatch(&request).await;
        assert_eq!(result.status, StatusCode::Success);
        assert!(result.return_value.is_none());
    }
}
