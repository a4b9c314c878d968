//! Service definitions: an interface at a version plus its method table.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Failure reported by a service method. Only the message reaches the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ServiceError(String);

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<String> for ServiceError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for ServiceError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Type-erased method: decoded arguments in, JSON result out.
pub type MethodHandler = Arc<dyn Fn(Vec<Value>) -> ServiceResult<Value> + Send + Sync>;

/// Overload key: a method is selected by name and parameter type descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MethodKey {
    name: String,
    parameter_types: Vec<String>,
}

/// An implementation of one interface at one version.
///
/// Methods are registered with their parameter type descriptors and a typed
/// closure. Arguments arrive as a tuple decoded from the request's parameter
/// list; a method without parameters takes `()`.
///
/// # Example
///
/// ```
/// use myrpc_server::ServiceDefinition;
/// use serde_json::json;
///
/// let service = ServiceDefinition::new("com.example.Calculator", "1.0")
///     .method("add", &["long", "long"], |(a, b): (i64, i64)| Ok(a + b))
///     .method("reset", &[], |(): ()| Ok(()));
///
/// let result = service.invoke("add", &["long".into(), "long".into()], vec![json!(2), json!(3)]);
/// assert_eq!(result.unwrap(), json!(5));
/// ```
#[derive(Clone)]
pub struct ServiceDefinition {
    interface_name: String,
    version: String,
    methods: HashMap<MethodKey, MethodHandler>,
}

impl ServiceDefinition {
    pub fn new(interface_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            interface_name: interface_name.into(),
            version: version.into(),
            methods: HashMap::new(),
        }
    }

    /// Adds a method. Registering the same name and parameter types twice
    /// replaces the earlier handler.
    pub fn method<A, R, F>(mut self, name: &str, parameter_types: &[&str], handler: F) -> Self
    where
        A: DeserializeOwned,
        R: Serialize,
        F: Fn(A) -> ServiceResult<R> + Send + Sync + 'static,
    {
        let key = MethodKey {
            name: name.to_string(),
            parameter_types: parameter_types.iter().map(|t| t.to_string()).collect(),
        };
        let method = name.to_string();
        let erased: MethodHandler = Arc::new(move |args: Vec<Value>| {
            let args: A = decode_args(args).map_err(|e| {
                ServiceError::new(format!("invalid arguments for {}: {}", method, e))
            })?;
            let result = handler(args)?;
            serde_json::to_value(result).map_err(|e| {
                ServiceError::new(format!("failed to serialize result of {}: {}", method, e))
            })
        });

        if self.methods.insert(key, erased).is_some() {
            tracing::warn!(
                interface = %self.interface_name,
                method = %name,
                "method redefined, keeping the last handler"
            );
        }
        self
    }

    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Dispatch key, `interface#version`.
    pub fn key(&self) -> String {
        myrpc_common::service_key(&self.interface_name, &self.version)
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Runs the method matching `name` and `parameter_types`.
    ///
    /// A panicking handler is caught and reported as an error.
    ///
    /// # Errors
    ///
    /// - `method not found: ...` if no overload matches
    /// - the handler's own error, or an argument decoding error
    pub fn invoke(&self, name: &str, parameter_types: &[String], args: Vec<Value>) -> ServiceResult<Value> {
        let key = MethodKey {
            name: name.to_string(),
            parameter_types: parameter_types.to_vec(),
        };
        let handler = self.methods.get(&key).ok_or_else(|| {
            ServiceError::new(format!(
                "method not found: {}.{}({})",
                self.interface_name,
                name,
                parameter_types.join(", ")
            ))
        })?;

        match catch_unwind(AssertUnwindSafe(|| handler(args))) {
            Ok(result) => result,
            Err(payload) => Err(ServiceError::new(format!(
                "{}.{} panicked: {}",
                self.interface_name,
                name,
                panic_message(payload.as_ref())
            ))),
        }
    }
}

impl fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<String> = self
            .methods
            .keys()
            .map(|k| format!("{}({})", k.name, k.parameter_types.join(", ")))
            .collect();
        methods.sort();

        f.debug_struct("ServiceDefinition")
            .field("interface_name", &self.interface_name)
            .field("version", &self.version)
            .field("methods", &methods)
            .finish()
    }
}

fn decode_args<A: DeserializeOwned>(args: Vec<Value>) -> serde_json::Result<A> {
    // `()` only deserializes from null
    if args.is_empty() {
        serde_json::from_value(Value::Null)
    } else {
        serde_json::from_value(Value::Array(args))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
