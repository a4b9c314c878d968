//! MyRPC Request Types
//!
//! This module defines the RPC request structure sent from a client proxy to
//! a provider.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{Result, RpcError};

/// Opaque identifier correlating a response with its request.
pub type RequestId = String;

/// Version used when a service or reference does not name one.
pub const DEFAULT_VERSION: &str = "DEFAULT";

/// An RPC request describing one method invocation on a remote interface.
///
/// # Fields
///
/// - `request_id`: Unique per in-flight call on a connection (UUID v4)
/// - `interface_name`: Fully qualified name of the target interface
/// - `method_name`: Method to invoke on that interface
/// - `parameter_types`: Ordered type descriptors used to select the overload
/// - `parameters`: Argument values, one per type descriptor
/// - `version`: Service version, `"DEFAULT"` unless set
///
/// # Example
///
/// ```
/// use myrpc_common::protocol::Request;
/// use serde_json::json;
///
/// let request = Request::new("com.example.ExampleService", "sayHello")
///     .with_arg("string", json!("World"))
///     .with_arg("int", json!(3))
///     .with_version("1.0");
///
/// assert_eq!(request.parameter_types, vec!["string", "int"]);
/// assert!(request.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub request_id: RequestId,
    pub interface_name: String,
    pub method_name: String,
    #[serde(default)]
    pub parameter_types: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<serde_json::Value>,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

impl Request {
    /// Creates a request with a fresh id, no arguments and the default version.
    pub fn new(interface_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Request {
            request_id: generate_request_id(),
            interface_name: interface_name.into(),
            method_name: method_name.into(),
            parameter_types: Vec::new(),
            parameters: Vec::new(),
            version: default_version(),
        }
    }

    /// Appends one typed argument.
    pub fn with_arg(mut self, type_descriptor: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameter_types.push(type_descriptor.into());
        self.parameters.push(value);
        self
    }

    /// Replaces the whole argument list.
    pub fn with_args(mut self, parameter_types: Vec<String>, parameters: Vec<serde_json::Value>) -> Self {
        self.parameter_types = parameter_types;
        self.parameters = parameters;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Key of the service this request targets, `interface#version`.
    pub fn service_key(&self) -> String {
        service_key(&self.interface_name, &self.version)
    }

    /// Checks the structural invariants of the request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the id, interface or method is empty, or if
    /// the number of type descriptors differs from the number of arguments.
    pub fn validate(&self) -> Result<()> {
        if self.request_id.is_empty() {
            return Err(RpcError::InvalidRequest("empty request id".to_string()));
        }
        if self.interface_name.is_empty() {
            return Err(RpcError::InvalidRequest("empty interface name".to_string()));
        }
        if self.method_name.is_empty() {
            return Err(RpcError::InvalidRequest("empty method name".to_string()));
        }
        if self.parameter_types.len() != self.parameters.len() {
            return Err(RpcError::InvalidRequest(format!(
                "{} parameter types but {} parameters",
                self.parameter_types.len(),
                self.parameters.len()
            )));
        }
        Ok(())
    }
}

/// Cache and dispatch key for an interface at a version.
pub fn service_key(interface_name: &str, version: &str) -> String {
    format!("{}#{}", interface_name, version)
}

fn generate_request_id() -> RequestId {
    Uuid::new_v4().to_string()
}
