use std::collections::HashMap;

use myrpc_common::{service_key, Request, Response, Result, RpcError};
use serde_json::Value;

use crate::service::ServiceDefinition;

/// Error text for a request naming an unknown `interface#version`.
pub const SERVICE_NOT_FOUND: &str = "service not found";

/// Services served by one provider, keyed by `interface#version`.
///
/// Built once at startup and shared read-only by every connection.
#[derive(Debug, Default)]
pub struct DispatchTable {
    services: HashMap<String, ServiceDefinition>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a service.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the interface name or version is empty, or
    /// if the same `interface#version` is already present.
    pub fn insert(&mut self, service: ServiceDefinition) -> Result<()> {
        if service.interface_name().is_empty() || service.version().is_empty() {
            return Err(RpcError::InvalidRequest(
                "service interface and version must not be empty".to_string(),
            ));
        }
        let key = service.key();
        if self.services.contains_key(&key) {
            return Err(RpcError::InvalidRequest(format!("service {} defined twice", key)));
        }
        self.services.insert(key, service);
        Ok(())
    }

    pub fn get(&self, interface_name: &str, version: &str) -> Option<&ServiceDefinition> {
        self.services.get(&service_key(interface_name, version))
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceDefinition> {
        self.services.values()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Executes `request` and builds its response.
    ///
    /// Never fails: every problem is reported in the response's `error`, and
    /// the response always carries the request's id.
    pub fn dispatch(&self, request: Request) -> Response {
        let request_id = request.request_id.clone();

        if let Err(e) = request.validate() {
            tracing::debug!(request_id = %request_id, error = %e, "rejecting invalid request");
            return Response::error(request_id, e.to_string());
        }

        let Some(service) = self.services.get(&request.service_key()) else {
            tracing::debug!(
                request_id = %request_id,
                interface = %request.interface_name,
                version = %request.version,
                "service not found"
            );
            return Response::error(request_id, SERVICE_NOT_FOUND);
        };

        tracing::debug!(
            request_id = %request_id,
            interface = %request.interface_name,
            method = %request.method_name,
            "dispatching request"
        );

        match service.invoke(&request.method_name, &request.parameter_types, request.parameters) {
            Ok(Value::Null) => Response::empty(request_id),
            Ok(result) => Response::success(request_id, result),
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    interface = %request.interface_name,
                    method = %request.method_name,
                    error = %e,
                    "service method failed"
                );
                Response::error(request_id, e.to_string())
            }
        }
    }
}
