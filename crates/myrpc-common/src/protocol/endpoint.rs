//! Service endpoints and provider addresses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::{Result, RpcError};
use super::requests::service_key;

/// A provider's announcement that it serves `interface_name` at `version`
/// on `address`.
///
/// Endpoints are published as ephemeral registry nodes: they exist exactly as
/// long as the provider's registry session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub interface_name: String,
    pub version: String,
    pub address: ServiceAddress,
}

impl ServiceEndpoint {
    pub fn new(interface_name: impl Into<String>, version: impl Into<String>, address: ServiceAddress) -> Self {
        Self {
            interface_name: interface_name.into(),
            version: version.into(),
            address,
        }
    }

    pub fn key(&self) -> String {
        service_key(&self.interface_name, &self.version)
    }
}

/// A `host:port` pair as stored in the registry.
///
/// # Example
///
/// ```
/// use myrpc_common::protocol::ServiceAddress;
///
/// let addr: ServiceAddress = "127.0.0.1:20880".parse().unwrap();
/// assert_eq!(addr.host(), "127.0.0.1");
/// assert_eq!(addr.port(), 20880);
/// assert_eq!(addr.to_string(), "127.0.0.1:20880");
///
/// assert!("127.0.0.1".parse::<ServiceAddress>().is_err());
/// assert!("a:b:c".parse::<ServiceAddress>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceAddress {
    host: String,
    port: u16,
}

impl ServiceAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses exactly one `host:port` pair.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress` if the string does not split into exactly two
    /// colon-separated parts, the host is empty, or the port is not a `u16`.
    pub fn parse(addr: &str) -> Result<Self> {
        let parts: Vec<&str> = addr.split(':').collect();
        if parts.len() != 2 || parts[0].is_empty() {
            return Err(RpcError::InvalidAddress(addr.to_string()));
        }
        let port = parts[1]
            .parse::<u16>()
            .map_err(|_| RpcError::InvalidAddress(addr.to_string()))?;
        Ok(Self::new(parts[0], port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for ServiceAddress {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ServiceAddress {
    type Error = RpcError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ServiceAddress> for String {
    fn from(addr: ServiceAddress) -> Self {
        addr.to_string()
    }
}

impl From<std::net::SocketAddr> for ServiceAddress {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}
