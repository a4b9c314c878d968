pub mod endpoint;
pub mod error;
pub mod requests;
pub mod responses;

#[cfg(test)]
mod tests;

pub use endpoint::{ServiceAddress, ServiceEndpoint};
pub use error::{Result, RpcError};
pub use requests::{service_key, Request, RequestId, DEFAULT_VERSION};
pub use responses::{Response, RpcResult};
