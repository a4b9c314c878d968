//! # MyRPC CLI
//!
//! Command-line interface for MyRPC.
//!
//! This crate provides the `myrpc` binary and the demo service it runs:
//!
//! - **Registry**: a networked coordination server providers and consumers share
//! - **Provider**: serves the demo `ExampleService` and registers it
//! - **Call**: discovers a provider and calls `sayHello` through a proxy
//!
//! ## Key Commands
//!
//! - `myrpc registry`: Start the coordination server
//! - `myrpc provider`: Start a demo provider
//! - `myrpc call`: Call the demo service (prints only the result)

pub mod demo;

/// Environment variable naming the coordination server address
pub const REGISTRY_ENV: &str = "MYRPC_REGISTRY";

/// Environment variable naming the host providers advertise
pub const ADVERTISE_HOST_ENV: &str = "MYRPC_ADVERTISE_HOST";

/// Coordination server address used when neither flag nor environment set one
pub const DEFAULT_REGISTRY: &str = "127.0.0.1:2181";

/// Registry address: flag, then `MYRPC_REGISTRY`, then the default.
pub fn resolve_registry(flag: Option<String>) -> String {
    first_set(flag, std::env::var(REGISTRY_ENV).ok()).unwrap_or_else(|| DEFAULT_REGISTRY.to_string())
}

/// Advertised host: flag, then `MYRPC_ADVERTISE_HOST`, then the server default.
pub fn resolve_advertise_host(flag: Option<String>) -> String {
    first_set(flag, std::env::var(ADVERTISE_HOST_ENV).ok())
        .unwrap_or_else(|| myrpc_server::DEFAULT_ADVERTISE_HOST.to_string())
}

fn first_set(flag: Option<String>, env: Option<String>) -> Option<String> {
    let set = |value: &String| !value.trim().is_empty();
    flag.filter(set).or_else(|| env.filter(set))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_wins_over_env() {
        assert_eq!(
            first_set(Some("10.0.0.1:2181".into()), Some("10.0.0.2:2181".into())),
            Some("10.0.0.1:2181".to_string())
        );
    }

    #[test]
    fn test_env_used_without_flag() {
        assert_eq!(
            first_set(None, Some("10.0.0.2:2181".into())),
            Some("10.0.0.2:2181".to_string())
        );
    }

    #[test]
    fn test_blank_values_ignored() {
        assert_eq!(first_set(None, Some("  ".into())), None);
        assert_eq!(first_set(None, None), None);
        assert_eq!(
            first_set(Some(String::new()), Some("10.0.0.2:2181".into())),
            Some("10.0.0.2:2181".to_string())
        );
    }
}
