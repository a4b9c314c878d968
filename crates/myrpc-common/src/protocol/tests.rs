//! Integration tests for the protocol module
//!
//! These tests verify request construction, id generation and the
//! response shapes.

#[cfg(test)]
mod tests {
    use super::super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_request_creation() {
        let req = Request::new("com.example.ExampleService", "sayHello");
        assert_eq!(req.interface_name, "com.example.ExampleService");
        assert_eq!(req.method_name, "sayHello");
        assert!(req.parameters.is_empty());
        assert_eq!(req.version, DEFAULT_VERSION);
    }

    #[test]
    fn test_request_with_args_and_version() {
        let req = Request::new("svc", "m")
            .with_arg("string", json!("World"))
            .with_arg("int", json!(3))
            .with_version("1.0");
        assert_eq!(req.parameter_types, vec!["string".to_string(), "int".to_string()]);
        assert_eq!(req.parameters, vec![json!("World"), json!(3)]);
        assert_eq!(req.service_key(), "svc#1.0");
    }

    #[test]
    fn test_request_validate_rejects_arity_mismatch() {
        let req = Request::new("svc", "m").with_args(vec!["int".into()], vec![]);
        assert!(matches!(req.validate(), Err(RpcError::InvalidRequest(_))));
    }

    #[test]
    fn test_request_validate_rejects_empty_names() {
        assert!(Request::new("", "m").validate().is_err());
        assert!(Request::new("svc", "").validate().is_err());
    }

    #[test]
    fn test_request_id_uniqueness() {
        let ids: HashSet<_> = (0..1000)
            .map(|_| Request::new("svc", "m").request_id)
            .collect();
        assert_eq!(ids.len(), 1000, "All request IDs should be unique");
    }

    #[test]
    fn test_request_id_uniqueness_under_stress() {
        use std::sync::{Arc, Mutex};
        use std::thread;

        let ids = Arc::new(Mutex::new(HashSet::new()));
        let mut handles = vec![];

        for _ in 0..8 {
            let ids_clone = Arc::clone(&ids);
            handles.push(thread::spawn(move || {
                for _ in 0..500 {
                    let id = Request::new("svc", "m").request_id;
                    assert!(ids_clone.lock().unwrap().insert(id), "Duplicate ID detected");
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ids.lock().unwrap().len(), 4000);
    }

    #[test]
    fn test_missing_version_deserializes_to_default() {
        let raw = json!({
            "request_id": "abc",
            "interface_name": "svc",
            "method_name": "m"
        });
        let req: Request = serde_json::from_value(raw).unwrap();
        assert_eq!(req.version, DEFAULT_VERSION);
        assert!(req.parameters.is_empty());
    }

    #[test]
    fn test_response_success() {
        let resp = Response::success("abc", json!({"value": 42}));
        assert_eq!(resp.request_id, "abc");
        assert_eq!(resp.result, Some(json!({"value": 42})));
        assert!(!resp.is_error());
    }

    #[test]
    fn test_response_error() {
        let resp = Response::error("abc", "something failed");
        assert!(resp.is_error());
        assert!(resp.result.is_none());
        assert_eq!(resp.error.as_deref(), Some("something failed"));
    }

    #[test]
    fn test_response_empty_is_void_success() {
        let resp = Response::empty("abc");
        assert!(resp.result.is_none());
        assert!(!resp.is_error());
    }

    #[test]
    fn test_array_parameters_survive_serialization() {
        let req = Request::new("svc", "sum")
            .with_arg("int[]", json!([1, 2, 3]))
            .with_arg("map", json!({"nested": [true, null]}));
        let bytes = serde_json::to_vec(&req).unwrap();
        let decoded: Request = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, req);
    }
}
