use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::error::{Result, RpcError};
use crate::protocol::{Request, Response};

/// Symmetric serialization capability used for frame payloads.
///
/// Whatever `serialize` produces, `deserialize` must accept and turn back
/// into an equal value.
pub trait Serializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T>;
}

/// Codec for encoding/decoding RPC payloads
///
/// Only JSON is supported, but the enum leaves room for other formats.
/// Arguments and results are `serde_json::Value`s, which rules out formats
/// that cannot deserialize self-describing data.
///
/// # Example
///
/// ```
/// use myrpc_common::transport::Codec;
/// use myrpc_common::protocol::Request;
///
/// let codec = Codec::new();
/// let request = Request::new("com.example.ExampleService", "sayHello");
///
/// let encoded = codec.encode_request(&request).unwrap();
/// let decoded = codec.decode_request(&encoded).unwrap();
/// assert_eq!(request, decoded);
/// ```
#[derive(Debug, Clone, Copy)]
pub enum Codec {
    /// JSON codec (currently the only supported format)
    Json(JsonCodec),
}

impl Codec {
    /// Create a new codec (JSON is the only supported format)
    pub fn new() -> Self {
        Codec::Json(JsonCodec)
    }

    pub fn encode_request(&self, request: &Request) -> Result<Vec<u8>> {
        self.serialize(request)
    }

    pub fn decode_request(&self, data: &[u8]) -> Result<Request> {
        self.deserialize(data)
    }

    pub fn encode_response(&self, response: &Response) -> Result<Vec<u8>> {
        self.serialize(response)
    }

    pub fn decode_response(&self, data: &[u8]) -> Result<Response> {
        self.deserialize(data)
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer for Codec {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Codec::Json(json) => json.serialize(value),
        }
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            Codec::Json(json) => json.deserialize(data),
        }
    }
}

/// JSON serializer for frame payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Serializer for JsonCodec {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        serde_json::from_slice(data)
            .map_err(|e| RpcError::Protocol(format!("Failed to decode payload: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_codec_round_trip() {
        let request = Request::new("svc", "m").with_arg("int", json!(42));

        let encoded = JsonCodec.serialize(&request).unwrap();
        let decoded: Request = JsonCodec.deserialize(&encoded).unwrap();

        assert_eq!(request, decoded);
    }

    #[test]
    fn test_codec_enum_response_round_trip() {
        let codec = Codec::new();
        let response = Response::success("id-1", json!({"nested": [1, "two", null]}));

        let encoded = codec.encode_response(&response).unwrap();
        let decoded = codec.decode_response(&encoded).unwrap();

        assert_eq!(response, decoded);
    }

    #[test]
    fn test_error_response() {
        let codec = Codec::new();
        let response = Response::error("id-2", "Test error message");

        let decoded = codec.decode_response(&codec.encode_response(&response).unwrap()).unwrap();

        assert!(decoded.is_error());
        assert_eq!(decoded.error, Some("Test error message".to_string()));
    }

    #[test]
    fn test_invalid_data_is_protocol_error() {
        let result = Codec::new().decode_request(&[0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(matches!(result, Err(RpcError::Protocol(_))));
    }
}
