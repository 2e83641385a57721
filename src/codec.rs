//! Pluggable structured-body codec.
//!
//! The dispatcher treats the structured payload format as a collaborator:
//! anything that can decode body bytes into a [`serde_json::Value`] tree
//! and encode one back. The default is JSON; an instance may swap in
//! another codec before `start` via `Instance::set_body_codec`.

use serde_json::Value;

/// Decode/encode step for structured request and response bodies.
///
/// Decode failures are reported as strings and surface on the request as
/// `body_error`; they never abort dispatch.
pub trait BodyCodec: Send + Sync {
    /// Media type this codec produces and consumes, without parameters
    /// (e.g. `application/json`).
    fn content_type(&self) -> &str;

    /// Decode body bytes into a structured value.
    fn decode(&self, bytes: &[u8]) -> Result<Value, String>;

    /// Encode a structured value into response body bytes.
    fn encode(&self, value: &Value) -> Vec<u8>;

    /// Whether a request `Content-Type` header selects this codec.
    /// Parameters (`; charset=utf-8`) are ignored.
    fn matches(&self, content_type: &str) -> bool {
        content_type
            .split(';')
            .next()
            .map(str::trim)
            .is_some_and(|mime| mime.eq_ignore_ascii_case(self.content_type()))
    }
}

/// Default codec: JSON via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl BodyCodec for JsonCodec {
    fn content_type(&self) -> &str {
        "application/json"
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, String> {
        serde_json::from_slice(bytes).map_err(|e| e.to_string())
    }

    fn encode(&self, value: &Value) -> Vec<u8> {
        // serialization of an in-memory Value tree cannot fail
        serde_json::to_vec(value).unwrap_or_default()
    }
}
