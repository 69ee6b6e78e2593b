//! Base64 JSON payload codec.
//!
//! Task bodies travel base64-encoded through the queue. The decoder
//! also accepts raw JSON so local tools can POST endpoints directly.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{QueueError, QueueResult};

/// Encode a payload as base64 JSON for a task body.
pub fn encode_payload<T: Serialize>(payload: &T) -> QueueResult<String> {
    let json = serde_json::to_vec(payload)?;
    Ok(BASE64.encode(json))
}

/// Decode a delivered task body: raw JSON first, then base64 JSON.
pub fn decode_payload<T: DeserializeOwned>(body: &str) -> QueueResult<T> {
    let trimmed = body.trim();

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let decoded = BASE64
        .decode(trimmed)
        .map_err(|e| QueueError::invalid_payload(format!("not JSON and not base64: {}", e)))?;
    serde_json::from_slice(&decoded)
        .map_err(|e| QueueError::invalid_payload(format!("base64 body is not valid JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        upload_id: String,
        batch_index: u32,
    }

    fn payload() -> Payload {
        Payload {
            upload_id: "up-1".into(),
            batch_index: 2,
        }
    }

    #[test]
    fn test_roundtrip() {
        let encoded = encode_payload(&payload()).unwrap();
        // Encoded form is base64, not JSON
        assert!(!encoded.contains('{'));

        let decoded: Payload = decode_payload(&encoded).unwrap();
        assert_eq!(decoded, payload());
    }

    #[test]
    fn test_raw_json_accepted() {
        let decoded: Payload =
            decode_payload(r#"{"upload_id":"up-1","batch_index":2}"#).unwrap();
        assert_eq!(decoded, payload());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(decode_payload::<Payload>("not//valid//anything").is_err());
    }
}
