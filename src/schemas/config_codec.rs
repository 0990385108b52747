//! Encoding of opaque component configurations.
//!
//! A configuration is serialized to JSON and the JSON text is base64
//! encoded, so the column holds a single self-delimited ASCII payload
//! regardless of what the user put in the mapping.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{StoreError, StoreResult};
use crate::models::ComponentConfiguration;

/// Encodes a configuration mapping into its stored byte form.
pub fn encode_configuration(configuration: &ComponentConfiguration) -> StoreResult<Vec<u8>> {
    let json = serde_json::to_vec(configuration)
        .map_err(|e| StoreError::Decode(format!("configuration is not serializable: {}", e)))?;
    Ok(STANDARD.encode(json).into_bytes())
}

/// Decodes a stored configuration blob back into a mapping.
///
/// Fails with [`StoreError::Decode`] when the blob is not base64, not JSON,
/// or holds a JSON value other than an object.
pub fn decode_configuration(blob: &[u8]) -> StoreResult<ComponentConfiguration> {
    let json = STANDARD
        .decode(blob)
        .map_err(|e| StoreError::Decode(format!("configuration is not valid base64: {}", e)))?;

    match serde_json::from_slice(&json) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::Decode(format!(
            "configuration must be a JSON object, found {}",
            json_kind(&other)
        ))),
        Err(e) => Err(StoreError::Decode(format!(
            "configuration is not valid JSON: {}",
            e
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
