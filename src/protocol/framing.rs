//! Newline framing for protocol messages

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Maximum accepted length of a single reply line
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Serialize a message as one `\n`-terminated line
pub fn encode_line<T: Serialize>(message: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Parse one reply line, ignoring the line terminator
///
/// Only JSON objects are valid frames; scalars and arrays are rejected.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, String> {
    let trimmed = line.trim_end_matches(['\n', '\r']);
    let value: serde_json::Value =
        serde_json::from_str(trimmed).map_err(|e| format!("invalid JSON: {e}"))?;
    if !value.is_object() {
        return Err("reply line is not a JSON object".to_string());
    }
    serde_json::from_value(value).map_err(|e| format!("unexpected reply shape: {e}"))
}
