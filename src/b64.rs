//! Base64 helpers for binary payloads carried in JSON frames.

use base64::{engine::general_purpose::STANDARD, Engine as _};

pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub fn decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(data)
}
