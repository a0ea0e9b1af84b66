//! Key encoding helpers.
//!
//! Public keys travel as lowercase hex. X25519 identity keys carry a one-byte
//! type prefix (`05`) when rendered as a session id; group keys and recipient
//! keys may arrive with or without it.

use constant_time_eq::constant_time_eq;

/// Type prefix of a hex-encoded X25519 session id.
pub const SESSION_ID_PREFIX: &str = "05";

/// Length of a prefixed, hex-encoded session id.
pub const SESSION_ID_HEX_LEN: usize = 66;

#[derive(Debug, thiserror::Error)]
pub enum KeyEncodingError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("invalid key length: expected 32, got {0}")]
    Length(usize),
}

/// Strip the `05` type prefix from a 66-character session id.
///
/// Anything that is not exactly a prefixed session id is returned unchanged.
pub fn remove_prefix_if_needed(hex_key: &str) -> &str {
    if hex_key.len() == SESSION_ID_HEX_LEN && hex_key.starts_with(SESSION_ID_PREFIX) {
        &hex_key[SESSION_ID_PREFIX.len()..]
    } else {
        hex_key
    }
}

/// Render an X25519 public key as a prefixed session id.
pub fn encode_session_id(x25519_public: &[u8; 32]) -> String {
    format!("{}{}", SESSION_ID_PREFIX, hex::encode(x25519_public))
}

/// Decode a hex X25519 public key, with or without the session id prefix.
pub fn decode_x25519_public_hex(hex_key: &str) -> Result<[u8; 32], KeyEncodingError> {
    let bytes = hex::decode(remove_prefix_if_needed(hex_key))?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| KeyEncodingError::Length(len))
}

/// Compare two byte slices in constant time.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    constant_time_eq(a, b)
}

/// Compare two fixed-size arrays in constant time.
pub fn constant_time_compare_array<const N: usize>(a: &[u8; N], b: &[u8; N]) -> bool {
    constant_time_eq(a, b)
}
