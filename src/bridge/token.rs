//! Host token
//!
//! A surface proves it was started by the host launcher by sending the token
//! printed at startup as its first message.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use subtle::ConstantTimeEq;

const TOKEN_LEN: usize = 32;

/// Generate a cryptographically secure authentication token
///
/// 32 bytes of OS randomness, URL-safe Base64 without padding (43 chars).
/// The token lives as long as the host process.
pub fn generate_token() -> String {
    let mut data = [0u8; TOKEN_LEN];
    rand::rngs::OsRng.fill_bytes(&mut data);
    URL_SAFE_NO_PAD.encode(data)
}

/// Constant-time comparison of a received token against the host token
pub fn validate_token(received: &str, expected: &str) -> bool {
    let received = received.trim();

    // Quick length check (doesn't leak token content)
    if received.len() != expected.len() {
        return false;
    }

    let received_bytes = match URL_SAFE_NO_PAD.decode(received) {
        Ok(bytes) if bytes.len() == TOKEN_LEN => bytes,
        _ => {
            tracing::warn!("Token validation failed: invalid Base64 or wrong length");
            return false;
        }
    };
    let expected_bytes = match URL_SAFE_NO_PAD.decode(expected) {
        Ok(bytes) if bytes.len() == TOKEN_LEN => bytes,
        _ => {
            tracing::warn!("Token validation failed: expected token malformed");
            return false;
        }
    };

    bool::from(received_bytes.ct_eq(&expected_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), 43);
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_validate_token() {
        let token = generate_token();
        assert!(validate_token(&token, &token));
        assert!(validate_token(&format!(" {}\n", token), &token));
        assert!(!validate_token(&generate_token(), &token));
        assert!(!validate_token("", &token));
        assert!(!validate_token(&"!".repeat(43), &token));
    }
}
