use crate::error::Result;
use base64::{engine::general_purpose, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;

/// The size of the CSRF token in bytes.
const CSRF_TOKEN_SIZE: usize = 32;

/// Generates a new random CSRF token.
///
/// # Returns
///
/// A URL-safe base64-encoded CSRF token.
pub fn generate_csrf_token() -> Result<String> {
    let mut token = [0u8; CSRF_TOKEN_SIZE];
    OsRng.fill_bytes(&mut token);

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(token))
}

/// Double-submit check: the script-readable cookie must equal the echoed
/// request header, compared in constant time.
pub fn tokens_match(cookie: &str, header: &str) -> bool {
    cookie.as_bytes().ct_eq(header.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_distinct() {
        let a = generate_csrf_token().unwrap();
        let b = generate_csrf_token().unwrap();
        assert_ne!(a, b);
        assert!(a.len() >= 40);
    }

    #[test]
    fn matching_requires_exact_equality() {
        let token = generate_csrf_token().unwrap();
        assert!(tokens_match(&token, &token));
        assert!(!tokens_match(&token, &token[1..]));
        assert!(!tokens_match(&token, ""));
    }
}
