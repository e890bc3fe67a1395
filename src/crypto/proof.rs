use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// A signing failure. Only possible with a malformed key, which `SecureKey`
/// rules out, but surfaced rather than unwrapped.
#[derive(Debug)]
pub struct MacError;

/// Signs a payload and encodes it as `base64url(payload).base64url(mac)`.
pub fn sign(key: &[u8], payload: &[u8]) -> Result<String, MacError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| MacError)?;
    mac.update(payload);
    let tag = mac.finalize().into_bytes();

    Ok(format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(payload),
        URL_SAFE_NO_PAD.encode(tag)
    ))
}

/// Verifies a `base64url(payload).base64url(mac)` token and returns the
/// payload bytes. The MAC comparison is constant-time (`Mac::verify_slice`).
pub fn verify(key: &[u8], token: &str) -> Option<Vec<u8>> {
    let (payload_b64, tag_b64) = token.split_once('.')?;
    let payload = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
    let tag = URL_SAFE_NO_PAD.decode(tag_b64).ok()?;

    let mut mac = HmacSha256::new_from_slice(key).ok()?;
    mac.update(&payload);
    mac.verify_slice(&tag).ok()?;

    Some(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let token = sign(b"proof key", b"{\"uid\":1}").unwrap();
        assert_eq!(verify(b"proof key", &token).unwrap(), b"{\"uid\":1}");
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let token = sign(b"proof key", b"payload").unwrap();
        assert!(verify(b"other key", &token).is_none());
    }

    #[test]
    fn verify_rejects_tampered_payload() {
        let token = sign(b"proof key", b"payload").unwrap();
        let (payload_b64, tag_b64) = token.split_once('.').unwrap();
        let swapped = format!("{}.{}", URL_SAFE_NO_PAD.encode(b"payloae"), tag_b64);
        assert!(verify(b"proof key", &swapped).is_none());
        let garbled = format!("{}x.{}", payload_b64, tag_b64);
        assert!(verify(b"proof key", &garbled).is_none());
    }

    #[test]
    fn verify_rejects_structural_garbage() {
        assert!(verify(b"proof key", "").is_none());
        assert!(verify(b"proof key", "no-dot-here").is_none());
        assert!(verify(b"proof key", "!!!.@@@").is_none());
    }
}
