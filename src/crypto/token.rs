use crate::crypto::aes::{self, NONCE_SIZE, TAG_SIZE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The identity payload sealed into a session cookie.
///
/// `sid` is the persistent session row id; the row, not the cookie, is the
/// sole source of truth for revocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// The persistent session id.
    pub sid: Uuid,
    /// The authenticated user id.
    pub uid: Uuid,
    /// Issuance time (unix seconds).
    pub iat: i64,
}

impl SessionClaims {
    /// Creates claims for a freshly issued session.
    pub fn new(sid: Uuid, uid: Uuid) -> Self {
        Self {
            sid,
            uid,
            iat: Utc::now().timestamp(),
        }
    }

    /// The issuance time as a `DateTime`.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }
}

/// Opaque "this token is not valid" error.
///
/// Tampered ciphertext, malformed hex, truncated segments and bad payloads
/// are all collapsed into this one value so callers cannot tell which check
/// failed.
#[derive(Debug, PartialEq, Eq)]
pub struct InvalidToken;

/// Seals session claims into the cookie wire format
/// `hex(iv):hex(tag):hex(ciphertext)`.
pub fn seal(key: &[u8; 32], claims: &SessionClaims) -> crate::error::Result<String> {
    let payload = sonic_rs::to_vec(claims)
        .map_err(|e| crate::error::AppError::Internal(format!("Claims serialization: {}", e)))?;

    let (ct_and_tag, nonce) = aes::encrypt(key, &payload)?;
    let split = ct_and_tag.len() - TAG_SIZE;
    let (ciphertext, tag) = ct_and_tag.split_at(split);

    Ok(format!(
        "{}:{}:{}",
        hex::encode(nonce),
        hex::encode(tag),
        hex::encode(ciphertext)
    ))
}

/// Opens a sealed session token. Fails closed: any structural or
/// cryptographic problem yields the same `InvalidToken`.
pub fn open(key: &[u8; 32], token: &str) -> Result<SessionClaims, InvalidToken> {
    let mut parts = token.split(':');
    let (iv_hex, tag_hex, ct_hex) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(iv), Some(tag), Some(ct), None) => (iv, tag, ct),
        _ => return Err(InvalidToken),
    };

    let iv = hex::decode(iv_hex).map_err(|_| InvalidToken)?;
    let tag = hex::decode(tag_hex).map_err(|_| InvalidToken)?;
    let ciphertext = hex::decode(ct_hex).map_err(|_| InvalidToken)?;

    if iv.len() != NONCE_SIZE || tag.len() != TAG_SIZE {
        return Err(InvalidToken);
    }

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&iv);

    let mut ct_and_tag = ciphertext;
    ct_and_tag.extend_from_slice(&tag);

    let payload = aes::decrypt(key, &ct_and_tag, &nonce).map_err(|_| InvalidToken)?;

    sonic_rs::from_slice(&payload).map_err(|_| InvalidToken)
}
