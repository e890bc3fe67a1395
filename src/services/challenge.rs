use crate::crypto::aes::SecureKey;
use crate::crypto::proof;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// TTL for an issued fingerprint challenge.
pub const CHALLENGE_TTL_SECS: i64 = 120;
/// TTL for the one-shot verified flag bridging verify and cast.
pub const VERIFICATION_TTL_SECS: i64 = 120;
/// TTL for a signed face-proof.
pub const FACE_PROOF_TTL_SECS: i64 = 120;

const CHALLENGE_SIZE: usize = 32;

/// An outstanding fingerprint challenge.
#[derive(Debug, Clone)]
pub struct StoredChallenge {
    /// base64url-encoded random value.
    pub challenge: String,
    /// Hard expiry; bounds the replay window.
    pub expires_at: DateTime<Utc>,
}

/// One-shot challenge consumption failure. A single category on purpose:
/// expired, absent and mismatched are indistinguishable to callers.
#[derive(Debug, PartialEq, Eq)]
pub struct ChallengeExpiredOrMismatched;

/// Backing store for challenges and verified flags.
///
/// Process-local in the in-memory implementation; a multi-instance
/// deployment needs a shared implementation behind this same trait.
#[async_trait]
pub trait ChallengeBackend: Send + Sync {
    async fn put_challenge(&self, user_id: Uuid, entry: StoredChallenge);
    /// Removes and returns the outstanding challenge, if any.
    async fn take_challenge(&self, user_id: &Uuid) -> Option<StoredChallenge>;
    async fn put_verified(&self, user_id: Uuid, expires_at: DateTime<Utc>);
    /// Removes and returns the verified-flag expiry, if any.
    async fn take_verified(&self, user_id: &Uuid) -> Option<DateTime<Utc>>;
    /// Drops expired entries.
    async fn sweep(&self, now: DateTime<Utc>);
}

/// Process-local challenge bookkeeping.
#[derive(Default)]
pub struct MemoryChallengeBackend {
    challenges: Mutex<HashMap<Uuid, StoredChallenge>>,
    verified: Mutex<HashMap<Uuid, DateTime<Utc>>>,
}

impl MemoryChallengeBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChallengeBackend for MemoryChallengeBackend {
    async fn put_challenge(&self, user_id: Uuid, entry: StoredChallenge) {
        self.challenges
            .lock()
            .expect("challenge lock poisoned")
            .insert(user_id, entry);
    }

    async fn take_challenge(&self, user_id: &Uuid) -> Option<StoredChallenge> {
        self.challenges
            .lock()
            .expect("challenge lock poisoned")
            .remove(user_id)
    }

    async fn put_verified(&self, user_id: Uuid, expires_at: DateTime<Utc>) {
        self.verified
            .lock()
            .expect("challenge lock poisoned")
            .insert(user_id, expires_at);
    }

    async fn take_verified(&self, user_id: &Uuid) -> Option<DateTime<Utc>> {
        self.verified
            .lock()
            .expect("challenge lock poisoned")
            .remove(user_id)
    }

    async fn sweep(&self, now: DateTime<Utc>) {
        self.challenges
            .lock()
            .expect("challenge lock poisoned")
            .retain(|_, entry| entry.expires_at > now);
        self.verified
            .lock()
            .expect("challenge lock poisoned")
            .retain(|_, expires_at| *expires_at > now);
    }
}

/// The signed face-proof payload. Not persisted anywhere; validity derives
/// from the MAC and the embedded expiry.
#[derive(Debug, Serialize, Deserialize)]
struct FaceProofClaims {
    uid: Uuid,
    confidence: f64,
    threshold: f64,
    nonce: Uuid,
    exp: i64,
}

/// Short-lived, one-shot challenge and verification-proof bookkeeping for
/// both biometric modalities.
#[derive(Clone)]
pub struct ChallengeStore {
    backend: Arc<dyn ChallengeBackend>,
    proof_key: Arc<SecureKey>,
}

impl ChallengeStore {
    pub fn new(backend: Arc<dyn ChallengeBackend>, proof_key: Arc<SecureKey>) -> Self {
        Self { backend, proof_key }
    }

    /// Issues a fresh challenge for the user, overwriting any outstanding one.
    pub async fn issue_challenge(&self, user_id: Uuid) -> String {
        let mut raw = [0u8; CHALLENGE_SIZE];
        OsRng.fill_bytes(&mut raw);
        let challenge = URL_SAFE_NO_PAD.encode(raw);

        self.backend
            .put_challenge(
                user_id,
                StoredChallenge {
                    challenge: challenge.clone(),
                    expires_at: Utc::now() + Duration::seconds(CHALLENGE_TTL_SECS),
                },
            )
            .await;

        challenge
    }

    /// Consumes the user's outstanding challenge.
    ///
    /// The entry is deleted before the comparison, so a challenge can never
    /// be replayed — not even after a failed attempt. Values are compared in
    /// constant time after base64url padding normalization.
    pub async fn consume_challenge(
        &self,
        user_id: &Uuid,
        supplied: &str,
    ) -> std::result::Result<(), ChallengeExpiredOrMismatched> {
        let entry = self
            .backend
            .take_challenge(user_id)
            .await
            .ok_or(ChallengeExpiredOrMismatched)?;

        if Utc::now() > entry.expires_at {
            return Err(ChallengeExpiredOrMismatched);
        }

        let stored = entry.challenge.trim_end_matches('=');
        let supplied = supplied.trim_end_matches('=');

        if bool::from(stored.as_bytes().ct_eq(supplied.as_bytes())) {
            Ok(())
        } else {
            Err(ChallengeExpiredOrMismatched)
        }
    }

    /// Flags the user as having passed assertion verification.
    pub async fn mark_verified(&self, user_id: Uuid) {
        self.backend
            .put_verified(
                user_id,
                Utc::now() + Duration::seconds(VERIFICATION_TTL_SECS),
            )
            .await;
    }

    /// Consumes the one-shot verified flag. Exactly-once: a second call
    /// returns false, so one assertion can never authorize two votes.
    pub async fn consume_verified(&self, user_id: &Uuid) -> bool {
        match self.backend.take_verified(user_id).await {
            Some(expires_at) => Utc::now() <= expires_at,
            None => false,
        }
    }

    /// Issues a signed face-proof asserting a successful comparison.
    pub async fn issue_face_proof(
        &self,
        user_id: Uuid,
        confidence: f64,
        threshold: f64,
    ) -> Result<String> {
        let claims = FaceProofClaims {
            uid: user_id,
            confidence,
            threshold,
            nonce: Uuid::new_v4(),
            exp: (Utc::now() + Duration::seconds(FACE_PROOF_TTL_SECS)).timestamp(),
        };

        let payload = sonic_rs::to_vec(&claims)
            .map_err(|e| AppError::Internal(format!("Proof serialization: {}", e)))?;

        proof::sign(self.proof_key.as_bytes(), &payload)
            .map_err(|_| AppError::Encryption("Proof signing failed".to_string()))
    }

    /// Verifies a face-proof: MAC, embedded expiry and user binding. No
    /// server-side state is consulted.
    pub async fn verify_face_proof(&self, user_id: &Uuid, token: &str) -> bool {
        let Some(payload) = proof::verify(self.proof_key.as_bytes(), token) else {
            return false;
        };
        let Ok(claims) = sonic_rs::from_slice::<FaceProofClaims>(&payload) else {
            return false;
        };
        claims.uid == *user_id && Utc::now().timestamp() <= claims.exp
    }

    /// Drops expired challenges and verified flags.
    pub async fn sweep(&self) {
        self.backend.sweep(Utc::now()).await;
    }
}
