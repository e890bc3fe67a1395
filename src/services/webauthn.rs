use crate::error::AppError;
use crate::services::challenge::ChallengeStore;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

/// COSE algorithm identifier for ES256, the only algorithm accepted.
pub const ES256_ALG: i32 = -7;

const ASSERTION_CEREMONY: &str = "webauthn.get";
const CREDENTIAL_TYPE: &str = "public-key";

/// rpIdHash (32) + flags (1) + signCount (4).
const MIN_AUTH_DATA_LEN: usize = 37;
const FLAG_USER_PRESENT: u8 = 0x01;
const FLAG_USER_VERIFIED: u8 = 0x04;

/// The assertion a browser returns, binary fields base64url-encoded.
#[derive(Debug, Deserialize)]
pub struct AssertionPayload {
    pub id: String,
    #[serde(rename = "rawId")]
    pub raw_id: String,
    #[serde(rename = "type")]
    pub credential_type: String,
    pub response: AssertionResponse,
}

/// The authenticator's response inside an assertion.
#[derive(Debug, Deserialize)]
pub struct AssertionResponse {
    #[serde(rename = "authenticatorData")]
    pub authenticator_data: String,
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub signature: String,
    #[serde(rename = "userHandle")]
    pub user_handle: Option<String>,
}

/// The collected client data the authenticator signed over.
#[derive(Debug, Deserialize)]
struct ClientData {
    #[serde(rename = "type")]
    ceremony: String,
    challenge: String,
    origin: String,
}

/// The credential on record for a user.
#[derive(Debug)]
pub struct StoredCredential<'a> {
    /// base64url credential id captured at registration.
    pub credential_id: &'a str,
    /// Uncompressed SEC1 P-256 public key.
    pub public_key: &'a [u8],
    /// COSE algorithm of the credential.
    pub algorithm: i32,
}

/// Categorical verification failures. Callers learn the category and nothing
/// about which sub-check inside it failed.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum WebAuthnError {
    #[error("Malformed assertion payload")]
    Malformed,

    #[error("Challenge expired or mismatched")]
    ChallengeExpiredOrMismatched,

    #[error("Unknown credential")]
    CredentialMismatch,

    /// The credential was registered against a different deployment domain.
    /// Re-registration is the remedy, not a retry.
    #[error("Credential is not bound to this domain; please re-register your fingerprint")]
    DomainBindingMismatch,

    #[error("User verification was not confirmed by the authenticator")]
    UserVerificationRequired,

    #[error("Assertion signature invalid")]
    SignatureInvalid,
}

impl From<WebAuthnError> for AppError {
    fn from(e: WebAuthnError) -> Self {
        match e {
            WebAuthnError::Malformed => AppError::Validation(e.to_string()),
            _ => AppError::Authentication(e.to_string()),
        }
    }
}

/// base64url decode, tolerant of padding.
fn b64url_decode(value: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(value.trim_end_matches('=')).ok()
}

fn normalized_eq(a: &str, b: &str) -> bool {
    let a = a.trim_end_matches('=');
    let b = b.trim_end_matches('=');
    bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

/// Verifies a fingerprint assertion end to end.
///
/// Checks run in a strict order so cheap structural rejections happen before
/// the challenge is burned and before any signature math:
/// structural payload → ceremony type → origin allow-list → one-shot
/// challenge consumption → credential binding → authenticator data
/// (RP-ID hash, presence/verification flags) → ECDSA signature over
/// `authenticatorData ‖ SHA-256(clientDataJSON)`.
///
/// On success the user's one-shot verified flag is set for the vote-casting
/// step to consume.
pub async fn verify_assertion(
    challenges: &ChallengeStore,
    user_id: Uuid,
    assertion: &AssertionPayload,
    credential: &StoredCredential<'_>,
    allowed_origins: &[String],
    rp_id: &str,
) -> Result<(), WebAuthnError> {
    // Structural validation before anything else.
    if assertion.credential_type != CREDENTIAL_TYPE
        || assertion.id.is_empty()
        || assertion.raw_id.is_empty()
    {
        return Err(WebAuthnError::Malformed);
    }

    let auth_data =
        b64url_decode(&assertion.response.authenticator_data).ok_or(WebAuthnError::Malformed)?;
    let client_data_bytes =
        b64url_decode(&assertion.response.client_data_json).ok_or(WebAuthnError::Malformed)?;
    let signature_der =
        b64url_decode(&assertion.response.signature).ok_or(WebAuthnError::Malformed)?;

    if !normalized_eq(&assertion.id, &assertion.raw_id) {
        return Err(WebAuthnError::Malformed);
    }

    let client_data: ClientData =
        sonic_rs::from_slice(&client_data_bytes).map_err(|_| WebAuthnError::Malformed)?;

    if client_data.ceremony != ASSERTION_CEREMONY {
        return Err(WebAuthnError::Malformed);
    }

    if !allowed_origins.iter().any(|o| *o == client_data.origin) {
        return Err(WebAuthnError::DomainBindingMismatch);
    }

    // One shot: the outstanding challenge is deleted here no matter what the
    // comparison says, so it can never be presented twice.
    challenges
        .consume_challenge(&user_id, &client_data.challenge)
        .await
        .map_err(|_| WebAuthnError::ChallengeExpiredOrMismatched)?;

    if !normalized_eq(&assertion.id, credential.credential_id) {
        return Err(WebAuthnError::CredentialMismatch);
    }

    if auth_data.len() < MIN_AUTH_DATA_LEN {
        return Err(WebAuthnError::Malformed);
    }

    let rp_id_hash = Sha256::digest(rp_id.as_bytes());
    if !bool::from(auth_data[..32].ct_eq(rp_id_hash.as_slice())) {
        return Err(WebAuthnError::DomainBindingMismatch);
    }

    let flags = auth_data[32];
    if flags & FLAG_USER_PRESENT == 0 || flags & FLAG_USER_VERIFIED == 0 {
        return Err(WebAuthnError::UserVerificationRequired);
    }

    if credential.algorithm != ES256_ALG {
        return Err(WebAuthnError::SignatureInvalid);
    }

    let verifying_key = VerifyingKey::from_sec1_bytes(credential.public_key)
        .map_err(|_| WebAuthnError::SignatureInvalid)?;
    let signature =
        Signature::from_der(&signature_der).map_err(|_| WebAuthnError::SignatureInvalid)?;

    // The authenticator signed authenticatorData ‖ SHA-256(clientDataJSON).
    let client_data_hash = Sha256::digest(&client_data_bytes);
    let mut signed_payload = Vec::with_capacity(auth_data.len() + client_data_hash.len());
    signed_payload.extend_from_slice(&auth_data);
    signed_payload.extend_from_slice(&client_data_hash);

    verifying_key
        .verify(&signed_payload, &signature)
        .map_err(|_| WebAuthnError::SignatureInvalid)?;

    challenges.mark_verified(user_id).await;
    tracing::info!("✅ Assertion verified for user: {}", user_id);

    Ok(())
}

/// The origin allow-list for assertion verification: the request's own
/// origin, the canonical application origin, and fixed loopback origins
/// outside production.
pub fn allowed_origins(
    request_origin: Option<&str>,
    app_origin: &str,
    production: bool,
) -> Vec<String> {
    let mut origins = vec![app_origin.to_string()];

    if let Some(origin) = request_origin {
        if !origin.is_empty() && !origins.iter().any(|o| o == origin) {
            origins.push(origin.to_string());
        }
    }

    if !production {
        for loopback in ["http://localhost:3000", "http://127.0.0.1:3000"] {
            if !origins.iter().any(|o| o == loopback) {
                origins.push(loopback.to_string());
            }
        }
    }

    origins
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::aes::derive_key;
    use crate::services::challenge::MemoryChallengeBackend;
    use p256::ecdsa::{signature::Signer, SigningKey};
    use rand::rngs::OsRng;
    use std::sync::Arc;

    const RP_ID: &str = "vote.example.org";
    const ORIGIN: &str = "https://vote.example.org";
    const CRED_ID: &str = "dGVzdC1jcmVkZW50aWFs";

    fn challenge_store() -> ChallengeStore {
        ChallengeStore::new(
            Arc::new(MemoryChallengeBackend::new()),
            Arc::new(derive_key("face-proof", b"test secret")),
        )
    }

    fn keypair() -> (SigningKey, Vec<u8>) {
        let signing_key = SigningKey::random(&mut OsRng);
        let public_key = VerifyingKey::from(&signing_key)
            .to_encoded_point(false)
            .as_bytes()
            .to_vec();
        (signing_key, public_key)
    }

    fn auth_data(rp_id: &str, flags: u8) -> Vec<u8> {
        let mut data = Sha256::digest(rp_id.as_bytes()).to_vec();
        data.push(flags);
        data.extend_from_slice(&0u32.to_be_bytes());
        data
    }

    fn client_data(challenge: &str, origin: &str) -> Vec<u8> {
        sonic_rs::to_vec(&sonic_rs::json!({
            "type": "webauthn.get",
            "challenge": challenge,
            "origin": origin,
        }))
        .unwrap()
    }

    fn signed_assertion(
        signing_key: &SigningKey,
        auth_data: &[u8],
        client_data: &[u8],
    ) -> AssertionPayload {
        let mut payload = auth_data.to_vec();
        payload.extend_from_slice(&Sha256::digest(client_data));
        let signature: Signature = signing_key.sign(&payload);

        AssertionPayload {
            id: CRED_ID.to_string(),
            raw_id: CRED_ID.to_string(),
            credential_type: "public-key".to_string(),
            response: AssertionResponse {
                authenticator_data: URL_SAFE_NO_PAD.encode(auth_data),
                client_data_json: URL_SAFE_NO_PAD.encode(client_data),
                signature: URL_SAFE_NO_PAD.encode(signature.to_der().as_bytes()),
                user_handle: None,
            },
        }
    }

    async fn run(
        store: &ChallengeStore,
        user: Uuid,
        assertion: &AssertionPayload,
        public_key: &[u8],
    ) -> Result<(), WebAuthnError> {
        let credential = StoredCredential {
            credential_id: CRED_ID,
            public_key,
            algorithm: ES256_ALG,
        };
        verify_assertion(
            store,
            user,
            assertion,
            &credential,
            &[ORIGIN.to_string()],
            RP_ID,
        )
        .await
    }

    #[tokio::test]
    async fn valid_assertion_verifies_and_sets_the_flag() {
        let store = challenge_store();
        let user = Uuid::new_v4();
        let (signing_key, public_key) = keypair();

        let challenge = store.issue_challenge(user).await;
        let assertion = signed_assertion(
            &signing_key,
            &auth_data(RP_ID, FLAG_USER_PRESENT | FLAG_USER_VERIFIED),
            &client_data(&challenge, ORIGIN),
        );

        assert_eq!(run(&store, user, &assertion, &public_key).await, Ok(()));
        assert!(store.consume_verified(&user).await);
    }

    #[tokio::test]
    async fn replayed_assertion_fails_on_the_consumed_challenge() {
        let store = challenge_store();
        let user = Uuid::new_v4();
        let (signing_key, public_key) = keypair();

        let challenge = store.issue_challenge(user).await;
        let assertion = signed_assertion(
            &signing_key,
            &auth_data(RP_ID, FLAG_USER_PRESENT | FLAG_USER_VERIFIED),
            &client_data(&challenge, ORIGIN),
        );

        assert_eq!(run(&store, user, &assertion, &public_key).await, Ok(()));
        assert_eq!(
            run(&store, user, &assertion, &public_key).await,
            Err(WebAuthnError::ChallengeExpiredOrMismatched)
        );
    }

    #[tokio::test]
    async fn mismatched_challenge_burns_the_outstanding_one() {
        let store = challenge_store();
        let user = Uuid::new_v4();
        let (signing_key, public_key) = keypair();

        let challenge = store.issue_challenge(user).await;
        let wrong = signed_assertion(
            &signing_key,
            &auth_data(RP_ID, FLAG_USER_PRESENT | FLAG_USER_VERIFIED),
            &client_data("bm90LXRoZS1jaGFsbGVuZ2U", ORIGIN),
        );
        assert_eq!(
            run(&store, user, &wrong, &public_key).await,
            Err(WebAuthnError::ChallengeExpiredOrMismatched)
        );

        // The genuine challenge can no longer be used either.
        let genuine = signed_assertion(
            &signing_key,
            &auth_data(RP_ID, FLAG_USER_PRESENT | FLAG_USER_VERIFIED),
            &client_data(&challenge, ORIGIN),
        );
        assert_eq!(
            run(&store, user, &genuine, &public_key).await,
            Err(WebAuthnError::ChallengeExpiredOrMismatched)
        );
    }

    #[tokio::test]
    async fn foreign_origin_is_a_domain_binding_error_despite_a_valid_signature() {
        let store = challenge_store();
        let user = Uuid::new_v4();
        let (signing_key, public_key) = keypair();

        let challenge = store.issue_challenge(user).await;
        let assertion = signed_assertion(
            &signing_key,
            &auth_data(RP_ID, FLAG_USER_PRESENT | FLAG_USER_VERIFIED),
            &client_data(&challenge, "https://evil.example.net"),
        );

        assert_eq!(
            run(&store, user, &assertion, &public_key).await,
            Err(WebAuthnError::DomainBindingMismatch)
        );
    }

    #[tokio::test]
    async fn wrong_rp_id_hash_is_a_domain_binding_error() {
        let store = challenge_store();
        let user = Uuid::new_v4();
        let (signing_key, public_key) = keypair();

        let challenge = store.issue_challenge(user).await;
        let assertion = signed_assertion(
            &signing_key,
            &auth_data("other.example.net", FLAG_USER_PRESENT | FLAG_USER_VERIFIED),
            &client_data(&challenge, ORIGIN),
        );

        assert_eq!(
            run(&store, user, &assertion, &public_key).await,
            Err(WebAuthnError::DomainBindingMismatch)
        );
    }

    #[tokio::test]
    async fn missing_user_verification_flag_is_rejected() {
        let store = challenge_store();
        let user = Uuid::new_v4();
        let (signing_key, public_key) = keypair();

        let challenge = store.issue_challenge(user).await;
        let assertion = signed_assertion(
            &signing_key,
            &auth_data(RP_ID, FLAG_USER_PRESENT),
            &client_data(&challenge, ORIGIN),
        );

        assert_eq!(
            run(&store, user, &assertion, &public_key).await,
            Err(WebAuthnError::UserVerificationRequired)
        );
    }

    #[tokio::test]
    async fn unknown_credential_id_is_rejected() {
        let store = challenge_store();
        let user = Uuid::new_v4();
        let (signing_key, public_key) = keypair();

        let challenge = store.issue_challenge(user).await;
        let mut assertion = signed_assertion(
            &signing_key,
            &auth_data(RP_ID, FLAG_USER_PRESENT | FLAG_USER_VERIFIED),
            &client_data(&challenge, ORIGIN),
        );
        assertion.id = "c29tZS1vdGhlci1jcmVk".to_string();
        assertion.raw_id = assertion.id.clone();

        assert_eq!(
            run(&store, user, &assertion, &public_key).await,
            Err(WebAuthnError::CredentialMismatch)
        );
    }

    #[tokio::test]
    async fn signature_from_another_key_is_rejected() {
        let store = challenge_store();
        let user = Uuid::new_v4();
        let (_, public_key) = keypair();
        let (other_key, _) = keypair();

        let challenge = store.issue_challenge(user).await;
        let assertion = signed_assertion(
            &other_key,
            &auth_data(RP_ID, FLAG_USER_PRESENT | FLAG_USER_VERIFIED),
            &client_data(&challenge, ORIGIN),
        );

        assert_eq!(
            run(&store, user, &assertion, &public_key).await,
            Err(WebAuthnError::SignatureInvalid)
        );
    }

    #[tokio::test]
    async fn tampered_authenticator_data_is_rejected() {
        let store = challenge_store();
        let user = Uuid::new_v4();
        let (signing_key, public_key) = keypair();

        let challenge = store.issue_challenge(user).await;
        let mut assertion = signed_assertion(
            &signing_key,
            &auth_data(RP_ID, FLAG_USER_PRESENT | FLAG_USER_VERIFIED),
            &client_data(&challenge, ORIGIN),
        );
        // Re-point the signed bytes at a different counter value.
        let mut data = auth_data(RP_ID, FLAG_USER_PRESENT | FLAG_USER_VERIFIED);
        let len = data.len();
        data[len - 1] = 7;
        assertion.response.authenticator_data = URL_SAFE_NO_PAD.encode(&data);

        assert_eq!(
            run(&store, user, &assertion, &public_key).await,
            Err(WebAuthnError::SignatureInvalid)
        );
    }

    #[tokio::test]
    async fn structural_garbage_is_malformed() {
        let store = challenge_store();
        let user = Uuid::new_v4();
        let (signing_key, public_key) = keypair();

        store.issue_challenge(user).await;
        let mut assertion = signed_assertion(
            &signing_key,
            &auth_data(RP_ID, FLAG_USER_PRESENT | FLAG_USER_VERIFIED),
            &client_data("whatever", ORIGIN),
        );
        assertion.response.client_data_json = "!!not-base64url!!".to_string();

        assert_eq!(
            run(&store, user, &assertion, &public_key).await,
            Err(WebAuthnError::Malformed)
        );
    }

    #[tokio::test]
    async fn wrong_ceremony_type_is_malformed() {
        let store = challenge_store();
        let user = Uuid::new_v4();
        let (signing_key, public_key) = keypair();

        let challenge = store.issue_challenge(user).await;
        let client = sonic_rs::to_vec(&sonic_rs::json!({
            "type": "webauthn.create",
            "challenge": challenge,
            "origin": ORIGIN,
        }))
        .unwrap();
        let assertion = signed_assertion(
            &signing_key,
            &auth_data(RP_ID, FLAG_USER_PRESENT | FLAG_USER_VERIFIED),
            &client,
        );

        assert_eq!(
            run(&store, user, &assertion, &public_key).await,
            Err(WebAuthnError::Malformed)
        );
    }

    #[test]
    fn allow_list_includes_loopbacks_only_outside_production() {
        let dev = allowed_origins(Some("https://vote.example.org"), ORIGIN, false);
        assert!(dev.contains(&"http://localhost:3000".to_string()));
        assert!(dev.contains(&"http://127.0.0.1:3000".to_string()));

        let prod = allowed_origins(None, ORIGIN, true);
        assert_eq!(prod, vec![ORIGIN.to_string()]);
    }
}
