use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::IntoResponse,
    Extension, Json,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result},
    models::session::AuthSession,
    repositories::user as user_repo,
    services::{
        challenge::{CHALLENGE_TTL_SECS, FACE_PROOF_TTL_SECS, VERIFICATION_TTL_SECS},
        face,
        webauthn::{self, AssertionPayload, StoredCredential},
    },
    state::AppState,
};

/// Comparison calls allowed per user per minute.
const BIOMETRIC_MAX_PER_WINDOW: u32 = 5;
const BIOMETRIC_WINDOW_SECS: i64 = 60;

#[derive(Serialize)]
pub struct ChallengeResponse {
    pub challenge: String,
    pub expires_in_secs: i64,
}

#[derive(Serialize)]
pub struct FingerprintVerifyResponse {
    pub verified: bool,
    /// How long the one-shot verified flag stays consumable.
    pub expires_in_secs: i64,
}

#[derive(Deserialize)]
pub struct FaceVerifyRequest {
    /// Base64 capture from the browser.
    pub image: String,
}

#[derive(Serialize)]
pub struct FaceVerifyResponse {
    pub verified: bool,
    pub band: &'static str,
    /// Signed proof the client must echo back when casting.
    pub face_proof: String,
    pub expires_in_secs: i64,
}

/// Issues a fingerprint challenge, overwriting any outstanding one.
#[axum::debug_handler]
pub async fn fingerprint_challenge(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
) -> Result<impl IntoResponse> {
    let challenge = state.challenges.issue_challenge(auth.user_id).await;
    tracing::debug!("🔑 Challenge issued for user: {}", auth.user_id);

    Ok(Json(ChallengeResponse {
        challenge,
        expires_in_secs: CHALLENGE_TTL_SECS,
    }))
}

/// Verifies a fingerprint assertion and arms the one-shot verified flag.
#[axum::debug_handler]
pub async fn fingerprint_verify(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    headers: HeaderMap,
    Json(assertion): Json<AssertionPayload>,
) -> Result<impl IntoResponse> {
    let user = user_repo::find_by_id(&state.db, &auth.user_id)
        .await?
        .ok_or_else(|| AppError::Authentication("Invalid session".to_string()))?;

    let (credential_id, public_key) = match (&user.fp_credential_id, &user.fp_public_key) {
        (Some(id), Some(key)) => (id.as_str(), key.as_slice()),
        _ => {
            return Err(AppError::Validation(
                "No fingerprint enrollment on record".to_string(),
            ))
        }
    };

    let credential = StoredCredential {
        credential_id,
        public_key,
        algorithm: user.fp_algorithm.unwrap_or(webauthn::ES256_ALG),
    };

    let request_origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    let origins = webauthn::allowed_origins(
        request_origin,
        &state.config.app_origin,
        state.config.production,
    );

    webauthn::verify_assertion(
        &state.challenges,
        user.id,
        &assertion,
        &credential,
        &origins,
        &state.config.rp_id,
    )
    .await
    .map_err(AppError::from)?;

    Ok(Json(FingerprintVerifyResponse {
        verified: true,
        expires_in_secs: VERIFICATION_TTL_SECS,
    }))
}

/// Runs a face comparison and, on success, issues the signed face-proof the
/// cast call requires as its precondition.
#[axum::debug_handler]
pub async fn face_verify(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Json(payload): Json<FaceVerifyRequest>,
) -> Result<impl IntoResponse> {
    state
        .rate_limiter
        .enforce(
            &format!("face:user:{}", auth.user_id),
            Duration::seconds(BIOMETRIC_WINDOW_SECS),
            BIOMETRIC_MAX_PER_WINDOW,
        )
        .await?;

    let user = user_repo::find_by_id(&state.db, &auth.user_id)
        .await?
        .ok_or_else(|| AppError::Authentication("Invalid session".to_string()))?;

    let enrollment = face::enrollment_token(&user)?;
    let comparison = state.face.compare(&enrollment, &payload.image).await?;
    let decision = state.face_policy.evaluate(&comparison);

    if !decision.matched {
        return Err(face::mismatch_error(&decision));
    }

    let proof = state
        .challenges
        .issue_face_proof(user.id, decision.confidence, decision.threshold)
        .await?;

    tracing::info!(
        "✅ Face verified for user {} (band: {})",
        user.id,
        decision.band.as_str()
    );

    Ok(Json(FaceVerifyResponse {
        verified: true,
        band: decision.band.as_str(),
        face_proof: proof,
        expires_in_secs: FACE_PROOF_TTL_SECS,
    }))
}
