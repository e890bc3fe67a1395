use crate::{
    error::{AppError, Result},
    models::{
        election::ElectionState,
        session::AuthSession,
        user::{BiometricType, User},
        vote::{Vote, IP_TRACKING_DISABLED},
    },
    repositories::{election as election_repo, user as user_repo, vote as vote_repo},
    services::face,
    state::AppState,
    validation::vote::validate_identifier,
};
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Vote-cast throttling window.
pub const VOTE_WINDOW_SECS: i64 = 60;
/// Allowed cast attempts per identifier per window.
pub const VOTE_MAX_PER_WINDOW: u32 = 10;

/// What a cast request carries besides the authenticated session.
#[derive(Debug)]
pub struct CastVote {
    pub election_id: String,
    pub candidate_id: String,
    /// Fresh capture, required in face mode.
    pub face_image: Option<String>,
    /// Signed proof from the preceding verification call, required in face
    /// mode as a fail-fast precondition.
    pub face_proof: Option<String>,
}

/// Request metadata the coordinator derives its heuristics from.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub client_ip: String,
    pub user_agent: String,
    pub accept_language: String,
}

/// Derived device fingerprint: a hash of user-agent and accept-language.
/// Spoofable by construction; used only as a secondary heuristic.
pub fn device_fingerprint(user_agent: &str, accept_language: &str) -> String {
    let digest = Sha256::new()
        .chain_update(user_agent.as_bytes())
        .chain_update(b"|")
        .chain_update(accept_language.as_bytes())
        .finalize();
    hex::encode(digest)
}

/// The throttling identifier: client IP under device/IP enforcement, the
/// voter id otherwise.
pub fn rate_identifier(enforce_device_ip: bool, client_ip: &str, user_id: &Uuid) -> String {
    if enforce_device_ip {
        format!("vote:ip:{}", client_ip)
    } else {
        format!("vote:user:{}", user_id)
    }
}

async fn biometric_gate(
    state: &AppState,
    user: &User,
    request: &CastVote,
) -> Result<()> {
    match user.biometric_type {
        // Face mode: a valid proof from the verification step is a
        // precondition, but only a fresh comparison authorizes the vote.
        Some(BiometricType::Face) => {
            let proof = request
                .face_proof
                .as_deref()
                .ok_or_else(|| AppError::Authentication("Face verification required".to_string()))?;

            if !state.challenges.verify_face_proof(&user.id, proof).await {
                return Err(AppError::Authentication(
                    "Face verification required".to_string(),
                ));
            }

            let image = request
                .face_image
                .as_deref()
                .ok_or_else(|| AppError::Validation("Face image is required".to_string()))?;

            let token = face::enrollment_token(user)?;
            let comparison = state.face.compare(&token, image).await?;
            let decision = state.face_policy.evaluate(&comparison);

            if !decision.matched {
                return Err(face::mismatch_error(&decision));
            }

            tracing::debug!("✅ Face gate passed (band: {})", decision.band.as_str());
            Ok(())
        }

        // Fingerprint mode: exactly-once consumption of the verified flag,
        // so one assertion can never authorize two votes.
        Some(BiometricType::Fingerprint) => {
            if !state.challenges.consume_verified(&user.id).await {
                return Err(AppError::Authentication(
                    "Fingerprint verification required".to_string(),
                ));
            }
            tracing::debug!("✅ Fingerprint gate passed");
            Ok(())
        }

        None => Err(AppError::IdentityUnverified),
    }
}

/// Casts a vote: the one atomic operation this service exists for.
pub async fn cast_vote(
    state: &AppState,
    auth: &AuthSession,
    ctx: &RequestContext,
    request: CastVote,
) -> Result<Vote> {
    let user = user_repo::find_by_id(&state.db, &auth.user_id)
        .await?
        .ok_or_else(|| AppError::Authentication("Invalid session".to_string()))?;

    if !user.verified {
        return Err(AppError::IdentityUnverified);
    }

    // Throttle before touching any persistent state.
    let identifier = rate_identifier(
        state.config.enforce_device_ip,
        &ctx.client_ip,
        &user.id,
    );
    state
        .rate_limiter
        .enforce(
            &identifier,
            Duration::seconds(VOTE_WINDOW_SECS),
            VOTE_MAX_PER_WINDOW,
        )
        .await?;

    // Syntax first, lookups second.
    validate_identifier(&request.election_id, "election")?;
    validate_identifier(&request.candidate_id, "candidate")?;

    let election_id = Uuid::parse_str(&request.election_id)
        .map_err(|_| AppError::Validation("Invalid election identifier".to_string()))?;
    let candidate_id = Uuid::parse_str(&request.candidate_id)
        .map_err(|_| AppError::Validation("Invalid candidate identifier".to_string()))?;

    let election = election_repo::find(&state.db, &election_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let election_state = election.state_at(Utc::now());
    if election_state != ElectionState::Active {
        return Err(AppError::ElectionClosed(format!(
            "Election is {}",
            election_state.as_str()
        )));
    }

    election_repo::candidate_in_election(&state.db, &candidate_id, &election_id)
        .await?
        .ok_or_else(|| {
            AppError::Validation("Candidate does not belong to this election".to_string())
        })?;

    biometric_gate(state, &user, &request).await?;

    // Advisory pre-check; the unique constraint at insert time is the
    // race-safe arbiter.
    if vote_repo::has_voted(&state.db, &user.id, &election_id).await? {
        return Err(AppError::AlreadyVoted(
            "You have already voted in this election".to_string(),
        ));
    }

    let fingerprint = device_fingerprint(&ctx.user_agent, &ctx.accept_language);

    // Secondary, spoofable heuristic; only consulted when enforcement is on.
    if state.config.enforce_device_ip
        && vote_repo::device_or_ip_seen(&state.db, &election_id, &fingerprint, &ctx.client_ip)
            .await?
    {
        return Err(AppError::AlreadyVoted(
            "A vote from this device or network has already been recorded".to_string(),
        ));
    }

    let recorded_ip = if state.config.track_voter_ip {
        ctx.client_ip.clone()
    } else {
        IP_TRACKING_DISABLED.to_string()
    };

    let vote = vote_repo::insert(
        &state.db,
        &user.id,
        &candidate_id,
        &election_id,
        &recorded_ip,
        &fingerprint,
    )
    .await?;

    tracing::info!(
        "🗳️ Vote recorded for user {} in election {}",
        user.id,
        election_id
    );

    Ok(vote)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic_for_identical_headers() {
        let a = device_fingerprint("Mozilla/5.0 (X11; Linux x86_64)", "pt-BR,pt;q=0.9");
        let b = device_fingerprint("Mozilla/5.0 (X11; Linux x86_64)", "pt-BR,pt;q=0.9");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_differs_when_either_header_differs() {
        let base = device_fingerprint("agent", "lang");
        assert_ne!(base, device_fingerprint("agent2", "lang"));
        assert_ne!(base, device_fingerprint("agent", "lang2"));
    }

    #[test]
    fn fingerprint_separator_prevents_boundary_collisions() {
        assert_ne!(device_fingerprint("ab", "c"), device_fingerprint("a", "bc"));
    }

    #[test]
    fn rate_identifier_follows_the_enforcement_mode() {
        let user = Uuid::new_v4();
        assert_eq!(
            rate_identifier(true, "203.0.113.9", &user),
            "vote:ip:203.0.113.9"
        );
        assert_eq!(
            rate_identifier(false, "203.0.113.9", &user),
            format!("vote:user:{}", user)
        );
    }
}
