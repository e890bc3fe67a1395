use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::session::AuthSession,
    repositories::election as election_repo,
    services::{
        session::resolve_client_ip,
        vote::{self, CastVote, RequestContext},
    },
    state::AppState,
    validation::vote::validate_identifier,
};

/// The request payload for casting a vote.
#[derive(Deserialize)]
pub struct CastVoteRequest {
    pub election_id: String,
    pub candidate_id: String,
    pub face_image: Option<String>,
    pub face_proof: Option<String>,
}

#[derive(Serialize)]
pub struct CastVoteResponse {
    pub success: bool,
    pub message: String,
    pub voted_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct ElectionStatusResponse {
    pub election_id: Uuid,
    pub name: String,
    pub state: &'static str,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Casts a vote through the full pipeline: throttle, validate, election
/// state, biometric gate, duplicate checks, atomic insert.
#[axum::debug_handler]
pub async fn cast_vote(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(auth): Extension<AuthSession>,
    headers: HeaderMap,
    Json(payload): Json<CastVoteRequest>,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext {
        client_ip: resolve_client_ip(&headers, Some(addr.ip()), &state.config.trusted_proxies),
        user_agent: header_string(&headers, header::USER_AGENT),
        accept_language: header_string(&headers, header::ACCEPT_LANGUAGE),
    };

    let vote = vote::cast_vote(
        &state,
        &auth,
        &ctx,
        CastVote {
            election_id: payload.election_id,
            candidate_id: payload.candidate_id,
            face_image: payload.face_image,
            face_proof: payload.face_proof,
        },
    )
    .await?;

    let response = CastVoteResponse {
        success: true,
        message: "Vote recorded".to_string(),
        voted_at: vote.voted_at,
    };

    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Public derived-state view of an election.
#[axum::debug_handler]
pub async fn election_status(
    State(state): State<AppState>,
    Path(election_id): Path<String>,
) -> Result<impl IntoResponse> {
    validate_identifier(&election_id, "election")?;
    let election_id = Uuid::parse_str(&election_id)
        .map_err(|_| AppError::Validation("Invalid election identifier".to_string()))?;

    let election = election_repo::find(&state.db, &election_id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(ElectionStatusResponse {
        election_id: election.id,
        name: election.name.clone(),
        state: election.state_at(Utc::now()).as_str(),
        start_date: election.start_date,
        end_date: election.end_date,
    }))
}
