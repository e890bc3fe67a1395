use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;

use crate::{
    error::Result,
    models::session::AuthSession,
    services::{auth as auth_service, session as session_service},
    state::AppState,
    validation::auth::*,
};

/// The request payload for voter registration.
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub document_number: String,
    pub password: String,
}

/// The request payload for voter login.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// The response payload for authentication-related requests.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
}

/// Handles voter registration.
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    tracing::info!("📝 Register attempt: {}", payload.email);
    validate_email(&payload.email)?;
    validate_document_number(&payload.document_number)?;
    validate_password(&payload.password)?;

    let user = auth_service::register_user(
        &state.db,
        payload.email,
        payload.document_number,
        payload.password,
    )
    .await?;

    session_service::create_session(&state, &cookies, user.id).await?;

    let response = AuthResponse {
        success: true,
        message: "Registration successful. Complete identity verification to vote".to_string(),
    };

    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Handles voter login.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<LoginRequest>,
) -> Result<Response> {
    tracing::info!("🔐 Login attempt: {}", payload.email);
    validate_email(&payload.email)?;

    let user = auth_service::authenticate_user(&state.db, payload.email, payload.password).await?;

    session_service::create_session(&state, &cookies, user.id).await?;

    let response = AuthResponse {
        success: true,
        message: "Login successful".to_string(),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Handles voter logout. Revokes the session row before clearing cookies so
/// the token is dead even though its ciphertext would still authenticate.
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
    cookies: Cookies,
) -> Result<Response> {
    tracing::info!("👋 Logout for user: {}", session.user_id);

    session_service::clear_session(&state, &cookies).await?;

    tracing::info!("✅ User logged out: {}", session.user_id);

    let response = AuthResponse {
        success: true,
        message: "Logout successful".to_string(),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}
