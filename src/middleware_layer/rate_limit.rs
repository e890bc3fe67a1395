use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Duration;
use std::net::SocketAddr;

use crate::{services::session::resolve_client_ip, state::AppState};

/// Allowed login/register attempts per IP per window.
const AUTH_MAX_PER_WINDOW: u32 = 5;
/// Login/register throttling window.
const AUTH_WINDOW_SECS: i64 = 900;

/// Resolves the client IP for throttling from the connection info and
/// forwarding headers.
fn request_ip(state: &AppState, req: &Request<Body>) -> String {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip());
    resolve_client_ip(req.headers(), peer, &state.config.trusted_proxies)
}

/// A middleware that throttles credential endpoints (login/register) per
/// client IP. Advisory: slows credential stuffing, guarantees nothing across
/// instances unless the shared store is configured.
pub async fn rate_limit_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = request_ip(&state, &req);
    let key = format!("auth:ip:{}", ip);

    match state
        .rate_limiter
        .enforce(&key, Duration::seconds(AUTH_WINDOW_SECS), AUTH_MAX_PER_WINDOW)
        .await
    {
        Ok(()) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}
