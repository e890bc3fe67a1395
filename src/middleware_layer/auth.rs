use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
    Extension,
};
use tower_cookies::Cookies;

use crate::{
    error::AppError,
    models::session::AuthSession,
    repositories::user as user_repo,
    services::session::{self, SESSION_COOKIE},
    state::AppState,
};

/// A middleware that requires a valid, unrevoked session.
///
/// The sealed cookie is opened and then checked against the session row; a
/// cookie that still authenticates cryptographically but has no row is
/// rejected the same way as a tampered one.
pub async fn require_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    tracing::debug!("🔐 Checking authentication...");

    let sealed = cookies
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .ok_or_else(|| AppError::Authentication("Invalid session".to_string()))?;

    let auth = session::authenticate_token(&state, &sealed).await?;

    tracing::debug!("✅ User authenticated: {}", auth.user_id);

    request.extensions_mut().insert(auth);

    Ok(next.run(request).await)
}

/// A middleware that requires an admin identity on top of `require_auth`.
///
/// Admin status comes from the account flag or the configured allow-list.
pub async fn require_admin(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let user = user_repo::find_by_id(&state.db, &auth.user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let allow_listed = state
        .config
        .admin_emails
        .iter()
        .any(|email| *email == user.email.to_ascii_lowercase());

    if !user.is_admin && !allow_listed {
        tracing::warn!("❌ Admin access denied for user: {}", user.id);
        return Err(AppError::Unauthorized);
    }

    tracing::debug!("✅ Admin access granted: {}", user.id);

    Ok(next.run(request).await)
}
