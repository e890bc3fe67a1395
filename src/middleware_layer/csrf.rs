use axum::{
    body::Body,
    extract::Request,
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::Cookies;

use crate::{
    crypto::csrf,
    error::AppError,
    services::session::{CSRF_COOKIE, CSRF_HEADER},
};

/// A middleware that verifies the CSRF double submit: the script-readable
/// cookie must equal the echoed request header, compared in constant time.
pub async fn verify_csrf(cookies: Cookies, req: Request<Body>, next: Next) -> Response {
    if req.method() == Method::GET
        || req.method() == Method::HEAD
        || req.method() == Method::OPTIONS
    {
        tracing::debug!("✅ CSRF exemption: {} request", req.method());
        return next.run(req).await;
    }

    let csrf_token_cookie = match cookies.get(CSRF_COOKIE) {
        Some(c) => c.value().to_string(),
        None => {
            tracing::warn!("❌ CSRF: cookie not found");
            return AppError::Authentication("Missing CSRF token cookie".to_string())
                .into_response();
        }
    };

    let csrf_token_header = match req.headers().get(CSRF_HEADER) {
        Some(token) => match token.to_str() {
            Ok(t) => t.to_string(),
            Err(_) => {
                tracing::warn!("❌ CSRF: header has invalid format");
                return AppError::Authentication("Invalid CSRF token format".to_string())
                    .into_response();
            }
        },
        None => {
            tracing::warn!("❌ CSRF: header not found");
            return AppError::Authentication("Missing CSRF token header".to_string())
                .into_response();
        }
    };

    if !csrf::tokens_match(&csrf_token_cookie, &csrf_token_header) {
        tracing::warn!("❌ CSRF: tokens do not match");
        return AppError::Authentication("CSRF token mismatch".to_string()).into_response();
    }

    tracing::debug!("✅ CSRF token valid");
    next.run(req).await
}
