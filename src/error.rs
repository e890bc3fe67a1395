use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A connection pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// An authentication error.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A biometric proof was rejected. Carries only the coarse quality band
    /// and a client-safe message, never the similarity score.
    #[error("Biometric verification failed ({band})")]
    BiometricMismatch { band: String, message: String },

    /// The biometric provider could not be reached or returned garbage.
    #[error("Biometric service error: {0}")]
    BiometricService(String),

    /// An authorization error.
    #[error("Authorization failed")]
    Unauthorized,

    /// The account has not completed identity verification.
    #[error("Identity not verified")]
    IdentityUnverified,

    /// A resource not found error.
    #[error("Resource not found")]
    NotFound,

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The election is not open for voting.
    #[error("Election not active: {0}")]
    ElectionClosed(String),

    /// A vote already exists for this voter (or, under device/IP enforcement,
    /// for this device/network) in the election.
    #[error("Already voted: {0}")]
    AlreadyVoted(String),

    /// An encryption error.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// A rate limit exceeded error.
    #[error("Rate limit exceeded")]
    RateLimited {
        /// Seconds until the current window resets.
        retry_after_secs: i64,
    },

    /// A row was missing an expected column.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    sonic_rs::json!({ "error": "Database error" }),
                )
            }

            AppError::Pool(ref e) => {
                tracing::error!("Pool error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    sonic_rs::json!({ "error": "Database error" }),
                )
            }

            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    sonic_rs::json!({ "error": "Cache error" }),
                )
            }

            AppError::Authentication(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                (
                    StatusCode::UNAUTHORIZED,
                    sonic_rs::json!({ "error": msg.clone() }),
                )
            }

            AppError::BiometricMismatch { ref band, ref message } => {
                tracing::warn!("Biometric mismatch (band: {})", band);
                (
                    StatusCode::UNAUTHORIZED,
                    sonic_rs::json!({
                        "error": message.clone(),
                        "band": band.clone(),
                    }),
                )
            }

            // Provider failures are logged without identifying detail.
            AppError::BiometricService(ref msg) => {
                tracing::error!("Biometric service error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    sonic_rs::json!({ "error": "Biometric service unavailable" }),
                )
            }

            AppError::Unauthorized => {
                tracing::warn!("Authorization failed");
                (
                    StatusCode::FORBIDDEN,
                    sonic_rs::json!({ "error": "Forbidden" }),
                )
            }

            AppError::IdentityUnverified => {
                tracing::warn!("Identity not verified");
                (
                    StatusCode::FORBIDDEN,
                    sonic_rs::json!({ "error": "Identity verification required" }),
                )
            }

            AppError::NotFound => {
                tracing::debug!("Resource not found");
                (
                    StatusCode::NOT_FOUND,
                    sonic_rs::json!({ "error": "Resource not found" }),
                )
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (
                    StatusCode::BAD_REQUEST,
                    sonic_rs::json!({ "error": msg.clone() }),
                )
            }

            AppError::ElectionClosed(ref msg) => {
                tracing::debug!("Election not active: {}", msg);
                (
                    StatusCode::BAD_REQUEST,
                    sonic_rs::json!({
                        "error": msg.clone(),
                        "code": "election_not_active",
                    }),
                )
            }

            AppError::AlreadyVoted(ref msg) => {
                tracing::warn!("Duplicate vote rejected");
                (
                    StatusCode::CONFLICT,
                    sonic_rs::json!({
                        "error": msg.clone(),
                        "code": "already_voted",
                    }),
                )
            }

            AppError::Encryption(ref msg) => {
                tracing::error!("Encryption error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    sonic_rs::json!({ "error": "Encryption error" }),
                )
            }

            // Carries the retry hint both in the body and the header.
            AppError::RateLimited { retry_after_secs } => {
                tracing::warn!("Rate limit exceeded (retry in {}s)", retry_after_secs);
                let payload = sonic_rs::to_string(&sonic_rs::json!({
                    "error": "Too many requests",
                    "retry_after_secs": retry_after_secs,
                }))
                .unwrap_or_else(|_| r#"{"error":"Too many requests"}"#.to_string());
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [
                        (header::RETRY_AFTER, retry_after_secs.max(0).to_string()),
                        (header::CONTENT_TYPE, "application/json".to_string()),
                    ],
                    payload,
                )
                    .into_response();
            }

            AppError::MissingData(ref col) => {
                tracing::error!("Missing data in row: {}", col);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    sonic_rs::json!({ "error": "Internal server error" }),
                )
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    sonic_rs::json!({ "error": "Internal server error" }),
                )
            }
        };

        let payload = sonic_rs::to_string(&body)
            .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (
            status,
            [(header::CONTENT_TYPE, "application/json".to_string())],
            payload,
        )
            .into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::BiometricService(e.to_string())
    }
}
