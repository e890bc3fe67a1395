use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};

use http::{header, HeaderValue, Method};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_cookies::CookieManagerLayer;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod state;
mod db;
mod crypto {
    pub mod aes;
    pub mod csrf;
    pub mod proof;
    pub mod token;
}

mod models {
    pub mod candidate;
    pub mod election;
    pub mod session;
    pub mod user;
    pub mod vote;
}

mod repositories {
    pub mod election;
    pub mod session;
    pub mod user;
    pub mod vote;
}

mod services {
    pub mod auth;
    pub mod challenge;
    pub mod face;
    pub mod rate_limit;
    pub mod session;
    pub mod vote;
    pub mod webauthn;
}

mod handlers {
    pub mod admin;
    pub mod auth;
    pub mod biometric;
    pub mod health;
    pub mod vote;
}

mod middleware_layer {
    pub mod auth;
    pub mod csrf;
    pub mod rate_limit;
}

mod validation {
    pub mod auth;
    pub mod vote;
}

use config::Config;
use state::AppState;

/// Interval of the background sweep of expired ephemeral state.
const SWEEP_INTERVAL_SECS: u64 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config).await?;
    tracing::info!("✅ AppState initialized");

    let cors = CorsLayer::new()
        .allow_origin(config.app_origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::COOKIE,
            "x-csrf-token".parse().expect("static header name"),
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400));

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/api/elections/{election_id}/status",
            get(handlers::vote::election_status),
        )
        .with_state(state.clone());

    let credential_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_auth,
        ))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route(
            "/api/biometric/fingerprint/challenge",
            post(handlers::biometric::fingerprint_challenge),
        )
        .route(
            "/api/biometric/fingerprint/verify",
            post(handlers::biometric::fingerprint_verify),
        )
        .route(
            "/api/biometric/face/verify",
            post(handlers::biometric::face_verify),
        )
        .route("/api/votes", post(handlers::vote::cast_vote))
        .route_layer(from_fn(middleware_layer::csrf::verify_csrf))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/api/admin/elections", get(handlers::admin::list_elections))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_admin,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state.clone());

    let app = Router::new()
        .merge(public_routes)
        .merge(credential_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(DefaultBodyLimit::max(8 * 1024 * 1024))
        .layer(cors);

    // One explicit sweeper owned by the process lifecycle, cancelled on
    // shutdown. Keeps the replay windows of challenges, verified flags and
    // rate-limit entries bounded.
    let shutdown = CancellationToken::new();
    let sweeper = {
        let state = state.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!("🧹 Sweeper stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        state.challenges.sweep().await;
                        state.rate_limiter.sweep().await;
                        match repositories::session::delete_expired(&state.db).await {
                            Ok(0) => {}
                            Ok(removed) => {
                                tracing::debug!("🧹 Purged {} expired sessions", removed);
                            }
                            Err(e) => tracing::error!("❌ Session purge failed: {}", e),
                        }
                    }
                }
            }
        })
    };

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("🚀 Server listening on http://{}", addr);
    tracing::info!("✅ Background sweeper started (every {}s)", SWEEP_INTERVAL_SECS);
    tracing::info!("✅ All systems operational");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    shutdown.cancel();
    let _ = sweeper.await;
    tracing::info!("👋 Shutdown complete");

    Ok(())
}

/// Resolves when SIGINT/SIGTERM arrives, cancelling the sweeper alongside
/// the HTTP listener.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("⚠️ Shutdown signal received");
    token.cancel();
}
