use crate::config::Config;
use crate::crypto::aes::{derive_key, SecureKey};
use crate::error::Result;
use crate::services::challenge::{ChallengeStore, MemoryChallengeBackend};
use crate::services::face::{FaceClient, FaceMatchPolicy};
use crate::services::rate_limit::{MemoryRateLimitStore, RateLimiter, RedisRateLimitStore};
use deadpool_postgres::Pool;
use redis::aio::ConnectionManager;
use std::sync::Arc;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    pub db: Pool,
    /// The application's configuration.
    pub config: Config,
    /// The derived session-sealing key.
    pub session_key: Arc<SecureKey>,
    /// Fixed-window request throttling.
    pub rate_limiter: RateLimiter,
    /// One-shot challenge / verified-flag bookkeeping and face proofs.
    pub challenges: ChallengeStore,
    /// The external face-comparison provider.
    pub face: FaceClient,
    /// The face threshold/banding policy.
    pub face_policy: FaceMatchPolicy,
}

impl AppState {
    /// Creates a new `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url)?;
        tracing::info!("✅ PostgreSQL pool initialized with deadpool-postgres");

        let session_key = Arc::new(derive_key("session-token", &config.session_secret));
        let proof_key = Arc::new(derive_key("face-proof", &config.session_secret));
        tracing::info!("✅ Session and proof keys derived");

        // Rate limiting is process-local unless a shared Redis store is
        // configured; only the shared store makes limits hold across
        // multiple instances.
        let rate_limiter = match &config.redis_url {
            Some(url) => {
                let client = redis::Client::open(url.as_str())?;
                let conn = ConnectionManager::new(client).await?;
                tracing::info!("✅ RateLimiter using shared Redis store");
                RateLimiter::with_store(Arc::new(RedisRateLimitStore::new(conn)))
            }
            None => {
                tracing::info!("✅ RateLimiter using in-memory store (single instance)");
                RateLimiter::in_memory()
            }
        };

        let challenges = ChallengeStore::new(Arc::new(MemoryChallengeBackend::new()), proof_key);
        tracing::info!("✅ ChallengeStore initialized (in-memory, single instance)");

        let face = FaceClient::new(config.face_service_url.clone());
        let face_policy = FaceMatchPolicy::new(config.face_match_floor);
        tracing::info!(
            "✅ Face provider client initialized ({})",
            config.face_service_url
        );

        Ok(AppState {
            db,
            config: config.clone(),
            session_key,
            rate_limiter,
            challenges,
            face,
            face_policy,
        })
    }
}
