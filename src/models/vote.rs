use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Sentinel recorded instead of a client IP when IP tracking is disabled.
pub const IP_TRACKING_DISABLED: &str = "disabled";

/// A recorded vote.
///
/// At most one row may exist per `(user_id, election_id)`; the storage-level
/// unique constraint is the authoritative arbiter of that invariant.
#[derive(Debug, Clone)]
pub struct Vote {
    /// The unique identifier for the vote row.
    pub id: Uuid,
    /// The voter.
    pub user_id: Uuid,
    /// The chosen candidate.
    pub candidate_id: Uuid,
    /// The election voted in.
    pub election_id: Uuid,
    /// The resolved client IP, or the disabled sentinel.
    pub ip_address: String,
    /// Derived hash of user-agent and accept-language. A spoofable
    /// heuristic, not a security invariant.
    pub device_fingerprint: String,
    /// The timestamp when the vote was recorded.
    pub voted_at: DateTime<Utc>,
}
