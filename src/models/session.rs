use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A persisted session row.
///
/// The row is the sole source of truth for revocation: a cookie whose
/// ciphertext still authenticates is invalid the moment this row is gone.
#[derive(Debug, Clone)]
pub struct Session {
    /// The session id embedded in the sealed cookie.
    pub id: Uuid,
    /// The ID of the user this session belongs to.
    pub user_id: Uuid,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Whether the row has outlived its expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// The authenticated identity attached to a request after the session
/// middleware accepts it.
#[derive(Debug, Clone)]
pub struct AuthSession {
    /// The persistent session id.
    pub session_id: Uuid,
    /// The authenticated user id.
    pub user_id: Uuid,
}
