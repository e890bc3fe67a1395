use crate::{
    error::{AppError, Result},
    models::vote::Vote,
};
use deadpool_postgres::Pool;
use tokio_postgres::error::SqlState;
use tokio_postgres::Row;
use uuid::Uuid;

/// A helper function to map a `tokio_postgres::Row` to a `Vote`.
fn row_to_vote(row: &Row) -> Result<Vote> {
    Ok(Vote {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        user_id: row
            .try_get("user_id")
            .map_err(|_| AppError::MissingData("user_id".to_string()))?,
        candidate_id: row
            .try_get("candidate_id")
            .map_err(|_| AppError::MissingData("candidate_id".to_string()))?,
        election_id: row
            .try_get("election_id")
            .map_err(|_| AppError::MissingData("election_id".to_string()))?,
        ip_address: row
            .try_get("ip_address")
            .map_err(|_| AppError::MissingData("ip_address".to_string()))?,
        device_fingerprint: row
            .try_get("device_fingerprint")
            .map_err(|_| AppError::MissingData("device_fingerprint".to_string()))?,
        voted_at: row
            .try_get("voted_at")
            .map_err(|_| AppError::MissingData("voted_at".to_string()))?,
    })
}

/// Whether a vote already exists for `(user_id, election_id)`.
///
/// Advisory pre-check only: the unique index re-asserts this at insert time
/// and is the race-safe arbiter.
pub async fn has_voted(pool: &Pool, user_id: &Uuid, election_id: &Uuid) -> Result<bool> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM votes WHERE user_id = $1 AND election_id = $2
            ) AS voted
            "#,
            &[user_id, election_id],
        )
        .await?;
    row.try_get("voted")
        .map_err(|_| AppError::MissingData("voted".to_string()))
}

/// Whether any vote in the election carries the same device fingerprint or
/// client IP. Secondary, spoofable heuristic used only under device/IP
/// enforcement.
pub async fn device_or_ip_seen(
    pool: &Pool,
    election_id: &Uuid,
    device_fingerprint: &str,
    ip_address: &str,
) -> Result<bool> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM votes
                WHERE election_id = $1
                  AND (device_fingerprint = $2 OR ip_address = $3)
            ) AS seen
            "#,
            &[election_id, &device_fingerprint, &ip_address],
        )
        .await?;
    row.try_get("seen")
        .map_err(|_| AppError::MissingData("seen".to_string()))
}

/// Inserts a vote atomically.
///
/// A unique violation on `(user_id, election_id)` is remapped to the same
/// conflict category as the pre-check; it is never surfaced as a raw
/// storage error.
pub async fn insert(
    pool: &Pool,
    user_id: &Uuid,
    candidate_id: &Uuid,
    election_id: &Uuid,
    ip_address: &str,
    device_fingerprint: &str,
) -> Result<Vote> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            r#"
            INSERT INTO votes (id, user_id, candidate_id, election_id, ip_address, device_fingerprint)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, candidate_id, election_id, ip_address, device_fingerprint, voted_at
            "#,
            &[
                &Uuid::new_v4(),
                user_id,
                candidate_id,
                election_id,
                &ip_address,
                &device_fingerprint,
            ],
        )
        .await
        .map_err(|e| {
            if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                AppError::AlreadyVoted(
                    "A vote has already been recorded for this election".to_string(),
                )
            } else {
                AppError::Database(e)
            }
        })?;
    row_to_vote(&row)
}
