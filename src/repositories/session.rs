use crate::{
    error::{AppError, Result},
    models::session::Session,
};
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

/// A helper function to map a `tokio_postgres::Row` to a `Session`.
fn row_to_session(row: &Row) -> Result<Session> {
    Ok(Session {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        user_id: row
            .try_get("user_id")
            .map_err(|_| AppError::MissingData("user_id".to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|_| AppError::MissingData("created_at".to_string()))?,
        expires_at: row
            .try_get("expires_at")
            .map_err(|_| AppError::MissingData("expires_at".to_string()))?,
    })
}

/// Persists a new session row.
pub async fn create(
    pool: &Pool,
    id: Uuid,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
) -> Result<Session> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            r#"
            INSERT INTO sessions (id, user_id, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, created_at, expires_at
            "#,
            &[&id, &user_id, &expires_at],
        )
        .await?;
    row_to_session(&row)
}

/// Finds a session row by id.
pub async fn find(pool: &Pool, id: &Uuid) -> Result<Option<Session>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT id, user_id, created_at, expires_at
            FROM sessions
            WHERE id = $1
            "#,
            &[id],
        )
        .await?;
    row.map(|r| row_to_session(&r)).transpose()
}

/// Deletes a session row. Deleting an absent row is not an error.
pub async fn delete(pool: &Pool, id: &Uuid) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute("DELETE FROM sessions WHERE id = $1", &[id])
        .await?;
    Ok(())
}

/// Deletes all expired session rows, returning how many were removed.
pub async fn delete_expired(pool: &Pool) -> Result<u64> {
    let client = pool.get().await?;
    let removed = client
        .execute("DELETE FROM sessions WHERE expires_at < NOW()", &[])
        .await?;
    Ok(removed)
}
