use crate::{
    error::{AppError, Result},
    models::{candidate::Candidate, election::Election},
};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

/// A helper function to map a `tokio_postgres::Row` to an `Election`.
fn row_to_election(row: &Row) -> Result<Election> {
    Ok(Election {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        name: row.try_get("name").map_err(|_| AppError::MissingData("name".to_string()))?,
        is_active: row
            .try_get("is_active")
            .map_err(|_| AppError::MissingData("is_active".to_string()))?,
        start_date: row
            .try_get("start_date")
            .map_err(|_| AppError::MissingData("start_date".to_string()))?,
        end_date: row
            .try_get("end_date")
            .map_err(|_| AppError::MissingData("end_date".to_string()))?,
    })
}

/// Finds an election by id.
pub async fn find(pool: &Pool, id: &Uuid) -> Result<Option<Election>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT id, name, is_active, start_date, end_date
            FROM elections
            WHERE id = $1
            "#,
            &[id],
        )
        .await?;
    row.map(|r| row_to_election(&r)).transpose()
}

/// Lists all elections, newest window first.
pub async fn list(pool: &Pool) -> Result<Vec<Election>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            r#"
            SELECT id, name, is_active, start_date, end_date
            FROM elections
            ORDER BY start_date DESC
            "#,
            &[],
        )
        .await?;
    rows.iter().map(row_to_election).collect()
}

/// Finds a candidate only if it belongs to the named election.
pub async fn candidate_in_election(
    pool: &Pool,
    candidate_id: &Uuid,
    election_id: &Uuid,
) -> Result<Option<Candidate>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT id, election_id, name
            FROM candidates
            WHERE id = $1 AND election_id = $2
            "#,
            &[candidate_id, election_id],
        )
        .await?;
    row.map(|r| {
        Ok(Candidate {
            id: r.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
            election_id: r
                .try_get("election_id")
                .map_err(|_| AppError::MissingData("election_id".to_string()))?,
            name: r.try_get("name").map_err(|_| AppError::MissingData("name".to_string()))?,
        })
    })
    .transpose()
}
