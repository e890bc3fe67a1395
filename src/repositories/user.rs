use crate::{
    error::{AppError, Result},
    models::user::{BiometricType, User},
};
use deadpool_postgres::Pool;
use tokio_postgres::error::SqlState;
use tokio_postgres::Row;
use uuid::Uuid;

/// A helper function to map a `tokio_postgres::Row` to a `User`.
fn row_to_user(row: &Row) -> Result<User> {
    Ok(User {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        email: row.try_get("email").map_err(|_| AppError::MissingData("email".to_string()))?,
        document_number: row
            .try_get("document_number")
            .map_err(|_| AppError::MissingData("document_number".to_string()))?,
        password_hash: row
            .try_get("password_hash")
            .map_err(|_| AppError::MissingData("password_hash".to_string()))?,
        biometric_type: row
            .try_get::<_, Option<BiometricType>>("biometric_type")
            .map_err(|_| AppError::MissingData("biometric_type".to_string()))?,
        face_enrollment_version: row
            .try_get("face_enrollment_version")
            .map_err(|_| AppError::MissingData("face_enrollment_version".to_string()))?,
        face_enrollment_data: row
            .try_get("face_enrollment_data")
            .map_err(|_| AppError::MissingData("face_enrollment_data".to_string()))?,
        fp_credential_id: row
            .try_get("fp_credential_id")
            .map_err(|_| AppError::MissingData("fp_credential_id".to_string()))?,
        fp_public_key: row
            .try_get("fp_public_key")
            .map_err(|_| AppError::MissingData("fp_public_key".to_string()))?,
        fp_algorithm: row
            .try_get("fp_algorithm")
            .map_err(|_| AppError::MissingData("fp_algorithm".to_string()))?,
        verified: row
            .try_get("verified")
            .map_err(|_| AppError::MissingData("verified".to_string()))?,
        is_admin: row
            .try_get("is_admin")
            .map_err(|_| AppError::MissingData("is_admin".to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|_| AppError::MissingData("created_at".to_string()))?,
    })
}

/// Creates a new voter account.
///
/// A unique violation on email or document number is collapsed into one
/// generic conflict so callers cannot learn which field collided.
pub async fn create_user(
    pool: &Pool,
    id: Uuid,
    email: &str,
    document_number: &str,
    password_hash: &str,
) -> Result<User> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            r#"
            INSERT INTO users (id, email, document_number, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, document_number, password_hash, biometric_type,
            face_enrollment_version, face_enrollment_data, fp_credential_id, fp_public_key,
            fp_algorithm, verified, is_admin, created_at
            "#,
            &[&id, &email, &document_number, &password_hash],
        )
        .await
        .map_err(|e| {
            if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                AppError::Validation("An account with these details already exists".to_string())
            } else {
                AppError::Database(e)
            }
        })?;
    row_to_user(&row)
}

/// Finds a user by their email address.
pub async fn find_by_email(pool: &Pool, email: &str) -> Result<Option<User>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT id, email, document_number, password_hash, biometric_type,
            face_enrollment_version, face_enrollment_data, fp_credential_id, fp_public_key,
            fp_algorithm, verified, is_admin, created_at
            FROM users
            WHERE email = $1
            "#,
            &[&email],
        )
        .await?;
    row.map(|r| row_to_user(&r)).transpose()
}

/// Finds a user by their ID.
pub async fn find_by_id(pool: &Pool, user_id: &Uuid) -> Result<Option<User>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT id, email, document_number, password_hash, biometric_type,
            face_enrollment_version, face_enrollment_data, fp_credential_id, fp_public_key,
            fp_algorithm, verified, is_admin, created_at
            FROM users
            WHERE id = $1
            "#,
            &[user_id],
        )
        .await?;
    row.map(|r| row_to_user(&r)).transpose()
}
