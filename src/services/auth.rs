use crate::error::{AppError, Result};
use crate::models::user::User;
use crate::repositories::user as user_repo;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder,
};
use deadpool_postgres::Pool;
use rand::rngs::OsRng;
use rand::RngCore;
use uuid::Uuid;
use zeroize::Zeroize;

/// The memory cost for Argon2 in MB.
const ARGON2_MEMORY_MB: u32 = 19;
/// The number of iterations for Argon2.
const ARGON2_ITERATIONS: u32 = 3;
/// The parallelism factor for Argon2.
const ARGON2_PARALLELISM: u32 = 1;

/// Hashes a password using Argon2id.
fn hash_password(password: &str) -> Result<String> {
    let mut password_bytes = password.as_bytes().to_vec();

    let mut salt_bytes = [0u8; 16];
    OsRng.fill_bytes(&mut salt_bytes);

    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::Encryption(format!("Salt encoding error: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        ParamsBuilder::new()
            .m_cost(ARGON2_MEMORY_MB * 1024)
            .t_cost(ARGON2_ITERATIONS)
            .p_cost(ARGON2_PARALLELISM)
            .build()
            .map_err(|e| AppError::Encryption(format!("Argon2 params: {}", e)))?,
    );

    let password_hash = argon2
        .hash_password(&password_bytes, &salt)
        .map_err(|e| AppError::Encryption(format!("Argon2 hash error: {}", e)))?
        .to_string();

    password_bytes.zeroize();
    Ok(password_hash)
}

/// Verifies a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let mut password_bytes = password.as_bytes().to_vec();
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Encryption(format!("Hash parse error: {}", e)))?;
    let argon2 = Argon2::default();
    let result = argon2.verify_password(&password_bytes, &parsed_hash).is_ok();

    password_bytes.zeroize();
    Ok(result)
}

/// Creates a new voter account.
///
/// Duplicate email/document collisions surface as one generic message; the
/// response never says which field already exists.
pub async fn register_user(
    pool: &Pool,
    email: String,
    document_number: String,
    password: String,
) -> Result<User> {
    tracing::debug!("🔐 Registering voter: {}", email);
    let hashed_password = hash_password(&password)?;

    let user = user_repo::create_user(
        pool,
        Uuid::new_v4(),
        &email.to_ascii_lowercase(),
        &document_number,
        &hashed_password,
    )
    .await?;

    tracing::info!("✅ Voter registered with ID: {}", user.id);
    Ok(user)
}

/// Authenticates a voter by email and password.
pub async fn authenticate_user(pool: &Pool, email: String, password: String) -> Result<User> {
    tracing::debug!("🔐 Authenticating voter: {}", email);

    let user = user_repo::find_by_email(pool, &email.to_ascii_lowercase())
        .await?
        .ok_or_else(|| AppError::Authentication("Invalid email or password".to_string()))?;

    if !verify_password(&password, &user.password_hash)? {
        return Err(AppError::Authentication(
            "Invalid email or password".to_string(),
        ));
    }

    tracing::info!("✅ Voter authenticated: {}", user.id);

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse battery", &hash).unwrap());
        assert!(!verify_password("wrong password", &hash).unwrap());
    }
}
