use crate::error::{AppError, Result};

/// Maximum accepted identifier length (UUIDs are 36).
const MAX_IDENTIFIER_LEN: usize = 64;

/// Validates an election/candidate identifier before any lookup: restricted
/// character set, bounded length.
pub fn validate_identifier(value: &str, field: &str) -> Result<()> {
    if value.is_empty() || value.len() > MAX_IDENTIFIER_LEN {
        return Err(AppError::Validation(format!(
            "Invalid {} identifier",
            field
        )));
    }

    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(AppError::Validation(format!(
            "Invalid {} identifier",
            field
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_uuid_shaped_identifiers() {
        assert!(validate_identifier("550e8400-e29b-41d4-a716-446655440000", "election").is_ok());
        assert!(validate_identifier("abc123", "candidate").is_ok());
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert!(validate_identifier("", "election").is_err());
        assert!(validate_identifier(&"a".repeat(65), "election").is_err());
    }

    #[test]
    fn rejects_characters_outside_the_set() {
        assert!(validate_identifier("abc_def", "election").is_err());
        assert!(validate_identifier("abc def", "election").is_err());
        assert!(validate_identifier("abc';--", "election").is_err());
        assert!(validate_identifier("élection", "election").is_err());
    }
}
