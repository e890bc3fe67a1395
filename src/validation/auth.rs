use crate::error::{AppError, Result};

/// Validates an email address.
///
/// # Arguments
///
/// * `email` - The email to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the email is plausible.
pub fn validate_email(email: &str) -> Result<()> {
    if email.len() < 5 || email.len() > 255 {
        return Err(AppError::Validation(
            "Email must be between 5 and 255 characters".to_string(),
        ));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(AppError::Validation("Invalid email address".to_string()));
    };

    if local.is_empty() || domain.len() < 3 || !domain.contains('.') {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }

    Ok(())
}

/// Validates a password.
///
/// # Arguments
///
/// * `password` - The password to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the password is valid.
pub fn validate_password(password: &str) -> Result<()> {
    if password.len() < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters long".to_string(),
        ));
    }

    if password.len() > 128 {
        return Err(AppError::Validation(
            "Password must be at most 128 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validates a government document number: digits only, sane length.
pub fn validate_document_number(document: &str) -> Result<()> {
    if document.len() < 5 || document.len() > 20 {
        return Err(AppError::Validation(
            "Document number must be between 5 and 20 digits".to_string(),
        ));
    }

    if !document.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(
            "Document number can only contain digits".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plausible_emails() {
        assert!(validate_email("voter@example.org").is_ok());
        assert!(validate_email("a.b+c@sub.example.org").is_ok());
    }

    #[test]
    fn rejects_implausible_emails() {
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.org").is_err());
        assert!(validate_email("voter@nodot").is_err());
    }

    #[test]
    fn password_length_bounds() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("long enough pass").is_ok());
        assert!(validate_password(&"x".repeat(129)).is_err());
    }

    #[test]
    fn document_number_is_digits_only() {
        assert!(validate_document_number("12345678900").is_ok());
        assert!(validate_document_number("123").is_err());
        assert!(validate_document_number("12345a78900").is_err());
    }
}
