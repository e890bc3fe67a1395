use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use uuid::Uuid;

/// The biometric modality a voter enrolled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ToSql, FromSql)]
#[postgres(name = "biometric_type")]
pub enum BiometricType {
    /// Face comparison through the external provider.
    #[postgres(name = "face")]
    Face,
    /// WebAuthn platform authenticator (fingerprint) assertion.
    #[postgres(name = "fingerprint")]
    Fingerprint,
}

/// A face enrollment record, versioned at write time.
///
/// Version 1 is the retired raw-embedding format; it is carried only so it
/// can be rejected with a re-enrollment instruction, never compared.
/// Version 2 is an opaque provider token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaceEnrollment {
    /// Retired embedding format (version 1). Not comparable.
    LegacyEmbedding,
    /// Opaque provider enrollment token (version 2).
    Token(String),
}

/// Represents a voter account.
#[derive(Clone, Debug)]
pub struct User {
    /// The unique identifier for the user.
    pub id: Uuid,
    /// The user's email address.
    pub email: String,
    /// The user's government document number.
    pub document_number: String,
    /// The user's hashed password.
    pub password_hash: String,
    /// The enrolled biometric modality, if any.
    pub biometric_type: Option<BiometricType>,
    /// Face enrollment format version (1 = legacy embedding, 2 = token).
    pub face_enrollment_version: Option<i32>,
    /// Face enrollment data in the format named by the version column.
    pub face_enrollment_data: Option<String>,
    /// WebAuthn credential id (base64url).
    pub fp_credential_id: Option<String>,
    /// WebAuthn credential public key (uncompressed SEC1 P-256 point).
    pub fp_public_key: Option<Vec<u8>>,
    /// COSE algorithm of the credential (-7 = ES256).
    pub fp_algorithm: Option<i32>,
    /// Whether the account completed identity verification.
    pub verified: bool,
    /// Whether the account is an administrator.
    pub is_admin: bool,
    /// The timestamp when the user was created.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// The user's face enrollment, decoded from the versioned columns.
    ///
    /// The version column was decided when the enrollment was written; no
    /// shape sniffing happens here.
    pub fn face_enrollment(&self) -> Option<FaceEnrollment> {
        match self.face_enrollment_version? {
            2 => self
                .face_enrollment_data
                .clone()
                .map(FaceEnrollment::Token),
            _ => Some(FaceEnrollment::LegacyEmbedding),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "voter@example.org".to_string(),
            document_number: "12345678900".to_string(),
            password_hash: "$argon2id$...".to_string(),
            biometric_type: Some(BiometricType::Face),
            face_enrollment_version: None,
            face_enrollment_data: None,
            fp_credential_id: None,
            fp_public_key: None,
            fp_algorithm: None,
            verified: true,
            is_admin: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn version_two_enrollment_is_a_token() {
        let mut user = base_user();
        user.face_enrollment_version = Some(2);
        user.face_enrollment_data = Some("tok_abc".to_string());
        assert_eq!(
            user.face_enrollment(),
            Some(FaceEnrollment::Token("tok_abc".to_string()))
        );
    }

    #[test]
    fn version_one_enrollment_is_legacy() {
        let mut user = base_user();
        user.face_enrollment_version = Some(1);
        user.face_enrollment_data = Some("[0.12,0.93,...]".to_string());
        assert_eq!(user.face_enrollment(), Some(FaceEnrollment::LegacyEmbedding));
    }

    #[test]
    fn missing_version_means_no_enrollment() {
        assert_eq!(base_user().face_enrollment(), None);
    }
}
