use crate::error::{AppError, Result};
use crate::models::user::{FaceEnrollment, User};
use serde::Deserialize;
use std::time::Duration;

/// Fixed safety margin added on top of a provider-published threshold.
pub const FACE_MATCH_MARGIN: f64 = 3.0;

/// Distance above the threshold that counts as a strong match.
const STRONG_DELTA: f64 = 10.0;
/// Width of the encouraging near-miss band below the threshold.
const NEAR_MISS_DELTA: f64 = 5.0;

/// FAR-indexed thresholds a provider may publish alongside a score.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ProviderThresholds {
    #[serde(rename = "1e-3")]
    pub far_1e3: Option<f64>,
    #[serde(rename = "1e-4")]
    pub far_1e4: Option<f64>,
    #[serde(rename = "1e-5")]
    pub far_1e5: Option<f64>,
}

/// The provider's answer to a comparison call.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderComparison {
    /// Similarity confidence, 0-100.
    pub confidence: f64,
    /// Optional FAR-indexed thresholds.
    pub thresholds: Option<ProviderThresholds>,
}

/// Coarse quality band for a comparison. Purely a UX classification; the
/// accept boundary is the resolved threshold alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceBand {
    Strong,
    Acceptable,
    NearMiss,
    Mismatch,
}

impl FaceBand {
    /// Stable lowercase label. This is the only score-derived detail that
    /// ever leaves the server on failure.
    pub fn as_str(&self) -> &'static str {
        match self {
            FaceBand::Strong => "strong",
            FaceBand::Acceptable => "acceptable",
            FaceBand::NearMiss => "near_miss",
            FaceBand::Mismatch => "mismatch",
        }
    }

    /// Client-facing message for a rejected comparison.
    pub fn retry_message(&self) -> &'static str {
        match self {
            FaceBand::NearMiss => {
                "Very close. Adjust your lighting and camera angle and try once more"
            }
            _ => "Face verification failed",
        }
    }
}

/// The outcome of applying the policy to a provider comparison.
#[derive(Debug, Clone, Copy)]
pub struct FaceDecision {
    pub matched: bool,
    pub band: FaceBand,
    /// The threshold the score was held against.
    pub threshold: f64,
    pub confidence: f64,
}

/// Interprets provider comparison results against a dynamic confidence
/// threshold.
#[derive(Debug, Clone, Copy)]
pub struct FaceMatchPolicy {
    floor: f64,
}

impl FaceMatchPolicy {
    pub fn new(floor: f64) -> Self {
        Self { floor }
    }

    fn valid_threshold(value: Option<f64>) -> Option<f64> {
        value.filter(|t| t.is_finite() && (0.0..=100.0).contains(t))
    }

    /// Resolves the effective threshold: the provider's strictest published
    /// value plus the safety margin, rounded up, but never below the
    /// operator's floor.
    pub fn resolve_threshold(&self, thresholds: Option<&ProviderThresholds>) -> f64 {
        let strictest = thresholds.and_then(|t| {
            Self::valid_threshold(t.far_1e5)
                .or_else(|| Self::valid_threshold(t.far_1e4))
                .or_else(|| Self::valid_threshold(t.far_1e3))
        });

        match strictest {
            Some(provider) => self.floor.max((provider + FACE_MATCH_MARGIN).ceil()),
            None => self.floor,
        }
    }

    /// Decides a comparison. The boundary is inclusive: confidence exactly
    /// at the threshold is a match.
    pub fn evaluate(&self, comparison: &ProviderComparison) -> FaceDecision {
        let threshold = self.resolve_threshold(comparison.thresholds.as_ref());
        let confidence = comparison.confidence;

        let band = if confidence >= threshold + STRONG_DELTA {
            FaceBand::Strong
        } else if confidence >= threshold {
            FaceBand::Acceptable
        } else if confidence >= threshold - NEAR_MISS_DELTA {
            FaceBand::NearMiss
        } else {
            FaceBand::Mismatch
        };

        FaceDecision {
            matched: confidence >= threshold,
            band,
            threshold,
            confidence,
        }
    }
}

/// The conflict payload for a rejected comparison: coarse band, client-safe
/// message, no score.
pub fn mismatch_error(decision: &FaceDecision) -> AppError {
    AppError::BiometricMismatch {
        band: decision.band.as_str().to_string(),
        message: decision.band.retry_message().to_string(),
    }
}

/// Extracts the comparable enrollment token from a user record.
///
/// Version-1 embeddings are rejected outright with a re-enrollment
/// instruction; they are never compared cross-format.
pub fn enrollment_token(user: &User) -> Result<String> {
    match user.face_enrollment() {
        Some(FaceEnrollment::Token(token)) => Ok(token),
        Some(FaceEnrollment::LegacyEmbedding) => Err(AppError::Validation(
            "Face enrollment uses a retired format; please re-enroll your face".to_string(),
        )),
        None => Err(AppError::Validation(
            "No face enrollment on record".to_string(),
        )),
    }
}

/// HTTP client for the external face-comparison provider.
///
/// Treated as an untrusted network dependency: responses are range-validated
/// and every transport or shape failure maps to the service-error category.
#[derive(Clone)]
pub struct FaceClient {
    http: reqwest::Client,
    base_url: String,
}

impl FaceClient {
    pub fn new(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self { http, base_url }
    }

    /// Compares an enrollment token with a freshly captured image.
    pub async fn compare(&self, enrollment_token: &str, image: &str) -> Result<ProviderComparison> {
        let response = self
            .http
            .post(format!("{}/verify", self.base_url))
            .json(&sonic_rs::json!({
                "token": enrollment_token,
                "image": image,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::BiometricService(format!(
                "Provider returned status {}",
                response.status()
            )));
        }

        let comparison: ProviderComparison = response.json().await?;

        if !comparison.confidence.is_finite() || !(0.0..=100.0).contains(&comparison.confidence) {
            return Err(AppError::BiometricService(
                "Provider confidence out of range".to_string(),
            ));
        }

        Ok(comparison)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::BiometricType;
    use chrono::Utc;
    use uuid::Uuid;

    fn policy() -> FaceMatchPolicy {
        FaceMatchPolicy::new(80.0)
    }

    fn comparison(confidence: f64, thresholds: Option<ProviderThresholds>) -> ProviderComparison {
        ProviderComparison {
            confidence,
            thresholds,
        }
    }

    #[test]
    fn floor_applies_without_provider_thresholds() {
        assert_eq!(policy().resolve_threshold(None), 80.0);
    }

    #[test]
    fn strictest_published_threshold_wins_with_margin() {
        let thresholds = ProviderThresholds {
            far_1e3: Some(62.0),
            far_1e4: Some(69.0),
            far_1e5: Some(79.2),
        };
        // 79.2 + 3, rounded up: 83.
        assert_eq!(policy().resolve_threshold(Some(&thresholds)), 83.0);
    }

    #[test]
    fn provider_threshold_never_lowers_the_floor() {
        let thresholds = ProviderThresholds {
            far_1e5: Some(40.0),
            ..Default::default()
        };
        assert_eq!(policy().resolve_threshold(Some(&thresholds)), 80.0);
    }

    #[test]
    fn invalid_provider_values_fall_through() {
        let thresholds = ProviderThresholds {
            far_1e5: Some(f64::NAN),
            far_1e4: Some(250.0),
            far_1e3: Some(84.5),
        };
        // Only the 1e-3 entry is usable: 84.5 + 3 rounded up.
        assert_eq!(policy().resolve_threshold(Some(&thresholds)), 88.0);
    }

    #[test]
    fn confidence_at_threshold_is_accepted() {
        let decision = policy().evaluate(&comparison(80.0, None));
        assert!(decision.matched);
        assert_eq!(decision.band, FaceBand::Acceptable);
    }

    #[test]
    fn confidence_one_below_threshold_is_rejected() {
        let decision = policy().evaluate(&comparison(79.0, None));
        assert!(!decision.matched);
        assert_eq!(decision.band, FaceBand::NearMiss);
    }

    #[test]
    fn well_above_threshold_is_strong() {
        let decision = policy().evaluate(&comparison(90.0, None));
        assert!(decision.matched);
        assert_eq!(decision.band, FaceBand::Strong);
    }

    #[test]
    fn far_below_threshold_is_a_hard_mismatch() {
        let decision = policy().evaluate(&comparison(60.0, None));
        assert!(!decision.matched);
        assert_eq!(decision.band, FaceBand::Mismatch);
        assert_eq!(decision.band.retry_message(), "Face verification failed");
    }

    #[test]
    fn near_miss_band_gets_the_encouraging_message() {
        let decision = policy().evaluate(&comparison(76.5, None));
        assert_eq!(decision.band, FaceBand::NearMiss);
        assert!(decision.band.retry_message().contains("try once more"));
    }

    fn user_with_enrollment(version: Option<i32>, data: Option<&str>) -> User {
        User {
            id: Uuid::new_v4(),
            email: "voter@example.org".to_string(),
            document_number: "12345678900".to_string(),
            password_hash: "$argon2id$...".to_string(),
            biometric_type: Some(BiometricType::Face),
            face_enrollment_version: version,
            face_enrollment_data: data.map(str::to_string),
            fp_credential_id: None,
            fp_public_key: None,
            fp_algorithm: None,
            verified: true,
            is_admin: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn current_enrollment_yields_the_token() {
        let user = user_with_enrollment(Some(2), Some("tok_123"));
        assert_eq!(enrollment_token(&user).unwrap(), "tok_123");
    }

    #[test]
    fn legacy_enrollment_demands_re_enrollment() {
        let user = user_with_enrollment(Some(1), Some("[0.1,0.2]"));
        let err = enrollment_token(&user).unwrap_err();
        assert!(err.to_string().contains("re-enroll"));
    }

    #[test]
    fn missing_enrollment_is_rejected() {
        let user = user_with_enrollment(None, None);
        assert!(enrollment_token(&user).is_err());
    }
}
