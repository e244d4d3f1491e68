use crate::store::UserId;
use std::time::Duration;
use thiserror::Error;

/// Message shared by every verification rejection that reaches the outside world.
pub const REJECTION_MESSAGE: &str = "verification failed";

/// Error handling for enrollment, verification and threshold calibration.
#[derive(Error, Debug)]
pub enum RidgegateError {
    /// The scanner failed to initialize or to produce a usable sample.
    ///
    /// The associated string describes the hardware or quality problem.
    #[error("Capture error: {0}")]
    Capture(String),

    /// No sample arrived before the capture deadline.
    #[error("Capture timed out after {0:?}")]
    CaptureTimeout(Duration),

    /// The user already has an enrolled template.
    #[error("User {0} is already enrolled")]
    DuplicateEnrollment(UserId),

    /// No enrolled template exists for the user.
    #[error("No template enrolled for user {0}")]
    TemplateNotFound(UserId),

    /// The match score stayed below the computed threshold.
    #[error("Verification failed: score {score} below threshold {threshold}")]
    VerificationFailed { score: u32, threshold: u32 },

    /// Invalid or unknown configuration, including unknown security profiles.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A fault inside the threshold math.
    ///
    /// Never surfaced by verification: the calculator logs it and falls back to
    /// the profile's static threshold.
    #[error("Internal calculation error: {0}")]
    InternalCalculation(String),

    /// The enrollment store refused to create a second template for a user.
    #[error("Conflict: a template already exists for user {0}")]
    Conflict(UserId),

    /// The enrollment store backend failed.
    #[error("Store error: {0}")]
    Store(String),
}

impl RidgegateError {
    /// True for the failures a caller must not be able to tell apart:
    /// an unknown user and a score below the threshold.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            RidgegateError::TemplateNotFound(_) | RidgegateError::VerificationFailed { .. }
        )
    }

    /// Message suitable for an end user. Rejections collapse into one string so
    /// that unknown users cannot be enumerated.
    pub fn public_message(&self) -> String {
        if self.is_rejection() {
            REJECTION_MESSAGE.to_string()
        } else {
            match self {
                RidgegateError::Capture(_) | RidgegateError::CaptureTimeout(_) => {
                    "fingerprint capture failed, please try again".to_string()
                }
                RidgegateError::DuplicateEnrollment(_) | RidgegateError::Conflict(_) => {
                    "fingerprint already enrolled".to_string()
                }
                _ => "internal error".to_string(),
            }
        }
    }
}
