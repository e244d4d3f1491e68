//! Enrollment and verification workflows.
//!
//! A [`Deployment`] owns the long-lived pieces: the scanner worker, the template
//! store and the shared [`ThresholdCalculator`]. It hands out lightweight
//! [`FingerprintService`] instances, typically one per request, that all feed
//! the same calibration history.

use crate::capture::ScannerHandle;
use crate::config::ServiceConfig;
use crate::environment::{CachedSensor, EnvironmentSensor};
use crate::error::RidgegateError;
use crate::features::{FeatureExtractor, FeatureSet, WhitespaceExtractor};
use crate::matcher::{MatchEngine, MatchResult, SetIntersectionMatcher};
use crate::scanner::{RawSample, ScannerDriver};
use crate::store::{EnrolledTemplate, EnrollmentStore, UserId};
use crate::threshold::{ThresholdBreakdown, ThresholdCalculator};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Score used to seed the threshold history before any attempt was observed.
pub const PROVISIONAL_SCORE: f64 = 0.5;

/// Progress of a single enroll or verify call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Capturing,
    Extracting,
    Persisting,
    ThresholdComputing,
    Matching,
    Succeeded,
    Failed,
}

/// Everything learned during one verification. Not persisted.
#[derive(Clone, Debug)]
pub struct VerificationAttempt {
    pub user_id: UserId,
    pub captured: FeatureSet,
    pub enrolled: FeatureSet,
    pub result: MatchResult,
    pub breakdown: ThresholdBreakdown,
    pub stage: Stage,
}

impl VerificationAttempt {
    pub fn matched(&self) -> bool {
        self.result.matched
    }

    pub fn threshold(&self) -> u32 {
        self.breakdown.threshold
    }
}

struct StageTracker {
    operation: &'static str,
    user_id: UserId,
    stage: Stage,
}

impl StageTracker {
    fn new(operation: &'static str, user_id: UserId) -> Self {
        Self { operation, user_id, stage: Stage::Idle }
    }

    fn advance(&mut self, next: Stage) {
        trace!("{} user {}: {} -> {}", self.operation, self.user_id, self.stage, next);
        self.stage = next;
    }

    fn finish<T>(&mut self, result: Result<T, RidgegateError>) -> Result<T, RidgegateError> {
        match result {
            Ok(value) => {
                self.advance(Stage::Succeeded);
                Ok(value)
            }
            Err(e) => {
                debug!("{} user {} failed while {}: {}", self.operation, self.user_id, self.stage, e);
                self.advance(Stage::Failed);
                Err(e)
            }
        }
    }
}

/// Long-lived components shared by every request.
pub struct Deployment {
    scanner: Arc<ScannerHandle>,
    store: Arc<dyn EnrollmentStore>,
    calculator: Arc<ThresholdCalculator>,
    min_sample_quality: u8,
}

impl Deployment {
    /// Starts the scanner worker and builds the shared calibration state.
    ///
    /// # Parameters
    /// - `config`: Validated service configuration
    /// - `driver`: Scanner driver, initialized here
    /// - `store`: Template store
    /// - `sensor`: Optional ambient feed, cached for `environment_cache_ttl`
    pub fn new<D>(
        config: &ServiceConfig,
        driver: D,
        store: Arc<dyn EnrollmentStore>,
        sensor: Option<Arc<dyn EnvironmentSensor>>,
    ) -> Result<Self, RidgegateError>
    where
        D: ScannerDriver + 'static,
    {
        config.validate()?;

        let scanner = ScannerHandle::spawn(
            "primary",
            driver,
            config.capture_timeout,
            config.capture_queue,
        )?;

        let mut calculator = ThresholdCalculator::new(
            config.profile.profile(),
            config.scanner,
            config.history_capacity,
        )?;
        if let Some(sensor) = sensor {
            calculator = calculator
                .with_sensor(Arc::new(CachedSensor::new(sensor, config.environment_cache_ttl)));
        }

        info!(
            "Deployment ready: profile {}, scanner {}",
            calculator.profile(),
            config.scanner
        );

        Ok(Self {
            scanner: Arc::new(scanner),
            store,
            calculator: Arc::new(calculator),
            min_sample_quality: config.min_sample_quality,
        })
    }

    /// A new service instance over the shared components.
    pub fn service(&self) -> FingerprintService {
        FingerprintService::new(
            Arc::clone(&self.scanner),
            Arc::clone(&self.store),
            Arc::clone(&self.calculator),
        )
        .with_min_sample_quality(self.min_sample_quality)
    }

    pub fn calculator(&self) -> &Arc<ThresholdCalculator> {
        &self.calculator
    }

    pub fn scanner(&self) -> &Arc<ScannerHandle> {
        &self.scanner
    }
}

/// Orchestrates enrollment and verification.
pub struct FingerprintService {
    scanner: Arc<ScannerHandle>,
    store: Arc<dyn EnrollmentStore>,
    extractor: Arc<dyn FeatureExtractor>,
    matcher: Arc<dyn MatchEngine>,
    calculator: Arc<ThresholdCalculator>,
    min_sample_quality: u8,
}

impl FingerprintService {
    pub fn new(
        scanner: Arc<ScannerHandle>,
        store: Arc<dyn EnrollmentStore>,
        calculator: Arc<ThresholdCalculator>,
    ) -> Self {
        Self {
            scanner,
            store,
            extractor: Arc::new(WhitespaceExtractor),
            matcher: Arc::new(SetIntersectionMatcher),
            calculator,
            min_sample_quality: 0,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn MatchEngine>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_min_sample_quality(mut self, min_sample_quality: u8) -> Self {
        self.min_sample_quality = min_sample_quality;
        self
    }

    pub fn calculator(&self) -> &ThresholdCalculator {
        &self.calculator
    }

    /// Captures a fingerprint and stores it as the user's template.
    ///
    /// # Errors
    /// `DuplicateEnrollment` if the user already has a template (checked before
    /// capturing), `Capture`/`CaptureTimeout` on scanner failure.
    pub fn enroll(&self, user_id: UserId) -> Result<EnrolledTemplate, RidgegateError> {
        let mut tracker = StageTracker::new("enroll", user_id);
        let result = self.enroll_stages(user_id, &mut tracker);
        let template = tracker.finish(result)?;

        info!("Enrolled user {} with template {}", user_id, template.feature_set.digest());
        Ok(template)
    }

    fn enroll_stages(
        &self,
        user_id: UserId,
        tracker: &mut StageTracker,
    ) -> Result<EnrolledTemplate, RidgegateError> {
        if self.store.get_by_user_id(user_id)?.is_some() {
            return Err(RidgegateError::DuplicateEnrollment(user_id));
        }

        tracker.advance(Stage::Capturing);
        let sample = self.scanner.capture()?;

        tracker.advance(Stage::Extracting);
        let features = self.extract(&sample)?;

        tracker.advance(Stage::Persisting);
        self.store.create(user_id, features).map_err(|e| match e {
            RidgegateError::Conflict(id) => RidgegateError::DuplicateEnrollment(id),
            other => other,
        })
    }

    /// Verifies a user against their template.
    ///
    /// Uses `provided_sample` when given, otherwise captures one. The outcome is
    /// not recorded as calibration history because routine traffic carries no
    /// ground truth; see [`FingerprintService::calibrate`].
    ///
    /// # Errors
    /// `TemplateNotFound` (before any capture), `Capture`/`CaptureTimeout`,
    /// `VerificationFailed` when the score is below the dynamic threshold.
    pub fn verify(
        &self,
        user_id: UserId,
        provided_sample: Option<RawSample>,
    ) -> Result<VerificationAttempt, RidgegateError> {
        let attempt = self.attempt("verify", user_id, provided_sample)?;

        if attempt.matched() {
            info!("Verified user {}", user_id);
            Ok(attempt)
        } else {
            info!("Rejected user {}: {}", user_id, attempt.result);
            Err(RidgegateError::VerificationFailed {
                score: attempt.result.score,
                threshold: attempt.threshold(),
            })
        }
    }

    /// Supervised verification with known ground truth.
    ///
    /// Runs the same pipeline as [`FingerprintService::verify`] but returns the
    /// attempt whatever the verdict, and records whether the verdict agreed with
    /// `expected` in the calibration history.
    pub fn calibrate(
        &self,
        user_id: UserId,
        sample: Option<RawSample>,
        expected: bool,
    ) -> Result<VerificationAttempt, RidgegateError> {
        let attempt = self.attempt("calibrate", user_id, sample)?;
        self.calculator.record_outcome(attempt.matched(), expected, f64::from(attempt.result.score));

        if attempt.matched() != expected {
            warn!(
                "Calibration disagreement for user {}: expected {}, got {}",
                user_id, expected, attempt.result
            );
        }
        Ok(attempt)
    }

    /// Deletes the user's template.
    pub fn remove_enrollment(&self, user_id: UserId) -> Result<(), RidgegateError> {
        if self.store.delete(user_id)? {
            info!("Removed template of user {}", user_id);
            Ok(())
        } else {
            Err(RidgegateError::TemplateNotFound(user_id))
        }
    }

    fn attempt(
        &self,
        operation: &'static str,
        user_id: UserId,
        provided_sample: Option<RawSample>,
    ) -> Result<VerificationAttempt, RidgegateError> {
        let mut tracker = StageTracker::new(operation, user_id);
        let attempt = match self.attempt_stages(user_id, provided_sample, &mut tracker) {
            Ok(attempt) => attempt,
            Err(e) => return tracker.finish(Err(e)),
        };

        tracker.advance(if attempt.matched() { Stage::Succeeded } else { Stage::Failed });
        Ok(VerificationAttempt { stage: tracker.stage, ..attempt })
    }

    fn attempt_stages(
        &self,
        user_id: UserId,
        provided_sample: Option<RawSample>,
        tracker: &mut StageTracker,
    ) -> Result<VerificationAttempt, RidgegateError> {
        // Looked up first so unknown users never touch the scanner.
        let template = self
            .store
            .get_by_user_id(user_id)?
            .ok_or(RidgegateError::TemplateNotFound(user_id))?;

        let sample = match provided_sample {
            Some(sample) => sample,
            None => {
                tracker.advance(Stage::Capturing);
                self.scanner.capture()?
            }
        };

        tracker.advance(Stage::Extracting);
        let captured = self.extract(&sample)?;

        tracker.advance(Stage::ThresholdComputing);
        let seed = self.calculator.last_observed_score().unwrap_or(PROVISIONAL_SCORE);
        let breakdown = self.calculator.compute_breakdown(seed);

        tracker.advance(Stage::Matching);
        let result = self.matcher.compare(&captured, &template.feature_set, breakdown.threshold);
        self.calculator.observe_score(f64::from(result.score));

        debug!(
            "User {}: sample {} vs template {}: {} against {}",
            user_id,
            captured.digest(),
            template.feature_set.digest(),
            result,
            breakdown
        );

        Ok(VerificationAttempt {
            user_id,
            captured,
            enrolled: template.feature_set,
            result,
            breakdown,
            stage: tracker.stage,
        })
    }

    fn extract(&self, sample: &RawSample) -> Result<FeatureSet, RidgegateError> {
        sample.check_quality(self.min_sample_quality)?;
        let features = self.extractor.extract(sample);
        if features.is_empty() {
            return Err(RidgegateError::Capture("sample yielded no features".to_string()));
        }
        Ok(features)
    }
}
