//! Adaptive acceptance threshold.
//!
//! The threshold for one verification attempt is the profile's minimum number
//! of matching points scaled by four bounded factors:
//!
//! - scanner quality, `[0.8, 1.2]`, from the device calibration
//! - performance, `[0.9, 1.1]`, from observed false accept/reject rates
//! - environment, `[0.95, 1.05]`, from ambient temperature and humidity
//! - the profile's own threshold multiplier
//!
//! Without an ambient reading the environmental factor is exactly 1.0; the
//! formula only applies to real readings. The result is rounded up and never
//! below 1. The calculator is shared by every
//! verification against the same profile and scanner; all history updates are
//! serialized behind one mutex.

use crate::environment::EnvironmentSensor;
use crate::error::RidgegateError;
use crate::profile::SecurityProfile;
use crate::scanner::ScannerCharacteristics;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

/// Default and upper bound for each history list.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

const UNOBSERVED_ENVIRONMENTAL_FACTOR: f64 = 1.0;

const MIN_PERFORMANCE_FACTOR: f64 = 0.9;
const MAX_PERFORMANCE_FACTOR: f64 = 1.1;
const MAX_PERFORMANCE_STEP: f64 = 0.1;
// Keeps floating noise on an integral product from adding a whole point.
const CEIL_EPSILON: f64 = 1e-9;

/// Rolling calibration history.
///
/// The score lists are bounded FIFO logs. Error rates come from the explicit
/// counters, which count every attempt whose ground truth was recorded.
#[derive(Debug, Clone)]
pub struct HistoricalRecord {
    capacity: usize,
    match_scores: VecDeque<f64>,
    false_accepts: VecDeque<f64>,
    false_rejects: VecDeque<f64>,
    total_attempts: u64,
    false_accept_count: u64,
    false_reject_count: u64,
    last_observed_score: Option<f64>,
}

/// Point-in-time copy of the history counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryStats {
    pub match_scores: usize,
    pub false_accepts: usize,
    pub false_rejects: usize,
    pub total_attempts: u64,
    pub false_accept_count: u64,
    pub false_reject_count: u64,
    pub last_observed_score: Option<f64>,
}

fn push_bounded(list: &mut VecDeque<f64>, value: f64, capacity: usize) {
    list.push_back(value);
    while list.len() > capacity {
        list.pop_front();
    }
}

impl HistoricalRecord {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            match_scores: VecDeque::with_capacity(capacity),
            false_accepts: VecDeque::new(),
            false_rejects: VecDeque::new(),
            total_attempts: 0,
            false_accept_count: 0,
            false_reject_count: 0,
            last_observed_score: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push_match_score(&mut self, score: f64) {
        push_bounded(&mut self.match_scores, score, self.capacity);
    }

    /// Records a labelled attempt. Only disagreements between the decision and
    /// the ground truth are logged as errors.
    pub fn record_outcome(&mut self, matched: bool, expected: bool, score: f64) {
        self.total_attempts = self.total_attempts.saturating_add(1);
        match (matched, expected) {
            (true, false) => {
                self.false_accept_count = self.false_accept_count.saturating_add(1);
                push_bounded(&mut self.false_accepts, score, self.capacity);
            }
            (false, true) => {
                self.false_reject_count = self.false_reject_count.saturating_add(1);
                push_bounded(&mut self.false_rejects, score, self.capacity);
            }
            _ => {}
        }
    }

    pub fn observe_score(&mut self, score: f64) {
        self.last_observed_score = Some(score);
    }

    pub fn last_observed_score(&self) -> Option<f64> {
        self.last_observed_score
    }

    pub fn match_scores(&self) -> &VecDeque<f64> {
        &self.match_scores
    }

    pub fn false_accepts(&self) -> &VecDeque<f64> {
        &self.false_accepts
    }

    pub fn false_rejects(&self) -> &VecDeque<f64> {
        &self.false_rejects
    }

    /// Observed `(FAR, FRR)`, or `None` before any labelled attempt.
    pub fn error_rates(&self) -> Option<(f64, f64)> {
        if self.total_attempts == 0 {
            return None;
        }
        let total = self.total_attempts as f64;
        Some((self.false_accept_count as f64 / total, self.false_reject_count as f64 / total))
    }

    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            match_scores: self.match_scores.len(),
            false_accepts: self.false_accepts.len(),
            false_rejects: self.false_rejects.len(),
            total_attempts: self.total_attempts,
            false_accept_count: self.false_accept_count,
            false_reject_count: self.false_reject_count,
            last_observed_score: self.last_observed_score,
        }
    }
}

/// Performance factor in `[0.9, 1.1]`.
///
/// Whichever error rate is further over its target drives the adjustment:
/// excess false accepts tighten, excess false rejects loosen, by at most one step.
pub fn performance_factor(profile: &SecurityProfile, rates: Option<(f64, f64)>) -> f64 {
    let Some((far, frr)) = rates else {
        return 1.0;
    };

    let far_ratio = far / profile.max_false_accept_rate;
    let frr_ratio = frr / profile.max_false_reject_rate;

    let factor = if far_ratio > frr_ratio {
        1.0 + (far_ratio - 1.0).min(MAX_PERFORMANCE_STEP)
    } else {
        1.0 - (frr_ratio - 1.0).min(MAX_PERFORMANCE_STEP)
    };

    factor.clamp(MIN_PERFORMANCE_FACTOR, MAX_PERFORMANCE_FACTOR)
}

/// Combines the factors into an integer threshold of at least 1.
pub fn dynamic_threshold(
    profile: &SecurityProfile,
    scanner_quality: f64,
    performance_factor: f64,
    environmental_factor: f64,
) -> Result<u32, RidgegateError> {
    let raw = f64::from(profile.min_matching_points)
        * scanner_quality
        * performance_factor
        * environmental_factor
        * profile.threshold_multiplier;

    if !raw.is_finite() || raw < 0.0 || raw > f64::from(u32::MAX) {
        return Err(RidgegateError::InternalCalculation(format!(
            "threshold product out of range: {raw} (scanner={scanner_quality}, \
             performance={performance_factor}, environment={environmental_factor})"
        )));
    }

    Ok((raw - CEIL_EPSILON).ceil().max(1.0) as u32)
}

/// Every factor behind one computed threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdBreakdown {
    pub scanner_quality: f64,
    pub performance_factor: f64,
    pub environmental_factor: f64,
    pub threshold: u32,
    /// True when the computation faulted and the static threshold was used.
    pub fallback: bool,
}

impl ThresholdBreakdown {
    fn fallback(profile: &SecurityProfile) -> Self {
        Self {
            scanner_quality: 1.0,
            performance_factor: 1.0,
            environmental_factor: 1.0,
            threshold: profile.min_matching_points.max(1),
            fallback: true,
        }
    }
}

/// Rejects history capacities of zero or above [`DEFAULT_HISTORY_CAPACITY`].
pub fn check_history_capacity(capacity: usize) -> Result<(), RidgegateError> {
    if capacity == 0 || capacity > DEFAULT_HISTORY_CAPACITY {
        return Err(RidgegateError::Configuration(format!(
            "history capacity must be between 1 and {DEFAULT_HISTORY_CAPACITY}, got {capacity}"
        )));
    }
    Ok(())
}

/// Stateful threshold engine shared by all verifications of one deployment.
pub struct ThresholdCalculator {
    profile: SecurityProfile,
    scanner: RwLock<ScannerCharacteristics>,
    history: Mutex<HistoricalRecord>,
    last_recalibration: Mutex<Instant>,
    sensor: Option<Arc<dyn EnvironmentSensor>>,
}

impl ThresholdCalculator {
    /// Creates a calculator with an empty history of `history_capacity` entries per list.
    ///
    /// # Errors
    /// Returns `Configuration` for invalid scanner characteristics or a capacity
    /// outside `1..=DEFAULT_HISTORY_CAPACITY`.
    pub fn new(
        profile: SecurityProfile,
        scanner: ScannerCharacteristics,
        history_capacity: usize,
    ) -> Result<Self, RidgegateError> {
        scanner.validate()?;
        check_history_capacity(history_capacity)?;

        Ok(Self {
            profile,
            scanner: RwLock::new(scanner),
            history: Mutex::new(HistoricalRecord::new(history_capacity)),
            last_recalibration: Mutex::new(Instant::now()),
            sensor: None,
        })
    }

    /// Attaches an ambient-conditions feed. Without one, the environmental factor is 1.0.
    pub fn with_sensor(mut self, sensor: Arc<dyn EnvironmentSensor>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn profile(&self) -> &SecurityProfile {
        &self.profile
    }

    pub fn scanner(&self) -> ScannerCharacteristics {
        *self.scanner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Computes the threshold for the current attempt, seeding the score history
    /// with `current_match_score`.
    ///
    /// Never fails: internal faults are logged and the profile's static minimum
    /// is returned instead.
    pub fn compute_threshold(&self, current_match_score: f64) -> u32 {
        self.compute_breakdown(current_match_score).threshold
    }

    pub fn compute_breakdown(&self, current_match_score: f64) -> ThresholdBreakdown {
        match self.try_compute(current_match_score) {
            Ok(breakdown) => {
                trace!(
                    "Threshold {} (scanner={:.3}, performance={:.3}, environment={:.3})",
                    breakdown.threshold,
                    breakdown.scanner_quality,
                    breakdown.performance_factor,
                    breakdown.environmental_factor
                );
                breakdown
            }
            Err(e) => {
                error!(
                    "{}; falling back to static threshold {}",
                    e, self.profile.min_matching_points
                );
                ThresholdBreakdown::fallback(&self.profile)
            }
        }
    }

    fn try_compute(&self, current_match_score: f64) -> Result<ThresholdBreakdown, RidgegateError> {
        if !current_match_score.is_finite() {
            return Err(RidgegateError::InternalCalculation(format!(
                "non-finite match score: {current_match_score}"
            )));
        }

        let rates = {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            history.push_match_score(current_match_score);
            history.error_rates()
        };

        let scanner = self.scanner();
        scanner.validate().map_err(|e| RidgegateError::InternalCalculation(e.to_string()))?;
        let scanner_quality = scanner.quality_factor();

        let performance_factor = performance_factor(&self.profile, rates);

        let environmental_factor = self
            .sensor
            .as_ref()
            .and_then(|sensor| sensor.current_conditions())
            .map_or(UNOBSERVED_ENVIRONMENTAL_FACTOR, |conditions| conditions.factor());

        let threshold =
            dynamic_threshold(&self.profile, scanner_quality, performance_factor, environmental_factor)?;

        Ok(ThresholdBreakdown {
            scanner_quality,
            performance_factor,
            environmental_factor,
            threshold,
            fallback: false,
        })
    }

    /// Records the ground truth of an attempt for future calibration.
    ///
    /// Call only when the truth is actually known, e.g. during supervised
    /// calibration runs.
    pub fn record_outcome(&self, matched: bool, expected: bool, score: f64) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.record_outcome(matched, expected, score);

        match (matched, expected) {
            (true, false) => warn!("False accept recorded at score {}", score),
            (false, true) => debug!("False reject recorded at score {}", score),
            _ => trace!("Correct decision recorded at score {}", score),
        }
    }

    /// Notes the score of the latest attempt; it seeds the next threshold computation.
    pub fn observe_score(&self, score: f64) {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).observe_score(score);
    }

    pub fn last_observed_score(&self) -> Option<f64> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).last_observed_score()
    }

    pub fn snapshot(&self) -> HistoryStats {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).stats()
    }

    /// Runs `f` against the history while holding its lock.
    pub fn with_history<R>(&self, f: impl FnOnce(&HistoricalRecord) -> R) -> R {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        f(&history)
    }

    /// Replaces the scanner snapshot and stamps the recalibration time.
    pub fn recalibrate(&self, scanner: ScannerCharacteristics) -> Result<(), RidgegateError> {
        scanner.validate()?;
        *self.scanner.write().unwrap_or_else(PoisonError::into_inner) = scanner;
        *self.last_recalibration.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
        debug!("Scanner recalibrated: {}", scanner);
        Ok(())
    }

    pub fn last_recalibration(&self) -> Instant {
        *self.last_recalibration.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn needs_recalibration(&self, max_age: Duration) -> bool {
        self.last_recalibration().elapsed() >= max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{EnvironmentalConditions, FixedConditions};
    use crate::profile::{HIGH, LOW, MEDIUM};

    fn neutral_scanner() -> ScannerCharacteristics {
        ScannerCharacteristics {
            dpi: 250,
            scan_width: 256,
            scan_height: 360,
            image_quality: 50,
            noise_level: 0.5,
        }
    }

    fn calculator(profile: SecurityProfile) -> ThresholdCalculator {
        match ThresholdCalculator::new(profile, neutral_scanner(), DEFAULT_HISTORY_CAPACITY) {
            Ok(calculator) => calculator,
            Err(e) => panic!("Failed to create calculator: {e}"),
        }
    }

    struct NoReading;

    impl EnvironmentSensor for NoReading {
        fn current_conditions(&self) -> Option<EnvironmentalConditions> {
            None
        }
    }

    #[test]
    fn medium_profile_with_neutral_factors_is_five() {
        match dynamic_threshold(&MEDIUM, 1.0, 1.0, 1.0) {
            Ok(threshold) => assert_eq!(threshold, 5),
            Err(e) => panic!("Threshold computation failed: {e}"),
        }

        let calculator = calculator(MEDIUM);
        let breakdown = calculator.compute_breakdown(0.5);
        assert!(!breakdown.fallback);
        assert_eq!(breakdown.performance_factor, 1.0);
        assert_eq!(breakdown.environmental_factor, 1.0);
        assert_eq!(breakdown.threshold, 5);
        assert_eq!(calculator.compute_threshold(0.5), 5);
    }

    #[test]
    fn missing_reading_is_unity_environment() {
        let blind = calculator(MEDIUM).with_sensor(Arc::new(NoReading));
        let breakdown = blind.compute_breakdown(0.5);
        assert_eq!(breakdown.environmental_factor, 1.0);
        assert_eq!(breakdown.threshold, 5);

        // A real reading at the neutral point still goes through the formula.
        let sensed = calculator(MEDIUM).with_sensor(Arc::new(FixedConditions(
            EnvironmentalConditions::NEUTRAL,
        )));
        let breakdown = sensed.compute_breakdown(0.5);
        assert!((breakdown.environmental_factor - 1.05).abs() < 1e-12);
        assert_eq!(breakdown.threshold, 6);
    }

    #[test]
    fn compute_seeds_score_history() {
        let calculator = calculator(LOW);
        calculator.compute_threshold(3.0);
        calculator.compute_threshold(4.0);

        calculator.with_history(|history| {
            assert_eq!(history.match_scores().iter().copied().collect::<Vec<_>>(), vec![3.0, 4.0]);
        });
    }

    #[test]
    fn performance_factor_branches() {
        assert_eq!(performance_factor(&MEDIUM, None), 1.0);
        // FAR far above target tightens by one step.
        assert_eq!(performance_factor(&MEDIUM, Some((0.01, 0.0))), 1.1);
        // FRR far above target loosens by one step.
        assert_eq!(performance_factor(&MEDIUM, Some((0.0, 0.5))), 0.9);
        // Labelled history without errors tightens to the ceiling.
        assert_eq!(performance_factor(&MEDIUM, Some((0.0, 0.0))), 1.1);
        // Slightly over the FAR target.
        let factor = performance_factor(&MEDIUM, Some((0.000105, 0.0)));
        assert!(factor > 1.0 && factor < 1.1);
    }

    #[test]
    fn error_rates_come_from_counters() {
        let mut history = HistoricalRecord::new(2);
        assert_eq!(history.error_rates(), None);

        history.record_outcome(true, true, 9.0);
        history.record_outcome(true, false, 6.0);
        history.record_outcome(false, true, 2.0);
        history.record_outcome(false, false, 1.0);

        assert_eq!(history.error_rates(), Some((0.25, 0.25)));
        assert_eq!(history.false_accepts().len(), 1);
        assert_eq!(history.false_rejects().len(), 1);
    }

    #[test]
    fn history_lists_are_bounded() {
        let mut history = HistoricalRecord::new(3);
        for score in 0..10 {
            history.push_match_score(f64::from(score));
            history.record_outcome(true, false, f64::from(score));
            history.record_outcome(false, true, f64::from(score));
        }

        assert_eq!(history.match_scores().iter().copied().collect::<Vec<_>>(), vec![7.0, 8.0, 9.0]);
        assert_eq!(history.false_accepts().len(), 3);
        assert_eq!(history.false_rejects().len(), 3);
        assert_eq!(history.stats().false_accept_count, 10);
        assert_eq!(history.stats().total_attempts, 20);
    }

    #[test]
    fn threshold_is_positive_for_all_inputs() {
        let conditions = [
            (f64::NAN, 50.0),
            (f64::INFINITY, f64::NEG_INFINITY),
            (-60.0, 0.0),
            (22.5, 50.0),
            (80.0, 100.0),
        ];
        for profile in SecurityProfile::all() {
            for dpi in [1, 250, 500, 1000, 4000] {
                for image_quality in [0, 50, 100] {
                    for noise_level in [0.0, 0.5, 1.0] {
                        for (temperature_c, humidity_percent) in conditions {
                            let scanner = ScannerCharacteristics {
                                dpi,
                                scan_width: 256,
                                scan_height: 360,
                                image_quality,
                                noise_level,
                            };
                            let calculator = match ThresholdCalculator::new(profile, scanner, 10) {
                                Ok(calculator) => calculator.with_sensor(Arc::new(FixedConditions(
                                    EnvironmentalConditions { temperature_c, humidity_percent },
                                ))),
                                Err(e) => panic!("Failed to create calculator: {e}"),
                            };
                            for score in [0.0, 0.5, 12.0, f64::NAN] {
                                assert!(calculator.compute_threshold(score) >= 1);
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn faults_fall_back_to_static_threshold() {
        let calculator = match ThresholdCalculator::new(HIGH, neutral_scanner(), 10) {
            Ok(calculator) => calculator.with_sensor(Arc::new(FixedConditions(
                EnvironmentalConditions { temperature_c: f64::NAN, humidity_percent: 50.0 },
            ))),
            Err(e) => panic!("Failed to create calculator: {e}"),
        };

        let breakdown = calculator.compute_breakdown(1.0);
        assert!(breakdown.fallback);
        assert_eq!(breakdown.threshold, HIGH.min_matching_points);

        let nan_score = calculator.compute_breakdown(f64::NAN);
        assert!(nan_score.fallback);
        assert_eq!(calculator.snapshot().match_scores, 1);
    }

    #[test]
    fn recalibration_swaps_scanner_and_validates() {
        let calculator = calculator(MEDIUM);
        let better = ScannerCharacteristics::default();

        if let Err(e) = calculator.recalibrate(better) {
            panic!("Recalibration failed: {e}");
        }
        assert_eq!(calculator.scanner(), better);
        assert!(!calculator.needs_recalibration(Duration::from_secs(3600)));
        assert!(calculator.needs_recalibration(Duration::ZERO));

        let broken = ScannerCharacteristics { dpi: 0, ..better };
        assert!(calculator.recalibrate(broken).is_err());
        assert_eq!(calculator.scanner(), better);
    }

    #[test]
    fn rejects_zero_capacity() {
        assert!(matches!(
            ThresholdCalculator::new(MEDIUM, neutral_scanner(), 0),
            Err(RidgegateError::Configuration(_))
        ));
    }
}
