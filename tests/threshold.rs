use ridgegate::environment::FixedConditions;
use ridgegate::profile::MEDIUM;
use ridgegate::threshold::{dynamic_threshold, DEFAULT_HISTORY_CAPACITY};
use ridgegate::{
    EnvironmentalConditions, RidgegateError, ScannerCharacteristics, SecurityProfile,
    ThresholdCalculator,
};
use std::sync::Arc;
use std::thread;

fn unwrap_calculator(result: Result<ThresholdCalculator, RidgegateError>) -> Arc<ThresholdCalculator> {
    match result {
        Ok(calculator) => Arc::new(calculator),
        Err(e) => panic!("Failed to create ThresholdCalculator: {e}"),
    }
}

fn shared_calculator() -> Arc<ThresholdCalculator> {
    unwrap_calculator(ThresholdCalculator::new(
        MEDIUM,
        ScannerCharacteristics::default(),
        DEFAULT_HISTORY_CAPACITY,
    ))
}

#[test]
fn test_medium_profile_neutral_threshold() {
    match dynamic_threshold(&MEDIUM, 1.0, 1.0, 1.0) {
        Ok(threshold) => assert_eq!(threshold, 5),
        Err(e) => panic!("Threshold computation failed: {e}"),
    }
}

#[test]
fn test_every_profile_yields_positive_threshold() {
    for profile in SecurityProfile::all() {
        for scanner_quality in [0.8, 1.0, 1.2] {
            for performance in [0.9, 1.0, 1.1] {
                for environment in [0.95, 1.0, 1.05] {
                    match dynamic_threshold(&profile, scanner_quality, performance, environment) {
                        Ok(threshold) => assert!(threshold >= 1),
                        Err(e) => panic!("Threshold computation failed: {e}"),
                    }
                }
            }
        }
    }
}

#[test]
fn test_scanner_quality_monotonic_in_image_quality() {
    for dpi in [100, 500, 1000] {
        for noise_level in [0.0, 0.3, 1.0] {
            let mut previous = f64::MIN;
            for image_quality in 0..=100u8 {
                let scanner = ScannerCharacteristics {
                    dpi,
                    scan_width: 256,
                    scan_height: 360,
                    image_quality,
                    noise_level,
                };
                let quality = scanner.quality_factor();
                assert!(quality >= previous);
                assert!((0.8..=1.2).contains(&quality));
                previous = quality;
            }
        }
    }
}

#[test]
fn test_concurrent_record_outcome_loses_nothing() {
    let calculator = shared_calculator();
    let threads: u32 = 200;

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let calculator = Arc::clone(&calculator);
            thread::spawn(move || calculator.record_outcome(true, false, f64::from(i)))
        })
        .collect();
    for handle in handles {
        if handle.join().is_err() {
            panic!("Worker thread panicked");
        }
    }

    let stats = calculator.snapshot();
    assert_eq!(stats.false_accepts, threads as usize);
    assert_eq!(stats.false_accept_count, u64::from(threads));
    assert_eq!(stats.total_attempts, u64::from(threads));
}

#[test]
fn test_concurrent_record_outcome_respects_capacity() {
    let calculator = shared_calculator();
    let threads: u32 = 8;
    let per_thread: u32 = 200;

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let calculator = Arc::clone(&calculator);
            thread::spawn(move || {
                for i in 0..per_thread {
                    calculator.record_outcome(false, true, f64::from(i));
                    calculator.compute_threshold(f64::from(i));
                }
            })
        })
        .collect();
    for handle in handles {
        if handle.join().is_err() {
            panic!("Worker thread panicked");
        }
    }

    let stats = calculator.snapshot();
    assert_eq!(stats.false_reject_count, u64::from(threads * per_thread));
    assert_eq!(stats.false_rejects, DEFAULT_HISTORY_CAPACITY);
    assert_eq!(stats.match_scores, DEFAULT_HISTORY_CAPACITY);
    assert_eq!(stats.false_accepts, 0);
}

#[test]
fn test_false_rejects_loosen_threshold() {
    let calculator = shared_calculator();
    let before = calculator.compute_breakdown(0.5);

    for _ in 0..10 {
        calculator.record_outcome(false, true, 3.0);
    }
    let after = calculator.compute_breakdown(3.0);

    assert_eq!(after.performance_factor, 0.9);
    assert!(after.threshold <= before.threshold);
}

#[test]
fn test_false_accepts_tighten_threshold() {
    let baseline = shared_calculator().compute_threshold(0.5);

    let tightened = shared_calculator();
    tightened.record_outcome(true, false, 9.0);
    let breakdown = tightened.compute_breakdown(9.0);

    assert_eq!(breakdown.performance_factor, 1.1);
    assert!(breakdown.threshold >= baseline);
}

#[test]
fn test_sensor_reading_changes_environmental_factor() {
    let calculator = unwrap_calculator(
        ThresholdCalculator::new(MEDIUM, ScannerCharacteristics::default(), 10).map(|calculator| {
            calculator.with_sensor(Arc::new(FixedConditions(EnvironmentalConditions {
                temperature_c: 40.0,
                humidity_percent: 85.0,
            })))
        }),
    );

    let breakdown = calculator.compute_breakdown(0.5);
    assert!(!breakdown.fallback);
    assert!(breakdown.environmental_factor < EnvironmentalConditions::NEUTRAL.factor());
    assert!((0.95..=1.05).contains(&breakdown.environmental_factor));
}

#[test]
fn test_medium_profile_without_sensor_is_five() {
    let scanner = ScannerCharacteristics {
        dpi: 250,
        scan_width: 256,
        scan_height: 360,
        image_quality: 50,
        noise_level: 0.5,
    };
    let calculator =
        unwrap_calculator(ThresholdCalculator::new(MEDIUM, scanner, DEFAULT_HISTORY_CAPACITY));

    let breakdown = calculator.compute_breakdown(0.5);
    assert!(!breakdown.fallback);
    assert_eq!(breakdown.environmental_factor, 1.0);
    assert_eq!(breakdown.threshold, 5);
    assert_eq!(calculator.compute_threshold(0.5), 5);
}

#[test]
fn test_history_capacity_above_default_is_rejected() {
    let oversized =
        ThresholdCalculator::new(MEDIUM, ScannerCharacteristics::default(), DEFAULT_HISTORY_CAPACITY + 1);
    assert!(matches!(oversized, Err(RidgegateError::Configuration(_))));

    let calculator = shared_calculator();
    for i in 0..3000 {
        calculator.record_outcome(true, false, f64::from(i));
    }
    let stats = calculator.snapshot();
    assert_eq!(stats.false_accepts, DEFAULT_HISTORY_CAPACITY);
    assert_eq!(stats.false_accept_count, 3000);
}
