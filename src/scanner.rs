//! Capture-device abstractions.
//!
//! A [`ScannerDriver`] talks to the hardware, [`ScannerCharacteristics`] describes
//! its calibration, and [`SimulatedScanner`] replays scripted samples for tests
//! and demos.

use crate::error::RidgegateError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

const REFERENCE_DPI: f64 = 500.0;
const MIN_SCANNER_QUALITY: f64 = 0.8;
const MAX_SCANNER_QUALITY: f64 = 1.2;

/// Calibration descriptor of one physical capture device.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScannerCharacteristics {
    pub dpi: u32,
    pub scan_width: u32,
    pub scan_height: u32,
    /// Device image quality, 0 to 100.
    pub image_quality: u8,
    /// Sensor noise, 0.0 to 1.0.
    pub noise_level: f64,
}

impl Default for ScannerCharacteristics {
    fn default() -> Self {
        Self { dpi: 500, scan_width: 256, scan_height: 360, image_quality: 80, noise_level: 0.1 }
    }
}

impl ScannerCharacteristics {
    pub fn new(
        dpi: u32,
        scan_width: u32,
        scan_height: u32,
        image_quality: u8,
        noise_level: f64,
    ) -> Result<Self, RidgegateError> {
        let characteristics = Self { dpi, scan_width, scan_height, image_quality, noise_level };
        characteristics.validate()?;
        Ok(characteristics)
    }

    pub fn validate(&self) -> Result<(), RidgegateError> {
        if self.dpi == 0 {
            return Err(RidgegateError::Configuration("scanner dpi must be positive".to_string()));
        }
        if self.image_quality > 100 {
            return Err(RidgegateError::Configuration(format!(
                "scanner image quality {} exceeds 100",
                self.image_quality
            )));
        }
        if !self.noise_level.is_finite() || !(0.0..=1.0).contains(&self.noise_level) {
            return Err(RidgegateError::Configuration(format!(
                "scanner noise level {} outside [0, 1]",
                self.noise_level
            )));
        }
        Ok(())
    }

    /// Device quality factor in `[0.8, 1.2]`.
    ///
    /// Weighted blend of resolution (against a 500 dpi reference), image quality
    /// and absence of noise.
    pub fn quality_factor(&self) -> f64 {
        let dpi_factor = f64::from(self.dpi) / REFERENCE_DPI;
        let quality_factor = f64::from(self.image_quality) / 100.0;
        let noise_factor = 1.0 - self.noise_level;

        let blended = 0.4 * dpi_factor + 0.4 * quality_factor + 0.2 * noise_factor;
        (MIN_SCANNER_QUALITY + 0.4 * blended).clamp(MIN_SCANNER_QUALITY, MAX_SCANNER_QUALITY)
    }
}

/// Opaque capture produced by a scanner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawSample {
    pub data: Vec<u8>,
    /// Quality score reported by the device, if it reports one (0 to 100).
    pub quality: Option<u8>,
}

impl RawSample {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into(), quality: None }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Rejects samples whose reported quality is below `minimum`.
    /// Samples without a reported quality pass.
    pub fn check_quality(&self, minimum: u8) -> Result<(), RidgegateError> {
        match self.quality {
            Some(quality) if quality < minimum => Err(RidgegateError::Capture(format!(
                "sample quality {quality} below minimum {minimum}"
            ))),
            _ => Ok(()),
        }
    }
}

/// Hardware or software source of fingerprint captures.
///
/// Drivers are blocking; [`crate::capture::ScannerHandle`] runs them on a
/// dedicated thread.
pub trait ScannerDriver: Send {
    fn initialize(&mut self) -> Result<(), RidgegateError>;

    fn capture_sample(&mut self, timeout: Duration) -> Result<RawSample, RidgegateError>;
}

impl<D: ScannerDriver + ?Sized> ScannerDriver for Box<D> {
    fn initialize(&mut self) -> Result<(), RidgegateError> {
        (**self).initialize()
    }

    fn capture_sample(&mut self, timeout: Duration) -> Result<RawSample, RidgegateError> {
        (**self).capture_sample(timeout)
    }
}

/// Scanner that replays a scripted queue of samples.
pub struct SimulatedScanner {
    samples: VecDeque<RawSample>,
    delay: Duration,
    fail_initialize: bool,
    initialized: bool,
    captures: Arc<AtomicUsize>,
}

impl SimulatedScanner {
    pub fn new<I>(samples: I) -> Self
    where
        I: IntoIterator<Item = RawSample>,
    {
        Self {
            samples: samples.into_iter().collect(),
            delay: Duration::ZERO,
            fail_initialize: false,
            initialized: false,
            captures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleeps this long inside every capture.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    /// Shared counter of `capture_sample` calls, readable after the scanner has
    /// moved into its worker.
    pub fn capture_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.captures)
    }
}

impl ScannerDriver for SimulatedScanner {
    fn initialize(&mut self) -> Result<(), RidgegateError> {
        if self.fail_initialize {
            return Err(RidgegateError::Capture("simulated scanner not connected".to_string()));
        }
        self.initialized = true;
        debug!("Simulated scanner initialized with {} queued samples", self.samples.len());
        Ok(())
    }

    fn capture_sample(&mut self, _timeout: Duration) -> Result<RawSample, RidgegateError> {
        if !self.initialized {
            return Err(RidgegateError::Capture("scanner not initialized".to_string()));
        }
        self.captures.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        self.samples
            .pop_front()
            .ok_or_else(|| RidgegateError::Capture("no finger presented".to_string()))
    }
}
