use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::trace;
use ttl_cache::TtlCache;

const NEUTRAL_TEMPERATURE_C: f64 = 22.5;
const NEUTRAL_HUMIDITY_PERCENT: f64 = 50.0;
const MIN_ENVIRONMENTAL_FACTOR: f64 = 0.95;
const MAX_ENVIRONMENTAL_FACTOR: f64 = 1.05;

/// Ambient conditions around the scanner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnvironmentalConditions {
    pub temperature_c: f64,
    pub humidity_percent: f64,
}

impl EnvironmentalConditions {
    pub const NEUTRAL: EnvironmentalConditions = EnvironmentalConditions {
        temperature_c: NEUTRAL_TEMPERATURE_C,
        humidity_percent: NEUTRAL_HUMIDITY_PERCENT,
    };

    /// Environmental factor in `[0.95, 1.05]`.
    ///
    /// NaN inputs propagate so the caller can detect the fault.
    pub fn factor(&self) -> f64 {
        let temp_factor = 1.0 - (self.temperature_c - NEUTRAL_TEMPERATURE_C).abs() / 50.0;
        let humidity_factor = 1.0 - (self.humidity_percent - NEUTRAL_HUMIDITY_PERCENT).abs() / 100.0;

        (MIN_ENVIRONMENTAL_FACTOR + 0.1 * (temp_factor + humidity_factor) / 2.0)
            .clamp(MIN_ENVIRONMENTAL_FACTOR, MAX_ENVIRONMENTAL_FACTOR)
    }
}

impl Default for EnvironmentalConditions {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Optional feed of ambient conditions. `None` means no reading is available.
pub trait EnvironmentSensor: Send + Sync {
    fn current_conditions(&self) -> Option<EnvironmentalConditions>;
}

impl<T: EnvironmentSensor + ?Sized> EnvironmentSensor for Arc<T> {
    fn current_conditions(&self) -> Option<EnvironmentalConditions> {
        (**self).current_conditions()
    }
}

/// Sensor that always reports the same reading.
#[derive(Clone, Copy, Debug)]
pub struct FixedConditions(pub EnvironmentalConditions);

impl EnvironmentSensor for FixedConditions {
    fn current_conditions(&self) -> Option<EnvironmentalConditions> {
        Some(self.0)
    }
}

const CACHE_KEY: &str = "ambient";

/// Memoizes another sensor's reading for a fixed time to live.
pub struct CachedSensor<S> {
    inner: S,
    ttl: Duration,
    cache: Mutex<TtlCache<&'static str, EnvironmentalConditions>>,
}

impl<S: EnvironmentSensor> CachedSensor<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self { inner, ttl, cache: Mutex::new(TtlCache::new(1)) }
    }
}

impl<S: EnvironmentSensor> EnvironmentSensor for CachedSensor<S> {
    fn current_conditions(&self) -> Option<EnvironmentalConditions> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(conditions) = cache.get(&CACHE_KEY) {
            return Some(*conditions);
        }

        let conditions = self.inner.current_conditions()?;
        trace!("Refreshed ambient reading: {}", conditions);
        cache.insert(CACHE_KEY, conditions, self.ttl);
        Some(conditions)
    }
}
