#![forbid(unsafe_code)]

//! # ridgegate
//!
//! Fingerprint verification against a single enrolled template with an adaptive
//! acceptance threshold.
//!
//! This crate provides:
//! - A closed catalog of security profiles
//! - A threshold calculator driven by scanner quality, ambient conditions and
//!   observed false accept/reject rates
//! - Pluggable feature extraction and matching
//! - Enrollment and verification workflows over an off-thread scanner worker

pub mod capture;
pub mod config;
pub mod environment;
pub mod error;
pub mod features;
pub mod matcher;
pub mod profile;
pub mod scanner;
pub mod service;
pub mod store;
pub mod threshold;

mod display;

// Re-exports
pub use capture::{CaptureStats, ScannerHandle};
pub use config::ServiceConfig;
pub use environment::{CachedSensor, EnvironmentSensor, EnvironmentalConditions, FixedConditions};
pub use error::RidgegateError;
pub use features::{FeatureExtractor, FeatureSet, WhitespaceExtractor};
pub use matcher::{MatchEngine, MatchResult, SetIntersectionMatcher};
pub use profile::{SecurityLevel, SecurityProfile};
pub use scanner::{RawSample, ScannerCharacteristics, ScannerDriver, SimulatedScanner};
pub use service::{Deployment, FingerprintService, Stage, VerificationAttempt};
pub use store::{EnrolledTemplate, EnrollmentStore, InMemoryEnrollmentStore, UserId};
pub use threshold::{HistoricalRecord, HistoryStats, ThresholdBreakdown, ThresholdCalculator};
