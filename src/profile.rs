use crate::error::RidgegateError;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::str::FromStr;

/// Named strictness level of a deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SecurityLevel {
    Low,
    Medium,
    High,
}

/// Immutable bundle of matching-strictness parameters.
///
/// Profiles are a deployment-time choice: they are looked up once when the
/// service is configured and never passed per call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SecurityProfile {
    pub level: SecurityLevel,
    /// Final scaling of the threshold, within `[0.8, 1.2]`.
    pub threshold_multiplier: f64,
    /// Baseline number of matching feature points, at least 1.
    pub min_matching_points: u32,
    /// Target false accept rate, in `(0, 1)`.
    pub max_false_accept_rate: f64,
    /// Target false reject rate, in `(0, 1)`.
    pub max_false_reject_rate: f64,
}

pub const LOW: SecurityProfile = SecurityProfile {
    level: SecurityLevel::Low,
    threshold_multiplier: 0.8,
    min_matching_points: 3,
    max_false_accept_rate: 0.001,
    max_false_reject_rate: 0.1,
};

pub const MEDIUM: SecurityProfile = SecurityProfile {
    level: SecurityLevel::Medium,
    threshold_multiplier: 1.0,
    min_matching_points: 5,
    max_false_accept_rate: 0.0001,
    max_false_reject_rate: 0.05,
};

pub const HIGH: SecurityProfile = SecurityProfile {
    level: SecurityLevel::High,
    threshold_multiplier: 1.2,
    min_matching_points: 8,
    max_false_accept_rate: 0.00001,
    max_false_reject_rate: 0.01,
};

lazy_static! {
    static ref CATALOG: HashMap<&'static str, SecurityProfile> = {
        let mut map = HashMap::new();
        map.insert("low", LOW);
        map.insert("medium", MEDIUM);
        map.insert("high", HIGH);
        map
    };
}

impl SecurityProfile {
    /// Looks up a profile by name, ignoring ASCII case.
    pub fn lookup(name: &str) -> Result<SecurityProfile, RidgegateError> {
        CATALOG
            .get(name.trim().to_ascii_lowercase().as_str())
            .copied()
            .ok_or_else(|| {
                RidgegateError::Configuration(format!("unknown security profile: {name}"))
            })
    }

    /// All profiles, from least to most strict.
    pub fn all() -> [SecurityProfile; 3] {
        [LOW, MEDIUM, HIGH]
    }
}

impl SecurityLevel {
    pub fn name(&self) -> &'static str {
        match self {
            SecurityLevel::Low => "low",
            SecurityLevel::Medium => "medium",
            SecurityLevel::High => "high",
        }
    }

    pub fn profile(&self) -> SecurityProfile {
        match self {
            SecurityLevel::Low => LOW,
            SecurityLevel::Medium => MEDIUM,
            SecurityLevel::High => HIGH,
        }
    }
}

impl FromStr for SecurityLevel {
    type Err = RidgegateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SecurityProfile::lookup(s).map(|profile| profile.level)
    }
}
