use crate::error::RidgegateError;
use crate::profile::SecurityLevel;
use crate::scanner::ScannerCharacteristics;
use crate::threshold::{check_history_capacity, DEFAULT_HISTORY_CAPACITY};
use nom::bytes::complete::take_while1;
use nom::character::complete::{char, space0};
use nom::combinator::rest;
use nom::sequence::{delimited, separated_pair};
use nom::{IResult, Parser};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{trace, warn};

/// Service configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceConfig {
    pub profile: SecurityLevel,
    pub capture_timeout: Duration,
    /// Capture requests allowed to wait for a busy scanner.
    pub capture_queue: usize,
    /// Minimum device-reported sample quality, 0 to 100.
    pub min_sample_quality: u8,
    pub history_capacity: usize,
    pub environment_cache_ttl: Duration,
    pub scanner: ScannerCharacteristics,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            profile: SecurityLevel::Medium,
            capture_timeout: Duration::from_secs(10),
            capture_queue: 4,
            min_sample_quality: 60,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            environment_cache_ttl: Duration::from_secs(60),
            scanner: ScannerCharacteristics::default(),
        }
    }
}

impl ServiceConfig {
    /// Reads and parses a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RidgegateError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            RidgegateError::Configuration(format!("Failed to read {}: {e}", path.display()))
        })?;
        content.parse()
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, RidgegateError> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies deployment overrides:
    /// - `SCANNER_TIMEOUT`: capture timeout in seconds
    /// - `SCANNER_QUALITY_THRESHOLD`: minimum sample quality
    /// - `SECURITY_PROFILE`: profile name
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), RidgegateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("SCANNER_TIMEOUT") {
            let seconds: u64 = parse_number("SCANNER_TIMEOUT", &value)?;
            self.capture_timeout = Duration::from_secs(seconds);
        }
        if let Some(value) = lookup("SCANNER_QUALITY_THRESHOLD") {
            self.min_sample_quality = parse_number("SCANNER_QUALITY_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("SECURITY_PROFILE") {
            self.profile = value.parse()?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), RidgegateError> {
        if self.capture_timeout.is_zero() {
            return Err(RidgegateError::Configuration(
                "capture timeout must be greater than 0".to_string(),
            ));
        }
        if self.min_sample_quality > 100 {
            return Err(RidgegateError::Configuration(format!(
                "minimum sample quality {} exceeds 100",
                self.min_sample_quality
            )));
        }
        check_history_capacity(self.history_capacity)?;
        self.scanner.validate()
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, RidgegateError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| RidgegateError::Configuration(format!("invalid value for `{key}`: {value}, {e}")))
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn parse_section(input: &str) -> IResult<&str, &str> {
    delimited(char('['), take_while1(is_key_char), char(']')).parse(input)
}

fn parse_named_value(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(take_while1(is_key_char), (space0, char('='), space0), rest).parse(input)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Service,
    Scanner,
    Unknown,
}

impl FromStr for ServiceConfig {
    type Err = RidgegateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config = ServiceConfig::default();
        let mut section = None;

        for line in s.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') {
                let (_, name) = parse_section(line).map_err(|err| {
                    RidgegateError::Configuration(format!("fail to parse section: {line}, {err}"))
                })?;
                section = Some(match name {
                    "service" => Section::Service,
                    "scanner" => Section::Scanner,
                    other => {
                        warn!("skip unknown section `{}`", other);
                        Section::Unknown
                    }
                });
                continue;
            }

            let (_, (key, value)) = parse_named_value(line).map_err(|err| {
                RidgegateError::Configuration(format!("fail to parse named value: {line}, {err}"))
            })?;
            let value = value.trim();

            trace!("config `{}` = `{}`", key, value);

            match (section, key) {
                (None, _) => {
                    return Err(RidgegateError::Configuration(format!(
                        "`{key}` outside of any section"
                    )))
                }
                (Some(Section::Service), "profile") => config.profile = value.parse()?,
                (Some(Section::Service), "capture_timeout_ms") => {
                    config.capture_timeout = Duration::from_millis(parse_number(key, value)?)
                }
                (Some(Section::Service), "capture_queue") => {
                    config.capture_queue = parse_number(key, value)?
                }
                (Some(Section::Service), "min_sample_quality") => {
                    config.min_sample_quality = parse_number(key, value)?
                }
                (Some(Section::Service), "history_capacity") => {
                    config.history_capacity = parse_number(key, value)?
                }
                (Some(Section::Service), "environment_cache_ttl_ms") => {
                    config.environment_cache_ttl = Duration::from_millis(parse_number(key, value)?)
                }
                (Some(Section::Scanner), "dpi") => config.scanner.dpi = parse_number(key, value)?,
                (Some(Section::Scanner), "scan_width") => {
                    config.scanner.scan_width = parse_number(key, value)?
                }
                (Some(Section::Scanner), "scan_height") => {
                    config.scanner.scan_height = parse_number(key, value)?
                }
                (Some(Section::Scanner), "image_quality") => {
                    config.scanner.image_quality = parse_number(key, value)?
                }
                (Some(Section::Scanner), "noise_level") => {
                    config.scanner.noise_level = parse_number(key, value)?
                }
                (Some(Section::Unknown), _) => {}
                (Some(_), other) => warn!("skip unknown key `{}`", other),
            }
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_value_allows_spacing() {
        match parse_named_value("noise_level =0.25") {
            Ok((_, (key, value))) => {
                assert_eq!(key, "noise_level");
                assert_eq!(value, "0.25");
            }
            Err(e) => panic!("Failed to parse named value: {e}"),
        }
    }

    #[test]
    fn section_header() {
        assert!(matches!(parse_section("[scanner]"), Ok(("", "scanner"))));
        assert!(parse_section("[scanner").is_err());
    }

    #[test]
    fn overrides_from_lookup() {
        let mut config = ServiceConfig::default();
        let result = config.apply_overrides(|key| match key {
            "SCANNER_TIMEOUT" => Some("3".to_string()),
            "SCANNER_QUALITY_THRESHOLD" => Some("75".to_string()),
            "SECURITY_PROFILE" => Some("High".to_string()),
            _ => None,
        });

        if let Err(e) = result {
            panic!("Failed to apply overrides: {e}");
        }
        assert_eq!(config.capture_timeout, Duration::from_secs(3));
        assert_eq!(config.min_sample_quality, 75);
        assert_eq!(config.profile, SecurityLevel::High);
    }

    #[test]
    fn history_capacity_is_capped() {
        let at_cap = ServiceConfig { history_capacity: DEFAULT_HISTORY_CAPACITY, ..ServiceConfig::default() };
        assert!(at_cap.validate().is_ok());

        let oversized = ServiceConfig { history_capacity: 5000, ..ServiceConfig::default() };
        assert!(matches!(oversized.validate(), Err(RidgegateError::Configuration(_))));
    }

    #[test]
    fn bad_override_is_rejected() {
        let mut config = ServiceConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "SCANNER_TIMEOUT").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(RidgegateError::Configuration(_))));
    }
}
