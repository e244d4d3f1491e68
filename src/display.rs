use crate::capture::CaptureStats;
use crate::environment::EnvironmentalConditions;
use crate::matcher::MatchResult;
use crate::profile::{SecurityLevel, SecurityProfile};
use crate::scanner::ScannerCharacteristics;
use crate::service::{Stage, VerificationAttempt};
use crate::threshold::{HistoryStats, ThresholdBreakdown};
use std::fmt;

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl fmt::Display for SecurityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (multiplier={}, min_points={}, max_far={}, max_frr={})",
            self.level,
            self.threshold_multiplier,
            self.min_matching_points,
            self.max_false_accept_rate,
            self.max_false_reject_rate
        )
    }
}

impl fmt::Display for ScannerCharacteristics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}dpi {}x{} quality={} noise={:.2}",
            self.dpi, self.scan_width, self.scan_height, self.image_quality, self.noise_level
        )
    }
}

impl fmt::Display for EnvironmentalConditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}C {:.0}%", self.temperature_c, self.humidity_percent)
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.matched { "match" } else { "no match" };
        write!(f, "{} (score={})", verdict, self.score)
    }
}

impl fmt::Display for ThresholdBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fallback {
            return write!(f, "threshold={} (static fallback)", self.threshold);
        }
        write!(
            f,
            "threshold={} scanner={:.3} performance={:.3} environment={:.3}",
            self.threshold, self.scanner_quality, self.performance_factor, self.environmental_factor
        )
    }
}

impl fmt::Display for HistoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Calibration history:")?;
        writeln!(f, "  match scores:     {}", self.match_scores)?;
        writeln!(f, "  labelled attempts: {}", self.total_attempts)?;
        writeln!(
            f,
            "  false accepts:    {} ({} retained)",
            self.false_accept_count, self.false_accepts
        )?;
        write!(f, "  false rejects:    {} ({} retained)", self.false_reject_count, self.false_rejects)
    }
}

impl fmt::Display for CaptureStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "captures requested={}, timed out={}, skipped={}",
            self.requested, self.timed_out, self.skipped
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Capturing => "capturing",
            Stage::Extracting => "extracting",
            Stage::Persisting => "persisting",
            Stage::ThresholdComputing => "threshold-computing",
            Stage::Matching => "matching",
            Stage::Succeeded => "succeeded",
            Stage::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

impl fmt::Display for VerificationAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user {}: {} against {} [{}]", self.user_id, self.result, self.breakdown, self.stage)
    }
}
