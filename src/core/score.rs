//! Stress scoring.
//!
//! The score is a pure function of one aggregated result: deviation of the
//! pulse above a resting baseline plus deviation of SpO2 below full
//! saturation, each weighted the same, clamped into `[0, 100]`.

use crate::core::aggregate::AggregatedResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resting pulse the score deviates from (BPM).
const PULSE_BASELINE: i32 = 60;
/// Full oxygen saturation (%).
const SPO2_BASELINE: i32 = 100;

/// Compute the stress score for an aggregated result.
pub fn stress_score(result: &AggregatedResult) -> u8 {
    let raw = (i32::from(result.pulse) - PULSE_BASELINE) * 2
        + (SPO2_BASELINE - i32::from(result.spo2)) * 2;
    raw.clamp(0, 100) as u8
}

/// Classification bands for a stress score.
///
/// Band boundaries compare with strict `>` against the lower cut, so a
/// score sitting exactly on a boundary belongs to the band below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressLevel {
    High,
    Elevated,
    Normal,
    Low,
}

impl StressLevel {
    /// Classify a score into its band.
    pub fn from_score(score: u8) -> Self {
        if score > 80 {
            StressLevel::High
        } else if score > 50 {
            StressLevel::Elevated
        } else if score > 30 {
            StressLevel::Normal
        } else {
            StressLevel::Low
        }
    }
}

impl fmt::Display for StressLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StressLevel::High => "High Stress",
            StressLevel::Elevated => "Elevated Stress",
            StressLevel::Normal => "Normal",
            StressLevel::Low => "Low Stress",
        };
        write!(f, "{text}")
    }
}
