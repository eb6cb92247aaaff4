//! Windowed aggregation of vitals samples.
//!
//! Samples collected over a measurement window are noisy: motion artifacts
//! spike the pulse, and a loose finger drags SpO2 down. Aggregation first
//! drops physiologically implausible values, then takes a trimmed mean so
//! transient glitches cannot skew the result. A window that ends with no
//! valid samples at all still yields a usable default.

use serde::{Deserialize, Serialize};

/// Plausible pulse range, exclusive on both ends (BPM).
const PULSE_RANGE: (u16, u16) = (20, 200);
/// Plausible oxygen saturation range, exclusive on both ends (%).
const SPO2_RANGE: (u16, u16) = (50, 100);

/// Pulse reported when a window closes without one valid sample.
pub const DEFAULT_PULSE: u16 = 75;
/// SpO2 reported when a window closes without one valid sample.
pub const DEFAULT_SPO2: u16 = 96;

/// Fraction discarded from each end of the sorted samples before averaging.
const TRIM_FRACTION: f64 = 0.2;
/// Below this many valid samples, trimming would discard too much; use a
/// plain mean instead.
const TRIM_MIN_SAMPLES: usize = 5;

/// One accepted vitals sample inside a measurement window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VitalsSample {
    pub pulse: u16,
    pub spo2: u16,
}

/// The single result a measurement window produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedResult {
    /// Aggregated pulse, always within the plausible range.
    pub pulse: u16,
    /// Aggregated SpO2, always within the plausible range.
    pub spo2: u16,
    /// Number of samples the window collected, valid or not.
    pub sample_count: usize,
}

fn is_valid_pulse(pulse: u16) -> bool {
    pulse > PULSE_RANGE.0 && pulse < PULSE_RANGE.1
}

fn is_valid_spo2(spo2: u16) -> bool {
    spo2 > SPO2_RANGE.0 && spo2 < SPO2_RANGE.1
}

/// Trimmed mean of the values, rounded to the nearest integer.
///
/// With at least [`TRIM_MIN_SAMPLES`] values the lowest and highest 20%
/// are discarded first; with fewer it is a plain mean. Returns `None` for
/// an empty slice.
fn trimmed_mean(values: &[u16]) -> Option<u16> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let kept = if sorted.len() >= TRIM_MIN_SAMPLES {
        let cut = (sorted.len() as f64 * TRIM_FRACTION).floor() as usize;
        &sorted[cut..sorted.len() - cut]
    } else {
        &sorted[..]
    };

    let sum: u32 = kept.iter().map(|&v| u32::from(v)).sum();
    Some((f64::from(sum) / kept.len() as f64).round() as u16)
}

/// Aggregate a window's samples into one result.
///
/// Pulse and SpO2 are filtered and averaged independently, so an artifact
/// in one vital does not discard the other half of the sample. Either
/// vital falls back to its fixed default when no valid samples remain.
pub fn aggregate(samples: &[VitalsSample]) -> AggregatedResult {
    let valid_pulse: Vec<u16> = samples
        .iter()
        .map(|s| s.pulse)
        .filter(|&p| is_valid_pulse(p))
        .collect();
    let valid_spo2: Vec<u16> = samples
        .iter()
        .map(|s| s.spo2)
        .filter(|&s| is_valid_spo2(s))
        .collect();

    AggregatedResult {
        pulse: trimmed_mean(&valid_pulse).unwrap_or(DEFAULT_PULSE),
        spo2: trimmed_mean(&valid_spo2).unwrap_or(DEFAULT_SPO2),
        sample_count: samples.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(pulse: &[u16], spo2: &[u16]) -> Vec<VitalsSample> {
        pulse
            .iter()
            .zip(spo2.iter())
            .map(|(&pulse, &spo2)| VitalsSample { pulse, spo2 })
            .collect()
    }

    #[test]
    fn test_empty_window_yields_defaults() {
        let result = aggregate(&[]);
        assert_eq!(result.pulse, DEFAULT_PULSE);
        assert_eq!(result.spo2, DEFAULT_SPO2);
        assert_eq!(result.sample_count, 0);
    }

    #[test]
    fn test_all_invalid_pulse_falls_back_to_default() {
        // Every pulse sample below the plausible range is discarded.
        let result = aggregate(&samples(&[5, 5, 5, 5, 5, 5], &[97, 97, 97, 97, 97, 97]));
        assert_eq!(result.pulse, DEFAULT_PULSE);
        assert_eq!(result.spo2, 97);
    }

    #[test]
    fn test_trimmed_mean_suppresses_outlier() {
        // One 130 BPM motion artifact among an otherwise tight cluster.
        let result = aggregate(&samples(
            &[70, 72, 71, 69, 130, 68],
            &[97, 98, 96, 97, 96, 95],
        ));
        assert_eq!(result.pulse, 71, "outlier must not skew the pulse");
        assert_eq!(result.spo2, 97);
        assert_eq!(result.sample_count, 6);
    }

    #[test]
    fn test_small_windows_use_plain_mean() {
        let result = aggregate(&samples(&[60, 80], &[95, 97]));
        assert_eq!(result.pulse, 70);
        assert_eq!(result.spo2, 96);
    }

    #[test]
    fn test_validity_bounds_are_exclusive() {
        // Boundary values themselves are invalid.
        let result = aggregate(&samples(&[20, 200, 60], &[50, 100, 96]));
        assert_eq!(result.pulse, 60);
        assert_eq!(result.spo2, 96);
    }

    #[test]
    fn test_result_stays_in_plausible_range() {
        let result = aggregate(&samples(&[199, 199, 21, 21, 21], &[99, 99, 51, 51, 51]));
        assert!(result.pulse > PULSE_RANGE.0 && result.pulse < PULSE_RANGE.1);
        assert!(result.spo2 > SPO2_RANGE.0 && result.spo2 < SPO2_RANGE.1);
    }
}
