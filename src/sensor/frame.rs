//! Frame parsing for the raw sensor stream.
//!
//! The oximeter firmware emits one text line per sample attempt. A usable
//! line carries a `PULSE` and an `SPO2` marker with integer values, in any
//! order and with either `:` or `=` as the separator. Everything else,
//! including the all-zero lines the sensor produces while warming up,
//! degrades to [`SensorFrame::NoSignal`]; parsing never fails.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Values at or below this are treated as line noise rather than vitals.
const NOISE_FLOOR: u16 = 10;

/// One parsed sample from the sensor channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorFrame {
    /// A paired pulse (BPM) and oxygen saturation (%) sample.
    Reading { pulse: u16, spo2: u16 },
    /// No usable physiological signal (no finger on the sensor).
    NoSignal,
}

impl SensorFrame {
    /// Convenience constructor for a reading.
    pub fn reading(pulse: u16, spo2: u16) -> Self {
        SensorFrame::Reading { pulse, spo2 }
    }

    /// Whether this frame carries a reading.
    pub fn is_reading(&self) -> bool {
        matches!(self, SensorFrame::Reading { .. })
    }
}

fn pulse_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)PULSE[:=](\d+)").expect("pulse pattern"))
}

fn spo2_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)SPO2[:=](\d+)").expect("spo2 pattern"))
}

/// Extract the integer following a marker anywhere in the line.
///
/// Values too large for `u16` fail the parse and count as absent.
fn extract(pattern: &Regex, line: &str) -> Option<u16> {
    pattern
        .captures(line)
        .and_then(|captures| captures.get(1))
        .and_then(|value| value.as_str().parse().ok())
}

/// Parse one raw line from the sensor channel.
///
/// A line yields a [`SensorFrame::Reading`] only when both markers are
/// present and both values exceed the noise floor. Partial lines are not
/// partial readings; they are no-signal.
pub fn parse_line(line: &str) -> SensorFrame {
    let pulse = extract(pulse_pattern(), line);
    let spo2 = extract(spo2_pattern(), line);

    match (pulse, spo2) {
        (Some(pulse), Some(spo2)) if pulse > NOISE_FLOOR && spo2 > NOISE_FLOOR => {
            SensorFrame::Reading { pulse, spo2 }
        }
        _ => SensorFrame::NoSignal,
    }
}
