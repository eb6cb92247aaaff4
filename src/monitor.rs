//! Consumer-side measurement engine.
//!
//! The engine owns the latest live reading and the active measurement
//! window, and is driven by a single task: frames arrive from the relay
//! client, a timer fires the finalization, and operator actions map onto
//! [`MonitorEngine::start`], [`MonitorEngine::complete_manual`] and
//! [`MonitorEngine::abort`]. All the async plumbing lives in
//! [`run_session`]; the engine itself is plain state and can be tested
//! without a runtime.

use crate::core::score::{stress_score, StressLevel};
use crate::core::window::{CompletionToken, MeasurementWindow};
use crate::core::{AggregatedResult, VitalsSample};
use crate::relay::client::{self, BackoffPolicy, ConnectionState};
use crate::sensor::frame::SensorFrame;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;

/// A finalized measurement with its derived score.
#[derive(Debug, Clone, Copy)]
pub struct Measurement {
    pub result: AggregatedResult,
    pub score: u8,
    pub level: StressLevel,
}

impl Measurement {
    fn from_result(result: AggregatedResult) -> Self {
        let score = stress_score(&result);
        Self {
            result,
            score,
            level: StressLevel::from_score(score),
        }
    }
}

/// Running history emitted after each accepted sample, for live display.
#[derive(Debug, Clone)]
pub struct SampleUpdate {
    pub pulse_history: Vec<u16>,
    pub spo2_history: Vec<u16>,
}

/// Errors from operator-facing engine operations.
#[derive(Debug, PartialEq, Eq)]
pub enum MonitorError {
    /// A measurement is already running.
    AlreadyMeasuring,
    /// No measurement is running.
    NotMeasuring,
    /// Manual completion with no current reading to complete from.
    NoDataAvailable,
}

impl std::fmt::Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorError::AlreadyMeasuring => write!(f, "a measurement is already running"),
            MonitorError::NotMeasuring => write!(f, "no measurement is running"),
            MonitorError::NoDataAvailable => {
                write!(f, "no data available, keep a finger on the sensor and retry")
            }
        }
    }
}

impl std::error::Error for MonitorError {}

/// State of the consumer-side pipeline between relay and score.
#[derive(Debug, Default)]
pub struct MonitorEngine {
    latest: Option<VitalsSample>,
    window: Option<MeasurementWindow>,
}

impl MonitorEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent live reading, if the sensor currently sees one.
    pub fn latest(&self) -> Option<VitalsSample> {
        self.latest
    }

    /// Whether a measurement window is active.
    pub fn is_measuring(&self) -> bool {
        self.window.as_ref().is_some_and(|w| w.is_active())
    }

    /// Feed one frame from the relay.
    ///
    /// Readings update the live value and, during a measurement, are
    /// appended to the window; the updated running history comes back for
    /// display. No-signal clears the live value only outside a
    /// measurement, so a brief finger lift does not blank the charts
    /// mid-measurement.
    pub fn observe(&mut self, frame: SensorFrame) -> Option<SampleUpdate> {
        match frame {
            SensorFrame::Reading { pulse, spo2 } => {
                let sample = VitalsSample { pulse, spo2 };
                self.latest = Some(sample);

                let window = self.window.as_mut()?;
                if !window.push(sample) {
                    return None;
                }
                Some(SampleUpdate {
                    pulse_history: window.pulse_history(),
                    spo2_history: window.spo2_history(),
                })
            }
            SensorFrame::NoSignal => {
                if !self.is_measuring() {
                    self.latest = None;
                }
                None
            }
        }
    }

    /// Begin a measurement window.
    ///
    /// Returns the window's completion token; the caller arms the timer
    /// that will fire [`MonitorEngine::finalize`] when `duration` elapses.
    pub fn start(&mut self, duration: Duration) -> Result<CompletionToken, MonitorError> {
        if self.is_measuring() {
            return Err(MonitorError::AlreadyMeasuring);
        }

        let window = MeasurementWindow::start(duration);
        let token = window.token();
        self.window = Some(window);
        Ok(token)
    }

    /// Timer-expiry finalization over the accumulated window.
    ///
    /// Returns `None` when there is nothing to finalize, including the
    /// case where a manual completion already claimed the window.
    pub fn finalize(&mut self) -> Option<Measurement> {
        let window = self.window.as_mut()?;
        let result = window.finalize()?;
        self.window = None;
        Some(Measurement::from_result(result))
    }

    /// Operator-initiated early completion from the single most recent
    /// live reading.
    ///
    /// Rejected with [`MonitorError::NoDataAvailable`] when no reading is
    /// currently live; the window stays active so the operator can retry.
    /// Returns `Ok(None)` if the window was already finalized elsewhere.
    pub fn complete_manual(&mut self) -> Result<Option<Measurement>, MonitorError> {
        let window = self.window.as_mut().ok_or(MonitorError::NotMeasuring)?;
        let latest = self.latest.ok_or(MonitorError::NoDataAvailable)?;

        match window.finalize_with_latest(latest) {
            Some(result) => {
                self.window = None;
                Ok(Some(Measurement::from_result(result)))
            }
            None => Ok(None),
        }
    }

    /// Abandon the active measurement without producing a result.
    pub fn abort(&mut self) -> Result<(), MonitorError> {
        if self.window.take().is_none() {
            return Err(MonitorError::NotMeasuring);
        }
        Ok(())
    }
}

/// Configuration for one interactive measurement session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Relay address to consume from.
    pub relay_addr: String,
    /// Measurement duration.
    pub duration: Duration,
}

/// Run one measurement session against the relay.
///
/// Connects through the reconnection supervisor, runs a window for the
/// configured duration, and returns the finalized measurement. Pressing
/// Enter completes early from the current reading; Ctrl+C aborts. The
/// window's timer is the pinned sleep below, owned by this function;
/// aborting the session drops it, so no stale timer can outlive the
/// window it belonged to.
pub async fn run_session(config: SessionConfig) -> anyhow::Result<Measurement> {
    let mut handle = client::spawn(config.relay_addr.clone(), BackoffPolicy::default());
    let mut engine = MonitorEngine::new();

    let token = engine.start(config.duration)?;

    let timer = tokio::time::sleep(config.duration);
    tokio::pin!(timer);

    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let measurement = loop {
        tokio::select! {
            () = &mut timer => {
                match engine.finalize() {
                    Some(measurement) => break measurement,
                    // A manual completion won the race; its arm broke out
                    // already, so this is unreachable in practice.
                    None => anyhow::bail!("window already finalized"),
                }
            }
            changed = handle.state.changed() => {
                if changed.is_err() {
                    continue;
                }
                let connected = *handle.state.borrow() == ConnectionState::Connected;
                println!(
                    "Sensor link: {}",
                    if connected { "connected" } else { "disconnected" }
                );
            }
            frame = handle.frames.recv() => {
                let Some(frame) = frame else {
                    anyhow::bail!("relay client ended unexpectedly");
                };
                if let Some(update) = engine.observe(frame) {
                    let n = update.pulse_history.len();
                    if let Some(sample) = engine.latest() {
                        println!(
                            "  pulse {:>3} bpm | spo2 {:>3}% ({n} samples)",
                            sample.pulse, sample.spo2
                        );
                    }
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(_)) => match engine.complete_manual() {
                        Ok(Some(measurement)) => {
                            println!("Completed early from the current reading.");
                            break measurement;
                        }
                        Ok(None) => {}
                        Err(e) => println!("Cannot complete: {e}"),
                    },
                    // Stdin closed; manual completion is unavailable.
                    _ => stdin_open = false,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                let _ = engine.abort();
                anyhow::bail!("measurement cancelled");
            }
        }
    };

    debug_assert!(token.is_claimed());
    Ok(measurement)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(pulse: u16, spo2: u16) -> SensorFrame {
        SensorFrame::Reading { pulse, spo2 }
    }

    #[test]
    fn test_observe_tracks_latest_reading() {
        let mut engine = MonitorEngine::new();
        assert!(engine.latest().is_none());

        engine.observe(reading(72, 97));
        assert_eq!(engine.latest(), Some(VitalsSample { pulse: 72, spo2: 97 }));

        engine.observe(SensorFrame::NoSignal);
        assert!(engine.latest().is_none());
    }

    #[test]
    fn test_no_signal_keeps_latest_during_measurement() {
        let mut engine = MonitorEngine::new();
        engine.start(Duration::from_secs(30)).unwrap();
        engine.observe(reading(72, 97));
        engine.observe(SensorFrame::NoSignal);

        assert!(engine.latest().is_some());
    }

    #[test]
    fn test_samples_accumulate_with_history_updates() {
        let mut engine = MonitorEngine::new();
        engine.start(Duration::from_secs(30)).unwrap();

        assert!(engine.observe(SensorFrame::NoSignal).is_none());
        let update = engine.observe(reading(70, 97)).unwrap();
        assert_eq!(update.pulse_history, vec![70]);

        let update = engine.observe(reading(72, 96)).unwrap();
        assert_eq!(update.pulse_history, vec![70, 72]);
        assert_eq!(update.spo2_history, vec![97, 96]);
    }

    #[test]
    fn test_start_rejects_concurrent_measurement() {
        let mut engine = MonitorEngine::new();
        engine.start(Duration::from_secs(30)).unwrap();
        assert_eq!(
            engine.start(Duration::from_secs(30)).unwrap_err(),
            MonitorError::AlreadyMeasuring
        );
    }

    #[test]
    fn test_finalize_emits_once() {
        let mut engine = MonitorEngine::new();
        engine.start(Duration::from_secs(30)).unwrap();
        for _ in 0..6 {
            engine.observe(reading(70, 97));
        }

        let measurement = engine.finalize().expect("first finalization");
        assert_eq!(measurement.result.pulse, 70);

        // Duplicate timer firing after the window is gone.
        assert!(engine.finalize().is_none());
    }

    #[test]
    fn test_manual_completion_requires_live_reading() {
        let mut engine = MonitorEngine::new();
        engine.start(Duration::from_secs(30)).unwrap();

        assert_eq!(
            engine.complete_manual().unwrap_err(),
            MonitorError::NoDataAvailable
        );
        // The rejection left the window running.
        assert!(engine.is_measuring());

        engine.observe(reading(88, 94));
        let measurement = engine.complete_manual().unwrap().expect("completed");
        assert_eq!(measurement.result.pulse, 88);
        assert_eq!(measurement.result.spo2, 94);
        assert_eq!(measurement.result.sample_count, 1);
    }

    #[test]
    fn test_manual_completion_without_window() {
        let mut engine = MonitorEngine::new();
        assert_eq!(
            engine.complete_manual().unwrap_err(),
            MonitorError::NotMeasuring
        );
    }

    #[test]
    fn test_scenario_underflow_uses_defaults() {
        let mut engine = MonitorEngine::new();
        engine.start(Duration::from_secs(30)).unwrap();
        // All pulse samples below the validity floor.
        for _ in 0..6 {
            engine.observe(reading(5, 5));
        }

        let measurement = engine.finalize().unwrap();
        assert_eq!(measurement.result.pulse, 75);
        assert_eq!(measurement.result.spo2, 96);
    }

    #[test]
    fn test_abort_discards_window() {
        let mut engine = MonitorEngine::new();
        engine.start(Duration::from_secs(30)).unwrap();
        engine.observe(reading(70, 97));

        engine.abort().unwrap();
        assert!(!engine.is_measuring());
        assert!(engine.finalize().is_none());

        // A fresh measurement can start afterwards.
        engine.start(Duration::from_secs(30)).unwrap();
        assert_eq!(engine.abort(), Ok(()));
        assert_eq!(engine.abort().unwrap_err(), MonitorError::NotMeasuring);
    }

    #[test]
    fn test_measurement_carries_score_and_level() {
        let mut engine = MonitorEngine::new();
        engine.start(Duration::from_secs(30)).unwrap();
        engine.observe(reading(80, 95));

        let measurement = engine.complete_manual().unwrap().unwrap();
        assert_eq!(measurement.score, 50);
        assert_eq!(measurement.level, StressLevel::Normal);
    }
}
