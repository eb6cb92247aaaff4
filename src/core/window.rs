//! The measurement window.
//!
//! A window runs for a fixed duration, accumulates readings, and is
//! finalized exactly once into an [`AggregatedResult`]. Both a duration
//! timer and an operator's manual completion can race to finalize it; a
//! one-shot completion token makes whichever arrives second a no-op.

use crate::core::aggregate::{self, AggregatedResult, VitalsSample};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One-shot guard against duplicate finalization.
///
/// Cloned into whatever timer or handler may fire the completion, and
/// claimed atomically by the first of them.
#[derive(Debug, Clone, Default)]
pub struct CompletionToken(Arc<AtomicBool>);

impl CompletionToken {
    fn new() -> Self {
        Self::default()
    }

    /// Claim the token. Returns `true` exactly once.
    pub fn claim(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    /// Whether the token has already been claimed.
    pub fn is_claimed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A fixed-duration accumulation of vitals samples.
#[derive(Debug)]
pub struct MeasurementWindow {
    started_at: DateTime<Utc>,
    duration: Duration,
    samples: Vec<VitalsSample>,
    completion: CompletionToken,
}

impl MeasurementWindow {
    /// Begin a new window now.
    pub fn start(duration: Duration) -> Self {
        Self {
            started_at: Utc::now(),
            duration,
            samples: Vec::new(),
            completion: CompletionToken::new(),
        }
    }

    /// When the window began.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// The window's configured duration.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// A clone of the completion token, for the timer that will fire it.
    pub fn token(&self) -> CompletionToken {
        self.completion.clone()
    }

    /// Whether the window is still accumulating.
    pub fn is_active(&self) -> bool {
        !self.completion.is_claimed()
    }

    /// Append a sample. Returns `false` once the window is finalized.
    pub fn push(&mut self, sample: VitalsSample) -> bool {
        if !self.is_active() {
            return false;
        }
        self.samples.push(sample);
        true
    }

    /// The samples accumulated so far, in arrival order.
    pub fn samples(&self) -> &[VitalsSample] {
        &self.samples
    }

    /// Running pulse history, for live display.
    pub fn pulse_history(&self) -> Vec<u16> {
        self.samples.iter().map(|s| s.pulse).collect()
    }

    /// Running SpO2 history, for live display.
    pub fn spo2_history(&self) -> Vec<u16> {
        self.samples.iter().map(|s| s.spo2).collect()
    }

    /// Finalize the window over its accumulated samples.
    ///
    /// The first call claims the completion token and returns the
    /// aggregate; every later call returns `None`.
    pub fn finalize(&mut self) -> Option<AggregatedResult> {
        if !self.completion.claim() {
            return None;
        }
        Some(aggregate::aggregate(&self.samples))
    }

    /// Finalize early from the single most recent live reading, ignoring
    /// the accumulated history.
    ///
    /// Same one-shot semantics as [`MeasurementWindow::finalize`]. The
    /// caller is responsible for having a current reading at all; that
    /// check belongs to the operator-facing layer, which rejects the
    /// request instead of defaulting.
    pub fn finalize_with_latest(&mut self, latest: VitalsSample) -> Option<AggregatedResult> {
        if !self.completion.claim() {
            return None;
        }
        Some(AggregatedResult {
            pulse: latest.pulse,
            spo2: latest.spo2,
            sample_count: 1,
        })
    }
}
