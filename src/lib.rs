//! Pulseox Agent - pulse oximeter acquisition, relay, and stress scoring.
//!
//! This library turns the noisy line stream of a fingertip pulse oximeter
//! into live readings for any number of consumers and, per measurement,
//! one defensible stress score.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Pulseox Agent                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌─────────┐  │
//! │  │  Sensor  │──▶│  Frame   │──▶│   Relay   │──▶│ Monitor │  │
//! │  │ channel  │   │  parser  │   │ (fan-out) │   │ (30s)   │  │
//! │  └──────────┘   └──────────┘   └───────────┘   └────┬────┘  │
//! │                                                     ▼       │
//! │                                 ┌─────────┐   ┌──────────┐  │
//! │                                 │ Record  │◀──│  Stress  │  │
//! │                                 │  store  │   │  score   │  │
//! │                                 └─────────┘   └──────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both relay endpoints heal themselves: the producer side reopens the
//! sensor channel after a fixed delay, the consumer side reconnects with
//! exponential backoff and never gives up. Malformed sensor lines degrade
//! to a no-signal marker instead of failing, and a measurement window
//! that collects nothing valid still completes with a usable default.
//!
//! # Example
//!
//! ```no_run
//! use pulseox_agent::core::{aggregate, stress_score, StressLevel, VitalsSample};
//!
//! let samples = vec![
//!     VitalsSample { pulse: 70, spo2: 97 },
//!     VitalsSample { pulse: 72, spo2: 96 },
//! ];
//! let result = aggregate(&samples);
//! let score = stress_score(&result);
//! println!("{score} -> {}", StressLevel::from_score(score));
//! ```

pub mod config;
pub mod core;
pub mod monitor;
pub mod relay;
pub mod sensor;
pub mod store;

// Re-export key types at crate root for convenience
pub use config::{Config, SensorConfig};
pub use crate::core::{aggregate, stress_score, AggregatedResult, StressLevel, VitalsSample};
pub use monitor::{Measurement, MonitorEngine, MonitorError};
pub use relay::{BackoffPolicy, ConnectionState, Message, RelayHub};
pub use sensor::{parse_line, SensorFrame, SensorSource};
pub use store::{HealthRecord, RecordSink};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
