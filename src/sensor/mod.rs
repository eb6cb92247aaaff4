//! Sensor acquisition for the pulse oximeter agent.
//!
//! This module provides frame parsing for the raw sensor stream and the
//! producer-side acquisition loop feeding the relay.

pub mod frame;
pub mod reader;

// Re-export commonly used types
pub use frame::{parse_line, SensorFrame};
pub use reader::SensorSource;
