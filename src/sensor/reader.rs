//! Sensor channel acquisition.
//!
//! The producer side of the pipeline: open a line-oriented sensor
//! channel, parse each line, and publish the result to the relay hub.
//! Channel errors never terminate the bridge; it waits a fixed delay and
//! reopens, forever.

use crate::relay::protocol::Message;
use crate::relay::server::RelayHub;
use crate::sensor::frame::{self, SensorFrame};
use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;

/// Pause before reopening the sensor channel after an error or close.
const REOPEN_DELAY: Duration = Duration::from_secs(2);

/// Cadence of generated readings in simulation.
const SIMULATED_INTERVAL: Duration = Duration::from_secs(1);

/// Where the sensor's line stream comes from.
#[derive(Debug, Clone)]
pub enum SensorSource {
    /// A character device exposing the oximeter's stream, e.g.
    /// `/dev/ttyUSB0` with the line discipline already configured.
    Device(PathBuf),
    /// TCP endpoint of a networked sensor bridge.
    Tcp(String),
    /// Built-in reading generator for demos and tests.
    Simulated,
}

impl SensorSource {
    /// Short description for logs and status output.
    pub fn describe(&self) -> String {
        match self {
            SensorSource::Device(path) => format!("device {}", path.display()),
            SensorSource::Tcp(addr) => format!("tcp {addr}"),
            SensorSource::Simulated => "simulated readings".to_string(),
        }
    }
}

/// Run the acquisition loop: open, pump, reopen on failure. Never returns.
pub async fn run(source: SensorSource, hub: RelayHub) {
    tracing::info!(source = %source.describe(), "sensor acquisition starting");

    loop {
        match acquire(&source, &hub).await {
            Ok(()) => tracing::info!("sensor channel closed, reopening"),
            Err(e) => tracing::warn!(error = %e, "sensor channel error"),
        }
        tokio::time::sleep(REOPEN_DELAY).await;
    }
}

/// One open-and-pump cycle over the configured source.
async fn acquire(source: &SensorSource, hub: &RelayHub) -> std::io::Result<()> {
    match source {
        SensorSource::Device(path) => {
            let device = tokio::fs::File::open(path).await?;
            pump_lines(device, hub).await
        }
        SensorSource::Tcp(addr) => {
            let stream = TcpStream::connect(addr).await?;
            pump_lines(stream, hub).await
        }
        SensorSource::Simulated => {
            simulate(hub).await;
            Ok(())
        }
    }
}

/// Parse lines from the channel and publish each frame until it ends.
async fn pump_lines<R>(channel: R, hub: &RelayHub) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(channel).lines();

    while let Some(line) = lines.next_line().await? {
        let parsed = frame::parse_line(&line);
        if parsed == SensorFrame::NoSignal {
            tracing::debug!(line = %line.trim(), "no usable sample in line");
        }
        hub.publish(Message::from_frame(parsed));
    }

    Ok(())
}

/// Generate plausible resting vitals, one reading per second.
async fn simulate(hub: &RelayHub) {
    let mut ticker = tokio::time::interval(SIMULATED_INTERVAL);

    loop {
        ticker.tick().await;
        let pulse = rand::thread_rng().gen_range(65..=95);
        let spo2 = rand::thread_rng().gen_range(94..=99);
        hub.publish(Message::Reading { pulse, spo2 });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pump_publishes_parsed_lines() {
        let hub = RelayHub::new();
        let mut rx = hub.subscribe();

        let input = b"PULSE:72:SPO2:97\ngarbage\nPULSE:74:SPO2:96\n" as &[u8];
        pump_lines(input, &hub).await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            Message::Reading {
                pulse: 72,
                spo2: 97
            }
        );
        assert_eq!(rx.recv().await.unwrap(), Message::NoSignal);
        assert_eq!(
            rx.recv().await.unwrap(),
            Message::Reading {
                pulse: 74,
                spo2: 96
            }
        );
    }

    #[tokio::test]
    async fn test_pump_survives_empty_channel() {
        let hub = RelayHub::new();
        pump_lines(b"" as &[u8], &hub).await.unwrap();
    }
}
