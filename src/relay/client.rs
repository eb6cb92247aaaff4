//! Consumer-side relay client with reconnection supervision.
//!
//! The supervisor owns all connection state and cycles
//! `Disconnected -> Connecting -> Connected -> Disconnected -> ...`
//! forever; there is no terminal failure state. Connect failures back off
//! exponentially, and a long run of failures pauses and starts the
//! schedule over rather than giving up. While connected it heartbeats the
//! relay and forwards application frames to the monitor.

use crate::relay::protocol::{write_message, Message};
use crate::sensor::frame::SensorFrame;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// Heartbeat interval while connected.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// How often the liveness check runs, independent of close events.
const LIVENESS_INTERVAL: Duration = Duration::from_secs(10);
/// Inbound silence past this forces a reconnect even without a close
/// event. The sensor emits roughly once a second, so a healthy link is
/// never anywhere near this quiet.
const SILENCE_LIMIT: Duration = Duration::from_secs(30);

/// Frames buffered toward the monitor before backpressure applies.
const FRAME_CHANNEL_CAPACITY: usize = 64;

/// Connection state of one relay endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Reconnect delay schedule.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// First retry delay.
    pub base: Duration,
    /// Multiplier applied per failed attempt.
    pub growth: f64,
    /// Upper bound on any single delay.
    pub max: Duration,
    /// Cap on the exponent, so the power stays finite.
    pub exponent_cap: u32,
    /// Consecutive failures before the schedule pauses and restarts.
    pub max_consecutive: u32,
    /// Pause after `max_consecutive` failures, before the counter resets.
    pub long_pause: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            growth: 1.5,
            max: Duration::from_secs(10),
            exponent_cap: 10,
            max_consecutive: 20,
            long_pause: Duration::from_secs(10),
        }
    }
}

impl BackoffPolicy {
    /// Delay before reconnect attempt `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(self.exponent_cap);
        let raw = self.base.as_secs_f64() * self.growth.powi(exponent as i32);
        Duration::from_secs_f64(raw.min(self.max.as_secs_f64()))
    }
}

/// The consumer's side of a supervised relay link.
pub struct ConsumerHandle {
    /// Application frames, in arrival order. Control traffic never
    /// appears here.
    pub frames: mpsc::Receiver<SensorFrame>,
    /// Connection indicator, updated on every transition.
    pub state: watch::Receiver<ConnectionState>,
}

/// Spawn a supervised consumer connection to `addr`.
///
/// The supervisor task runs until the returned handle's frame receiver
/// is dropped.
pub fn spawn(addr: String, backoff: BackoffPolicy) -> ConsumerHandle {
    let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

    tokio::spawn(supervise(addr, backoff, frame_tx, state_tx));

    ConsumerHandle {
        frames: frame_rx,
        state: state_rx,
    }
}

/// The supervision loop: connect, drive, back off, repeat.
async fn supervise(
    addr: String,
    backoff: BackoffPolicy,
    frame_tx: mpsc::Sender<SensorFrame>,
    state_tx: watch::Sender<ConnectionState>,
) {
    let mut attempts: u32 = 0;

    loop {
        state_tx.send_replace(ConnectionState::Connecting);

        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                tracing::info!(%addr, "connected to relay");
                state_tx.send_replace(ConnectionState::Connected);
                // Counter starts over on every successful connection.
                attempts = 0;

                let reason = drive_connection(stream, &frame_tx).await;
                tracing::warn!(%addr, reason, "relay link lost");
            }
            Err(e) => {
                tracing::warn!(%addr, error = %e, "relay connect failed");
            }
        }

        state_tx.send_replace(ConnectionState::Disconnected);

        if frame_tx.is_closed() {
            tracing::debug!(%addr, "monitor gone, ending supervision");
            return;
        }

        attempts += 1;
        if attempts >= backoff.max_consecutive {
            tracing::warn!(
                attempts,
                "repeated connect failures, pausing before starting over"
            );
            tokio::time::sleep(backoff.long_pause).await;
            attempts = 0;
        } else {
            tokio::time::sleep(backoff.delay(attempts - 1)).await;
        }
    }
}

/// Drive one established connection until it drops.
///
/// Returns a short human-readable reason for the disconnect, for the log.
async fn drive_connection(stream: TcpStream, frame_tx: &mpsc::Sender<SensorFrame>) -> &'static str {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    let mut liveness = tokio::time::interval(LIVENESS_INTERVAL);
    let mut last_inbound = Instant::now();

    loop {
        tokio::select! {
            inbound = lines.next_line() => match inbound {
                Ok(Some(line)) => {
                    last_inbound = Instant::now();
                    match Message::decode(&line) {
                        // Heartbeat answer; absence is not fatal here.
                        Message::Pong => {}
                        Message::Ping => {
                            if write_message(&mut write_half, Message::Pong).await.is_err() {
                                return "pong send failed";
                            }
                        }
                        Message::Connected => {
                            tracing::debug!("relay acknowledged connection");
                        }
                        message => {
                            if let Some(frame) = message.frame() {
                                if frame_tx.send(frame).await.is_err() {
                                    return "monitor dropped";
                                }
                            }
                        }
                    }
                }
                Ok(None) => return "closed by relay",
                Err(_) => return "read error",
            },
            _ = heartbeat.tick() => {
                if write_message(&mut write_half, Message::Ping).await.is_err() {
                    return "heartbeat send failed";
                }
            }
            // Redundant with the read path's error handling: if close
            // events were somehow missed, prolonged silence still forces
            // a reconnect.
            _ = liveness.tick() => {
                if last_inbound.elapsed() > SILENCE_LIMIT {
                    return "link silent past liveness limit";
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_exponentially() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_millis(1500));
        assert_eq!(policy.delay(2), Duration::from_millis(2250));
    }

    #[test]
    fn test_backoff_caps_at_max() {
        let policy = BackoffPolicy::default();
        // 1.5^6 ~= 11.4s, past the 10s ceiling.
        assert_eq!(policy.delay(6), Duration::from_secs(10));
        assert_eq!(policy.delay(100), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_exponent_is_capped() {
        let policy = BackoffPolicy {
            max: Duration::from_secs(100_000),
            ..BackoffPolicy::default()
        };
        assert_eq!(policy.delay(10), policy.delay(500));
    }
}
