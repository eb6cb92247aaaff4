//! The relay hub: one producer, any number of consumers.
//!
//! The hub fans readings out over a broadcast channel; each accepted TCP
//! connection gets its own forwarding task, so a failed or slow consumer
//! never affects the others. Messages are newline-framed text lines in
//! the wire form of [`crate::relay::protocol`].

use crate::relay::protocol::{write_message, Message};
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, oneshot};

/// Messages buffered per consumer before a slow consumer starts lagging.
const CHANNEL_CAPACITY: usize = 64;

/// Handle through which the producer publishes to all consumers.
#[derive(Clone)]
pub struct RelayHub {
    tx: broadcast::Sender<Message>,
}

impl RelayHub {
    /// Create a hub with no consumers yet.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish one application message to every connected consumer.
    ///
    /// Control messages stay connection-local and must not pass through
    /// here. Publishing with no consumers connected is not an error; a
    /// reading is superseded by the next one about a second later anyway.
    pub fn publish(&self, message: Message) {
        debug_assert!(!message.is_control());
        let _ = self.tx.send(message);
    }

    /// Subscribe a new consumer to the broadcast stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.tx.subscribe()
    }

    /// Number of currently subscribed consumers.
    pub fn consumer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the relay listener.
///
/// Binds `addr` (port 0 picks a free port), then accepts consumers until
/// the returned shutdown sender fires. Returns the bound address and the
/// shutdown handle.
pub async fn run(
    addr: SocketAddr,
    hub: RelayHub,
) -> anyhow::Result<(SocketAddr, oneshot::Sender<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("relay listening on {actual_addr}");

    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    tracing::info!("relay shutdown signal received");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::info!(%peer, "consumer connected");
                        let rx = hub.subscribe();
                        tokio::spawn(async move {
                            if let Err(e) = serve_consumer(stream, rx).await {
                                tracing::debug!(%peer, error = %e, "consumer connection ended");
                            }
                            tracing::info!(%peer, "consumer disconnected");
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                },
            }
        }
    });

    Ok((actual_addr, shutdown_tx))
}

/// Drive one consumer connection until it closes or errors.
async fn serve_consumer(
    stream: TcpStream,
    mut rx: broadcast::Receiver<Message>,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    // Greet the new consumer only; nobody else sees this.
    write_message(&mut write_half, Message::Connected).await?;

    loop {
        tokio::select! {
            forwarded = rx.recv() => match forwarded {
                Ok(message) => write_message(&mut write_half, message).await?,
                Err(broadcast::error::RecvError::Lagged(dropped)) => {
                    tracing::warn!(dropped, "slow consumer, dropping backlog");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            inbound = lines.next_line() => match inbound? {
                Some(line) => handle_inbound(&mut write_half, &line).await?,
                // Consumer closed its side.
                None => break,
            },
        }
    }

    Ok(())
}

/// Handle a line sent by a consumer.
///
/// Heartbeats are answered on the same connection; anything else a
/// consumer says is logged and ignored.
async fn handle_inbound(write_half: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    match Message::decode(line) {
        Message::Ping => write_message(write_half, Message::Pong).await,
        other => {
            tracing::debug!(message = ?other, "ignoring inbound consumer message");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hub_fans_out_to_subscribers() {
        let hub = RelayHub::new();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        hub.publish(Message::Reading {
            pulse: 72,
            spo2: 97,
        });

        let expected = Message::Reading {
            pulse: 72,
            spo2: 97,
        };
        assert_eq!(first.recv().await.unwrap(), expected);
        assert_eq!(second.recv().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_publish_without_consumers_is_fine() {
        let hub = RelayHub::new();
        assert_eq!(hub.consumer_count(), 0);
        hub.publish(Message::NoSignal);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_affect_others() {
        let hub = RelayHub::new();
        let dropped = hub.subscribe();
        let mut kept = hub.subscribe();
        drop(dropped);

        hub.publish(Message::NoSignal);
        assert_eq!(kept.recv().await.unwrap(), Message::NoSignal);
        assert_eq!(hub.consumer_count(), 1);
    }
}
