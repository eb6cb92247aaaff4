//! Wire protocol for the relay channel.
//!
//! Messages are plain text, one per line: `PULSE:<int>:SPO2:<int>`,
//! `NO_FINGER`, `PING`, `PONG`, and `CONNECTED`. Decoding prefers the
//! strict four-field reading form; the permissive marker grammar from
//! [`crate::sensor::frame`] is kept as a fallback for older producers.

use crate::sensor::frame::{self, SensorFrame};
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// One message on the relay wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// A paired vitals sample.
    Reading { pulse: u16, spo2: u16 },
    /// The sensor reports no usable signal.
    NoSignal,
    /// Heartbeat request, consumed by the relay layer.
    Ping,
    /// Heartbeat answer, consumed by the relay layer.
    Pong,
    /// Greeting sent once to each newly connected consumer.
    Connected,
}

impl Message {
    /// Wrap a parsed sensor frame for transmission.
    pub fn from_frame(frame: SensorFrame) -> Self {
        match frame {
            SensorFrame::Reading { pulse, spo2 } => Message::Reading { pulse, spo2 },
            SensorFrame::NoSignal => Message::NoSignal,
        }
    }

    /// The application payload carried by this message, if any.
    ///
    /// Control messages carry none and never reach application logic.
    pub fn frame(&self) -> Option<SensorFrame> {
        match *self {
            Message::Reading { pulse, spo2 } => Some(SensorFrame::Reading { pulse, spo2 }),
            Message::NoSignal => Some(SensorFrame::NoSignal),
            Message::Ping | Message::Pong | Message::Connected => None,
        }
    }

    /// Whether this is a relay-level control message.
    pub fn is_control(&self) -> bool {
        matches!(self, Message::Ping | Message::Pong | Message::Connected)
    }

    /// Encode to the canonical wire form, without the line terminator.
    pub fn encode(&self) -> String {
        match self {
            Message::Reading { pulse, spo2 } => format!("PULSE:{pulse}:SPO2:{spo2}"),
            Message::NoSignal => "NO_FINGER".to_string(),
            Message::Ping => "PING".to_string(),
            Message::Pong => "PONG".to_string(),
            Message::Connected => "CONNECTED".to_string(),
        }
    }

    /// Decode one wire line.
    ///
    /// Decoding cannot fail: anything that is neither a control token nor
    /// a parseable reading is treated as no-signal, and the stream moves on.
    pub fn decode(line: &str) -> Message {
        let line = line.trim();

        match line {
            "PING" => return Message::Ping,
            "PONG" => return Message::Pong,
            "CONNECTED" => return Message::Connected,
            "NO_FINGER" => return Message::NoSignal,
            _ => {}
        }

        // Strict form: exactly PULSE:<int>:SPO2:<int>.
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() == 4
            && fields[0].eq_ignore_ascii_case("PULSE")
            && fields[2].eq_ignore_ascii_case("SPO2")
        {
            if let (Ok(pulse), Ok(spo2)) = (fields[1].parse(), fields[3].parse()) {
                return Message::Reading { pulse, spo2 };
            }
        }

        Message::from_frame(frame::parse_line(line))
    }
}

/// Write one message as a newline-terminated wire line.
pub(crate) async fn write_message<W>(writer: &mut W, message: Message) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = message.encode();
    line.push('\n');
    writer.write_all(line.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_round_trip() {
        let message = Message::Reading {
            pulse: 72,
            spo2: 97,
        };
        assert_eq!(message.encode(), "PULSE:72:SPO2:97");
        assert_eq!(Message::decode(&message.encode()), message);
    }

    #[test]
    fn test_control_tokens_round_trip() {
        for message in [
            Message::NoSignal,
            Message::Ping,
            Message::Pong,
            Message::Connected,
        ] {
            assert_eq!(Message::decode(&message.encode()), message);
        }
    }

    #[test]
    fn test_permissive_fallback_for_older_producers() {
        assert_eq!(
            Message::decode("PULSE:75,SPO2:98"),
            Message::Reading {
                pulse: 75,
                spo2: 98
            }
        );
    }

    #[test]
    fn test_unknown_line_decodes_as_no_signal() {
        assert_eq!(Message::decode("hello"), Message::NoSignal);
        assert_eq!(Message::decode(""), Message::NoSignal);
        assert_eq!(Message::decode("PULSE:x:SPO2:y"), Message::NoSignal);
    }

    #[test]
    fn test_control_messages_carry_no_payload() {
        assert!(Message::Ping.frame().is_none());
        assert!(Message::Pong.frame().is_none());
        assert!(Message::Connected.frame().is_none());
        assert!(Message::NoSignal.frame().is_some());
    }
}
