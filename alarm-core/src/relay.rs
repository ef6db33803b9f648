//! Mapping from broker messages to the alarm flag.
//!
//! The wire contract is two-valued: the exact payload `100` turns the alarm
//! on, every other payload (empty, malformed, other numbers) turns it off.

use heapless::{String, Vec};

use crate::config::MAX_TOPIC_LEN;

/// Payload that switches the alarm on.
pub const TRIGGER_PAYLOAD: &[u8] = b"100";

/// Largest payload retained from an inbound message.
pub const MAX_PAYLOAD_LEN: usize = 64;

/// Decoded intent of an inbound message.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AlarmCommand {
    Trigger,
    Clear,
}

impl AlarmCommand {
    /// Interprets a raw payload.
    #[must_use]
    pub fn from_payload(payload: &[u8]) -> Self {
        if payload == TRIGGER_PAYLOAD {
            AlarmCommand::Trigger
        } else {
            AlarmCommand::Clear
        }
    }

    /// Alarm flag value this command sets.
    #[must_use]
    pub const fn alarm_flag(self) -> bool {
        matches!(self, AlarmCommand::Trigger)
    }
}

/// Message delivered by the session transport.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InboundMessage {
    pub topic: String<MAX_TOPIC_LEN>,
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
    /// Set when the payload did not fit and was cut short.
    pub truncated: bool,
}

impl InboundMessage {
    /// Builds a message, truncating oversized topic or payload.
    #[must_use]
    pub fn new(topic: &str, payload: &[u8]) -> Self {
        let mut message = Self::default();
        for ch in topic.chars() {
            if message.topic.push(ch).is_err() {
                break;
            }
        }
        let keep = payload.len().min(MAX_PAYLOAD_LEN);
        // Capacity checked above.
        let _ = message.payload.extend_from_slice(&payload[..keep]);
        message.truncated = keep < payload.len();
        message
    }

    /// Command carried by this message. A truncated payload is never the trigger.
    #[must_use]
    pub fn command(&self) -> AlarmCommand {
        if self.truncated {
            AlarmCommand::Clear
        } else {
            AlarmCommand::from_payload(&self.payload)
        }
    }
}

/// Applies a message to the alarm flag and returns the command it carried.
pub fn apply(message: &InboundMessage, alarm: &mut bool) -> AlarmCommand {
    let command = message.command();
    *alarm = command.alarm_flag();
    command
}
