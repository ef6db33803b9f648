//! Telemetry event catalog and recorder shared by firmware and host targets.
//!
//! Control loops report what they do through [`EventSink`]. The default sink
//! is [`TelemetryRecorder`], a fixed-capacity ring of timestamped records the
//! firmware mirrors to `defmt` and the emulator prints to its transcript.

use core::{fmt, net::Ipv4Addr, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::clock::Instant;
use crate::joystick::Direction;
use crate::network::SessionStage;
use crate::relay::AlarmCommand;

/// Identifier used when tracking emitted telemetry events.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// How loudly an event should be surfaced in logs.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// Discriminated telemetry events shared across all targets.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AlarmEventKind {
    /// An existing association was torn down before reconnecting.
    AssociationReset,
    AssociationAttempt { attempt: u8 },
    AssociationConnected { address: Option<Ipv4Addr> },
    AssociationTimedOut { attempt: u8 },
    /// The join request itself was rejected by the adapter.
    AssociationError { attempt: u8 },
    AssociationFailed { attempts: u8 },
    /// Link layer found down while recovering a session.
    AssociationLost,
    SessionAttempt { attempt: u8 },
    SessionConnected,
    SessionAttemptFailed { attempt: u8, stage: SessionStage },
    SessionFailed { attempts: u8 },
    SessionLost,
    ReconnectScheduled { delay: Duration },
    ReconnectSucceeded,
    MessageReceived { command: AlarmCommand },
    AlarmTriggered,
    AlarmCleared,
    SwitchToggled { on: bool },
    DirectionChanged(Direction),
}

impl AlarmEventKind {
    /// Log level used when mirroring the event.
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            AlarmEventKind::AssociationTimedOut { .. }
            | AlarmEventKind::AssociationError { .. }
            | AlarmEventKind::AssociationLost
            | AlarmEventKind::SessionAttemptFailed { .. }
            | AlarmEventKind::SessionLost
            | AlarmEventKind::ReconnectScheduled { .. } => Severity::Warn,
            AlarmEventKind::AssociationFailed { .. } | AlarmEventKind::SessionFailed { .. } => {
                Severity::Error
            }
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for AlarmEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmEventKind::AssociationReset => f.write_str("wifi already connected, reset"),
            AlarmEventKind::AssociationAttempt { attempt } => {
                write!(f, "wifi connect attempt {attempt}")
            }
            AlarmEventKind::AssociationConnected { address: Some(address) } => {
                write!(f, "wifi connected, ip {address}")
            }
            AlarmEventKind::AssociationConnected { address: None } => {
                f.write_str("wifi connected, ip unknown")
            }
            AlarmEventKind::AssociationTimedOut { attempt } => {
                write!(f, "wifi attempt {attempt} timed out")
            }
            AlarmEventKind::AssociationError { attempt } => {
                write!(f, "wifi attempt {attempt} rejected")
            }
            AlarmEventKind::AssociationFailed { attempts } => {
                write!(f, "wifi failed after {attempts} attempts")
            }
            AlarmEventKind::AssociationLost => f.write_str("wifi link lost"),
            AlarmEventKind::SessionAttempt { attempt } => {
                write!(f, "mqtt connect attempt {attempt}")
            }
            AlarmEventKind::SessionConnected => f.write_str("mqtt connected and subscribed"),
            AlarmEventKind::SessionAttemptFailed { attempt, stage } => {
                write!(f, "mqtt attempt {attempt} failed at {stage}")
            }
            AlarmEventKind::SessionFailed { attempts } => {
                write!(f, "mqtt failed after {attempts} attempts")
            }
            AlarmEventKind::SessionLost => f.write_str("mqtt session lost"),
            AlarmEventKind::ReconnectScheduled { delay } => {
                write!(f, "reconnect failed, retrying in {}s", delay.as_secs())
            }
            AlarmEventKind::ReconnectSucceeded => f.write_str("reconnected"),
            AlarmEventKind::MessageReceived { command } => {
                write!(f, "message received ({command:?})")
            }
            AlarmEventKind::AlarmTriggered => f.write_str("alarm on"),
            AlarmEventKind::AlarmCleared => f.write_str("alarm off"),
            AlarmEventKind::SwitchToggled { on } => {
                write!(f, "buzzer {}", if *on { "on" } else { "off" })
            }
            AlarmEventKind::DirectionChanged(direction) => {
                write!(f, "joystick {}", direction.label())
            }
        }
    }
}

/// Where a transport error surfaced, forwarded with the raw error value.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorSite {
    Association,
    Session(SessionStage),
    Poll,
}

/// Destination for telemetry emitted by the control loops.
pub trait EventSink {
    /// Records `event` observed at `timestamp`.
    fn record(&mut self, event: AlarmEventKind, timestamp: Instant) -> EventId;

    /// Receives the raw transport error behind a failed operation.
    fn transport_error(&mut self, _site: ErrorSite, _error: &dyn fmt::Debug) {}
}

impl<T: EventSink + ?Sized> EventSink for &mut T {
    fn record(&mut self, event: AlarmEventKind, timestamp: Instant) -> EventId {
        (**self).record(event, timestamp)
    }

    fn transport_error(&mut self, site: ErrorSite, error: &dyn fmt::Debug) {
        (**self).transport_error(site, error);
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord {
    pub id: EventId,
    pub timestamp: Instant,
    pub event: AlarmEventKind,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: TelemetryRing<CAPACITY>,
    next_event_id: EventId,
    transport_errors: u32,
}

impl<const CAPACITY: usize> TelemetryRecorder<CAPACITY> {
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
            transport_errors: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.ring.recent()
    }

    /// Returns the records written after `id`, oldest first.
    pub fn since(&self, id: Option<EventId>) -> impl Iterator<Item = &TelemetryRecord> {
        self.oldest_first()
            .filter(move |record| id.is_none_or(|seen| record.id > seen))
    }

    /// Returns the number of records currently stored.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Number of raw transport errors reported so far.
    pub const fn transport_errors(&self) -> u32 {
        self.transport_errors
    }
}

impl<const CAPACITY: usize> Default for TelemetryRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAPACITY: usize> EventSink for TelemetryRecorder<CAPACITY> {
    fn record(&mut self, event: AlarmEventKind, timestamp: Instant) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
        });

        id
    }

    fn transport_error(&mut self, _: ErrorSite, _: &dyn fmt::Debug) {
        self.transport_errors = self.transport_errors.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_events_in_order_with_ids() {
        let mut recorder = TelemetryRecorder::<4>::new();
        assert!(recorder.is_empty());

        let first = recorder.record(
            AlarmEventKind::AssociationAttempt { attempt: 1 },
            Instant::from_millis(10),
        );
        let second = recorder.record(AlarmEventKind::SessionConnected, Instant::from_millis(20));
        assert_eq!((first, second), (0, 1));

        let latest = recorder.latest().copied().expect("missing latest record");
        assert_eq!(latest.event, AlarmEventKind::SessionConnected);
        assert_eq!(latest.timestamp, Instant::from_millis(20));

        let since: heapless::Vec<EventId, 4> =
            recorder.since(Some(first)).map(|record| record.id).collect();
        assert_eq!(since.as_slice(), &[1]);
    }

    #[test]
    fn ring_keeps_most_recent_records() {
        let mut recorder = TelemetryRecorder::<2>::new();
        for attempt in 1..=3 {
            recorder.record(
                AlarmEventKind::SessionAttempt { attempt },
                Instant::from_millis(u64::from(attempt)),
            );
        }
        assert_eq!(recorder.len(), 2);
        let mut oldest = recorder.oldest_first();
        assert_eq!(
            oldest.next().map(|record| record.event),
            Some(AlarmEventKind::SessionAttempt { attempt: 2 })
        );
        assert_eq!(oldest.next().map(|record| record.id), Some(2));
    }

    #[test]
    fn counts_transport_errors() {
        let mut recorder = TelemetryRecorder::<2>::new();
        recorder.transport_error(ErrorSite::Poll, &"link closed");
        recorder.transport_error(ErrorSite::Session(SessionStage::Connect), &7_u8);
        assert_eq!(recorder.transport_errors(), 2);
        assert!(recorder.is_empty());
    }

    #[test]
    fn failures_are_errors_and_losses_warnings() {
        assert_eq!(
            AlarmEventKind::SessionFailed { attempts: 3 }.severity(),
            Severity::Error
        );
        assert_eq!(AlarmEventKind::SessionLost.severity(), Severity::Warn);
        assert_eq!(AlarmEventKind::AlarmTriggered.severity(), Severity::Info);
    }
}
