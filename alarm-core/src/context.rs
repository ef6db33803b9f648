//! Bundle of the delay, clock, and telemetry capabilities every loop needs.

use core::time::Duration;

use crate::clock::{Clock, DelayNs, Instant, block_for};
use crate::telemetry::{AlarmEventKind, EventId, EventSink};

/// Ambient services threaded through the network manager and control loops.
pub struct Context<D, C, S> {
    pub delay: D,
    pub clock: C,
    pub sink: S,
}

impl<D, C, S> Context<D, C, S>
where
    D: DelayNs,
    C: Clock,
    S: EventSink,
{
    pub const fn new(delay: D, clock: C, sink: S) -> Self {
        Self { delay, clock, sink }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Blocks for `duration`.
    pub fn wait(&mut self, duration: Duration) {
        block_for(&mut self.delay, duration);
    }

    /// Records `event` stamped with the current instant.
    pub fn record(&mut self, event: AlarmEventKind) -> EventId {
        let now = self.clock.now();
        self.sink.record(event, now)
    }
}
