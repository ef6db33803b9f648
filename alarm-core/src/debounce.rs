//! Time-gated toggle for the buzzer push switch.

use core::time::Duration;

use crate::clock::Instant;

/// Result of feeding one switch sample through [`maybe_toggle`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ToggleDecision {
    /// New on/off state when the press was honoured.
    pub new_state: Option<bool>,
    /// Timestamp of the last honoured press.
    pub last_toggle: Instant,
}

/// Flips `state` when the switch is closed and more than `interval` has
/// passed since `last_toggle`.
#[must_use]
pub fn maybe_toggle(
    switch_closed: bool,
    state: bool,
    now: Instant,
    last_toggle: Instant,
    interval: Duration,
) -> ToggleDecision {
    if switch_closed && now.saturating_duration_since(last_toggle) > interval {
        ToggleDecision {
            new_state: Some(!state),
            last_toggle: now,
        }
    } else {
        ToggleDecision {
            new_state: None,
            last_toggle,
        }
    }
}

/// Owned debounce state: current level plus the time of the last flip.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DebouncedToggle {
    state: bool,
    last_toggle: Instant,
    interval: Duration,
}

impl DebouncedToggle {
    pub const fn new(interval: Duration) -> Self {
        Self {
            state: false,
            last_toggle: Instant::ZERO,
            interval,
        }
    }

    pub const fn is_on(&self) -> bool {
        self.state
    }

    pub const fn last_toggle(&self) -> Instant {
        self.last_toggle
    }

    /// Feeds one sample; returns the new state when it flipped.
    pub fn sample(&mut self, switch_closed: bool, now: Instant) -> Option<bool> {
        let decision = maybe_toggle(switch_closed, self.state, now, self.last_toggle, self.interval);
        self.last_toggle = decision.last_toggle;
        if let Some(state) = decision.new_state {
            self.state = state;
        }
        decision.new_state
    }
}
