//! Looping tone sequencer for the alarm melody.
//!
//! Each [`ToneSequencer::step`] plays at most one note and then a short gap,
//! blocking through the [`DelayNs`] capability. Clearing the alarm silences
//! the output and rewinds to the first note without waiting.

use core::time::Duration;

use crate::clock::{DelayNs, block_for};
use crate::tune::TuneTable;

/// Silence inserted after every note.
pub const TONE_GAP: Duration = Duration::from_millis(50);

/// Abstraction over the buzzer PWM channel.
pub trait ToneOutput {
    /// Retunes the output to `hz`. Does not change the duty.
    fn set_frequency(&mut self, hz: u32);

    /// Sets the raw duty value, `0` being silent.
    fn set_duty(&mut self, duty: u16);

    /// Largest duty value the hardware accepts.
    fn max_duty(&self) -> u16;

    /// Stops driving the buzzer.
    fn silence(&mut self) {
        self.set_duty(0);
    }

    /// Duty value for a square wave (50%).
    fn half_duty(&self) -> u16 {
        self.max_duty().div_ceil(2)
    }
}

impl<T: ToneOutput + ?Sized> ToneOutput for &mut T {
    fn set_frequency(&mut self, hz: u32) {
        (**self).set_frequency(hz);
    }

    fn set_duty(&mut self, duty: u16) {
        (**self).set_duty(duty);
    }

    fn max_duty(&self) -> u16 {
        (**self).max_duty()
    }

    fn silence(&mut self) {
        (**self).silence();
    }
}

/// Tone output that discards every request.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopTone;

impl NoopTone {
    pub const fn new() -> Self {
        Self
    }
}

impl ToneOutput for NoopTone {
    fn set_frequency(&mut self, _: u32) {}

    fn set_duty(&mut self, _: u16) {}

    fn max_duty(&self) -> u16 {
        0
    }
}

/// Cursor over a [`TuneTable`] that wraps after the last note.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ToneSequencer {
    tune: TuneTable,
    cursor: usize,
}

impl ToneSequencer {
    pub const fn new(tune: TuneTable) -> Self {
        Self { tune, cursor: 0 }
    }

    /// Index of the next note to play.
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    pub const fn tune(&self) -> TuneTable {
        self.tune
    }

    /// Silences the output and rewinds to the first note.
    pub fn reset<T: ToneOutput + ?Sized>(&mut self, tone: &mut T) {
        tone.silence();
        self.cursor = 0;
    }

    /// Plays one step of the tune when `alarm` is set and returns the new cursor.
    ///
    /// With the alarm clear the output is silenced, the cursor returns to zero,
    /// and no time passes. Otherwise the note under the cursor sounds at 50%
    /// duty for its duration (rests skip the tone), the output is silenced for
    /// [`TONE_GAP`], and the cursor advances modulo the tune length.
    pub fn step<T, D>(&mut self, alarm: bool, tone: &mut T, delay: &mut D) -> usize
    where
        T: ToneOutput + ?Sized,
        D: DelayNs + ?Sized,
    {
        if !alarm {
            self.reset(tone);
            return self.cursor;
        }

        let Some(note) = self.tune.get(self.cursor) else {
            // Empty tune: nothing to play.
            self.reset(tone);
            return self.cursor;
        };

        if !note.is_rest() {
            tone.set_frequency(note.frequency_hz);
            let duty = tone.half_duty();
            tone.set_duty(duty);
        }
        block_for(delay, note.duration());

        tone.silence();
        block_for(delay, TONE_GAP);

        self.cursor = (self.cursor + 1) % self.tune.len();
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::sim::SimClock;
    use crate::tune::{ALARM_TUNE, Note};
    use heapless::Vec;

    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    enum ToneCall {
        Frequency(u32),
        Duty(u16),
    }

    #[derive(Default)]
    struct RecordingTone {
        calls: Vec<ToneCall, 64>,
    }

    impl ToneOutput for RecordingTone {
        fn set_frequency(&mut self, hz: u32) {
            self.calls.push(ToneCall::Frequency(hz)).expect("call log full");
        }

        fn set_duty(&mut self, duty: u16) {
            self.calls.push(ToneCall::Duty(duty)).expect("call log full");
        }

        fn max_duty(&self) -> u16 {
            1023
        }
    }

    const SHORT: [Note; 2] = [Note::new(880, 857), Note::rest(429)];

    #[test]
    fn plays_note_then_rest_with_gaps() {
        let clock = SimClock::new();
        let mut tone = RecordingTone::default();
        let mut sequencer = ToneSequencer::new(TuneTable::new(&SHORT));

        assert_eq!(sequencer.step(true, &mut tone, &mut &clock), 1);
        assert_eq!(clock.slept_ms(), 857 + 50);
        assert_eq!(
            tone.calls.as_slice(),
            &[ToneCall::Frequency(880), ToneCall::Duty(512), ToneCall::Duty(0)]
        );

        tone.calls.clear();
        assert_eq!(sequencer.step(true, &mut tone, &mut &clock), 0);
        assert_eq!(clock.slept_ms(), 857 + 50 + 429 + 50);
        assert_eq!(tone.calls.as_slice(), &[ToneCall::Duty(0)]);
    }

    #[test]
    fn cleared_alarm_resets_without_waiting() {
        let clock = SimClock::new();
        let mut tone = RecordingTone::default();
        let mut sequencer = ToneSequencer::new(ALARM_TUNE);

        for _ in 0..5 {
            sequencer.step(true, &mut tone, &mut &clock);
        }
        assert_eq!(sequencer.cursor(), 5);
        let slept = clock.slept_ms();

        tone.calls.clear();
        assert_eq!(sequencer.step(false, &mut tone, &mut &clock), 0);
        assert_eq!(clock.slept_ms(), slept);
        assert!(
            tone.calls
                .iter()
                .all(|call| matches!(call, ToneCall::Duty(0)))
        );
    }

    #[test]
    fn cursor_cycles_through_whole_tune() {
        let clock = SimClock::new();
        let mut tone = NoopTone::new();
        let mut sequencer = ToneSequencer::new(ALARM_TUNE);

        for _ in 0..3 {
            sequencer.step(true, &mut tone, &mut &clock);
        }
        let start = sequencer.cursor();
        for _ in 0..ALARM_TUNE.len() {
            let cursor = sequencer.step(true, &mut tone, &mut &clock);
            assert!(cursor < ALARM_TUNE.len());
        }
        assert_eq!(sequencer.cursor(), start);
    }

    #[test]
    fn empty_tune_never_blocks() {
        const EMPTY: [Note; 0] = [];
        let clock = SimClock::new();
        let mut sequencer = ToneSequencer::new(TuneTable::new(&EMPTY));
        assert_eq!(sequencer.step(true, &mut NoopTone::new(), &mut &clock), 0);
        assert_eq!(clock.slept_ms(), 0);
    }
}
