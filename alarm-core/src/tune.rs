//! Tune tables played by the alarm buzzer.
//!
//! A tune is an immutable, ordered list of notes. A note with frequency zero
//! is a rest: the buzzer stays silent for its duration.

use core::time::Duration;

/// Single entry in a tune table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Note {
    pub frequency_hz: u32,
    pub duration_ms: u32,
}

impl Note {
    pub const fn new(frequency_hz: u32, duration_ms: u32) -> Self {
        Self {
            frequency_hz,
            duration_ms,
        }
    }

    /// Silent note of the given length.
    pub const fn rest(duration_ms: u32) -> Self {
        Self::new(0, duration_ms)
    }

    pub const fn is_rest(self) -> bool {
        self.frequency_hz == 0
    }

    pub const fn duration(self) -> Duration {
        Duration::from_millis(self.duration_ms as u64)
    }
}

/// Borrowed view over a fixed tune.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TuneTable {
    notes: &'static [Note],
}

impl TuneTable {
    pub const fn new(notes: &'static [Note]) -> Self {
        Self { notes }
    }

    pub const fn len(&self) -> usize {
        self.notes.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Note> {
        self.notes.get(index).copied()
    }

    pub fn notes(&self) -> &'static [Note] {
        self.notes
    }

    /// Total playing time of one pass, excluding inter-note gaps.
    pub fn total_duration(&self) -> Duration {
        self.notes.iter().map(|note| note.duration()).sum()
    }
}

/// Notes of the alarm melody (A5/G5/F5 phrase with rests).
pub const ALARM_NOTES: [Note; 29] = [
    Note::new(880, 857),
    Note::new(784, 214),
    Note::new(698, 429),
    Note::new(784, 429),
    Note::new(880, 429),
    Note::new(880, 429),
    Note::new(880, 429),
    Note::rest(429),
    Note::new(784, 429),
    Note::new(784, 429),
    Note::new(784, 429),
    Note::rest(429),
    Note::new(880, 429),
    Note::new(880, 429),
    Note::new(880, 429),
    Note::rest(429),
    Note::new(880, 857),
    Note::new(784, 214),
    Note::new(698, 429),
    Note::new(784, 429),
    Note::new(880, 429),
    Note::new(880, 429),
    Note::new(880, 429),
    Note::rest(429),
    Note::new(784, 429),
    Note::new(784, 429),
    Note::new(880, 429),
    Note::new(784, 429),
    Note::new(698, 857),
];

/// Tune played while the alarm flag is set.
pub const ALARM_TUNE: TuneTable = TuneTable::new(&ALARM_NOTES);
