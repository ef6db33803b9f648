//! Joystick direction mapping, indicator LEDs, and the joystick buzzer.
//!
//! Axis readings come from a 12-bit ADC centred near [`JOYSTICK_CENTER`]. Low X
//! is left, low Y is up. Diagonals win over single-axis directions.

use core::fmt;

use crate::clock::Instant;
use crate::config::{JOYSTICK_CENTER, JOYSTICK_THRESHOLD, SWITCH_DEBOUNCE};
use crate::debounce::DebouncedToggle;
use crate::sequencer::ToneOutput;

/// Nine-way joystick position.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Centre,
    Up,
    Down,
    Left,
    Right,
    UpLeft,
    DownLeft,
    UpRight,
    DownRight,
}

impl Direction {
    /// LEDs lit for this direction; diagonals light two.
    #[must_use]
    pub const fn indicators(self) -> IndicatorMask {
        match self {
            Direction::Centre => IndicatorMask::NONE,
            Direction::Up => IndicatorMask::UP,
            Direction::Down => IndicatorMask::DOWN,
            Direction::Left => IndicatorMask::LEFT,
            Direction::Right => IndicatorMask::RIGHT,
            Direction::UpLeft => IndicatorMask::UP.union(IndicatorMask::LEFT),
            Direction::DownLeft => IndicatorMask::DOWN.union(IndicatorMask::LEFT),
            Direction::UpRight => IndicatorMask::UP.union(IndicatorMask::RIGHT),
            Direction::DownRight => IndicatorMask::DOWN.union(IndicatorMask::RIGHT),
        }
    }

    /// Note played for this direction, if any.
    #[must_use]
    pub const fn note_hz(self) -> Option<u32> {
        match self {
            Direction::Centre => None,
            Direction::UpLeft => Some(523),
            Direction::DownLeft => Some(587),
            Direction::UpRight => Some(659),
            Direction::DownRight => Some(698),
            Direction::Left => Some(392),
            Direction::Right => Some(440),
            Direction::Up => Some(494),
            Direction::Down => Some(330),
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Direction::Centre => "center",
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::UpLeft => "up-left",
            Direction::DownLeft => "down-left",
            Direction::UpRight => "up-right",
            Direction::DownRight => "down-right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Dead-zone configuration for [`classify`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AxisCalibration {
    pub center: u16,
    pub threshold: u16,
}

impl AxisCalibration {
    pub const fn new(center: u16, threshold: u16) -> Self {
        Self { center, threshold }
    }

    fn low(self, reading: u16) -> bool {
        u32::from(reading) + u32::from(self.threshold) < u32::from(self.center)
    }

    fn high(self, reading: u16) -> bool {
        u32::from(reading) > u32::from(self.center) + u32::from(self.threshold)
    }
}

impl Default for AxisCalibration {
    fn default() -> Self {
        Self::new(JOYSTICK_CENTER, JOYSTICK_THRESHOLD)
    }
}

/// Maps a pair of axis readings to a direction.
///
/// A reading exactly `threshold` away from the centre is still centred.
#[must_use]
pub fn classify(x: u16, y: u16, calibration: AxisCalibration) -> Direction {
    let left = calibration.low(x);
    let right = calibration.high(x);
    let up = calibration.low(y);
    let down = calibration.high(y);

    match (left, right, up, down) {
        (true, _, true, _) => Direction::UpLeft,
        (true, _, _, true) => Direction::DownLeft,
        (_, true, true, _) => Direction::UpRight,
        (_, true, _, true) => Direction::DownRight,
        (true, _, _, _) => Direction::Left,
        (_, true, _, _) => Direction::Right,
        (_, _, true, _) => Direction::Up,
        (_, _, _, true) => Direction::Down,
        _ => Direction::Centre,
    }
}

/// Single-axis variant: only left, right, or centre.
#[must_use]
pub fn classify_x(x: u16, calibration: AxisCalibration) -> Direction {
    if calibration.low(x) {
        Direction::Left
    } else if calibration.high(x) {
        Direction::Right
    } else {
        Direction::Centre
    }
}

/// Set of directional LEDs.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct IndicatorMask(u8);

impl IndicatorMask {
    pub const NONE: Self = Self(0);
    pub const UP: Self = Self(1 << 0);
    pub const DOWN: Self = Self(1 << 1);
    pub const LEFT: Self = Self(1 << 2);
    pub const RIGHT: Self = Self(1 << 3);

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// Drives the four directional LEDs.
pub trait IndicatorDriver {
    /// Lights exactly the LEDs in `mask`.
    fn apply(&mut self, mask: IndicatorMask);
}

/// LED-only joystick panel (the X and X/Y indicator demos).
pub struct IndicatorPanel<I> {
    indicators: I,
    calibration: AxisCalibration,
    last: Direction,
}

impl<I: IndicatorDriver> IndicatorPanel<I> {
    pub fn new(mut indicators: I, calibration: AxisCalibration) -> Self {
        indicators.apply(IndicatorMask::NONE);
        Self {
            indicators,
            calibration,
            last: Direction::Centre,
        }
    }

    /// Classifies the readings (X only when `y` is `None`) and lights the LEDs.
    pub fn update(&mut self, x: u16, y: Option<u16>) -> Direction {
        let direction = match y {
            Some(y) => classify(x, y, self.calibration),
            None => classify_x(x, self.calibration),
        };
        self.indicators.apply(IndicatorMask::NONE);
        self.indicators.apply(direction.indicators());
        self.last = direction;
        direction
    }

    pub fn last(&self) -> Direction {
        self.last
    }

    pub fn indicators(&self) -> &I {
        &self.indicators
    }
}

/// Status of the joystick buzzer after one update.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct JoystickReport {
    pub direction: Direction,
    pub buzzer_on: bool,
    /// Frequency last written to the buzzer.
    pub frequency: Option<u32>,
    /// Set when the switch press flipped the buzzer this update.
    pub toggled: bool,
}

/// Joystick-driven tone player with an on/off push switch.
pub struct JoystickBuzzer<T, I> {
    tone: T,
    panel: IndicatorPanel<I>,
    switch: DebouncedToggle,
    frequency: Option<u32>,
}

impl<T: ToneOutput, I: IndicatorDriver> JoystickBuzzer<T, I> {
    pub fn new(mut tone: T, indicators: I, calibration: AxisCalibration) -> Self {
        tone.silence();
        Self {
            tone,
            panel: IndicatorPanel::new(indicators, calibration),
            switch: DebouncedToggle::new(SWITCH_DEBOUNCE),
            frequency: None,
        }
    }

    /// Processes one poll: LEDs, retune, then the switch.
    ///
    /// `switch_closed` is the logical press (the input reads low).
    pub fn update(&mut self, x: u16, y: u16, switch_closed: bool, now: Instant) -> JoystickReport {
        let direction = self.panel.update(x, Some(y));

        if self.switch.is_on()
            && let Some(hz) = direction.note_hz()
            && self.frequency != Some(hz)
        {
            self.tone.set_frequency(hz);
            self.frequency = Some(hz);
        }

        let toggled = match self.switch.sample(switch_closed, now) {
            Some(true) => {
                let duty = self.tone.half_duty();
                self.tone.set_duty(duty);
                true
            }
            Some(false) => {
                self.tone.silence();
                true
            }
            None => false,
        };

        JoystickReport {
            direction,
            buzzer_on: self.switch.is_on(),
            frequency: self.frequency,
            toggled,
        }
    }

    pub fn tone(&self) -> &T {
        &self.tone
    }

    pub fn indicators(&self) -> &I {
        self.panel.indicators()
    }
}
