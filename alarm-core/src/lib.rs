#![no_std]

// Shared logic for the joystick/buzzer board and its remote alarm.
//
// Everything here reaches hardware through traits so the same control loops
// run on the STM32 firmware, the host emulator, and the test suite.

pub mod alarm;
pub mod clock;
pub mod config;
pub mod context;
pub mod debounce;
pub mod esp_at;
pub mod joystick;
pub mod network;
pub mod relay;
pub mod sequencer;
pub mod telemetry;
pub mod tune;
