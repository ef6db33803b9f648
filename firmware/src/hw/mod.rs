#![cfg_attr(not(feature = "joystick"), allow(dead_code))]

//! Board adapters that implement the `alarm-core` capabilities on the
//! STM32G0 peripherals.

use alarm_core::clock::{Clock, Instant};
use alarm_core::joystick::{IndicatorDriver, IndicatorMask};
use alarm_core::sequencer::ToneOutput;
use embassy_stm32::gpio::{Input, Output};
use embassy_stm32::peripherals::TIM3;
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::simple_pwm::SimplePwm;

/// Buzzer driven by channel 1 of a general-purpose timer.
pub struct PwmTone {
    pwm: SimplePwm<'static, TIM3>,
    duty: u16,
}

impl PwmTone {
    /// Takes over the timer and starts silent.
    pub fn new(mut pwm: SimplePwm<'static, TIM3>) -> Self {
        let mut channel = pwm.ch1();
        channel.set_duty_cycle_fully_off();
        channel.enable();
        Self { pwm, duty: 0 }
    }
}

impl ToneOutput for PwmTone {
    fn set_frequency(&mut self, hz: u32) {
        if hz == 0 {
            return;
        }
        let previous_max = u32::from(self.pwm.max_duty_cycle());
        self.pwm.set_frequency(Hertz(hz));

        // The compare value does not follow the new period; keep the ratio.
        if self.duty != 0 && previous_max != 0 {
            let scaled = u32::from(self.duty) * u32::from(self.pwm.max_duty_cycle()) / previous_max;
            self.set_duty(u16::try_from(scaled).unwrap_or(u16::MAX));
        }
    }

    fn set_duty(&mut self, duty: u16) {
        let duty = duty.min(self.pwm.max_duty_cycle());
        self.pwm.ch1().set_duty_cycle(duty);
        self.duty = duty;
    }

    fn max_duty(&self) -> u16 {
        self.pwm.max_duty_cycle()
    }
}

/// Four directional LEDs, active high.
pub struct LedIndicators {
    up: Output<'static>,
    down: Output<'static>,
    left: Output<'static>,
    right: Output<'static>,
}

impl LedIndicators {
    pub fn new(
        up: Output<'static>,
        down: Output<'static>,
        left: Output<'static>,
        right: Output<'static>,
    ) -> Self {
        Self {
            up,
            down,
            left,
            right,
        }
    }
}

impl IndicatorDriver for LedIndicators {
    fn apply(&mut self, mask: IndicatorMask) {
        drive(&mut self.up, mask.contains(IndicatorMask::UP));
        drive(&mut self.down, mask.contains(IndicatorMask::DOWN));
        drive(&mut self.left, mask.contains(IndicatorMask::LEFT));
        drive(&mut self.right, mask.contains(IndicatorMask::RIGHT));
    }
}

fn drive(led: &mut Output<'static>, lit: bool) {
    if lit {
        led.set_high();
    } else {
        led.set_low();
    }
}

/// Joystick push switch wired to ground with the internal pull-up enabled.
pub struct PushSwitch {
    input: Input<'static>,
}

impl PushSwitch {
    pub fn new(input: Input<'static>) -> Self {
        Self { input }
    }

    /// Pressed reads low.
    pub fn is_closed(&self) -> bool {
        self.input.is_low()
    }
}

/// Clock backed by the embassy time driver.
#[derive(Copy, Clone, Debug, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now(&self) -> Instant {
        Instant::from_millis(embassy_time::Instant::now().as_millis())
    }
}
