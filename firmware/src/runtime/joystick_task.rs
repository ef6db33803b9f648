use alarm_core::clock::{Clock, duration_millis_u32};
use alarm_core::config::JOYSTICK_POLL_PERIOD;
use alarm_core::joystick::{AxisCalibration, Direction, JoystickBuzzer};
use alarm_core::telemetry::{AlarmEventKind, EventSink};
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::adc::Adc;
use embassy_time::{Duration, Ticker};

use crate::hw::{EmbassyClock, LedIndicators, PushSwitch, PwmTone};
use crate::telemetry::{LoggingSink, log_joystick};

/// Polls the joystick every period and drives the LEDs and buzzer.
#[embassy_executor::task]
pub async fn run(
    tone: PwmTone,
    indicators: LedIndicators,
    switch: PushSwitch,
    mut adc: Adc<'static, hal::peripherals::ADC1>,
    mut x_pin: Peri<'static, hal::peripherals::PA0>,
    mut y_pin: Peri<'static, hal::peripherals::PA1>,
) -> ! {
    let clock = EmbassyClock;
    let mut sink = LoggingSink::new();
    let mut buzzer = JoystickBuzzer::new(tone, indicators, AxisCalibration::default());
    let mut last_direction = Direction::Centre;
    let mut ticker = Ticker::every(Duration::from_millis(u64::from(duration_millis_u32(
        JOYSTICK_POLL_PERIOD,
    ))));

    loop {
        let x = adc.blocking_read(&mut x_pin);
        let y = adc.blocking_read(&mut y_pin);
        let now = clock.now();
        let report = buzzer.update(x, y, switch.is_closed(), now);

        if report.direction != last_direction {
            sink.record(AlarmEventKind::DirectionChanged(report.direction), now);
            last_direction = report.direction;
        }
        if report.toggled {
            sink.record(
                AlarmEventKind::SwitchToggled {
                    on: report.buzzer_on,
                },
                now,
            );
        }
        log_joystick(&report);

        ticker.next().await;
    }
}
