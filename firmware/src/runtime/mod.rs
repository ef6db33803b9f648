use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
#[cfg(feature = "joystick")]
use embassy_stm32::adc::Adc;
#[cfg(feature = "joystick")]
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::gpio::OutputType;
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::low_level::CountingMode;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};

use crate::hw::PwmTone;
#[cfg(feature = "joystick")]
use crate::hw::{LedIndicators, PushSwitch};

#[cfg(not(feature = "joystick"))]
mod alarm_task;
#[cfg(feature = "joystick")]
mod joystick_task;

/// Carrier frequency the buzzer timer starts at before the first note.
const BUZZER_IDLE_HZ: Hertz = Hertz(1_000);

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let peripherals = hal::init(config);

    let pwm = SimplePwm::new(
        peripherals.TIM3,
        Some(PwmPin::new(peripherals.PA6, OutputType::PushPull)),
        None,
        None,
        None,
        BUZZER_IDLE_HZ,
        CountingMode::EdgeAlignedUp,
    );
    let tone = PwmTone::new(pwm);

    #[cfg(not(feature = "joystick"))]
    {
        spawner
            .spawn(alarm_task::run(
                tone,
                peripherals.USART5,
                peripherals.PB0,
                peripherals.PB1,
            ))
            .expect("failed to spawn alarm task");
    }

    #[cfg(feature = "joystick")]
    {
        let indicators = LedIndicators::new(
            Output::new(peripherals.PB3, Level::Low, Speed::Low),
            Output::new(peripherals.PB4, Level::Low, Speed::Low),
            Output::new(peripherals.PB5, Level::Low, Speed::Low),
            Output::new(peripherals.PB6, Level::Low, Speed::Low),
        );
        let switch = PushSwitch::new(Input::new(peripherals.PA7, Pull::Up));

        spawner
            .spawn(joystick_task::run(
                tone,
                indicators,
                switch,
                Adc::new(peripherals.ADC1),
                peripherals.PA0,
                peripherals.PA1,
            ))
            .expect("failed to spawn joystick task");
    }

    core::future::pending::<()>().await;
}
