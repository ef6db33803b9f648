use alarm_core::alarm::AlarmLoop;
use alarm_core::context::Context;
use alarm_core::esp_at::EspAtClient;
use alarm_core::tune::ALARM_TUNE;
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use embassy_time::{Delay, Duration, Timer};

use crate::hw::{EmbassyClock, PwmTone};
use crate::settings;
use crate::telemetry::LoggingSink;

const ESP_UART_BAUD: u32 = 115_200;
const ESP_UART_BUFFER_SIZE: usize = 512;

static mut UART_TX_BUFFER: [u8; ESP_UART_BUFFER_SIZE] = [0; ESP_UART_BUFFER_SIZE];
static mut UART_RX_BUFFER: [u8; ESP_UART_BUFFER_SIZE] = [0; ESP_UART_BUFFER_SIZE];

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART3_4_5_6_LPUART1 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART5>;
});

/// Brings up the ESP-AT link and runs the alarm loop until power-off.
///
/// The loop blocks between notes, so this is the only task spawned in alarm
/// mode.
#[embassy_executor::task]
pub async fn run(
    tone: PwmTone,
    usart: Peri<'static, hal::peripherals::USART5>,
    tx_pin: Peri<'static, hal::peripherals::PB0>,
    rx_pin: Peri<'static, hal::peripherals::PB1>,
) -> ! {
    let mut config = UartConfig::default();
    config.baudrate = ESP_UART_BAUD;
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;

    let uart = unsafe {
        BufferedUart::new(
            usart,
            rx_pin,
            tx_pin,
            &mut UART_TX_BUFFER,
            &mut UART_RX_BUFFER,
            UartIrqs,
            config,
        )
        .expect("failed to initialize ESP UART")
    };

    let mut modem = EspAtClient::new(uart, Delay);
    if let Err(err) = modem.handshake() {
        defmt::warn!("ESP-AT handshake failed: {}", defmt::Display2Format(&err));
    }

    let ctx = Context::new(Delay, EmbassyClock, LoggingSink::new());
    match AlarmLoop::start(modem, settings::network_config(), ALARM_TUNE, tone, ctx) {
        Ok(alarm) => {
            defmt::info!("alarm armed, waiting for timer messages");
            alarm.run()
        }
        Err(err) => {
            defmt::error!("alarm startup failed: {}", defmt::Display2Format(&err));
            loop {
                Timer::after(Duration::from_secs(60)).await;
            }
        }
    }
}
