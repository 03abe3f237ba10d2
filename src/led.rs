/// Event indicator LED.
///
/// Waits for signals on `LED_SIGNAL` and flashes the board LED once per
/// emitted event. Purely cosmetic: a missed signal only means a missed blink.
use embassy_time::{Duration, Timer};
use esp_hal::gpio::{Level, Output, OutputConfig};

use crate::board;
use crate::defaults;

#[cfg(feature = "board-xiao")]
pub type LedPin = esp_hal::peripherals::GPIO21<'static>;
#[cfg(feature = "board-devkit")]
pub type LedPin = esp_hal::peripherals::GPIO2<'static>;

fn level(on: bool) -> Level {
    if on != board::LED_ACTIVE_LOW {
        Level::High
    } else {
        Level::Low
    }
}

#[embassy_executor::task]
pub async fn led_task(pin: LedPin) {
    let mut led = Output::new(pin, level(false), OutputConfig::default());
    log::info!("Event LED on GPIO{}", board::LED_PIN);

    let rx = crate::LED_SIGNAL.receiver();

    loop {
        rx.receive().await;

        led.set_level(level(true));
        Timer::after(Duration::from_millis(defaults::LED_PULSE_MS)).await;
        led.set_level(level(false));
    }
}
