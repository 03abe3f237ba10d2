//! Event indicator LED on a plain GPIO.
//!
//! Receives signals via mpsc channel and flashes once per emitted event.

use std::sync::mpsc;
use std::time::Duration;

use esp_idf_svc::hal::gpio::{OutputPin, PinDriver};
use esp_idf_svc::hal::peripheral::Peripheral;

use echonode::{board, defaults};

pub fn led_thread(led_rx: mpsc::Receiver<()>, pin: impl Peripheral<P = impl OutputPin> + 'static) {
    let mut led = match PinDriver::output(pin) {
        Ok(p) => p,
        Err(e) => {
            log::error!("LED pin init failed: {:?}", e);
            return;
        }
    };

    let mut set = |on: bool| {
        let result = if on != board::LED_ACTIVE_LOW {
            led.set_high()
        } else {
            led.set_low()
        };
        result.ok();
    };

    set(false);
    log::info!("Event LED on GPIO{}", board::LED_PIN);

    while led_rx.recv().is_ok() {
        set(true);
        std::thread::sleep(Duration::from_millis(defaults::LED_PULSE_MS));
        set(false);
    }
}
