//! EchoNode — ESP-IDF std firmware
//!
//! Thread-based variant of the Embassy firmware. The ranging loop runs on
//! the main thread and drives `Node::step`; the echo line is timed by a raw
//! ESP-IDF GPIO ISR; the collector link and the event LED get a thread each.

mod led;
mod link;

use std::ffi::c_void;
use std::ptr;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use embedded_hal::digital::OutputPin;

use echonode::capture::{EchoCapture, Edge};
use echonode::comm;
use echonode::config::NodeConfig;
use echonode::cycle::MicrosClock;
use echonode::emitter::{Link, LogSink, NodeContext};
use echonode::node::Node;
use echonode::protocol::{MsgBuffer, MAX_MSG_LEN, VERSION};
use echonode::ranging::RangeConfig;
use echonode::{board, defaults};

use esp_idf_svc::hal::delay::Delay;
use esp_idf_svc::hal::gpio::PinDriver;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::sys::{
    esp, esp_timer_get_time, gpio_config, gpio_config_t, gpio_get_level,
    gpio_install_isr_service, gpio_int_type_t_GPIO_INTR_ANYEDGE, gpio_isr_handler_add,
    gpio_mode_t_GPIO_MODE_INPUT,
};
use esp_idf_svc::wifi::{BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs::EspDefaultNvsPartition};

use link::TcpLink;

// ── Shared state ─────────────────────────────────────────────────────

/// Pulse timing shared between the echo ISR and the ranging loop
static ECHO: EchoCapture = EchoCapture::new();

fn micros() -> u32 {
    unsafe { esp_timer_get_time() as u32 }
}

struct EspClock;

impl MicrosClock for EspClock {
    fn now_us(&self) -> u32 {
        micros()
    }
}

// ── Echo interrupt ───────────────────────────────────────────────────

/// Any-edge ISR on the echo pin. Runs from the IDF GPIO ISR service.
unsafe extern "C" fn echo_isr(_arg: *mut c_void) {
    let now_us = micros();
    let is_high = unsafe { gpio_get_level(board::ECHO_PIN as i32) } != 0;
    ECHO.on_edge(Edge::from_level(is_high), now_us);
}

fn install_echo_isr() -> anyhow::Result<()> {
    let conf = gpio_config_t {
        pin_bit_mask: 1u64 << board::ECHO_PIN,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        intr_type: gpio_int_type_t_GPIO_INTR_ANYEDGE,
        ..Default::default()
    };
    unsafe {
        esp!(gpio_config(&conf))?;
        esp!(gpio_install_isr_service(0))?;
        esp!(gpio_isr_handler_add(
            board::ECHO_PIN as i32,
            Some(echo_isr),
            ptr::null_mut()
        ))?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();

    // Bind the ESP-IDF logger to the `log` facade
    esp_idf_svc::log::EspLogger::initialize_default();

    let boot = Instant::now();

    log::info!("EchoNode v{} starting on {} (std)", VERSION, board::BOARD_NAME);

    let config = NodeConfig::from_env()?;
    log::info!(
        "Device {} -> collector {}:{}",
        config.device_id,
        config.collector_host,
        config.collector_port
    );

    // ── Peripherals ──────────────────────────────────────────────────

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    #[cfg(feature = "xiao")]
    let (trig_pin, echo_pin, led_pin) = (
        peripherals.pins.gpio1,
        peripherals.pins.gpio2,
        peripherals.pins.gpio21,
    );
    #[cfg(feature = "devkit")]
    let (trig_pin, echo_pin, led_pin) = (
        peripherals.pins.gpio5,
        peripherals.pins.gpio18,
        peripherals.pins.gpio2,
    );

    let mut trigger = PinDriver::output(trig_pin)?;
    trigger.set_low()?;

    // The ISR reads the echo pin by number; holding the peripheral keeps
    // it from being claimed elsewhere.
    let _echo_pin = echo_pin;
    install_echo_isr()?;

    log::info!(
        "HC-SR04 on TRIG GPIO{} / ECHO GPIO{}",
        board::TRIG_PIN,
        board::ECHO_PIN
    );

    // ── LED thread ───────────────────────────────────────────────────

    let (led_tx, led_rx) = mpsc::sync_channel::<()>(1);
    thread::Builder::new()
        .name("led".into())
        .stack_size(2048)
        .spawn(move || led::led_thread(led_rx, led_pin))?;

    // ── WiFi ─────────────────────────────────────────────────────────

    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sys_loop.clone(), Some(nvs))?,
        sys_loop,
    )?;
    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: config
            .wifi_ssid
            .try_into()
            .map_err(|_| anyhow::anyhow!("WIFI_SSID too long"))?,
        password: config
            .wifi_password
            .try_into()
            .map_err(|_| anyhow::anyhow!("WIFI_PASSWORD too long"))?,
        ..Default::default()
    }))?;
    wifi.start()?;

    // Ranging does not wait for the network; a failed join leaves the
    // node logging locally only.
    match wifi.connect().and_then(|_| wifi.wait_netif_up()) {
        Ok(()) => log::info!("WiFi connected"),
        Err(e) => log::warn!("WiFi connect failed: {:?}", e),
    }

    // ── Link thread ──────────────────────────────────────────────────

    let link = TcpLink::default();
    {
        let link = link.clone();
        let host = config.collector_host;
        let port = config.collector_port;
        let device_id = config.device_id.clone();
        thread::Builder::new()
            .name("link".into())
            .stack_size(4096)
            .spawn(move || link::link_thread(link, host, port, &device_id, micros))?;
    }

    // ── Ranging loop ─────────────────────────────────────────────────

    ranging_loop(&mut trigger, link, led_tx, config, boot, wifi)
}

fn ranging_loop<P>(
    trigger: &mut P,
    mut link: TcpLink,
    led_tx: mpsc::SyncSender<()>,
    config: NodeConfig,
    boot: Instant,
    _wifi: BlockingWifi<EspWifi<'static>>,
) -> anyhow::Result<()>
where
    P: OutputPin,
{
    log::info!("Ranging loop started");

    let mut delay = Delay::new_default();
    let clock = EspClock;
    let mut sink = LogSink;
    let mut node = Node::new(&ECHO, NodeContext::new(config.device_id), RangeConfig::new());

    let status_every = Duration::from_secs(defaults::STATUS_INTERVAL_SECS);
    let mut next_status = boot + status_every;

    loop {
        match node.step(trigger, &mut delay, &clock, &mut sink, &mut link) {
            Ok(Some(_)) => {
                let _ = led_tx.try_send(());
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("Trigger pin error: {:?}", e);
                thread::sleep(Duration::from_millis(defaults::CYCLE_DELAY_MS as u64));
            }
        }

        if Instant::now() >= next_status {
            next_status += status_every;
            let msg = node.status(boot.elapsed().as_secs() as u32, link.is_connected());

            let mut buf = MsgBuffer::new();
            buf.resize_default(MAX_MSG_LEN).ok();
            if let Some(len) = comm::serialize_message(&msg, &mut buf) {
                buf.truncate(len);
                if let Ok(s) = std::str::from_utf8(&buf) {
                    log::info!("{}", s);
                }
            }
        }
    }
}
