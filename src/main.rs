//! EchoNode — ultrasonic ranging node firmware
//!
//! Fires an HC-SR04 style sensor at ~10 Hz, times the echo from a GPIO edge
//! interrupt, and reports every echo inside the proximity band as a
//! sequenced crossing event: to the serial log always, and to the collector
//! over TCP whenever the link is up.
//!
//! The collector correlates events from several nodes; this firmware does
//! no calibration and keeps no history.

#![no_std]
#![no_main]

extern crate alloc;

use esp_backtrace as _;

esp_bootloader_esp_idf::esp_app_desc!();

// Hardware-specific modules (binary crate only)
mod led;

// Re-export library modules so binary submodules can use crate::*
pub(crate) use echonode::{board, defaults};

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};
use critical_section::Mutex;
use embassy_net::tcp::TcpSocket;
use embassy_net::{IpAddress, IpEndpoint, Runner, Stack, StackResources};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant, Timer};
use esp_hal::delay::Delay;
use esp_hal::gpio::{Event, Input, InputConfig, Io, Level, Output, OutputConfig, Pull};
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController, WifiDevice, WifiEvent};
use static_cell::StaticCell;

use echonode::capture::{EchoCapture, Edge};
use echonode::comm;
use echonode::config::NodeConfig;
use echonode::cycle::MicrosClock;
use echonode::emitter::{Link, LogSink, NodeContext};
use echonode::error::LinkError;
use echonode::node::Node;
use echonode::protocol::{DeviceId, LineBuffer, MsgBuffer, MAX_MSG_LEN, VERSION};
use echonode::ranging::RangeConfig;

// ── Channel type aliases ──────────────────────────────────────────────

type OutputChannel = Channel<CriticalSectionRawMutex, LineBuffer, 8>;

// ── Static channels and shared state ─────────────────────────────────

/// Pulse timing shared between the echo ISR and the ranging task
static ECHO: EchoCapture = EchoCapture::new();

/// Echo input pin, owned by the ISR once interrupts are enabled
static ECHO_PIN: Mutex<RefCell<Option<Input<'static>>>> = Mutex::new(RefCell::new(None));

/// Event lines from the ranging task to the link task
static OUTPUT_CHANNEL: OutputChannel = Channel::new();

/// Whether the collector socket is connected and handshaken
static LINK_UP: AtomicBool = AtomicBool::new(false);

/// Signal channel for event LED blinks
pub(crate) static LED_SIGNAL: Channel<CriticalSectionRawMutex, (), 1> = Channel::new();

// ── Echo interrupt ───────────────────────────────────────────────────

/// Microseconds since boot, truncated to the 32-bit wire width.
fn micros() -> u32 {
    esp_hal::time::Instant::now()
        .duration_since_epoch()
        .as_micros() as u32
}

struct HalClock;

impl MicrosClock for HalClock {
    fn now_us(&self) -> u32 {
        micros()
    }
}

/// GPIO interrupt for the echo line — stamps the edge and hands it to the
/// capture. Timestamp first, so lock time never skews the measurement.
#[esp_hal::handler]
fn echo_isr() {
    let now_us = micros();
    critical_section::with(|cs| {
        if let Some(pin) = ECHO_PIN.borrow_ref_mut(cs).as_mut() {
            if pin.is_interrupt_set() {
                ECHO.on_edge(Edge::from_level(pin.is_high()), now_us);
                pin.clear_interrupt();
            }
        }
    });
}

// ── Collector link (ranging-task side) ───────────────────────────────

/// Link as seen by the emitter: connected iff the link task holds an open,
/// handshaken socket. Writes are queued to the link task without waiting.
struct ChannelLink;

impl Link for ChannelLink {
    fn is_connected(&self) -> bool {
        LINK_UP.load(Ordering::Relaxed)
    }

    fn send_line(&mut self, line: &str) -> Result<(), LinkError> {
        let mut buf = LineBuffer::new();
        buf.push_str(line).map_err(|_| LinkError::Io)?;
        OUTPUT_CHANNEL.try_send(buf).map_err(|_| LinkError::Busy)
    }
}

// ── Entry point ──────────────────────────────────────────────────────

#[esp_rtos::main]
async fn main(spawner: embassy_executor::Spawner) {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // WiFi driver needs a heap; ESP32 is tighter on DRAM
    #[cfg(feature = "esp32")]
    {
        esp_alloc::heap_allocator!(size: 64 * 1024);
    }
    #[cfg(not(feature = "esp32"))]
    {
        esp_alloc::heap_allocator!(size: 96 * 1024);
    }

    // Start the RTOS — requires timer + software interrupt
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    log::info!("EchoNode v{} starting on {}", VERSION, board::BOARD_NAME);

    let config = NodeConfig::from_env().expect("invalid build configuration");
    let collector_ip = config
        .collector_ipv4()
        .expect("COLLECTOR_HOST must be an IPv4 address");
    log::info!(
        "Device {} -> collector {}:{}",
        config.device_id,
        collector_ip,
        config.collector_port
    );

    // ── Sensor pins ─────────────────────────────────────────────────

    #[cfg(feature = "board-xiao")]
    let (trig_pin, echo_pin, led_pin) = (peripherals.GPIO1, peripherals.GPIO2, peripherals.GPIO21);
    #[cfg(feature = "board-devkit")]
    let (trig_pin, echo_pin, led_pin) = (peripherals.GPIO5, peripherals.GPIO18, peripherals.GPIO2);

    let trigger = Output::new(trig_pin, Level::Low, OutputConfig::default());

    let mut io = Io::new(peripherals.IO_MUX);
    io.set_interrupt_handler(echo_isr);

    let mut echo = Input::new(echo_pin, InputConfig::default().with_pull(Pull::Down));
    critical_section::with(|cs| {
        echo.listen(Event::AnyEdge);
        ECHO_PIN.borrow_ref_mut(cs).replace(echo);
    });

    log::info!(
        "HC-SR04 on TRIG GPIO{} / ECHO GPIO{}",
        board::TRIG_PIN,
        board::ECHO_PIN
    );

    spawner.spawn(led::led_task(led_pin)).unwrap();

    // Ranging runs from here on, link or no link
    spawner
        .spawn(ranging_task(trigger, config.device_id.clone()))
        .unwrap();

    // ── WiFi station + TCP/IP ───────────────────────────────────────

    let (controller, interfaces) =
        esp_radio::wifi::new(peripherals.WIFI, Default::default()).expect("WiFi init failed");

    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;

    static NET_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        NET_RESOURCES.init(StackResources::new()),
        seed,
    );

    spawner
        .spawn(wifi_task(controller, config.wifi_ssid, config.wifi_password))
        .unwrap();
    spawner.spawn(net_task(runner)).unwrap();
    spawner
        .spawn(link_task(
            stack,
            IpEndpoint::new(IpAddress::Ipv4(collector_ip), config.collector_port),
            config.device_id,
        ))
        .unwrap();

    log::info!(
        "Build target: {}",
        if cfg!(feature = "xiao") {
            "xiao (ESP32-S3)"
        } else if cfg!(feature = "devkit") {
            "devkit (ESP32)"
        } else {
            "unknown"
        }
    );
}

/// Ranging task — one trigger cycle per iteration, polled between executor
/// yields. Also writes the periodic status record.
#[embassy_executor::task]
async fn ranging_task(mut trigger: Output<'static>, device_id: DeviceId) {
    log::info!("Ranging task started");

    let mut delay = Delay::new();
    let clock = HalClock;
    let mut sink = LogSink;
    let mut link = ChannelLink;
    let mut node = Node::new(&ECHO, NodeContext::new(device_id), RangeConfig::new());

    let status_every = Duration::from_secs(defaults::STATUS_INTERVAL_SECS);
    let mut next_status = Instant::now() + status_every;

    let cycle_delay = Duration::from_millis(defaults::CYCLE_DELAY_MS as u64);

    loop {
        let cycle = node.cycle_mut();
        if let Err(e) = cycle.fire(&mut trigger, &mut delay, &clock) {
            // Cycle is back in Idle; polling it would never resolve
            log::warn!("Trigger pin error: {:?}", e);
            Timer::after(cycle_delay).await;
            continue;
        }
        let outcome = loop {
            if let Some(outcome) = cycle.poll(clock.now_us()) {
                break outcome;
            }
            Timer::after(Duration::from_micros(defaults::ECHO_POLL_US as u64)).await;
        };

        if node.finish(outcome, &mut sink, &mut link).is_some() {
            let _ = LED_SIGNAL.try_send(());
        }

        if Instant::now() >= next_status {
            next_status += status_every;
            let uptime_secs = Instant::now().as_secs() as u32;
            let msg = node.status(uptime_secs, link.is_connected());

            let mut buf = MsgBuffer::new();
            buf.resize_default(MAX_MSG_LEN).ok();
            if let Some(len) = comm::serialize_message(&msg, &mut buf) {
                buf.truncate(len);
                if let Ok(s) = core::str::from_utf8(&buf) {
                    log::info!("{}", s);
                }
            }
        }

        Timer::after(cycle_delay).await;
    }
}

/// WiFi task — joins the network once. A later drop is only logged; the
/// collector link does not come back within a run.
#[embassy_executor::task]
async fn wifi_task(
    mut controller: WifiController<'static>,
    ssid: &'static str,
    password: &'static str,
) {
    log::info!("WiFi task started, SSID '{}'", ssid);

    let mode = ModeConfig::Client(
        ClientConfig::default()
            .with_ssid(ssid.into())
            .with_password(password.into()),
    );
    if let Err(e) = controller.set_config(&mode) {
        log::error!("WiFi config rejected: {:?}", e);
        return;
    }

    loop {
        if !matches!(controller.is_started(), Ok(true)) {
            if let Err(e) = controller.start_async().await {
                log::error!("WiFi start failed: {:?}", e);
                Timer::after(Duration::from_secs(5)).await;
                continue;
            }
        }

        match controller.connect_async().await {
            Ok(()) => break,
            Err(e) => {
                log::warn!("WiFi connect failed: {:?}", e);
                Timer::after(Duration::from_secs(5)).await;
            }
        }
    }

    log::info!("WiFi connected");
    controller.wait_for_event(WifiEvent::StaDisconnected).await;
    log::warn!("WiFi disconnected");
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

/// Link task — owns the collector socket. Dials until the collector first
/// answers, sends the handshake, then forwards queued event lines. A link
/// lost mid-run stays down; the node carries on logging locally.
#[embassy_executor::task]
async fn link_task(stack: Stack<'static>, collector: IpEndpoint, device_id: DeviceId) {
    let mut rx_buf = [0u8; 128];
    let mut tx_buf = [0u8; 1024];
    let lines = OUTPUT_CHANNEL.receiver();

    let mut socket = TcpSocket::new(stack, &mut rx_buf, &mut tx_buf);
    socket.set_timeout(Some(Duration::from_secs(10)));

    loop {
        stack.wait_config_up().await;

        log::info!("Connecting to collector {}", collector);
        match socket.connect(collector).await {
            Ok(()) => match send_handshake(&mut socket, &device_id).await {
                Ok(()) => break,
                Err(e) => log::warn!("Handshake failed: {}", e),
            },
            Err(e) => log::warn!("Collector connect failed: {:?}", e),
        }

        socket.abort();
        let _ = socket.flush().await;
        Timer::after(Duration::from_secs(2)).await;
    }

    // Anything queued before the handshake belongs to no one
    OUTPUT_CHANNEL.clear();
    LINK_UP.store(true, Ordering::Relaxed);
    log::info!("Collector link up");

    loop {
        let line = lines.receive().await;
        if write_line(&mut socket, &line).await.is_err() {
            break;
        }
    }

    LINK_UP.store(false, Ordering::Relaxed);
    log::warn!("Collector link lost, continuing with local log only");
    socket.abort();
    let _ = socket.flush().await;
}

/// `ID:` then `BOOT=`, stamped with the node clock at connect time.
async fn send_handshake(socket: &mut TcpSocket<'_>, device_id: &str) -> Result<(), LinkError> {
    let mut line = LineBuffer::new();
    comm::format_identity(device_id, &mut line).map_err(|_| LinkError::Io)?;
    write_line(socket, &line).await?;
    comm::format_boot(micros(), &mut line).map_err(|_| LinkError::Io)?;
    write_line(socket, &line).await
}

async fn write_line(socket: &mut TcpSocket<'_>, line: &str) -> Result<(), LinkError> {
    let mut bytes = line.as_bytes();
    while !bytes.is_empty() {
        match socket.write(bytes).await {
            Ok(0) => return Err(LinkError::Disconnected),
            Ok(n) => bytes = &bytes[n..],
            Err(_) => return Err(LinkError::Io),
        }
    }
    Ok(())
}
