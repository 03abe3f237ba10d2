//! Host-side simulation of an HC-SR04 wired to an `EchoCapture`.
//!
//! The bench owns a virtual microsecond clock. The trigger pin records the
//! pulse it is driven with; on the falling edge of each trigger it schedules
//! the next scripted echo. Delays advance the clock and deliver any due echo
//! edges to the capture with their exact timestamps, standing in for the ISR.

use core::cell::{Cell, RefCell};
use core::convert::Infallible;
use std::collections::VecDeque;
use std::string::String;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin};

use crate::capture::{EchoCapture, Edge};
use crate::cycle::MicrosClock;
use crate::emitter::{DiagnosticSink, Link};
use crate::error::LinkError;

/// Time from trigger end to echo rising edge (the 40 kHz burst).
pub const BURST_LATENCY_US: u32 = 450;

pub struct Bench<'a> {
    capture: &'a EchoCapture,
    now_us: Cell<u32>,
    trigger_high: Cell<bool>,
    high_since_us: Cell<u32>,
    low_since_us: Cell<u32>,
    last_settle_us: Cell<u32>,
    last_pulse_us: Cell<u32>,
    trigger_pulses: Cell<u32>,
    last_echo_rising_us: Cell<u32>,
    script: RefCell<VecDeque<Option<u32>>>,
    pending: RefCell<Vec<(u32, Edge)>>,
}

impl<'a> Bench<'a> {
    pub fn new(capture: &'a EchoCapture) -> Self {
        Self {
            capture,
            now_us: Cell::new(1_000_000),
            trigger_high: Cell::new(false),
            high_since_us: Cell::new(0),
            low_since_us: Cell::new(0),
            last_settle_us: Cell::new(0),
            last_pulse_us: Cell::new(0),
            trigger_pulses: Cell::new(0),
            last_echo_rising_us: Cell::new(0),
            script: RefCell::new(VecDeque::new()),
            pending: RefCell::new(Vec::new()),
        }
    }

    /// Queue the echo for the next trigger: `Some(width_us)` or no echo.
    pub fn script_echo(&self, width_us: Option<u32>) {
        self.script.borrow_mut().push_back(width_us);
    }

    pub fn trigger(&self) -> SimTrigger<'_, 'a> {
        SimTrigger { bench: self }
    }

    pub fn delay(&self) -> SimDelay<'_, 'a> {
        SimDelay { bench: self }
    }

    pub fn now(&self) -> u32 {
        self.now_us.get()
    }

    pub fn set_now(&self, now_us: u32) {
        self.now_us.set(now_us);
    }

    pub fn trigger_pulses(&self) -> u32 {
        self.trigger_pulses.get()
    }

    pub fn last_pulse_us(&self) -> u32 {
        self.last_pulse_us.get()
    }

    pub fn last_settle_us(&self) -> u32 {
        self.last_settle_us.get()
    }

    pub fn trigger_is_high(&self) -> bool {
        self.trigger_high.get()
    }

    pub fn last_echo_rising_us(&self) -> u32 {
        self.last_echo_rising_us.get()
    }

    /// Inject an edge right now, outside the script.
    pub fn inject(&self, edge: Edge) {
        self.capture.on_edge(edge, self.now());
    }

    fn advance(&self, us: u32) {
        let start = self.now();
        let end = start.wrapping_add(us);
        loop {
            let due = {
                let mut pending = self.pending.borrow_mut();
                let next = pending
                    .iter()
                    .enumerate()
                    .filter(|(_, (at, _))| at.wrapping_sub(start) <= us)
                    .min_by_key(|(_, (at, _))| at.wrapping_sub(start))
                    .map(|(i, _)| i);
                next.map(|i| pending.remove(i))
            };
            match due {
                Some((at, edge)) => {
                    self.now_us.set(at);
                    self.capture.on_edge(edge, at);
                }
                None => break,
            }
        }
        self.now_us.set(end);
    }

    fn trigger_released(&self) {
        if let Some(Some(width)) = self.script.borrow_mut().pop_front() {
            let rising = self.now().wrapping_add(BURST_LATENCY_US);
            self.last_echo_rising_us.set(rising);
            let mut pending = self.pending.borrow_mut();
            pending.push((rising, Edge::Rising));
            pending.push((rising.wrapping_add(width), Edge::Falling));
        }
    }
}

impl MicrosClock for Bench<'_> {
    fn now_us(&self) -> u32 {
        self.now()
    }
}

pub struct SimTrigger<'b, 'a> {
    bench: &'b Bench<'a>,
}

impl ErrorType for SimTrigger<'_, '_> {
    type Error = Infallible;
}

impl OutputPin for SimTrigger<'_, '_> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let b = self.bench;
        if b.trigger_high.get() {
            b.trigger_high.set(false);
            b.last_pulse_us.set(b.now().wrapping_sub(b.high_since_us.get()));
            b.trigger_pulses.set(b.trigger_pulses.get() + 1);
            b.trigger_released();
        }
        b.low_since_us.set(b.now());
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let b = self.bench;
        if !b.trigger_high.get() {
            b.last_settle_us.set(b.now().wrapping_sub(b.low_since_us.get()));
            b.trigger_high.set(true);
            b.high_since_us.set(b.now());
        }
        Ok(())
    }
}

pub struct SimDelay<'b, 'a> {
    bench: &'b Bench<'a>,
}

impl DelayNs for SimDelay<'_, '_> {
    fn delay_ns(&mut self, ns: u32) {
        self.bench.advance(ns.div_ceil(1_000));
    }

    fn delay_us(&mut self, us: u32) {
        self.bench.advance(us);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.bench.advance(ms * 1_000);
    }
}

/// Trigger pin whose every write fails.
pub struct FailingPin;

#[derive(Debug)]
pub struct PinFault;

impl embedded_hal::digital::Error for PinFault {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}

impl ErrorType for FailingPin {
    type Error = PinFault;
}

impl OutputPin for FailingPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Err(PinFault)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Err(PinFault)
    }
}

/// Diagnostic sink that keeps every record.
#[derive(Default)]
pub struct MemorySink {
    pub lines: Vec<String>,
}

impl DiagnosticSink for MemorySink {
    fn record(&mut self, line: &str) {
        self.lines.push(line.into());
    }
}

/// Link that captures sent bytes, with a switchable connection flag.
#[derive(Default)]
pub struct MemoryLink {
    pub connected: bool,
    pub fail_writes: bool,
    pub sent: String,
}

impl MemoryLink {
    pub fn connected() -> Self {
        Self {
            connected: true,
            ..Default::default()
        }
    }
}

impl Link for MemoryLink {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send_line(&mut self, line: &str) -> Result<(), LinkError> {
        if self.fail_writes {
            return Err(LinkError::Io);
        }
        self.sent.push_str(line);
        Ok(())
    }
}
