/// Trigger cycle — one ranging attempt per iteration of the control loop.
///
/// `Idle → Pulsing → AwaitingEcho → {Resolved | TimedOut}`
///
/// [`TriggerCycle::fire`] arms the capture and sends the 10 µs trigger pulse;
/// [`TriggerCycle::poll`] is a non-blocking step the caller repeats until the
/// echo resolves or the 50 ms deadline passes. The std firmware and the tests
/// busy-poll through [`TriggerCycle::run_blocking`]; the Embassy firmware
/// yields to the executor between polls instead.
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::capture::EchoCapture;
use crate::defaults::{ECHO_POLL_US, ECHO_TIMEOUT_US, TRIGGER_PULSE_US, TRIGGER_SETTLE_US};
use crate::ranging::{self, Measurement, RangeConfig, Reading};

/// Node-local microsecond clock. Wraps at 2^32, like the ISR timestamps.
///
/// Must be the same time base the echo ISR stamps edges with.
pub trait MicrosClock {
    fn now_us(&self) -> u32;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Pulsing,
    AwaitingEcho,
    Resolved,
    TimedOut,
}

/// How a cycle ended. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// Echo inside the proximity band — worth an event.
    Measured(Measurement),
    /// Echo resolved but filtered out.
    OutOfRange { distance_cm: f32 },
    /// No complete echo before the deadline.
    TimedOut,
}

pub struct TriggerCycle<'a> {
    capture: &'a EchoCapture,
    range: RangeConfig,
    state: CycleState,
    started_us: u32,
}

impl<'a> TriggerCycle<'a> {
    pub fn new(capture: &'a EchoCapture, range: RangeConfig) -> Self {
        Self {
            capture,
            range,
            state: CycleState::Idle,
            started_us: 0,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Start a cycle: arm the capture and send the trigger pulse.
    ///
    /// On a pin error the cycle drops back to `Idle`.
    pub fn fire<P, D, C>(&mut self, trigger: &mut P, delay: &mut D, clock: &C) -> Result<(), P::Error>
    where
        P: OutputPin,
        D: DelayNs,
        C: MicrosClock + ?Sized,
    {
        self.started_us = clock.now_us();
        self.capture.arm();
        self.state = CycleState::Pulsing;

        if let Err(e) = send_trigger(trigger, delay) {
            self.state = CycleState::Idle;
            return Err(e);
        }

        self.state = CycleState::AwaitingEcho;
        Ok(())
    }

    /// One non-blocking check of the echo. `None` while still waiting.
    pub fn poll(&mut self, now_us: u32) -> Option<CycleOutcome> {
        if self.state != CycleState::AwaitingEcho {
            return None;
        }

        if let Some(pulse) = self.capture.take() {
            // A pair that closed past the deadline counts as no echo
            if pulse.falling_us.wrapping_sub(self.started_us) >= ECHO_TIMEOUT_US {
                self.state = CycleState::TimedOut;
                log::debug!(
                    "Echo closed {} us after trigger, past deadline",
                    pulse.falling_us.wrapping_sub(self.started_us)
                );
                return Some(CycleOutcome::TimedOut);
            }

            self.state = CycleState::Resolved;
            return Some(match ranging::measure(&pulse, &self.range) {
                Reading::InRange(m) => CycleOutcome::Measured(m),
                Reading::OutOfRange { distance_cm } => {
                    log::debug!(
                        "Echo {} us = {:.2} cm, outside band",
                        pulse.width_us(),
                        distance_cm
                    );
                    CycleOutcome::OutOfRange { distance_cm }
                }
            });
        }

        if now_us.wrapping_sub(self.started_us) >= ECHO_TIMEOUT_US {
            self.state = CycleState::TimedOut;
            log::debug!("No echo within {} us", ECHO_TIMEOUT_US);
            return Some(CycleOutcome::TimedOut);
        }

        None
    }

    /// Fire and busy-poll until the cycle resolves or times out.
    pub fn run_blocking<P, D, C>(
        &mut self,
        trigger: &mut P,
        delay: &mut D,
        clock: &C,
    ) -> Result<CycleOutcome, P::Error>
    where
        P: OutputPin,
        D: DelayNs,
        C: MicrosClock + ?Sized,
    {
        self.fire(trigger, delay, clock)?;
        loop {
            if let Some(outcome) = self.poll(clock.now_us()) {
                return Ok(outcome);
            }
            delay.delay_us(ECHO_POLL_US);
        }
    }
}

/// Low ≥2 µs, high exactly 10 µs, low.
fn send_trigger<P: OutputPin, D: DelayNs>(trigger: &mut P, delay: &mut D) -> Result<(), P::Error> {
    trigger.set_low()?;
    delay.delay_us(TRIGGER_SETTLE_US);
    trigger.set_high()?;
    delay.delay_us(TRIGGER_PULSE_US);
    trigger.set_low()
}
