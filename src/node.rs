/// Ranging node — one trigger cycle, one emitter, and run statistics.
///
/// [`Node::step`] is the whole control loop body for blocking drivers:
/// fire, wait for the echo or the deadline, emit on a valid measurement,
/// account, then sleep the inter-cycle delay. Async drivers poll
/// [`Node::cycle_mut`] themselves and hand the outcome to [`Node::finish`].
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::board;
use crate::capture::EchoCapture;
use crate::cycle::{CycleOutcome, MicrosClock, TriggerCycle};
use crate::defaults::CYCLE_DELAY_MS;
use crate::emitter::{DiagnosticSink, Emission, EventEmitter, Link, NodeContext};
use crate::protocol::{LocalMessage, VERSION};
use crate::ranging::RangeConfig;

/// Counters since boot. Reported in the periodic status record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    pub cycles: u32,
    pub emitted: u32,
    pub timed_out: u32,
    pub out_of_range: u32,
    pub stray_edges: u32,
}

impl NodeStats {
    pub fn record(&mut self, outcome: &CycleOutcome) {
        self.cycles += 1;
        match outcome {
            CycleOutcome::Measured(_) => self.emitted += 1,
            CycleOutcome::OutOfRange { .. } => self.out_of_range += 1,
            CycleOutcome::TimedOut => self.timed_out += 1,
        }
    }

    pub fn add_stray_edges(&mut self, n: u32) {
        self.stray_edges += n;
    }
}

pub struct Node<'a> {
    capture: &'a EchoCapture,
    cycle: TriggerCycle<'a>,
    emitter: EventEmitter,
    stats: NodeStats,
}

impl<'a> Node<'a> {
    pub fn new(capture: &'a EchoCapture, context: NodeContext, range: RangeConfig) -> Self {
        Self {
            capture,
            cycle: TriggerCycle::new(capture, range),
            emitter: EventEmitter::new(context),
            stats: NodeStats::default(),
        }
    }

    pub fn cycle_mut(&mut self) -> &mut TriggerCycle<'a> {
        &mut self.cycle
    }

    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    pub fn device_id(&self) -> &str {
        self.emitter.context().device_id()
    }

    /// Close out a resolved cycle: emit if measured, update counters and
    /// report any edges that raced the pending pair.
    pub fn finish<S, L>(&mut self, outcome: CycleOutcome, sink: &mut S, link: &mut L) -> Option<Emission>
    where
        S: DiagnosticSink + ?Sized,
        L: Link + ?Sized,
    {
        self.stats.record(&outcome);

        let emission = match outcome {
            CycleOutcome::Measured(m) => Some(self.emitter.emit(m, sink, link)),
            _ => None,
        };

        let stray = self.capture.take_stray_edges();
        if stray > 0 {
            self.stats.add_stray_edges(stray);
            log::warn!("{} stray echo edge(s) ignored this cycle", stray);
        }

        emission
    }

    /// Run one full cycle including the inter-cycle delay.
    pub fn step<P, D, C, S, L>(
        &mut self,
        trigger: &mut P,
        delay: &mut D,
        clock: &C,
        sink: &mut S,
        link: &mut L,
    ) -> Result<Option<Emission>, P::Error>
    where
        P: OutputPin,
        D: DelayNs,
        C: MicrosClock + ?Sized,
        S: DiagnosticSink + ?Sized,
        L: Link + ?Sized,
    {
        let outcome = self.cycle.run_blocking(trigger, delay, clock)?;
        let emission = self.finish(outcome, sink, link);
        delay.delay_ms(CYCLE_DELAY_MS);
        Ok(emission)
    }

    /// Status record for the local log.
    pub fn status(&self, uptime_secs: u32, link_up: bool) -> LocalMessage<'_> {
        LocalMessage::Status {
            device: self.device_id(),
            uptime: uptime_secs,
            cycles: self.stats.cycles,
            emitted: self.stats.emitted,
            timed_out: self.stats.timed_out,
            out_of_range: self.stats.out_of_range,
            stray_edges: self.stats.stray_edges,
            link: link_up,
            board: board::BOARD_NAME,
            version: VERSION,
        }
    }
}
