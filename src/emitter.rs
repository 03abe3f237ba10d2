/// Event emitter — sequences validated measurements and publishes them.
///
/// Every event goes to the local diagnostic sink. It also goes to the
/// collector link if, and only if, the link reports connected at that
/// moment. There is no buffering and no retry: a dropped event is gone,
/// and the sequence number it used is not reissued.
use crate::comm;
use crate::error::LinkError;
use crate::protocol::{DeviceId, LineBuffer, RangingEvent};
use crate::ranging::Measurement;

/// Where human-readable records go. Always written, link or no link.
pub trait DiagnosticSink {
    fn record(&mut self, line: &str);
}

/// Diagnostic sink backed by the `log` facade (serial console on device).
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn record(&mut self, line: &str) {
        log::info!("{}", line);
    }
}

/// The collector link, as seen from the emitter.
///
/// Connection management belongs to the transport; the emitter only asks
/// whether the link is up and writes whole lines to it.
pub trait Link {
    fn is_connected(&self) -> bool;

    /// Write one complete record, newline included. Must not block waiting
    /// for delivery.
    fn send_line(&mut self, line: &str) -> Result<(), LinkError>;
}

/// Identity and sequence counter of this node. Lives as long as the run.
#[derive(Debug, Clone)]
pub struct NodeContext {
    device_id: DeviceId,
    next_sequence: u32,
}

impl NodeContext {
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            next_sequence: 1,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Sequence of the most recent event, 0 before the first.
    pub fn last_sequence(&self) -> u32 {
        self.next_sequence - 1
    }

    fn advance(&mut self) -> u32 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }
}

/// What happened to one emitted event.
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub event: RangingEvent,
    /// Whether the record was handed to a connected link.
    pub sent: bool,
}

pub struct EventEmitter {
    context: NodeContext,
}

impl EventEmitter {
    pub fn new(context: NodeContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &NodeContext {
        &self.context
    }

    /// Turn a validated measurement into the next event and publish it.
    pub fn emit<S, L>(&mut self, measurement: Measurement, sink: &mut S, link: &mut L) -> Emission
    where
        S: DiagnosticSink + ?Sized,
        L: Link + ?Sized,
    {
        let event = RangingEvent {
            device_id: self.context.device_id.clone(),
            sequence: self.context.advance(),
            timestamp_us: measurement.timestamp_us,
            distance_cm: measurement.distance_cm,
        };

        let mut line = LineBuffer::new();
        if comm::format_diagnostic(&event, &mut line).is_ok() {
            sink.record(&line);
        }

        let sent = link.is_connected()
            && comm::format_event(&event, &mut line).is_ok()
            && match link.send_line(&line) {
                Ok(()) => true,
                Err(e) => {
                    log::debug!("Event {} dropped: {}", event.sequence, e);
                    false
                }
            };

        Emission { event, sent }
    }
}
