/// Collector session — the receiving end of one node's TCP stream.
///
/// Bytes are framed into lines, decoded, checked against the id the node
/// registered with, and event timestamps are widened to 64 bits. One
/// session per accepted connection; correlation across nodes happens above
/// this layer.
use crate::comm::{parse_record, LineReader, WrapTracker};
use crate::error::{ParseError, SessionError};
use crate::protocol::{DeviceId, Record};

/// An accepted line, after the session's checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// `ID:` received; the session now belongs to this device.
    Registered(DeviceId),
    /// `BOOT=` on the node's widened timeline.
    Boot { timestamp_us: u64 },
    /// Crossing event from the registered device.
    Event { sequence: u32, timestamp_us: u64 },
}

pub struct CollectorSession {
    reader: LineReader,
    device: Option<DeviceId>,
    wrap: WrapTracker,
}

impl CollectorSession {
    pub const fn new() -> Self {
        Self {
            reader: LineReader::new(),
            device: None,
            wrap: WrapTracker::new(),
        }
    }

    /// Registered device id, once `ID:` has arrived.
    pub fn device_id(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Feed one received byte. Yields a result each time a line completes.
    pub fn feed(&mut self, byte: u8) -> Option<Result<SessionEvent, SessionError>> {
        let line = self.reader.feed(byte)?;
        Some(match core::str::from_utf8(line) {
            Ok(line) => accept(&mut self.device, &mut self.wrap, line),
            Err(_) => Err(ParseError::InvalidUtf8.into()),
        })
    }

    /// Handle one already-framed line.
    pub fn handle_line(&mut self, line: &str) -> Result<SessionEvent, SessionError> {
        accept(&mut self.device, &mut self.wrap, line)
    }
}

impl Default for CollectorSession {
    fn default() -> Self {
        Self::new()
    }
}

fn accept(
    device: &mut Option<DeviceId>,
    wrap: &mut WrapTracker,
    line: &str,
) -> Result<SessionEvent, SessionError> {
    match parse_record(line)? {
        Record::Identity(id) => {
            // A different node on the same stream starts a fresh timeline
            if device.as_ref() != Some(&id) {
                *wrap = WrapTracker::new();
            }
            log::info!("Registered device {}", id);
            *device = Some(id.clone());
            Ok(SessionEvent::Registered(id))
        }
        Record::Boot { timestamp_us } => {
            if device.is_none() {
                return Err(SessionError::NotIdentified);
            }
            Ok(SessionEvent::Boot {
                timestamp_us: wrap.extend(timestamp_us),
            })
        }
        Record::Event {
            device_id,
            sequence,
            timestamp_us,
        } => {
            let registered = device.as_ref().ok_or(SessionError::NotIdentified)?;
            if device_id != *registered {
                log::warn!("Device {} sent mismatched prefix t{}", registered, device_id);
                return Err(SessionError::MismatchedDevice);
            }
            Ok(SessionEvent::Event {
                sequence,
                timestamp_us: wrap.extend(timestamp_us),
            })
        }
    }
}
