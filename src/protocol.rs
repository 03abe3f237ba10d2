/// Line protocol between ranging nodes and the collector.
///
/// All records are newline-terminated ASCII over one TCP stream per node:
///
/// ```text
/// ID:B            identity, once after connect
/// BOOT=81234      boot timestamp (µs), once after connect
/// tB7=1234567     event 7 from device B, rising edge at 1234567 µs
/// ```
///
/// The node also writes a JSON status record to its local log; that one
/// never goes over the wire. Uses `heapless` types for no_std/no-alloc
/// operation.
use heapless::{String, Vec};
use serde::Serialize;

use crate::error::ConfigError;

/// Maximum device id length.
pub const MAX_DEVICE_ID_LEN: usize = 8;

/// Static identity of a node, e.g. "A".
pub type DeviceId = String<MAX_DEVICE_ID_LEN>;

/// Maximum length of any single text record, newline included.
pub const MAX_LINE_LEN: usize = 64;

/// Buffer for one formatted text record.
pub type LineBuffer = String<MAX_LINE_LEN>;

/// Identity announcement prefix.
pub const IDENTITY_PREFIX: &str = "ID:";

/// Boot marker prefix.
pub const BOOT_PREFIX: &str = "BOOT=";

/// Event record prefix, followed by device id and sequence.
pub const EVENT_PREFIX: char = 't';

/// One validated crossing event. Never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct RangingEvent {
    pub device_id: DeviceId,
    /// Strictly increasing per device, starting at 1.
    pub sequence: u32,
    /// Rising edge of the echo, node-local clock.
    pub timestamp_us: u32,
    pub distance_cm: f32,
}

/// A decoded wire record, as the collector sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Identity(DeviceId),
    Boot {
        timestamp_us: u32,
    },
    Event {
        device_id: DeviceId,
        sequence: u32,
        timestamp_us: u32,
    },
}

/// Validate and copy a device id.
///
/// Letters only: the sequence number follows the id directly in event
/// records, so a trailing digit would make `tB17` ambiguous.
pub fn parse_device_id(s: &str) -> Result<DeviceId, ConfigError> {
    if s.is_empty() {
        return Err(ConfigError::EmptyDeviceId);
    }
    if let Some(found) = s.chars().find(|c| !c.is_ascii_alphabetic()) {
        return Err(ConfigError::InvalidDeviceIdChar { found });
    }
    DeviceId::try_from(s).map_err(|_| ConfigError::DeviceIdTooLong {
        max: MAX_DEVICE_ID_LEN,
    })
}

/// Messages written to the node's local log as JSON.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum LocalMessage<'a> {
    /// Periodic node status
    #[serde(rename = "status")]
    Status {
        device: &'a str,
        /// Uptime in seconds
        uptime: u32,
        cycles: u32,
        emitted: u32,
        timed_out: u32,
        out_of_range: u32,
        stray_edges: u32,
        /// Whether the collector link is up
        link: bool,
        /// Board identifier
        board: &'static str,
        /// Firmware version
        version: &'static str,
    },
}

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized JSON message
pub const MAX_MSG_LEN: usize = 256;

/// Buffer type for serialized JSON messages
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;
