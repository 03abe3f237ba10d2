/// Communication layer — record formatting, handshake, and the collector-side
/// decoding helpers.
///
/// The node formats every record into a fixed-capacity [`LineBuffer`]; the
/// collector side frames bytes with [`LineReader`], decodes them with
/// [`parse_record`], and widens 32-bit node timestamps with [`WrapTracker`].
/// `collector::CollectorSession` wires the three together per connection.
use core::fmt::Write;

use crate::emitter::Link;
use crate::error::{LinkError, ParseError};
use crate::protocol::{
    parse_device_id, LineBuffer, LocalMessage, RangingEvent, Record, BOOT_PREFIX, EVENT_PREFIX,
    IDENTITY_PREFIX, MAX_LINE_LEN,
};

// ── Node-side formatting ───────────────────────────────────────────────

/// `ID:<device_id>\n`
pub fn format_identity(device_id: &str, buf: &mut LineBuffer) -> core::fmt::Result {
    buf.clear();
    writeln!(buf, "{IDENTITY_PREFIX}{device_id}")
}

/// `BOOT=<boot_timestamp_us>\n`
pub fn format_boot(boot_us: u32, buf: &mut LineBuffer) -> core::fmt::Result {
    buf.clear();
    writeln!(buf, "{BOOT_PREFIX}{boot_us}")
}

/// Wire event record: `t<device_id><sequence>=<timestamp_us>\n`
pub fn format_event(event: &RangingEvent, buf: &mut LineBuffer) -> core::fmt::Result {
    buf.clear();
    writeln!(
        buf,
        "{}{}{}={}",
        EVENT_PREFIX, event.device_id, event.sequence, event.timestamp_us
    )
}

/// Local diagnostic record: `t<device_id><sequence> = <timestamp_us> (<cm> cm)`
pub fn format_diagnostic(event: &RangingEvent, buf: &mut LineBuffer) -> core::fmt::Result {
    buf.clear();
    write!(
        buf,
        "{}{}{} = {} ({:.2} cm)",
        EVENT_PREFIX, event.device_id, event.sequence, event.timestamp_us, event.distance_cm
    )
}

/// Announce identity and boot time on a freshly connected link.
pub fn send_handshake<L: Link + ?Sized>(
    link: &mut L,
    device_id: &str,
    boot_us: u32,
) -> Result<(), LinkError> {
    if !link.is_connected() {
        return Err(LinkError::Disconnected);
    }
    let mut line = LineBuffer::new();
    // A validated device id always fits; treat overflow as a dead link
    format_identity(device_id, &mut line).map_err(|_| LinkError::Io)?;
    link.send_line(&line)?;
    format_boot(boot_us, &mut line).map_err(|_| LinkError::Io)?;
    link.send_line(&line)
}

/// Serialize a LocalMessage to JSON bytes and write to the output buffer.
/// Returns the number of bytes written, or None if serialization failed.
pub fn serialize_message(msg: &LocalMessage, buf: &mut [u8]) -> Option<usize> {
    match serde_json_core::to_slice(msg, buf) {
        Ok(len) => {
            // Append newline for NDJSON
            if len < buf.len() {
                buf[len] = b'\n';
                Some(len + 1)
            } else {
                Some(len)
            }
        }
        Err(_) => None,
    }
}

// ── Collector-side decoding ────────────────────────────────────────────

/// Decode one line (without or with its trailing newline).
pub fn parse_record(line: &str) -> Result<Record, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }

    if let Some(id) = line.strip_prefix(IDENTITY_PREFIX) {
        return Ok(Record::Identity(parse_device_id(id.trim())?));
    }

    if let Some(ts) = line.strip_prefix(BOOT_PREFIX) {
        return Ok(Record::Boot {
            timestamp_us: parse_u32(ts)?,
        });
    }

    if let Some(rest) = line.strip_prefix(EVENT_PREFIX) {
        let (tag, ts) = rest.split_once('=').ok_or(ParseError::MissingDelimiter)?;
        let digits_at = tag
            .find(|c: char| c.is_ascii_digit())
            .ok_or(ParseError::MissingSequence)?;
        let (id, seq) = tag.split_at(digits_at);
        if id.is_empty() {
            return Err(ParseError::MissingDeviceId);
        }
        return Ok(Record::Event {
            device_id: parse_device_id(id)?,
            sequence: parse_u32(seq)?,
            timestamp_us: parse_u32(ts)?,
        });
    }

    Err(ParseError::UnknownRecord)
}

fn parse_u32(s: &str) -> Result<u32, ParseError> {
    s.trim().parse().map_err(|_| ParseError::InvalidNumber)
}

/// Line reader state machine.
/// Accumulates bytes until a newline is found, then yields the line.
pub struct LineReader {
    buf: [u8; MAX_LINE_LEN],
    pos: usize,
}

impl LineReader {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_LINE_LEN],
            pos: 0,
        }
    }

    /// Feed a byte into the reader. Returns a complete line (without newline)
    /// when one is detected.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        if byte == b'\n' || byte == b'\r' {
            if self.pos > 0 {
                let line = &self.buf[..self.pos];
                self.pos = 0;
                Some(line)
            } else {
                None
            }
        } else if self.pos < self.buf.len() {
            self.buf[self.pos] = byte;
            self.pos += 1;
            None
        } else {
            // Overflow — discard and reset
            self.pos = 0;
            None
        }
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

/// One full period of the node's 32-bit microsecond clock.
pub const MICROS_WRAP: u64 = 1 << 32;

/// A backwards jump larger than this is a rollover, not reordering.
pub const WRAP_THRESHOLD_US: u32 = 1_000_000;

/// Widens one node's 32-bit timestamps into a monotonic 64-bit timeline.
///
/// Track one per device; timestamps from different nodes share no epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct WrapTracker {
    last_raw: Option<u32>,
    wraps: u64,
}

impl WrapTracker {
    pub const fn new() -> Self {
        Self {
            last_raw: None,
            wraps: 0,
        }
    }

    pub fn extend(&mut self, raw_us: u32) -> u64 {
        if let Some(last) = self.last_raw {
            if raw_us < last && last - raw_us > WRAP_THRESHOLD_US {
                self.wraps += 1;
            }
        }
        self.last_raw = Some(raw_us);
        raw_us as u64 + self.wraps * MICROS_WRAP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DeviceId;
    use crate::testing::MemoryLink;

    fn event(id: &str, sequence: u32, timestamp_us: u32, distance_cm: f32) -> RangingEvent {
        RangingEvent {
            device_id: DeviceId::try_from(id).unwrap(),
            sequence,
            timestamp_us,
            distance_cm,
        }
    }

    // ── Formatting ──────────────────────────────────────────────────

    #[test]
    fn identity_line() {
        let mut buf = LineBuffer::new();
        format_identity("B", &mut buf).unwrap();
        assert_eq!(buf.as_str(), "ID:B\n");
    }

    #[test]
    fn boot_line() {
        let mut buf = LineBuffer::new();
        format_boot(81_234, &mut buf).unwrap();
        assert_eq!(buf.as_str(), "BOOT=81234\n");
    }

    #[test]
    fn event_line() {
        let mut buf = LineBuffer::new();
        format_event(&event("B", 7, 1_234_567, 17.15), &mut buf).unwrap();
        assert_eq!(buf.as_str(), "tB7=1234567\n");
    }

    #[test]
    fn diagnostic_line() {
        let mut buf = LineBuffer::new();
        format_diagnostic(&event("B", 7, 1_234_567, 17.15), &mut buf).unwrap();
        assert_eq!(buf.as_str(), "tB7 = 1234567 (17.15 cm)");
    }

    #[test]
    fn longest_records_fit() {
        let mut buf = LineBuffer::new();
        let e = event("ABCDEFGH", u32::MAX, u32::MAX, 34.99);
        assert!(format_event(&e, &mut buf).is_ok());
        assert!(format_diagnostic(&e, &mut buf).is_ok());
    }

    #[test]
    fn formatting_replaces_previous_contents() {
        let mut buf = LineBuffer::new();
        format_identity("A", &mut buf).unwrap();
        format_boot(5, &mut buf).unwrap();
        assert_eq!(buf.as_str(), "BOOT=5\n");
    }

    // ── Handshake ───────────────────────────────────────────────────

    #[test]
    fn handshake_sends_identity_then_boot() {
        let mut link = MemoryLink::connected();
        send_handshake(&mut link, "A", 42).unwrap();
        assert_eq!(link.sent, "ID:A\nBOOT=42\n");
    }

    #[test]
    fn handshake_requires_connection() {
        let mut link = MemoryLink::default();
        assert_eq!(
            send_handshake(&mut link, "A", 42),
            Err(LinkError::Disconnected)
        );
        assert!(link.sent.is_empty());
    }

    // ── serialize_message ───────────────────────────────────────────

    #[test]
    fn serialize_appends_newline() {
        let msg = LocalMessage::Status {
            device: "A",
            uptime: 1,
            cycles: 0,
            emitted: 0,
            timed_out: 0,
            out_of_range: 0,
            stray_edges: 0,
            link: false,
            board: "b",
            version: "0.1.0",
        };
        let mut buf = [0u8; 256];
        let len = serialize_message(&msg, &mut buf).unwrap();
        assert_eq!(buf[len - 1], b'\n');
        assert_eq!(buf[0], b'{');
    }

    #[test]
    fn serialize_fails_on_tiny_buffer() {
        let msg = LocalMessage::Status {
            device: "A",
            uptime: 1,
            cycles: 0,
            emitted: 0,
            timed_out: 0,
            out_of_range: 0,
            stray_edges: 0,
            link: false,
            board: "b",
            version: "0.1.0",
        };
        let mut buf = [0u8; 8];
        assert_eq!(serialize_message(&msg, &mut buf), None);
    }

    // ── parse_record ────────────────────────────────────────────────

    #[test]
    fn parses_identity() {
        assert_eq!(
            parse_record("ID:B\n"),
            Ok(Record::Identity(DeviceId::try_from("B").unwrap()))
        );
        assert_eq!(
            parse_record("ID: A "),
            Ok(Record::Identity(DeviceId::try_from("A").unwrap()))
        );
    }

    #[test]
    fn parses_boot() {
        assert_eq!(
            parse_record("BOOT=81234"),
            Ok(Record::Boot {
                timestamp_us: 81_234
            })
        );
    }

    #[test]
    fn parses_event() {
        assert_eq!(
            parse_record("tB7=1234567\n"),
            Ok(Record::Event {
                device_id: DeviceId::try_from("B").unwrap(),
                sequence: 7,
                timestamp_us: 1_234_567,
            })
        );
    }

    #[test]
    fn parses_multi_letter_device_and_long_sequence() {
        assert_eq!(
            parse_record("tNorth1024=99"),
            Ok(Record::Event {
                device_id: DeviceId::try_from("North").unwrap(),
                sequence: 1024,
                timestamp_us: 99,
            })
        );
    }

    #[test]
    fn formatted_event_parses_back() {
        let mut buf = LineBuffer::new();
        format_event(&event("A", 3, 4_000_000_000, 10.0), &mut buf).unwrap();
        assert_eq!(
            parse_record(&buf),
            Ok(Record::Event {
                device_id: DeviceId::try_from("A").unwrap(),
                sequence: 3,
                timestamp_us: 4_000_000_000,
            })
        );
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(parse_record(""), Err(ParseError::Empty));
        assert_eq!(parse_record("  \r\n"), Err(ParseError::Empty));
        assert_eq!(parse_record("hello"), Err(ParseError::UnknownRecord));
        assert_eq!(parse_record("tB7"), Err(ParseError::MissingDelimiter));
        assert_eq!(parse_record("tB=5"), Err(ParseError::MissingSequence));
        assert_eq!(parse_record("t7=5"), Err(ParseError::MissingDeviceId));
        assert_eq!(parse_record("tB7=abc"), Err(ParseError::InvalidNumber));
        assert_eq!(parse_record("tB7x=5"), Err(ParseError::InvalidNumber));
        assert_eq!(parse_record("BOOT=-1"), Err(ParseError::InvalidNumber));
        assert!(matches!(parse_record("ID:"), Err(ParseError::Config(_))));
    }

    // ── LineReader ──────────────────────────────────────────────────

    #[test]
    fn line_reader_splits_records() {
        let mut reader = LineReader::new();
        let mut lines: std::vec::Vec<std::string::String> = std::vec::Vec::new();
        for &b in b"ID:A\nBOOT=1\r\ntA1=5\n" {
            if let Some(line) = reader.feed(b) {
                lines.push(core::str::from_utf8(line).unwrap().into());
            }
        }
        assert_eq!(lines, ["ID:A", "BOOT=1", "tA1=5"]);
    }

    #[test]
    fn line_reader_ignores_blank_lines() {
        let mut reader = LineReader::new();
        assert!(reader.feed(b'\n').is_none());
        assert!(reader.feed(b'\r').is_none());
    }

    #[test]
    fn line_reader_drops_overlong_line() {
        let mut reader = LineReader::new();
        for _ in 0..MAX_LINE_LEN {
            assert!(reader.feed(b'x').is_none());
        }
        // Overflow byte resets the buffer
        assert!(reader.feed(b'x').is_none());
        assert!(reader.feed(b'y').is_none());
        assert_eq!(reader.feed(b'\n'), Some(&b"y"[..]));
    }

    // ── WrapTracker ─────────────────────────────────────────────────

    #[test]
    fn wrap_tracker_passes_through_before_wrap() {
        let mut t = WrapTracker::new();
        assert_eq!(t.extend(100), 100);
        assert_eq!(t.extend(5_000_000), 5_000_000);
    }

    #[test]
    fn wrap_tracker_counts_rollover() {
        let mut t = WrapTracker::new();
        t.extend(u32::MAX - 1_000);
        assert_eq!(t.extend(500), MICROS_WRAP + 500);
        assert_eq!(t.extend(2_000_000), MICROS_WRAP + 2_000_000);
    }

    #[test]
    fn wrap_tracker_tolerates_small_reordering() {
        let mut t = WrapTracker::new();
        t.extend(10_000_000);
        assert_eq!(t.extend(9_500_000), 9_500_000);
    }
}
