/// Error types for configuration, collector-side parsing and the link.
///
/// Timeouts and out-of-range readings are not errors — they are ordinary
/// cycle outcomes (see `cycle::CycleOutcome`). Everything here is `Copy` and
/// allocation-free.
use thiserror::Error;

/// Build-time node configuration was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("device id is empty")]
    EmptyDeviceId,
    #[error("device id longer than {max} characters")]
    DeviceIdTooLong { max: usize },
    #[error("device id may only contain ASCII letters, found {found:?}")]
    InvalidDeviceIdChar { found: char },
    #[error("WiFi SSID is empty")]
    EmptySsid,
    #[error("collector port is not a valid non-zero port number")]
    InvalidPort,
    #[error("collector host is not an IPv4 address")]
    InvalidHost,
}

/// A received line could not be decoded as a wire record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("unrecognised record")]
    UnknownRecord,
    #[error("record is missing '='")]
    MissingDelimiter,
    #[error("event record has no device id")]
    MissingDeviceId,
    #[error("event record has no sequence number")]
    MissingSequence,
    #[error("invalid number")]
    InvalidNumber,
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A write to the collector link did not go out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("link is not connected")]
    Disconnected,
    #[error("link output queue is full")]
    Busy,
    #[error("link write failed")]
    Io,
}

/// A collector session refused a line from its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("data received before ID record")]
    NotIdentified,
    #[error("event prefix does not match the registered device id")]
    MismatchedDevice,
    #[error(transparent)]
    Parse(#[from] ParseError),
}
