/// Default constants for the ranging node.
///
/// The trigger timings are a hardware contract with the HC-SR04 and are not
/// tunable. The range band and cycle pacing are what the collector expects
/// from every node in a deployment, so they live here rather than in the
/// per-node build configuration.

// ── Physics ──────────────────────────────────────────────────────────

/// Speed of sound in air at ~20 °C, in centimetres per microsecond.
pub const SPEED_OF_SOUND_CM_PER_US: f32 = 0.0343;

/// Lower bound of the valid proximity band (exclusive).
pub const MIN_RANGE_CM: f32 = 0.0;

/// Upper bound of the valid proximity band (exclusive).
pub const MAX_RANGE_CM: f32 = 35.0;

// ── Trigger pulse (sensor contract) ──────────────────────────────────

/// Low time before the trigger pulse, so the sensor sees a clean edge.
pub const TRIGGER_SETTLE_US: u32 = 2;

/// Trigger pulse high time.
pub const TRIGGER_PULSE_US: u32 = 10;

// ── Cycle pacing ─────────────────────────────────────────────────────

/// Echo wait deadline, measured from cycle start.
pub const ECHO_TIMEOUT_US: u32 = 50_000;

/// Interval between polls of the capture state while awaiting an echo.
/// Small next to the ~58 µs/cm echo resolution; only bounds poll latency,
/// the timestamps themselves come from the interrupt.
pub const ECHO_POLL_US: u32 = 100;

/// Settle delay after each cycle. Caps sampling at ~10 Hz.
pub const CYCLE_DELAY_MS: u32 = 100;

// ── Indicator ────────────────────────────────────────────────────────

/// LED on-time after an emitted event.
pub const LED_PULSE_MS: u64 = 50;

// ── Status ───────────────────────────────────────────────────────────

/// Interval between local status records.
pub const STATUS_INTERVAL_SECS: u64 = 30;

// ── Node identity and link defaults ──────────────────────────────────

/// Device id used when none is configured at build time.
pub const DEVICE_ID: &str = "A";

/// Collector address used when none is configured at build time.
pub const COLLECTOR_HOST: &str = "192.168.1.100";

/// TCP port the collector listens on.
pub const COLLECTOR_PORT: u16 = 5000;
