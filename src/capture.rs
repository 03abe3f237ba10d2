/// Echo edge capture — the interrupt-side half of a ranging cycle.
///
/// The GPIO interrupt calls [`EchoCapture::on_edge`] on every transition of
/// the echo line; the control loop arms the capture before each trigger and
/// takes the completed rising/falling pair once. The two sides share only
/// atomics, so the ISR never blocks and never waits on the control loop.
///
/// A completed pair is published into a protected slot. While a pair is
/// pending, further edges cannot touch it: they are counted as stray edges
/// instead. The control loop reports stray edges so an echo that would
/// otherwise have silently replaced the pending pair is visible in the logs.
use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

// Capture states. Only the ISR moves Armed -> Risen -> Ready; only the
// control loop moves to Armed (arm) or Idle (take).
const IDLE: u8 = 0;
const ARMED: u8 = 1;
const RISEN: u8 = 2;
const READY: u8 = 3;

/// Direction of an echo line transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

impl Edge {
    /// Classify a transition from the line level read on ISR entry.
    #[inline]
    pub fn from_level(is_high: bool) -> Self {
        if is_high {
            Edge::Rising
        } else {
            Edge::Falling
        }
    }
}

/// Snapshot of one completed echo pulse, in node-local microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoPulse {
    pub rising_us: u32,
    pub falling_us: u32,
}

impl EchoPulse {
    /// Pulse width in microseconds. Wrapping, so a pulse that straddles the
    /// 32-bit microsecond rollover still measures correctly.
    #[inline]
    pub fn width_us(&self) -> u32 {
        self.falling_us.wrapping_sub(self.rising_us)
    }
}

/// Shared pulse-timing state between the echo ISR and the control loop.
///
/// Single producer (ISR), single consumer (control loop). Meant to live in a
/// `static`.
pub struct EchoCapture {
    state: AtomicU8,
    /// Rising edge of the pulse in progress. Scratch, ISR-only writes.
    rising_us: AtomicU32,
    /// The published pair. Written only while state is `RISEN`.
    pair_rising_us: AtomicU32,
    pair_falling_us: AtomicU32,
    stray_edges: AtomicU32,
}

impl EchoCapture {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
            rising_us: AtomicU32::new(0),
            pair_rising_us: AtomicU32::new(0),
            pair_falling_us: AtomicU32::new(0),
            stray_edges: AtomicU32::new(0),
        }
    }

    /// Record one echo transition. Interrupt context: bounded, no I/O.
    #[inline]
    pub fn on_edge(&self, edge: Edge, now_us: u32) {
        match (self.state.load(Ordering::Acquire), edge) {
            (ARMED | RISEN, Edge::Rising) => {
                // A second rising edge before the falling one restarts the
                // pulse, as the line itself does.
                self.rising_us.store(now_us, Ordering::Relaxed);
                let _ = self.state.compare_exchange(
                    ARMED,
                    RISEN,
                    Ordering::Release,
                    Ordering::Relaxed,
                );
            }
            (RISEN, Edge::Falling) => {
                self.pair_rising_us
                    .store(self.rising_us.load(Ordering::Relaxed), Ordering::Relaxed);
                self.pair_falling_us.store(now_us, Ordering::Relaxed);
                // Fails only if the control loop re-armed mid-edge; the
                // pair then belongs to a cycle nobody is waiting on.
                let _ = self.state.compare_exchange(
                    RISEN,
                    READY,
                    Ordering::Release,
                    Ordering::Relaxed,
                );
            }
            (ARMED | READY, _) => {
                // Armed + falling: the pulse began before the trigger.
                // Ready: a pair is pending and must not be overwritten.
                self.stray_edges.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    /// Start a new cycle: drop any unconsumed pair and clear `complete`.
    pub fn arm(&self) {
        self.state.store(ARMED, Ordering::Release);
    }

    /// True once a falling edge has completed a pulse since the last `arm`.
    pub fn is_complete(&self) -> bool {
        self.state.load(Ordering::Acquire) == READY
    }

    /// Take the completed pair, exactly once per cycle.
    pub fn take(&self) -> Option<EchoPulse> {
        if self.state.load(Ordering::Acquire) != READY {
            return None;
        }
        let pulse = EchoPulse {
            rising_us: self.pair_rising_us.load(Ordering::Relaxed),
            falling_us: self.pair_falling_us.load(Ordering::Relaxed),
        };
        self.state
            .compare_exchange(READY, IDLE, Ordering::AcqRel, Ordering::Relaxed)
            .ok()
            .map(|_| pulse)
    }

    /// Stray edges seen since the last call.
    pub fn take_stray_edges(&self) -> u32 {
        self.stray_edges.swap(0, Ordering::Relaxed)
    }
}

impl Default for EchoCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_from_level() {
        assert_eq!(Edge::from_level(true), Edge::Rising);
        assert_eq!(Edge::from_level(false), Edge::Falling);
    }

    #[test]
    fn nothing_before_arm() {
        let cap = EchoCapture::new();
        cap.on_edge(Edge::Rising, 100);
        cap.on_edge(Edge::Falling, 200);
        assert!(!cap.is_complete());
        assert_eq!(cap.take(), None);
        assert_eq!(cap.take_stray_edges(), 0);
    }

    #[test]
    fn rising_then_falling_completes() {
        let cap = EchoCapture::new();
        cap.arm();
        cap.on_edge(Edge::Rising, 1_000);
        assert!(!cap.is_complete());
        cap.on_edge(Edge::Falling, 2_000);
        assert!(cap.is_complete());

        let pulse = cap.take().unwrap();
        assert_eq!(pulse.rising_us, 1_000);
        assert_eq!(pulse.falling_us, 2_000);
        assert_eq!(pulse.width_us(), 1_000);
    }

    #[test]
    fn take_is_exactly_once() {
        let cap = EchoCapture::new();
        cap.arm();
        cap.on_edge(Edge::Rising, 10);
        cap.on_edge(Edge::Falling, 20);
        assert!(cap.take().is_some());
        assert!(cap.take().is_none());
        assert!(!cap.is_complete());
    }

    #[test]
    fn arm_clears_pending_pair() {
        let cap = EchoCapture::new();
        cap.arm();
        cap.on_edge(Edge::Rising, 10);
        cap.on_edge(Edge::Falling, 20);
        cap.arm();
        assert!(!cap.is_complete());
        assert!(cap.take().is_none());
    }

    #[test]
    fn falling_without_rising_is_stray() {
        let cap = EchoCapture::new();
        cap.arm();
        cap.on_edge(Edge::Falling, 50);
        assert!(!cap.is_complete());
        assert_eq!(cap.take_stray_edges(), 1);

        // The following real pulse is still captured
        cap.on_edge(Edge::Rising, 100);
        cap.on_edge(Edge::Falling, 400);
        assert_eq!(cap.take().unwrap().width_us(), 300);
    }

    #[test]
    fn second_pulse_cannot_overwrite_pending_pair() {
        let cap = EchoCapture::new();
        cap.arm();
        cap.on_edge(Edge::Rising, 1_000);
        cap.on_edge(Edge::Falling, 2_000);
        // Unrelated pulse arrives before the control loop consumes the pair
        cap.on_edge(Edge::Rising, 2_500);
        cap.on_edge(Edge::Falling, 2_600);

        let pulse = cap.take().unwrap();
        assert_eq!(pulse.rising_us, 1_000);
        assert_eq!(pulse.falling_us, 2_000);
        assert_eq!(cap.take_stray_edges(), 2);
        assert_eq!(cap.take_stray_edges(), 0);
    }

    #[test]
    fn repeated_rising_restarts_pulse() {
        let cap = EchoCapture::new();
        cap.arm();
        cap.on_edge(Edge::Rising, 100);
        cap.on_edge(Edge::Rising, 150);
        cap.on_edge(Edge::Falling, 400);
        assert_eq!(cap.take().unwrap().rising_us, 150);
    }

    #[test]
    fn width_across_timer_wrap() {
        let pulse = EchoPulse {
            rising_us: u32::MAX - 99,
            falling_us: 900,
        };
        assert_eq!(pulse.width_us(), 1_000);
    }
}
