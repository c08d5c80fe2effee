//! Clock offset estimation.
//!
//! The server half is a stateless echo of server time: a `sync-ping` carrying
//! the client's send time `t0` is answered with a `sync-pong` carrying the
//! server's wall clock `t1`. `t0` is not echoed back and requests are not
//! correlated, so a client must keep at most one ping outstanding. Pipelined
//! pings cannot be matched to their pongs.
//!
//! The client half is reproduced in [`ClockSample::estimate`] so both sides
//! share one definition of the midpoint calculation.

use std::fmt;
use std::sync::Arc;

/// Source of server wall-clock time in Unix epoch milliseconds.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Answers clock sync pings for every connection.
#[derive(Debug, Clone)]
pub struct ClockSync {
    clock: Arc<dyn Clock>,
}

impl ClockSync {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Current server timestamp to send back as the `sync-pong` payload.
    pub fn respond_to_ping(&self) -> i64 {
        self.clock.now_millis()
    }
}

impl Default for ClockSync {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

/// One completed ping/pong exchange as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSample {
    /// Client clock when the ping was sent.
    pub t0: f64,
    /// Server clock carried by the pong.
    pub t1: f64,
}

/// Result of [`ClockSample::estimate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetEstimate {
    pub rtt: f64,
    /// Server clock minus client clock, assuming symmetric network delay.
    pub offset: f64,
}

impl ClockSample {
    pub fn new(t0: f64, t1: f64) -> Self {
        Self { t0, t1 }
    }

    /// Estimate round trip and offset given the client clock at pong receipt.
    pub fn estimate(&self, received_at: f64) -> OffsetEstimate {
        let rtt = received_at - self.t0;
        OffsetEstimate {
            rtt,
            offset: self.t1 - (self.t0 + rtt / 2.0),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Manually driven clock for deterministic tests.
    #[derive(Debug, Default)]
    pub(crate) struct ManualClock(AtomicI64);

    impl ManualClock {
        pub(crate) fn at(millis: i64) -> Self {
            Self(AtomicI64::new(millis))
        }

        pub(crate) fn advance(&self, millis: i64) {
            self.0.fetch_add(millis, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_millis(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_offset_estimate_midpoint() {
        let estimate = ClockSample::new(1000.0, 1060.0).estimate(1100.0);
        assert_eq!(estimate.rtt, 100.0);
        assert_eq!(estimate.offset, 10.0);
    }

    #[test]
    fn test_offset_negative_when_server_behind() {
        let estimate = ClockSample::new(5000.0, 4000.0).estimate(5200.0);
        assert_eq!(estimate.rtt, 200.0);
        assert_eq!(estimate.offset, -1100.0);
    }

    #[test]
    fn test_respond_to_ping_reads_clock() {
        let clock = Arc::new(ManualClock::at(1060));
        let sync = ClockSync::new(clock.clone());
        assert_eq!(sync.respond_to_ping(), 1060);

        clock.advance(15);
        assert_eq!(sync.respond_to_ping(), 1075);
    }

    #[test]
    fn test_system_clock_is_epoch_millis() {
        let now = ClockSync::default().respond_to_ping();
        // 2020-01-01T00:00:00Z
        assert!(now > 1_577_836_800_000);
    }
}
