use std::sync::Arc;

use study_quota_tracker::{
    default_features, ManualClock, QuotaGate, QuotaTracker, SharedQuotaTracker,
};

pub use study_quota_tracker;

/// A tracker over the default feature table driven by a manual clock, so
/// benchmarks control when windows expire.
pub struct QuotaBenchFixture {
    pub tracker: SharedQuotaTracker,
    pub gate: QuotaGate,
    pub clock: ManualClock,
}

impl QuotaBenchFixture {
    pub fn new() -> Self {
        let tracker = QuotaTracker::from_features(&default_features()).expect("default features");
        let clock = ManualClock::new(0);
        let tracker = SharedQuotaTracker::with_clock(tracker, Arc::new(clock.clone()));
        Self {
            gate: QuotaGate::new(tracker.clone()),
            tracker,
            clock,
        }
    }

    /// Fills `feature` to its limit at the current clock reading.
    pub fn saturate(&self, feature: &str) {
        while self
            .tracker
            .try_consume(feature)
            .expect("configured feature")
            .allowed
        {}
    }
}

impl Default for QuotaBenchFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A bare tracker with one feature, for measuring the window bookkeeping
/// without the shared lock.
pub fn single_feature_tracker(max_events: u32, window_ms: u64) -> QuotaTracker {
    let mut tracker = QuotaTracker::new();
    tracker
        .configure("bench", max_events, window_ms)
        .expect("valid bench quota");
    tracker
}
