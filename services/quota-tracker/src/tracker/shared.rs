use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};

use super::error::QuotaError;
use super::manager::QuotaTracker;
use super::metrics::{FeatureUsage, ResetEvent, UsageReport};

/// Outcome of a gated consume, computed under a single lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_in_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub limited: bool,
    pub remaining: u32,
    pub reset_in_ms: u64,
}

/// The process-wide tracker instance. Cloning shares the same window state,
/// so construct one at startup and hand clones to every consumer.
#[derive(Clone)]
pub struct SharedQuotaTracker {
    inner: Arc<Mutex<QuotaTracker>>,
    clock: Arc<dyn Clock>,
}

impl SharedQuotaTracker {
    pub fn new(tracker: QuotaTracker) -> Self {
        Self::with_clock(tracker, Arc::new(SystemClock))
    }

    pub fn with_clock(tracker: QuotaTracker, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tracker)),
            clock,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn try_consume(&self, feature: &str) -> Result<ConsumeDecision, QuotaError> {
        let now = self.now_ms();
        let mut tracker = self.lock();
        let allowed = tracker.try_consume(feature, now)?;
        Ok(ConsumeDecision {
            allowed,
            remaining: tracker.remaining_allowance(feature, now)?,
            reset_in_ms: tracker.time_until_reset(feature, now)?,
        })
    }

    pub fn record_usage(&self, feature: &str) -> Result<(), QuotaError> {
        let now = self.now_ms();
        self.lock().record_usage(feature, now)
    }

    pub fn status(&self, feature: &str) -> Result<QuotaStatus, QuotaError> {
        let now = self.now_ms();
        let mut tracker = self.lock();
        Ok(QuotaStatus {
            limited: tracker.is_limited(feature, now)?,
            remaining: tracker.remaining_allowance(feature, now)?,
            reset_in_ms: tracker.time_until_reset(feature, now)?,
        })
    }

    pub fn usage(&self, feature: &str) -> Result<FeatureUsage, QuotaError> {
        let now = self.now_ms();
        self.lock().usage(feature, now)
    }

    pub fn report(&self) -> UsageReport {
        let now = self.now_ms();
        self.lock().report(now)
    }

    pub fn features(&self) -> Vec<String> {
        self.lock().features()
    }

    /// Callbacks run inside [`SharedQuotaTracker::tick`] with the tracker
    /// locked; they must not call back into this handle.
    pub fn on_reset<F>(&self, feature: &str, callback: F) -> Result<(), QuotaError>
    where
        F: FnMut(&ResetEvent) + Send + 'static,
    {
        self.lock().on_reset(feature, callback)
    }

    pub fn tick(&self) -> Vec<ResetEvent> {
        let now = self.now_ms();
        self.lock().tick(now)
    }

    pub fn start_ticker(&self, period: Duration) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let fired = tracker.tick();
                if !fired.is_empty() {
                    debug!(restored = fired.len(), "quota tick restored features");
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, QuotaTracker> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("quota tracker lock poisoned by a panicking reset callback; continuing");
            poisoned.into_inner()
        })
    }
}
