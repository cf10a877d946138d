use std::future::Future;

use tracing::info;

use crate::tracker::{QuotaError, SharedQuotaTracker};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome<T> {
    Completed(T),
    RateLimited {
        feature: String,
        retry_after_ms: u64,
        message: String,
    },
}

impl<T> GateOutcome<T> {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GateOutcome::RateLimited { .. })
    }

    pub fn completed(self) -> Option<T> {
        match self {
            GateOutcome::Completed(value) => Some(value),
            GateOutcome::RateLimited { .. } => None,
        }
    }
}

/// Runs actions behind a feature quota. The slot is taken before the action
/// starts and stays counted even if the action fails.
#[derive(Clone)]
pub struct QuotaGate {
    tracker: SharedQuotaTracker,
}

impl QuotaGate {
    pub fn new(tracker: SharedQuotaTracker) -> Self {
        Self { tracker }
    }

    pub async fn run<F, Fut, T>(&self, feature: &str, action: F) -> Result<GateOutcome<T>, QuotaError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let decision = self.tracker.try_consume(feature)?;
        if !decision.allowed {
            info!(
                feature,
                retry_after_ms = decision.reset_in_ms,
                "gated action rejected"
            );
            return Ok(GateOutcome::RateLimited {
                feature: feature.to_string(),
                retry_after_ms: decision.reset_in_ms,
                message: rate_limit_message(decision.reset_in_ms),
            });
        }

        Ok(GateOutcome::Completed(action().await))
    }
}

/// User-facing wait message, rounded up to whole seconds.
pub fn rate_limit_message(retry_after_ms: u64) -> String {
    let seconds = retry_after_ms.div_ceil(1000);
    format!("Rate limit exceeded. Please wait {seconds} seconds.")
}
