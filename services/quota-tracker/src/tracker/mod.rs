pub mod error;
pub mod manager;
pub mod metrics;
pub mod shared;

pub use error::QuotaError;
pub use manager::{FeatureLimit, QuotaTracker, ResetCallback};
pub use metrics::{FeatureUsage, ResetEvent, UsageReport, UsageStatus};
pub use shared::{ConsumeDecision, QuotaStatus, SharedQuotaTracker};

pub const DEFAULT_WARNING_THRESHOLD_PERCENT: f64 = 80.0;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
