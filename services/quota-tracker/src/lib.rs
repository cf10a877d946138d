pub mod api;
pub mod client;
pub mod clock;
pub mod config;
pub mod gate;
pub mod tracker;

pub use api::{create_router, ApiState};
pub use client::{ClientError, QuotaClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{default_features, FeatureConfig, QuotaServiceConfig};
pub use gate::{rate_limit_message, GateOutcome, QuotaGate};
pub use tracker::{
    ConsumeDecision, FeatureLimit, FeatureUsage, QuotaError, QuotaStatus, QuotaTracker,
    ResetEvent, SharedQuotaTracker, UsageReport, UsageStatus,
};
