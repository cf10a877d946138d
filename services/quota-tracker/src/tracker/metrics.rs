use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus {
    Available,
    Warning,
    Limited,
}

impl UsageStatus {
    pub fn from_percentage(percentage: f64, warning_threshold_percent: f64) -> Self {
        if percentage >= 100.0 {
            UsageStatus::Limited
        } else if percentage >= warning_threshold_percent {
            UsageStatus::Warning
        } else {
            UsageStatus::Available
        }
    }
}

/// Point-in-time view of one feature's window, as shown on a usage dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureUsage {
    pub feature: String,
    pub label: String,
    pub used: u32,
    pub max_events: u32,
    pub remaining: u32,
    pub window_ms: u64,
    pub window_minutes: u64,
    pub percentage: f64,
    pub status: UsageStatus,
    pub reset_in_ms: u64,
}

impl FeatureUsage {
    pub fn is_limited(&self) -> bool {
        self.status == UsageStatus::Limited
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    pub generated_at_ms: u64,
    pub total_used: u64,
    pub total_max: u64,
    pub overall_percentage: f64,
    pub features: Vec<FeatureUsage>,
}

impl UsageReport {
    pub fn from_features(generated_at_ms: u64, features: Vec<FeatureUsage>) -> Self {
        let total_used = features.iter().map(|f| u64::from(f.used)).sum();
        let total_max = features.iter().map(|f| u64::from(f.max_events)).sum();

        Self {
            generated_at_ms,
            total_used,
            total_max,
            overall_percentage: usage_percentage(total_used, total_max),
            features,
        }
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureUsage> {
        self.features.iter().find(|f| f.feature == name)
    }
}

/// Fired once when a feature leaves the limited state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetEvent {
    pub feature: String,
    pub remaining: u32,
    pub at_ms: u64,
    pub at: DateTime<Utc>,
}

impl ResetEvent {
    pub fn new(feature: &str, remaining: u32, at_ms: u64) -> Self {
        let at = i64::try_from(at_ms)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_default();
        Self {
            feature: feature.to_string(),
            remaining,
            at_ms,
            at,
        }
    }
}

/// `used / max` as a percentage, capped at 100.
pub fn usage_percentage(used: u64, max: u64) -> f64 {
    if max == 0 {
        return 0.0;
    }
    (used as f64 * 100.0 / max as f64).min(100.0)
}
