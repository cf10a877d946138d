use serde::{Deserialize, Serialize};

use crate::tracker::{FeatureUsage, ResetEvent};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRequest {
    pub feature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumeResponse {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_in_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    pub limited: bool,
    pub remaining: u32,
    pub reset_in_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetUsageResponse {
    pub usage: FeatureUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamFilter {
    #[serde(default)]
    pub feature: Option<String>,
}

impl StreamFilter {
    pub fn matches(&self, event: &ResetEvent) -> bool {
        match &self.feature {
            Some(feature) => event.feature == *feature,
            None => true,
        }
    }
}
