use std::env;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::tracker::{DEFAULT_TICK_INTERVAL_MS, DEFAULT_WARNING_THRESHOLD_PERCENT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    pub max_events: u32,
    pub window_ms: u64,
}

impl FeatureConfig {
    pub fn new(name: &str, label: &str, max_events: u32, window_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            label: Some(label.to_string()),
            max_events,
            window_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaServiceConfig {
    pub server_host: String,
    pub server_port: u16,
    pub tick_interval_ms: u64,
    pub warning_threshold_percent: f64,
    pub features: Vec<FeatureConfig>,
    pub log_level: String,
}

impl Default for QuotaServiceConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 8184,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            warning_threshold_percent: DEFAULT_WARNING_THRESHOLD_PERCENT,
            features: default_features(),
            log_level: "info".to_string(),
        }
    }
}

/// Limits for the AI-backed study features.
pub fn default_features() -> Vec<FeatureConfig> {
    vec![
        FeatureConfig::new("tutor", "AI Tutor", 15, 60_000),
        FeatureConfig::new("exam", "Mock Exam", 5, 300_000),
        FeatureConfig::new("review", "Spaced Review", 10, 300_000),
        FeatureConfig::new("adaptive", "Adaptive AI", 10, 300_000),
    ]
}

impl QuotaServiceConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(host) = env::var("QUOTA_HOST") {
            if !host.trim().is_empty() {
                cfg.server_host = host;
            }
        }
        if let Ok(port) = env::var("QUOTA_PORT") {
            cfg.server_port = port.parse().context("QUOTA_PORT must be a valid u16")?;
        }
        if let Ok(interval) = env::var("TICK_INTERVAL_MS") {
            cfg.tick_interval_ms = interval
                .parse()
                .context("TICK_INTERVAL_MS must be a positive integer")?;
        }
        if let Ok(threshold) = env::var("WARNING_THRESHOLD_PERCENT") {
            cfg.warning_threshold_percent = threshold
                .parse()
                .context("WARNING_THRESHOLD_PERCENT must be a number")?;
        }
        if let Ok(path) = env::var("QUOTA_FEATURES_FILE") {
            cfg.features = load_features_file(Path::new(&path))?;
        }
        if let Ok(inline) = env::var("QUOTA_FEATURES") {
            for feature in parse_feature_list(&inline)? {
                upsert_feature(&mut cfg.features, feature);
            }
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            if !level.trim().is_empty() {
                cfg.log_level = level;
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.features.is_empty() {
            anyhow::bail!("at least one feature quota must be configured");
        }
        for feature in &self.features {
            if feature.name.trim().is_empty() {
                anyhow::bail!("feature names cannot be empty");
            }
            if feature.max_events == 0 {
                anyhow::bail!("feature {} must allow at least one event", feature.name);
            }
            if feature.window_ms == 0 {
                anyhow::bail!("feature {} window must be greater than zero", feature.name);
            }
        }
        if self.tick_interval_ms == 0 {
            anyhow::bail!("TICK_INTERVAL_MS must be greater than zero");
        }
        if !(self.warning_threshold_percent > 0.0 && self.warning_threshold_percent <= 100.0) {
            anyhow::bail!("WARNING_THRESHOLD_PERCENT must be in (0, 100]");
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

/// Reads a JSON array of feature quotas.
pub fn load_features_file(path: &Path) -> Result<Vec<FeatureConfig>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("unable to read feature file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("feature file {} is not a valid quota table", path.display()))
}

/// Parses `name=max/window_ms` entries separated by commas.
pub fn parse_feature_list(value: &str) -> Result<Vec<FeatureConfig>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_feature_entry)
        .collect()
}

fn parse_feature_entry(entry: &str) -> Result<FeatureConfig> {
    let (name, limit) = entry
        .split_once('=')
        .ok_or_else(|| anyhow!("feature quota '{entry}' must look like name=max/window_ms"))?;
    let (max, window) = limit
        .split_once('/')
        .ok_or_else(|| anyhow!("feature quota '{entry}' is missing /window_ms"))?;

    Ok(FeatureConfig {
        name: name.trim().to_string(),
        label: None,
        max_events: max
            .trim()
            .parse()
            .with_context(|| format!("invalid max events in '{entry}'"))?,
        window_ms: window
            .trim()
            .parse()
            .with_context(|| format!("invalid window in '{entry}'"))?,
    })
}

fn upsert_feature(features: &mut Vec<FeatureConfig>, mut feature: FeatureConfig) {
    match features.iter_mut().find(|f| f.name == feature.name) {
        Some(existing) => {
            if feature.label.is_none() {
                feature.label = existing.label.take();
            }
            *existing = feature;
        }
        None => features.push(feature),
    }
}
