use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use tracing::{debug, info};

use crate::config::FeatureConfig;

use super::error::QuotaError;
use super::metrics::{usage_percentage, FeatureUsage, ResetEvent, UsageReport, UsageStatus};
use super::DEFAULT_WARNING_THRESHOLD_PERCENT;

pub type ResetCallback = Box<dyn FnMut(&ResetEvent) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureLimit {
    pub max_events: u32,
    pub window_ms: u64,
}

impl FeatureLimit {
    pub fn new(feature: &str, max_events: u32, window_ms: u64) -> Result<Self, QuotaError> {
        if max_events == 0 {
            return Err(QuotaError::InvalidLimit {
                feature: feature.to_string(),
                reason: "max_events must be at least 1".into(),
            });
        }
        if window_ms == 0 {
            return Err(QuotaError::InvalidLimit {
                feature: feature.to_string(),
                reason: "window_ms must be at least 1".into(),
            });
        }
        Ok(Self {
            max_events,
            window_ms,
        })
    }
}

struct FeatureState {
    limit: FeatureLimit,
    label: Option<String>,
    // Ascending; ties keep insertion order.
    events: VecDeque<u64>,
    was_at_limit: bool,
    callbacks: Vec<ResetCallback>,
}

impl FeatureState {
    fn new(limit: FeatureLimit) -> Self {
        Self {
            limit,
            label: None,
            events: VecDeque::new(),
            was_at_limit: false,
            callbacks: Vec::new(),
        }
    }

    fn prune(&mut self, now: u64) -> usize {
        let mut removed = 0;
        while let Some(&oldest) = self.events.front() {
            // A timestamp ahead of `now` means the clock moved backwards; it stays counted.
            match now.checked_sub(oldest) {
                Some(age) if age >= self.limit.window_ms => {
                    self.events.pop_front();
                    removed += 1;
                }
                _ => break,
            }
        }
        removed
    }

    fn append(&mut self, now: u64) {
        let idx = self.events.partition_point(|&ts| ts <= now);
        self.events.insert(idx, now);
        self.was_at_limit |= self.is_limited();
    }

    fn used(&self) -> u32 {
        u32::try_from(self.events.len()).unwrap_or(u32::MAX)
    }

    fn is_limited(&self) -> bool {
        self.used() >= self.limit.max_events
    }

    fn remaining(&self) -> u32 {
        self.limit.max_events.saturating_sub(self.used())
    }

    fn time_until_reset(&self, now: u64) -> u64 {
        if !self.is_limited() {
            return 0;
        }
        match self.events.front() {
            Some(&oldest) => self
                .limit
                .window_ms
                .saturating_sub(now.saturating_sub(oldest)),
            None => 0,
        }
    }
}

/// Sliding-window usage tracker keyed by feature name.
///
/// Every feature must be registered with [`QuotaTracker::configure`] before
/// use. All operations take the evaluation instant explicitly and prune
/// expired events before reading or writing, so the retained log length is
/// always the current usage count.
pub struct QuotaTracker {
    features: BTreeMap<String, FeatureState>,
    warning_threshold_percent: f64,
}

impl Default for QuotaTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for QuotaTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuotaTracker")
            .field("features", &self.features.keys().collect::<Vec<_>>())
            .field("warning_threshold_percent", &self.warning_threshold_percent)
            .finish()
    }
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self {
            features: BTreeMap::new(),
            warning_threshold_percent: DEFAULT_WARNING_THRESHOLD_PERCENT,
        }
    }

    pub fn from_features(features: &[FeatureConfig]) -> Result<Self, QuotaError> {
        let mut tracker = Self::new();
        for feature in features {
            tracker.configure(&feature.name, feature.max_events, feature.window_ms)?;
            if let Some(label) = &feature.label {
                tracker.set_label(&feature.name, label)?;
            }
        }
        Ok(tracker)
    }

    pub fn with_warning_threshold(mut self, percent: f64) -> Self {
        self.warning_threshold_percent = percent;
        self
    }

    /// Registers or replaces the limit for `feature`. Existing events are kept
    /// and judged against the new limit on the next access.
    pub fn configure(
        &mut self,
        feature: &str,
        max_events: u32,
        window_ms: u64,
    ) -> Result<(), QuotaError> {
        if feature.trim().is_empty() {
            return Err(QuotaError::InvalidLimit {
                feature: feature.to_string(),
                reason: "feature name cannot be empty".into(),
            });
        }
        let limit = FeatureLimit::new(feature, max_events, window_ms)?;

        match self.features.get_mut(feature) {
            Some(state) => {
                debug!(
                    feature,
                    old_max = state.limit.max_events,
                    old_window_ms = state.limit.window_ms,
                    max_events,
                    window_ms,
                    "replacing feature quota"
                );
                state.limit = limit;
            }
            None => {
                self.features
                    .insert(feature.to_string(), FeatureState::new(limit));
            }
        }
        Ok(())
    }

    pub fn set_label(&mut self, feature: &str, label: &str) -> Result<(), QuotaError> {
        self.state_mut(feature)?.label = Some(label.to_string());
        Ok(())
    }

    pub fn limit(&self, feature: &str) -> Result<FeatureLimit, QuotaError> {
        self.state(feature).map(|state| state.limit)
    }

    pub fn features(&self) -> Vec<String> {
        self.features.keys().cloned().collect()
    }

    /// Drops events that have aged out of the window. Returns how many were removed.
    pub fn prune(&mut self, feature: &str, now: u64) -> Result<usize, QuotaError> {
        Ok(self.state_mut(feature)?.prune(now))
    }

    pub fn is_limited(&mut self, feature: &str, now: u64) -> Result<bool, QuotaError> {
        let state = self.pruned(feature, now)?;
        Ok(state.is_limited())
    }

    pub fn remaining_allowance(&mut self, feature: &str, now: u64) -> Result<u32, QuotaError> {
        let state = self.pruned(feature, now)?;
        Ok(state.remaining())
    }

    /// Milliseconds until the oldest counted event leaves the window, or 0
    /// when the feature is not limited.
    pub fn time_until_reset(&mut self, feature: &str, now: u64) -> Result<u64, QuotaError> {
        let state = self.pruned(feature, now)?;
        Ok(state.time_until_reset(now))
    }

    /// Takes one slot if the feature is under its limit. A rejected attempt
    /// leaves the log untouched.
    pub fn try_consume(&mut self, feature: &str, now: u64) -> Result<bool, QuotaError> {
        let state = self.pruned(feature, now)?;
        if state.is_limited() {
            debug!(
                feature,
                used = state.used(),
                max_events = state.limit.max_events,
                "quota exhausted"
            );
            return Ok(false);
        }
        state.append(now);
        Ok(true)
    }

    /// Appends an event without checking the limit.
    pub fn record_usage(&mut self, feature: &str, now: u64) -> Result<(), QuotaError> {
        self.pruned(feature, now)?.append(now);
        Ok(())
    }

    pub fn on_reset<F>(&mut self, feature: &str, callback: F) -> Result<(), QuotaError>
    where
        F: FnMut(&ResetEvent) + Send + 'static,
    {
        self.state_mut(feature)?.callbacks.push(Box::new(callback));
        Ok(())
    }

    /// Periodic evaluation. Fires reset callbacks for every feature that was
    /// at its limit on the previous evaluation and no longer is.
    pub fn tick(&mut self, now: u64) -> Vec<ResetEvent> {
        let mut fired = Vec::new();

        for (name, state) in self.features.iter_mut() {
            state.prune(now);
            let limited = state.is_limited();

            if state.was_at_limit && !limited {
                let event = ResetEvent::new(name, state.remaining(), now);
                for callback in state.callbacks.iter_mut() {
                    callback(&event);
                }
                info!(
                    feature = %event.feature,
                    remaining = event.remaining,
                    "feature quota available again"
                );
                fired.push(event);
            }

            state.was_at_limit = limited;
        }

        fired
    }

    pub fn usage(&mut self, feature: &str, now: u64) -> Result<FeatureUsage, QuotaError> {
        let threshold = self.warning_threshold_percent;
        let state = self.pruned(feature, now)?;
        Ok(snapshot(feature, state, now, threshold))
    }

    pub fn report(&mut self, now: u64) -> UsageReport {
        let threshold = self.warning_threshold_percent;
        let features = self
            .features
            .iter_mut()
            .map(|(name, state)| {
                state.prune(now);
                snapshot(name, state, now, threshold)
            })
            .collect();
        UsageReport::from_features(now, features)
    }

    /// Retained timestamps for `feature`, oldest first. Does not prune.
    pub fn events(&self, feature: &str) -> Result<Vec<u64>, QuotaError> {
        Ok(self.state(feature)?.events.iter().copied().collect())
    }

    fn state(&self, feature: &str) -> Result<&FeatureState, QuotaError> {
        self.features
            .get(feature)
            .ok_or_else(|| QuotaError::UnknownFeature(feature.to_string()))
    }

    fn state_mut(&mut self, feature: &str) -> Result<&mut FeatureState, QuotaError> {
        self.features
            .get_mut(feature)
            .ok_or_else(|| QuotaError::UnknownFeature(feature.to_string()))
    }

    fn pruned(&mut self, feature: &str, now: u64) -> Result<&mut FeatureState, QuotaError> {
        let state = self.state_mut(feature)?;
        state.prune(now);
        Ok(state)
    }
}

fn snapshot(name: &str, state: &FeatureState, now: u64, threshold: f64) -> FeatureUsage {
    let used = state.used();
    let percentage = usage_percentage(u64::from(used), u64::from(state.limit.max_events));

    FeatureUsage {
        feature: name.to_string(),
        label: state.label.clone().unwrap_or_else(|| name.to_string()),
        used,
        max_events: state.limit.max_events,
        remaining: state.remaining(),
        window_ms: state.limit.window_ms,
        window_minutes: state.limit.window_ms / 60_000,
        percentage,
        status: UsageStatus::from_percentage(percentage, threshold),
        reset_in_ms: state.time_until_reset(now),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn tracker_with(feature: &str, max: u32, window: u64) -> QuotaTracker {
        let mut tracker = QuotaTracker::new();
        tracker.configure(feature, max, window).unwrap();
        tracker
    }

    #[test]
    fn test_exhausts_at_same_instant() {
        let mut tracker = tracker_with("tutor", 15, 60_000);
        for _ in 0..15 {
            assert!(tracker.try_consume("tutor", 42).unwrap());
        }
        assert!(!tracker.try_consume("tutor", 42).unwrap());
        assert_eq!(tracker.remaining_allowance("tutor", 42).unwrap(), 0);
        assert_eq!(tracker.events("tutor").unwrap().len(), 15);
    }

    #[test]
    fn test_sliding_window() {
        let mut tracker = tracker_with("chat", 3, 1000);
        assert!(tracker.try_consume("chat", 0).unwrap());
        assert!(tracker.try_consume("chat", 100).unwrap());
        assert!(tracker.try_consume("chat", 200).unwrap());

        assert!(!tracker.try_consume("chat", 999).unwrap());

        // the t=0 event has aged out, freeing exactly one slot
        assert_eq!(tracker.remaining_allowance("chat", 1001).unwrap(), 1);
        assert!(tracker.try_consume("chat", 1001).unwrap());
        assert_eq!(tracker.remaining_allowance("chat", 1001).unwrap(), 0);
        assert_eq!(tracker.events("chat").unwrap(), vec![100, 200, 1001]);
    }

    #[test]
    fn test_event_on_window_boundary_is_expired() {
        let mut tracker = tracker_with("chat", 1, 1000);
        assert!(tracker.try_consume("chat", 0).unwrap());
        assert!(tracker.is_limited("chat", 999).unwrap());
        assert!(!tracker.is_limited("chat", 1000).unwrap());
    }

    #[test]
    fn test_time_until_reset() {
        let mut tracker = tracker_with("exam", 2, 1000);
        assert_eq!(tracker.time_until_reset("exam", 0).unwrap(), 0);

        tracker.try_consume("exam", 100).unwrap();
        tracker.try_consume("exam", 300).unwrap();

        assert_eq!(tracker.time_until_reset("exam", 400).unwrap(), 700);
        assert_eq!(tracker.time_until_reset("exam", 900).unwrap(), 200);
        // oldest expired, one slot free
        assert_eq!(tracker.time_until_reset("exam", 1100).unwrap(), 0);
    }

    #[test]
    fn test_prune_is_idempotent() {
        let mut tracker = tracker_with("review", 10, 500);
        for ts in [0, 100, 200, 400] {
            tracker.record_usage("review", ts).unwrap();
        }
        assert_eq!(tracker.events("review").unwrap(), vec![0, 100, 200, 400]);

        assert_eq!(tracker.prune("review", 650).unwrap(), 2);
        let once = tracker.events("review").unwrap();
        assert_eq!(tracker.prune("review", 650).unwrap(), 0);
        assert_eq!(tracker.events("review").unwrap(), once);
        assert_eq!(once, vec![200, 400]);
    }

    #[test]
    fn test_rejected_attempt_is_not_recorded() {
        let mut tracker = tracker_with("exam", 1, 1000);
        assert!(tracker.try_consume("exam", 0).unwrap());
        assert!(!tracker.try_consume("exam", 10).unwrap());
        assert_eq!(tracker.events("exam").unwrap(), vec![0]);
    }

    #[test]
    fn test_record_usage_ignores_limit() {
        let mut tracker = tracker_with("adaptive", 1, 1000);
        tracker.record_usage("adaptive", 0).unwrap();
        tracker.record_usage("adaptive", 1).unwrap();
        assert_eq!(tracker.events("adaptive").unwrap().len(), 2);
        assert_eq!(tracker.remaining_allowance("adaptive", 2).unwrap(), 0);
    }

    #[test]
    fn test_unknown_feature_is_rejected() {
        let mut tracker = QuotaTracker::new();
        let err = tracker.try_consume("missing", 0).unwrap_err();
        assert_eq!(err, QuotaError::UnknownFeature("missing".into()));
        assert!(tracker.is_limited("missing", 0).is_err());
        assert!(tracker.remaining_allowance("missing", 0).is_err());
        assert!(tracker.time_until_reset("missing", 0).is_err());
        assert!(tracker.on_reset("missing", |_| {}).is_err());
    }

    #[test]
    fn test_invalid_limits() {
        let mut tracker = QuotaTracker::new();
        assert!(matches!(
            tracker.configure("tutor", 0, 1000),
            Err(QuotaError::InvalidLimit { .. })
        ));
        assert!(matches!(
            tracker.configure("tutor", 1, 0),
            Err(QuotaError::InvalidLimit { .. })
        ));
        assert!(matches!(
            tracker.configure("  ", 1, 1),
            Err(QuotaError::InvalidLimit { .. })
        ));
        assert!(tracker.features().is_empty());
    }

    #[test]
    fn test_reconfigure_keeps_backlog() {
        let mut tracker = tracker_with("tutor", 5, 10_000);
        for ts in 0..4 {
            assert!(tracker.try_consume("tutor", ts).unwrap());
        }

        tracker.configure("tutor", 2, 10_000).unwrap();
        assert_eq!(tracker.events("tutor").unwrap().len(), 4);
        assert!(tracker.is_limited("tutor", 10).unwrap());
        assert_eq!(tracker.remaining_allowance("tutor", 10).unwrap(), 0);
        assert_eq!(
            tracker.limit("tutor").unwrap(),
            FeatureLimit {
                max_events: 2,
                window_ms: 10_000
            }
        );
    }

    #[test]
    fn test_clock_rollback_keeps_future_events() {
        let mut tracker = tracker_with("tutor", 2, 1000);
        assert!(tracker.try_consume("tutor", 1000).unwrap());

        assert_eq!(tracker.prune("tutor", 500).unwrap(), 0);
        assert_eq!(tracker.remaining_allowance("tutor", 500).unwrap(), 1);

        assert!(tracker.try_consume("tutor", 500).unwrap());
        assert_eq!(tracker.events("tutor").unwrap(), vec![500, 1000]);
        assert!(tracker.is_limited("tutor", 500).unwrap());
        assert_eq!(tracker.time_until_reset("tutor", 500).unwrap(), 1000);

        // 500 ages out first, then 1000
        assert_eq!(tracker.remaining_allowance("tutor", 1500).unwrap(), 1);
        assert_eq!(tracker.remaining_allowance("tutor", 2000).unwrap(), 2);
    }

    #[test]
    fn test_reset_fires_once_per_transition() {
        let mut tracker = tracker_with("exam", 2, 1000);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        tracker
            .on_reset("exam", move |event| sink.lock().unwrap().push(event.remaining))
            .unwrap();

        tracker.try_consume("exam", 0).unwrap();
        tracker.try_consume("exam", 0).unwrap();

        assert!(tracker.tick(500).is_empty());
        let mut fired = 0;
        for now in (1000..5000).step_by(250) {
            fired += tracker.tick(now).len();
        }

        assert_eq!(fired, 1);
        assert_eq!(*seen.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_reset_fires_again_after_second_exhaustion() {
        let mut tracker = tracker_with("exam", 1, 100);
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        tracker
            .on_reset("exam", move |_| *sink.lock().unwrap() += 1)
            .unwrap();

        tracker.try_consume("exam", 0).unwrap();
        tracker.tick(50);
        tracker.tick(150);
        tracker.try_consume("exam", 200).unwrap();
        tracker.tick(250);
        tracker.tick(350);
        tracker.tick(450);

        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn test_no_reset_without_reaching_limit() {
        let mut tracker = tracker_with("review", 3, 100);
        tracker.try_consume("review", 0).unwrap();
        tracker.tick(10);
        assert!(tracker.tick(200).is_empty());
    }

    #[test]
    fn test_usage_snapshot() {
        let mut tracker = tracker_with("review", 10, 300_000).with_warning_threshold(80.0);
        tracker.set_label("review", "Spaced Review").unwrap();
        for _ in 0..8 {
            tracker.try_consume("review", 0).unwrap();
        }

        let usage = tracker.usage("review", 1).unwrap();
        assert_eq!(usage.label, "Spaced Review");
        assert_eq!(usage.used, 8);
        assert_eq!(usage.remaining, 2);
        assert_eq!(usage.window_minutes, 5);
        assert_eq!(usage.percentage, 80.0);
        assert_eq!(usage.status, UsageStatus::Warning);
        assert_eq!(usage.reset_in_ms, 0);
    }

    #[test]
    fn test_report_totals() {
        let mut tracker = QuotaTracker::new();
        tracker.configure("tutor", 15, 60_000).unwrap();
        tracker.configure("exam", 5, 300_000).unwrap();
        for _ in 0..5 {
            tracker.try_consume("exam", 0).unwrap();
        }
        tracker.try_consume("tutor", 0).unwrap();

        let report = tracker.report(10);
        assert_eq!(report.total_used, 6);
        assert_eq!(report.total_max, 20);
        assert_eq!(report.overall_percentage, 30.0);
        assert_eq!(report.features.len(), 2);

        let exam = report.feature("exam").unwrap();
        assert!(exam.is_limited());
        assert_eq!(exam.reset_in_ms, 299_990);
        assert_eq!(exam.label, "exam");
    }
}
