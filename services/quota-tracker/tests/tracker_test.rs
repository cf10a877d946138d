use std::sync::{Arc, Mutex};

use study_quota_tracker::{default_features, QuotaError, QuotaTracker, UsageStatus};

#[test]
fn test_exam_quota_scenario() {
    let mut tracker = QuotaTracker::new();
    tracker.configure("exam", 5, 300_000).unwrap();

    for _ in 0..5 {
        assert!(tracker.try_consume("exam", 0).unwrap());
    }
    assert!(!tracker.try_consume("exam", 0).unwrap());
    assert_eq!(tracker.time_until_reset("exam", 0).unwrap(), 300_000);
    assert!(!tracker.is_limited("exam", 300_000).unwrap());
}

#[test]
fn test_time_until_reset_decreases() {
    let mut tracker = QuotaTracker::new();
    tracker.configure("tutor", 3, 60_000).unwrap();
    for ts in [1_000, 2_000, 3_000] {
        assert!(tracker.try_consume("tutor", ts).unwrap());
    }

    let mut previous = u64::MAX;
    for now in (3_000..61_000).step_by(1_000) {
        let wait = tracker.time_until_reset("tutor", now).unwrap();
        assert_eq!(wait, 60_000 - (now - 1_000));
        assert!(wait < previous);
        previous = wait;
    }
    assert_eq!(tracker.time_until_reset("tutor", 61_000).unwrap(), 0);
}

#[test]
fn test_clock_rollback_does_not_inflate_allowance() {
    let mut tracker = QuotaTracker::new();
    tracker.configure("review", 1, 10_000).unwrap();
    assert!(tracker.try_consume("review", 1_000).unwrap());

    assert_eq!(tracker.events("review").unwrap(), vec![1_000]);
    assert!(tracker.is_limited("review", 500).unwrap());
    assert_eq!(tracker.remaining_allowance("review", 500).unwrap(), 0);
    assert!(!tracker.try_consume("review", 500).unwrap());
    assert_eq!(tracker.events("review").unwrap(), vec![1_000]);
}

#[test]
fn test_independent_trackers_do_not_share_windows() {
    let mut first = QuotaTracker::from_features(&default_features()).unwrap();
    let mut second = QuotaTracker::from_features(&default_features()).unwrap();

    for _ in 0..5 {
        assert!(first.try_consume("exam", 0).unwrap());
    }
    assert!(!first.try_consume("exam", 0).unwrap());
    assert!(second.try_consume("exam", 0).unwrap());
}

#[test]
fn test_reset_notification_across_features() {
    let mut tracker = QuotaTracker::from_features(&default_features()).unwrap();
    let restored = Arc::new(Mutex::new(Vec::new()));
    for feature in tracker.features() {
        let sink = Arc::clone(&restored);
        tracker
            .on_reset(&feature, move |event| {
                sink.lock().unwrap().push(event.feature.clone())
            })
            .unwrap();
    }

    for _ in 0..15 {
        tracker.try_consume("tutor", 0).unwrap();
    }
    for _ in 0..5 {
        tracker.try_consume("exam", 0).unwrap();
    }

    for second in 0..400 {
        tracker.tick(second * 1_000);
    }

    assert_eq!(*restored.lock().unwrap(), vec!["tutor", "exam"]);
}

#[test]
fn test_report_for_default_table() {
    let mut tracker = QuotaTracker::from_features(&default_features()).unwrap();
    for _ in 0..12 {
        tracker.try_consume("tutor", 0).unwrap();
    }

    let report = tracker.report(0);
    let tutor = report.feature("tutor").unwrap();
    assert_eq!(tutor.label, "AI Tutor");
    assert_eq!(tutor.status, UsageStatus::Warning);
    assert_eq!(tutor.window_minutes, 1);
    assert_eq!(report.total_max, 40);
    assert_eq!(report.total_used, 12);
    assert_eq!(report.overall_percentage, 30.0);

    let adaptive = report.feature("adaptive").unwrap();
    assert_eq!(adaptive.status, UsageStatus::Available);
}

#[test]
fn test_unconfigured_feature_fails_fast() {
    let mut tracker = QuotaTracker::from_features(&default_features()).unwrap();
    assert!(matches!(
        tracker.usage("summary", 0),
        Err(QuotaError::UnknownFeature(name)) if name == "summary"
    ));
}
