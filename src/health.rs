//! Relay health tracking.
//!
//! Counts requests, keeps a time-pruned log of recent errors and derives a
//! health flag from how many errors landed in the last few minutes. Pruning
//! happens inline on every recorded error and health is read straight from
//! the error timestamps; there is no background timer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::rolling_log::RollingLog;
use crate::system_log::SystemLog;

/// Errors older than this are dropped on the next write.
pub const ERROR_RETENTION_MINUTES: i64 = 60;

/// Window used to decide whether the relay is healthy.
pub const HEALTH_WINDOW_MINUTES: i64 = 5;

/// The relay is unhealthy once this many errors land inside the window.
pub const UNHEALTHY_ERROR_THRESHOLD: usize = 5;

/// Hard cap on retained error records, independent of time pruning.
pub const ERROR_LOG_CAPACITY: usize = 1000;

/// Default number of records returned by [`HealthMonitor::errors`] callers.
pub const DEFAULT_ERROR_LIMIT: usize = 50;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What went wrong, independent of where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Triage state of an error record. Records are only ever created as `New`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStatus {
    New,
}

/// A recorded failure.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub error: ErrorInfo,
    pub context: String,
    pub status: ErrorStatus,
}

/// Dashboard projection of an [`ErrorRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorView {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub status: ErrorStatus,
}

impl From<&ErrorRecord> for ErrorView {
    fn from(record: &ErrorRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            kind: record.error.kind.clone(),
            message: record.error.message.clone(),
            status: record.status,
        }
    }
}

/// Point-in-time view of request and error statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub is_healthy: bool,
    pub recent_error_count: usize,
    pub total_requests: u64,
    pub successful_requests: u64,
    /// Whole percentage, 0 when no requests have been made.
    pub success_rate: u64,
}

// ---------------------------------------------------------------------------
// HealthMonitor
// ---------------------------------------------------------------------------

/// Passive recorder of request outcomes and errors.
#[derive(Debug)]
pub struct HealthMonitor {
    total_requests: u64,
    successful_requests: u64,
    errors: RollingLog<ErrorRecord>,
    log: SystemLog,
}

impl HealthMonitor {
    /// Create a monitor that narrates errors into `log`.
    pub fn new(log: SystemLog) -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            errors: RollingLog::new(ERROR_LOG_CAPACITY),
            log,
        }
    }

    /// Count one logical request.
    pub fn record_request(&mut self, success: bool) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        }
    }

    /// Record a failure that happened now.
    pub fn record_error(&mut self, error: ErrorInfo, context: &str) {
        self.record_error_at(Utc::now(), error, context);
    }

    /// Record a failure at an explicit instant.
    pub fn record_error_at(&mut self, now: DateTime<Utc>, error: ErrorInfo, context: &str) {
        self.log
            .error(format!("{context}: {} ({})", error.message, error.kind));

        self.errors.push(ErrorRecord {
            timestamp: now,
            error,
            context: context.to_string(),
            status: ErrorStatus::New,
        });

        let cutoff = now - Duration::minutes(ERROR_RETENTION_MINUTES);
        self.errors.retain(|e| e.timestamp >= cutoff);
    }

    /// Up to `limit` most recent errors, newest first.
    pub fn errors(&self, limit: usize) -> Vec<ErrorView> {
        self.errors.iter().take(limit).map(ErrorView::from).collect()
    }

    /// Fewer than [`UNHEALTHY_ERROR_THRESHOLD`] errors in the last
    /// [`HEALTH_WINDOW_MINUTES`] minutes.
    pub fn is_healthy(&self) -> bool {
        self.is_healthy_at(Utc::now())
    }

    pub fn is_healthy_at(&self, now: DateTime<Utc>) -> bool {
        self.errors_within_window(now) < UNHEALTHY_ERROR_THRESHOLD
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        self.snapshot_at(Utc::now())
    }

    /// Derive a snapshot as seen from `now`.
    ///
    /// Both the health flag and the error count are computed from the
    /// timestamps, so records that have aged out but not yet been pruned do
    /// not count.
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> HealthSnapshot {
        let cutoff = now - Duration::minutes(ERROR_RETENTION_MINUTES);
        let recent_error_count = self
            .errors
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .count();

        HealthSnapshot {
            is_healthy: self.is_healthy_at(now),
            recent_error_count,
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            success_rate: success_rate(self.successful_requests, self.total_requests),
        }
    }

    fn errors_within_window(&self, now: DateTime<Utc>) -> usize {
        let window_start = now - Duration::minutes(HEALTH_WINDOW_MINUTES);
        self.errors
            .iter()
            .filter(|e| e.timestamp >= window_start)
            .count()
    }
}

/// `round(successful / total * 100)` in integer arithmetic, half rounding up.
pub fn success_rate(successful: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    (successful * 200 + total) / (2 * total)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system_log::LogKind;

    fn monitor() -> HealthMonitor {
        HealthMonitor::new(SystemLog::new())
    }

    fn timeout() -> ErrorInfo {
        ErrorInfo::new("timeout", "upstream timed out")
    }

    #[test]
    fn record_request_counts_total_and_success() {
        let mut health = monitor();
        health.record_request(true);
        health.record_request(false);
        health.record_request(true);

        let snap = health.snapshot();
        assert_eq!(snap.total_requests, 3);
        assert_eq!(snap.successful_requests, 2);
        assert_eq!(snap.success_rate, 67);
    }

    #[test]
    fn success_rate_zero_without_requests() {
        assert_eq!(success_rate(0, 0), 0);
        assert_eq!(monitor().snapshot().success_rate, 0);
    }

    #[test]
    fn success_rate_rounds_half_up() {
        assert_eq!(success_rate(1, 3), 33);
        assert_eq!(success_rate(2, 3), 67);
        assert_eq!(success_rate(1, 8), 13);
        assert_eq!(success_rate(1, 200), 1);
        assert_eq!(success_rate(199, 200), 100);
        assert_eq!(success_rate(0, 5), 0);
        assert_eq!(success_rate(5, 5), 100);
    }

    #[test]
    fn success_rate_within_half_a_point() {
        for total in 1..=120u64 {
            for successful in 0..=total {
                let rate = success_rate(successful, total);
                assert!(rate <= 100);
                // |100 * s / t - rate| <= 1/2, in integers.
                let diff = (100 * successful).abs_diff(rate * total);
                assert!(2 * diff <= total, "{successful}/{total} -> {rate}");
            }
        }
    }

    #[test]
    fn healthy_iff_fewer_than_five_recent_errors() {
        let now = Utc::now();
        for n in 0..8usize {
            let mut health = monitor();
            for i in 0..n {
                let at = now - Duration::seconds((n - i) as i64 * 10);
                health.record_error_at(at, timeout(), "api_request");
            }
            let expected = n < UNHEALTHY_ERROR_THRESHOLD;
            assert_eq!(health.snapshot_at(now).is_healthy, expected, "n = {n}");
            assert_eq!(health.is_healthy_at(now), expected, "n = {n}");
        }
    }

    #[test]
    fn errors_outside_window_do_not_affect_health() {
        let now = Utc::now();
        let mut health = monitor();
        for _ in 0..6 {
            health.record_error_at(now - Duration::minutes(10), timeout(), "api_request");
        }
        health.record_error_at(now, timeout(), "api_request");

        assert!(health.is_healthy());
        let snap = health.snapshot_at(now);
        assert!(snap.is_healthy);
        assert_eq!(snap.recent_error_count, 7);
    }

    #[test]
    fn old_errors_pruned_on_next_write() {
        let now = Utc::now();
        let mut health = monitor();
        health.record_error_at(
            now - Duration::minutes(90),
            ErrorInfo::new("network", "stale"),
            "api_request",
        );
        health.record_error_at(
            now - Duration::minutes(30),
            ErrorInfo::new("network", "recent"),
            "api_request",
        );
        assert_eq!(health.errors(DEFAULT_ERROR_LIMIT).len(), 2);

        health.record_error_at(now, timeout(), "api_request");
        let errors = health.errors(DEFAULT_ERROR_LIMIT);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.message != "stale"));
        assert_eq!(errors[0].kind, "timeout");
        assert_eq!(errors[1].message, "recent");
    }

    #[test]
    fn health_recovers_without_new_errors() {
        let now = Utc::now();
        let mut health = monitor();
        for _ in 0..UNHEALTHY_ERROR_THRESHOLD {
            health.record_error_at(now, timeout(), "api_request");
        }
        assert!(!health.is_healthy_at(now));

        let quiet = now + Duration::minutes(HEALTH_WINDOW_MINUTES) + Duration::seconds(1);
        assert!(health.is_healthy_at(quiet));
        assert_eq!(health.is_healthy_at(quiet), health.snapshot_at(quiet).is_healthy);
    }

    #[test]
    fn snapshot_ignores_expired_unpruned_errors() {
        let now = Utc::now();
        let mut health = monitor();
        health.record_error_at(now, timeout(), "api_request");

        let later = now + Duration::minutes(ERROR_RETENTION_MINUTES + 1);
        let snap = health.snapshot_at(later);
        assert_eq!(snap.recent_error_count, 0);
        assert!(snap.is_healthy);
    }

    #[test]
    fn errors_projection_is_newest_first_and_limited() {
        let mut health = monitor();
        for i in 0..5 {
            health.record_error(ErrorInfo::new("network", format!("failure {i}")), "api_request");
        }
        let errors = health.errors(3);
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].message, "failure 4");
        assert_eq!(errors[2].message, "failure 2");
        assert!(errors.iter().all(|e| e.status == ErrorStatus::New));
    }

    #[test]
    fn record_error_emits_error_log_entry() {
        let log = SystemLog::new();
        let mut health = HealthMonitor::new(log.clone());
        health.record_error(timeout(), "api_request");

        let entries = log.list(10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, LogKind::Error);
        assert!(entries[0].message.contains("api_request"));
        assert!(entries[0].message.contains("upstream timed out"));
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let mut health = monitor();
        health.record_request(true);
        let json = serde_json::to_value(health.snapshot()).unwrap();
        assert_eq!(json["isHealthy"], true);
        assert_eq!(json["recentErrorCount"], 0);
        assert_eq!(json["totalRequests"], 1);
        assert_eq!(json["successfulRequests"], 1);
        assert_eq!(json["successRate"], 100);
    }

    #[test]
    fn error_view_serializes_type_and_status() {
        let mut health = monitor();
        health.record_error(timeout(), "api_request");
        let json = serde_json::to_value(&health.errors(1)[0]).unwrap();
        assert_eq!(json["type"], "timeout");
        assert_eq!(json["status"], "new");
    }
}
