//! Retry backoff schedule.
//!
//! A fixed lookup table maps the number of failed attempts so far to the
//! delay before the next one. Indices past the end of the table yield a zero
//! delay; by then the record is already outside the retry budget.

use chrono::{DateTime, Duration, Utc};

use courier_common::config::{AppConfig, DEFAULT_BACKOFF_MINUTES};
use courier_common::types::{NotificationRecord, Reschedule};

/// Default number of failed attempts after which a record is abandoned.
pub const DEFAULT_MAX_RETRY: i32 = 6;

/// Immutable retry delay table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    delays: Vec<Duration>,
}

impl BackoffSchedule {
    pub fn from_minutes(minutes: &[i64]) -> Self {
        Self {
            delays: minutes
                .iter()
                .map(|m| Duration::try_minutes(*m).unwrap_or(Duration::MAX))
                .collect(),
        }
    }

    /// Delay to apply after the attempt numbered `retry_count` fails.
    pub fn next_delay(&self, retry_count: i32) -> Duration {
        usize::try_from(retry_count)
            .ok()
            .and_then(|idx| self.delays.get(idx).copied())
            .unwrap_or_else(Duration::zero)
    }

    /// Next eligible time computed from the record's current one.
    ///
    /// Always `>= current`, so eligibility only ever moves forward.
    pub fn next_eligible(&self, current: DateTime<Utc>, retry_count: i32) -> DateTime<Utc> {
        current
            .checked_add_signed(self.next_delay(retry_count))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::from_minutes(&DEFAULT_BACKOFF_MINUTES)
    }
}

/// Backoff table plus the retry budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub schedule: BackoffSchedule,
    pub max_retry: i32,
}

impl RetryPolicy {
    pub fn new(schedule: BackoffSchedule, max_retry: i32) -> Self {
        Self {
            schedule,
            max_retry,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            BackoffSchedule::from_minutes(&config.retry_backoff_minutes),
            config.max_retry,
        )
    }

    /// Fields to persist when a dispatch of `record` fails.
    pub fn reschedule(&self, record: &NotificationRecord) -> Reschedule {
        Reschedule {
            retry_count: record.retry_count.saturating_add(1),
            next_delivery_time: self
                .schedule
                .next_eligible(record.next_delivery_time, record.retry_count),
        }
    }

    /// Whether a record with `retry_count` failures is out of retries.
    pub fn is_exhausted(&self, retry_count: i32) -> bool {
        retry_count >= self.max_retry
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(BackoffSchedule::default(), DEFAULT_MAX_RETRY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use courier_common::types::DeliveryStatus;
    use uuid::Uuid;

    fn record(retry_count: i32, next: DateTime<Utc>) -> NotificationRecord {
        NotificationRecord {
            id: Uuid::new_v4(),
            recipient_id: Uuid::new_v4(),
            product_id: "p1".to_string(),
            product_type: "order".to_string(),
            payload: "{}".to_string(),
            status: DeliveryStatus::Pending,
            retry_count,
            next_delivery_time: next,
            created_at: next,
            updated_at: next,
        }
    }

    #[test]
    fn test_default_table_values() {
        let schedule = BackoffSchedule::default();
        let expected = [15, 45, 120, 180, 360, 720];
        for (count, minutes) in expected.iter().enumerate() {
            assert_eq!(
                schedule.next_delay(count as i32),
                Duration::minutes(*minutes),
                "retry_count {}",
                count
            );
        }
    }

    #[test]
    fn test_past_table_end_is_zero() {
        let schedule = BackoffSchedule::default();
        assert_eq!(schedule.next_delay(6), Duration::zero());
        assert_eq!(schedule.next_delay(7), Duration::zero());
        assert_eq!(schedule.next_delay(i32::MAX), Duration::zero());
        assert_eq!(schedule.next_delay(-1), Duration::zero());
    }

    #[test]
    fn test_next_eligible_is_pure() {
        let schedule = BackoffSchedule::default();
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let first = schedule.next_eligible(t, 2);
        let second = schedule.next_eligible(t, 2);
        assert_eq!(first, second);
        assert_eq!(first, t + Duration::minutes(120));
    }

    #[test]
    fn test_next_eligible_never_moves_backward() {
        let schedule = BackoffSchedule::default();
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        for count in 0..10 {
            assert!(schedule.next_eligible(t, count) >= t);
        }
    }

    #[test]
    fn test_reschedule_increments_and_advances() {
        let policy = RetryPolicy::default();
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        for count in 0..=5 {
            let next = policy.reschedule(&record(count, t));
            assert_eq!(
                next,
                Reschedule {
                    retry_count: count + 1,
                    next_delivery_time: t + policy.schedule.next_delay(count),
                }
            );
        }
    }

    #[test]
    fn test_exhaustion_bound() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_exhausted(5));
        assert!(policy.is_exhausted(6));
        assert!(policy.is_exhausted(7));
    }

    #[test]
    fn test_custom_table() {
        let schedule = BackoffSchedule::from_minutes(&[1, 2]);
        assert_eq!(schedule.next_delay(0), Duration::minutes(1));
        assert_eq!(schedule.next_delay(1), Duration::minutes(2));
        assert_eq!(schedule.next_delay(2), Duration::zero());
    }
}
