//! Subscription: a standing named query that delivers results on a trigger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{SubscriptionId, TenantId};

/// What causes a Subscription to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trigger {
    /// Fire shortly after a matching capture commits (subject to the
    /// debounce window in `epcis-subscriptions`).
    OnCapture,
    /// Fire on a cron schedule (standard 5-field cron expression).
    OnSchedule(String),
}

/// A standing named query (spec.md §3.1, §4.8).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_id: SubscriptionId,
    pub tenant_id: TenantId,

    /// Unique per tenant.
    pub name: String,
    /// One of the predefined query types (e.g. `"SimpleEventQuery"`).
    pub query_name: String,
    /// Frozen at creation time: `(parameter name, value)` pairs, parsed the
    /// same way as an ad-hoc query by `epcis-query`.
    pub parameters: Vec<(String, String)>,

    pub destination: String,
    pub report_if_empty: bool,

    /// Watermark on `Capture.record_time` (not `event_time`, spec.md §4.8
    /// "Cursor"). `None` until the first delivery.
    pub initial_record_time: Option<DateTime<Utc>>,
    pub last_executed_time: Option<DateTime<Utc>>,

    pub trigger: Trigger,
    pub active: bool,
}

impl Subscription {
    pub fn new(
        tenant_id: TenantId,
        name: impl Into<String>,
        query_name: impl Into<String>,
        parameters: Vec<(String, String)>,
        destination: impl Into<String>,
        trigger: Trigger,
    ) -> Self {
        Self {
            subscription_id: SubscriptionId::new(),
            tenant_id,
            name: name.into(),
            query_name: query_name.into(),
            parameters,
            destination: destination.into(),
            report_if_empty: false,
            initial_record_time: None,
            last_executed_time: None,
            trigger,
            active: true,
        }
    }

    /// The watermark to pass as an implicit `GT_recordTime` predicate on the
    /// next run (spec.md §4.8 "Cursor").
    pub fn cursor(&self) -> Option<DateTime<Utc>> {
        self.last_executed_time.or(self.initial_record_time)
    }

    /// Cursor advance must be monotonically non-decreasing (spec.md §8,
    /// invariant 7). Returns `false` (no-op) if `new_watermark` would move
    /// the cursor backwards.
    pub fn advance_cursor(&mut self, new_watermark: DateTime<Utc>) -> bool {
        if let Some(current) = self.last_executed_time {
            if new_watermark < current {
                return false;
            }
        }
        self.last_executed_time = Some(new_watermark);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sub() -> Subscription {
        Subscription::new(
            TenantId::new("t1"),
            "sub1",
            "SimpleEventQuery",
            vec![],
            "https://example.com/hook",
            Trigger::OnCapture,
        )
    }

    #[test]
    fn cursor_advance_is_monotonic() {
        let mut s = sub();
        let t1 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        assert!(s.advance_cursor(t1));
        assert_eq!(s.last_executed_time, Some(t1));

        assert!(!s.advance_cursor(t0));
        assert_eq!(s.last_executed_time, Some(t1));
    }
}
