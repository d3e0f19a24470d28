//! OnSchedule trigger: a cron expression drives a subscription, a scheduler
//! holds a min-heap of next-fire instants.
//!
//! The heap is rebuilt from storage on a fixed cadence rather than kept
//! perfectly in sync with subscription CRUD — a newly-created OnSchedule
//! subscription joins the heap within one `refresh_interval`, which is well
//! inside the granularity cron expressions operate at (minutes, not
//! milliseconds).

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use epcis_core::cancel::CancellationToken;
use epcis_core::{Subscription, SubscriptionId, TenantId, Trigger};
use epcis_storage::Storage;

use crate::error::{SubscriptionError, SubscriptionResult};

/// `Trigger::OnSchedule` carries a standard 5-field expression (minute hour
/// day-of-month month day-of-week); the `cron` crate requires a leading
/// seconds field, so a bare 5-field expression is widened to "0 <rest>"
/// before parsing.
fn widen_to_six_fields(expression: &str) -> String {
    let field_count = expression.split_whitespace().count();
    if field_count == 5 { format!("0 {expression}") } else { expression.to_string() }
}

pub fn next_fire_after(expression: &str, after: DateTime<Utc>) -> SubscriptionResult<DateTime<Utc>> {
    let widened = widen_to_six_fields(expression);
    let schedule = Schedule::from_str(&widened).map_err(|e| SubscriptionError::InvalidSchedule {
        expression: expression.to_string(),
        detail: e.to_string(),
    })?;
    schedule.after(&after).next().ok_or_else(|| SubscriptionError::InvalidSchedule {
        expression: expression.to_string(),
        detail: "schedule has no upcoming fire time".to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapEntry {
    fire_at: DateTime<Utc>,
    subscription_id: SubscriptionId,
}

// `SubscriptionId` has no `Ord`; the heap only ever needs to order by fire
// time; ties break arbitrarily (but deterministically, via `Eq` above).
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.fire_at.cmp(&other.fire_at)
    }
}

/// Drives every active `OnSchedule` subscription. `on_fire` is invoked (with
/// the subscription's tenant and id) once per scheduled occurrence; it is
/// expected to hand off to the coalescing runner rather than block this
/// loop directly.
pub async fn run_schedule_loop<S, F>(
    storage: &S,
    refresh_interval: Duration,
    token: &CancellationToken,
    on_fire: F,
) where
    S: Storage,
    F: Fn(TenantId, SubscriptionId),
{
    let mut heap: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::new();
    let mut tenants: std::collections::HashMap<SubscriptionId, TenantId> = std::collections::HashMap::new();

    loop {
        if token.is_canceled() {
            return;
        }

        if let Ok(subscriptions) = storage.list_active_subscriptions().await {
            rebuild_heap(&subscriptions, &mut heap, &mut tenants);
        }

        let sleep_for = match heap.peek() {
            Some(Reverse(entry)) => {
                let now = Utc::now();
                if entry.fire_at <= now {
                    Duration::ZERO
                } else {
                    (entry.fire_at - now).to_std().unwrap_or(refresh_interval).min(refresh_interval)
                }
            }
            None => refresh_interval,
        };

        tokio::time::sleep(sleep_for).await;

        if token.is_canceled() {
            return;
        }

        let now = Utc::now();
        while let Some(Reverse(entry)) = heap.peek() {
            if entry.fire_at > now {
                break;
            }
            let Reverse(entry) = heap.pop().expect("peeked above");
            if let Some(tenant_id) = tenants.get(&entry.subscription_id).cloned() {
                on_fire(tenant_id, entry.subscription_id);
            }
        }
    }
}

fn rebuild_heap(
    subscriptions: &[Subscription],
    heap: &mut BinaryHeap<Reverse<HeapEntry>>,
    tenants: &mut std::collections::HashMap<SubscriptionId, TenantId>,
) {
    let known: std::collections::HashSet<SubscriptionId> =
        heap.iter().map(|Reverse(e)| e.subscription_id).collect();

    let active: std::collections::HashSet<SubscriptionId> = subscriptions
        .iter()
        .filter(|s| matches!(s.trigger, Trigger::OnSchedule(_)))
        .map(|s| s.subscription_id)
        .collect();

    heap.retain(|Reverse(e)| active.contains(&e.subscription_id));
    tenants.retain(|id, _| active.contains(id));

    for subscription in subscriptions {
        let Trigger::OnSchedule(expression) = &subscription.trigger else { continue };
        if known.contains(&subscription.subscription_id) {
            continue;
        }
        let Ok(fire_at) = next_fire_after(expression, Utc::now()) else { continue };
        tenants.insert(subscription.subscription_id, subscription.tenant_id.clone());
        heap.push(Reverse(HeapEntry { fire_at, subscription_id: subscription.subscription_id }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_fire_after_resolves_a_standard_five_field_expression() {
        // "0 * * * *": top of every hour.
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let fire_at = next_fire_after("0 * * * *", after).unwrap();
        assert_eq!(fire_at, Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap());
    }

    #[test]
    fn an_invalid_expression_is_rejected() {
        let err = next_fire_after("not a cron expression", Utc::now()).unwrap_err();
        assert!(matches!(err, SubscriptionError::InvalidSchedule { .. }));
    }
}
