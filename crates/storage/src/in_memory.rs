//! A process-local `Storage` backend: no persistence across restarts, used
//! for tests and for `--provider memory` development runs (spec.md treats
//! the storage provider as pluggable and does not mandate an embedded
//! database, SPEC_FULL.md §2.4).

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use epcis_core::{Capture, CaptureId, Event, EventId, MasterData, Subscription, SubscriptionId, TenantId};

use crate::error::StorageError;
use crate::eval;
use crate::predicate::{Order, Predicate};
use crate::store::Storage;

#[derive(Default)]
struct TenantState {
    captures: Vec<Capture>,
    /// Vocabulary entries are embedded on the `Capture` that introduced them
    /// (for audit/immutability) but also promoted here, keyed by
    /// `(vocabulary_type, id)`, so discovery queries don't have to scan every
    /// capture the tenant ever submitted.
    master_data: HashMap<(String, String), MasterData>,
    subscriptions: Vec<Subscription>,
}

/// In-memory `Storage` implementation, guarded by a single `RwLock`. Fine
/// for tests and single-process development; `PostgresStore` is what a
/// deployed repository actually runs against.
#[derive(Default)]
pub struct InMemoryStore {
    tenants: RwLock<HashMap<TenantId, TenantState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStore {
    async fn insert_capture(&self, capture: Capture) -> Result<(), StorageError> {
        let record_time = capture
            .record_time
            .ok_or_else(|| StorageError::Internal("capture has no record_time assigned".into()))?;
        let _ = record_time;

        let mut tenants = self.tenants.write().unwrap();
        let state = tenants.entry(capture.tenant_id.clone()).or_default();

        if state.captures.iter().any(|c| c.capture_id == capture.capture_id) {
            return Err(StorageError::Conflict(format!(
                "capture {} already exists",
                capture.capture_id
            )));
        }

        for entry in &capture.master_data {
            state
                .master_data
                .insert((entry.vocabulary_type.clone(), entry.id.clone()), entry.clone());
        }

        state.captures.push(capture);
        Ok(())
    }

    async fn get_capture(&self, tenant_id: &TenantId, id: &CaptureId) -> Result<Option<Capture>, StorageError> {
        let tenants = self.tenants.read().unwrap();
        Ok(tenants
            .get(tenant_id)
            .and_then(|s| s.captures.iter().find(|c| &c.capture_id == id))
            .cloned())
    }

    async fn list_captures(
        &self,
        tenant_id: &TenantId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Capture>, StorageError> {
        let tenants = self.tenants.read().unwrap();
        let Some(state) = tenants.get(tenant_id) else {
            return Ok(Vec::new());
        };

        let mut captures: Vec<Capture> = state.captures.clone();
        captures.sort_by_key(|c| c.record_time);
        Ok(captures
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn select_event_ids(
        &self,
        tenant_id: &TenantId,
        predicate: &Predicate,
        order: Order,
        cap: u32,
    ) -> Result<Vec<(EventId, DateTime<Utc>)>, StorageError> {
        let tenants = self.tenants.read().unwrap();
        let Some(state) = tenants.get(tenant_id) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<(Event, DateTime<Utc>)> = Vec::new();
        for capture in &state.captures {
            let Some(record_time) = capture.record_time else {
                continue;
            };
            for event in &capture.events {
                if eval::matches(event, record_time, predicate) {
                    matched.push((event.clone(), record_time));
                }
            }
        }

        eval::sort_by_order(&mut matched, order);
        Ok(matched
            .into_iter()
            .take(cap as usize)
            .map(|(event, record_time)| {
                let order_value = match order.field {
                    crate::predicate::TimeField::EventTime => event.event_time,
                    crate::predicate::TimeField::RecordTime => record_time,
                };
                (event.event_id, order_value)
            })
            .collect())
    }

    async fn hydrate_events(&self, tenant_id: &TenantId, ids: &[EventId]) -> Result<Vec<Event>, StorageError> {
        let tenants = self.tenants.read().unwrap();
        let Some(state) = tenants.get(tenant_id) else {
            return Ok(Vec::new());
        };

        let wanted: HashSet<&EventId> = ids.iter().collect();
        let mut by_id: HashMap<&EventId, &Event> = HashMap::new();
        for capture in &state.captures {
            for event in &capture.events {
                if wanted.contains(&event.event_id) {
                    by_id.insert(&event.event_id, event);
                }
            }
        }

        Ok(ids
            .iter()
            .filter_map(|id| by_id.get(id).map(|&e| e.clone()))
            .collect())
    }

    async fn list_master_data(
        &self,
        tenant_id: &TenantId,
        vocabulary_type: Option<&str>,
    ) -> Result<Vec<MasterData>, StorageError> {
        let tenants = self.tenants.read().unwrap();
        let Some(state) = tenants.get(tenant_id) else {
            return Ok(Vec::new());
        };

        Ok(state
            .master_data
            .values()
            .filter(|m| vocabulary_type.is_none_or(|t| t == m.vocabulary_type))
            .cloned()
            .collect())
    }

    async fn upsert_master_data(&self, tenant_id: &TenantId, entries: Vec<MasterData>) -> Result<(), StorageError> {
        let mut tenants = self.tenants.write().unwrap();
        let state = tenants.entry(tenant_id.clone()).or_default();
        for entry in entries {
            state
                .master_data
                .insert((entry.vocabulary_type.clone(), entry.id.clone()), entry);
        }
        Ok(())
    }

    async fn create_subscription(&self, subscription: Subscription) -> Result<(), StorageError> {
        let mut tenants = self.tenants.write().unwrap();
        let state = tenants.entry(subscription.tenant_id.clone()).or_default();

        if state.subscriptions.iter().any(|s| s.name == subscription.name) {
            return Err(StorageError::Conflict(format!(
                "subscription '{}' already exists for this tenant",
                subscription.name
            )));
        }

        state.subscriptions.push(subscription);
        Ok(())
    }

    async fn get_subscription(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, StorageError> {
        let tenants = self.tenants.read().unwrap();
        Ok(tenants
            .get(tenant_id)
            .and_then(|s| s.subscriptions.iter().find(|s| &s.subscription_id == id))
            .cloned())
    }

    async fn list_subscriptions(&self, tenant_id: &TenantId) -> Result<Vec<Subscription>, StorageError> {
        let tenants = self.tenants.read().unwrap();
        Ok(tenants
            .get(tenant_id)
            .map(|s| s.subscriptions.clone())
            .unwrap_or_default())
    }

    async fn list_active_subscriptions(&self) -> Result<Vec<Subscription>, StorageError> {
        let tenants = self.tenants.read().unwrap();
        Ok(tenants
            .values()
            .flat_map(|s| s.subscriptions.iter())
            .filter(|s| s.active)
            .cloned()
            .collect())
    }

    async fn delete_subscription(&self, tenant_id: &TenantId, id: &SubscriptionId) -> Result<bool, StorageError> {
        let mut tenants = self.tenants.write().unwrap();
        let Some(state) = tenants.get_mut(tenant_id) else {
            return Ok(false);
        };

        let before = state.subscriptions.len();
        state.subscriptions.retain(|s| &s.subscription_id != id);
        Ok(state.subscriptions.len() != before)
    }

    async fn advance_subscription_cursor(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
        watermark: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut tenants = self.tenants.write().unwrap();
        let Some(state) = tenants.get_mut(tenant_id) else {
            return Ok(false);
        };

        let Some(subscription) = state.subscriptions.iter_mut().find(|s| &s.subscription_id == id) else {
            return Ok(false);
        };

        Ok(subscription.advance_cursor(watermark))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use epcis_core::{Action, Event, EventType, SchemaVersion, Trigger};

    fn tenant() -> TenantId {
        TenantId::new("acme")
    }

    fn capture_with_event(tenant_id: TenantId, record_time: DateTime<Utc>, event_id: &str) -> Capture {
        let mut capture = Capture::new(tenant_id, SchemaVersion::V2_0, record_time);
        capture.record_time = Some(record_time);
        let mut event = Event::new(EventType::ObjectEvent, record_time, "+00:00");
        event.event_id = EventId::new(event_id);
        event.action = Some(Action::Observe);
        capture.events.push(event);
        capture
    }

    #[tokio::test]
    async fn insert_then_select_then_hydrate_round_trips() {
        let store = InMemoryStore::new();
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let capture = capture_with_event(tenant(), t0, "urn:event:1");

        store.insert_capture(capture).await.unwrap();

        let rows = store
            .select_event_ids(&tenant(), &Predicate::EventTypeIn(vec![EventType::ObjectEvent]), Order::default(), 10)
            .await
            .unwrap();
        let ids: Vec<EventId> = rows.into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![EventId::new("urn:event:1")]);

        let events = store.hydrate_events(&tenant(), &ids).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id, EventId::new("urn:event:1"));
    }

    #[tokio::test]
    async fn duplicate_capture_id_is_a_conflict() {
        let store = InMemoryStore::new();
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let capture = capture_with_event(tenant(), t0, "urn:event:1");
        let replay = capture.clone();

        store.insert_capture(capture).await.unwrap();
        let err = store.insert_capture(replay).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn select_event_ids_is_tenant_isolated() {
        let store = InMemoryStore::new();
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        store
            .insert_capture(capture_with_event(TenantId::new("acme"), t0, "urn:event:1"))
            .await
            .unwrap();
        store
            .insert_capture(capture_with_event(TenantId::new("globex"), t0, "urn:event:2"))
            .await
            .unwrap();

        let rows = store
            .select_event_ids(
                &TenantId::new("acme"),
                &Predicate::EventTypeIn(vec![EventType::ObjectEvent]),
                Order::default(),
                10,
            )
            .await
            .unwrap();
        let ids: Vec<EventId> = rows.into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![EventId::new("urn:event:1")]);
    }

    #[tokio::test]
    async fn subscription_cursor_rejects_cursor_moving_backwards() {
        let store = InMemoryStore::new();
        let subscription = Subscription::new(
            tenant(),
            "sub1",
            "SimpleEventQuery",
            vec![],
            "https://example.com/hook",
            Trigger::OnCapture,
        );
        let id = subscription.subscription_id;
        store.create_subscription(subscription).await.unwrap();

        let later = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        assert!(store.advance_subscription_cursor(&tenant(), &id, later).await.unwrap());
        assert!(!store.advance_subscription_cursor(&tenant(), &id, earlier).await.unwrap());
    }
}
