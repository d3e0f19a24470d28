//! `StorageBackend`: the one enum-dispatch seam that lets `epcis-capture`,
//! `epcis-query`, and `epcis-subscriptions` (all generic over `S: Storage`)
//! be instantiated exactly once per process, regardless of which
//! `storageProvider` (spec.md §6.6) the deployment chose.
//!
//! DESIGN.md's Open Question #3: only `postgres` and the in-memory backend
//! are implemented. `sqlserver`/`sqlite` are accepted configuration values
//! that fail fast at startup with `StorageError::UnsupportedProvider`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use epcis_core::{Capture, CaptureId, Event, EventId, MasterData, Subscription, SubscriptionId, TenantId};
use epcis_storage::predicate::{Order, Predicate};
use epcis_storage::{InMemoryStore, PostgresStore, Storage, StorageError};

pub enum StorageBackend {
    InMemory(InMemoryStore),
    Postgres(PostgresStore),
}

macro_rules! dispatch {
    ($self:expr, $method:ident $(, $arg:expr)*) => {
        match $self {
            StorageBackend::InMemory(s) => s.$method($($arg),*).await,
            StorageBackend::Postgres(s) => s.$method($($arg),*).await,
        }
    };
}

#[async_trait]
impl Storage for StorageBackend {
    async fn insert_capture(&self, capture: Capture) -> Result<(), StorageError> {
        dispatch!(self, insert_capture, capture)
    }

    async fn get_capture(&self, tenant_id: &TenantId, id: &CaptureId) -> Result<Option<Capture>, StorageError> {
        dispatch!(self, get_capture, tenant_id, id)
    }

    async fn list_captures(
        &self,
        tenant_id: &TenantId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Capture>, StorageError> {
        dispatch!(self, list_captures, tenant_id, limit, offset)
    }

    async fn select_event_ids(
        &self,
        tenant_id: &TenantId,
        predicate: &Predicate,
        order: Order,
        cap: u32,
    ) -> Result<Vec<(EventId, DateTime<Utc>)>, StorageError> {
        dispatch!(self, select_event_ids, tenant_id, predicate, order, cap)
    }

    async fn hydrate_events(&self, tenant_id: &TenantId, ids: &[EventId]) -> Result<Vec<Event>, StorageError> {
        dispatch!(self, hydrate_events, tenant_id, ids)
    }

    async fn list_master_data(
        &self,
        tenant_id: &TenantId,
        vocabulary_type: Option<&str>,
    ) -> Result<Vec<MasterData>, StorageError> {
        dispatch!(self, list_master_data, tenant_id, vocabulary_type)
    }

    async fn upsert_master_data(&self, tenant_id: &TenantId, entries: Vec<MasterData>) -> Result<(), StorageError> {
        dispatch!(self, upsert_master_data, tenant_id, entries)
    }

    async fn create_subscription(&self, subscription: Subscription) -> Result<(), StorageError> {
        dispatch!(self, create_subscription, subscription)
    }

    async fn get_subscription(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, StorageError> {
        dispatch!(self, get_subscription, tenant_id, id)
    }

    async fn list_subscriptions(&self, tenant_id: &TenantId) -> Result<Vec<Subscription>, StorageError> {
        dispatch!(self, list_subscriptions, tenant_id)
    }

    async fn list_active_subscriptions(&self) -> Result<Vec<Subscription>, StorageError> {
        dispatch!(self, list_active_subscriptions)
    }

    async fn delete_subscription(&self, tenant_id: &TenantId, id: &SubscriptionId) -> Result<bool, StorageError> {
        dispatch!(self, delete_subscription, tenant_id, id)
    }

    async fn advance_subscription_cursor(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
        watermark: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        dispatch!(self, advance_subscription_cursor, tenant_id, id, watermark)
    }
}
