//! Process-wide service wiring: storage, capture handler, query engine,
//! subscription engine, and the tiny in-process named-query registry.
//!
//! Mirrors the teacher's `services.rs` role — the one place that knows how
//! to construct the stack from `RepositoryConfig` — generalized from
//! event-store/bus/projection wiring to storage/capture/query/subscriptions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use epcis_auth::{IdentityOracle, StaticIdentityOracle};
use epcis_capture::CaptureHandler;
use epcis_core::TenantId;
use epcis_events::{InMemoryEventBus, RepositoryNotification};
use epcis_query::{CursorCodec, QueryEngine};
use epcis_storage::{InMemoryStore, PostgresStore, StorageError};
use epcis_subscriptions::{SubscriptionEngine, SubscriptionEngineConfig, SubscriptionSupervisor};

use crate::config::{RepositoryConfig, StorageProvider};
use crate::storage_backend::StorageBackend;

/// A named query registered via `POST /queries` (SPEC_FULL.md §2.5):
/// frozen parameters a client can later execute by name or attach a
/// subscription to. Not an owned entity in spec.md's data model (§3.1) —
/// only `Subscription` is — so it lives in this process-local registry
/// rather than in the storage contract; restarting the process forgets
/// named queries that were never subscribed to.
#[derive(Clone)]
pub struct NamedQueryRegistry {
    inner: Arc<Mutex<HashMap<(TenantId, String), Vec<(String, String)>>>>,
}

impl NamedQueryRegistry {
    fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn create(&self, tenant_id: &TenantId, name: &str, params: Vec<(String, String)>) -> Result<(), ()> {
        let mut guard = self.inner.lock().unwrap();
        let key = (tenant_id.clone(), name.to_string());
        if guard.contains_key(&key) {
            return Err(());
        }
        guard.insert(key, params);
        Ok(())
    }

    pub fn get(&self, tenant_id: &TenantId, name: &str) -> Option<Vec<(String, String)>> {
        self.inner.lock().unwrap().get(&(tenant_id.clone(), name.to_string())).cloned()
    }

    pub fn delete(&self, tenant_id: &TenantId, name: &str) -> bool {
        self.inner.lock().unwrap().remove(&(tenant_id.clone(), name.to_string())).is_some()
    }
}

pub struct AppState {
    pub config: Arc<RepositoryConfig>,
    pub identity: Arc<dyn IdentityOracle>,
    pub storage: Arc<StorageBackend>,
    pub capture_handler: Arc<CaptureHandler<StorageBackend, InMemoryEventBus<RepositoryNotification>>>,
    pub query_engine: Arc<QueryEngine<StorageBackend>>,
    pub subscription_engine: SubscriptionEngine<StorageBackend>,
    pub named_queries: NamedQueryRegistry,
}

/// Everything `build_app` needs beyond the router tree: the live state plus
/// the background-task handle the caller is responsible for shutting down.
pub struct Services {
    pub state: Arc<AppState>,
    pub supervisor: SubscriptionSupervisor,
}

async fn build_storage(config: &RepositoryConfig) -> anyhow::Result<StorageBackend> {
    match config.storage_provider {
        StorageProvider::Memory => Ok(StorageBackend::InMemory(InMemoryStore::new())),
        StorageProvider::Postgres => {
            let dsn = config
                .connection_string
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("connectionString is required for storageProvider=postgres"))?;
            let pool = sqlx::postgres::PgPoolOptions::new().connect(dsn).await?;
            Ok(StorageBackend::Postgres(PostgresStore::new(pool)))
        }
        StorageProvider::Sqlserver | StorageProvider::Sqlite => {
            Err(StorageError::UnsupportedProvider(format!("{:?}", config.storage_provider)).into())
        }
    }
}

/// Build the full service stack and start the subscription supervisor's
/// background tasks (OnCapture dispatch, OnSchedule loop).
pub async fn build_services(config: RepositoryConfig) -> anyhow::Result<Services> {
    let config = Arc::new(config);
    let storage = Arc::new(build_storage(&config).await?);
    let bus = Arc::new(InMemoryEventBus::<RepositoryNotification>::new());

    let capture_handler = Arc::new(CaptureHandler::new(
        storage.clone(),
        bus.clone(),
        config.max_events_per_call,
    ));

    let cursor_codec = CursorCodec::new(config.pagination_secret.clone().into_bytes());
    let query_engine = Arc::new(QueryEngine::new(
        storage.clone(),
        cursor_codec,
        config.max_events_returned_in_query,
    ));

    let subscription_engine_config = SubscriptionEngineConfig::default();
    let subscription_engine = SubscriptionEngine::new(storage.clone(), query_engine.clone(), &subscription_engine_config);
    let supervisor = SubscriptionSupervisor::spawn(
        subscription_engine.clone(),
        storage.clone(),
        bus,
        &subscription_engine_config,
    );

    // Reference identity oracle (spec.md §6.3): a fixed account table. A
    // production deployment swaps this for its own `IdentityOracle` (e.g.
    // backed by a directory service) without touching any route handler.
    let identity: Arc<dyn IdentityOracle> = Arc::new(
        StaticIdentityOracle::new()
            .with_account("demo", "demo", TenantId::new("demo"))
            .with_super_user("root", std::env::var("EPCIS_ROOT_PASSWORD").unwrap_or_else(|_| "root".to_string()).as_str()),
    );

    let state = Arc::new(AppState {
        config,
        identity,
        storage,
        capture_handler,
        query_engine,
        subscription_engine,
        named_queries: NamedQueryRegistry::new(),
    });

    Ok(Services { state, supervisor })
}
