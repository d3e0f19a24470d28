//! The Capture Handler: orchestrates one capture from a decoded `Capture`
//! aggregate to durably-persisted state, under at-most-one transaction.
//!
//! Mirrors the decide → persist → publish-after-commit shape used
//! elsewhere in this codebase for command handling, with the publish step
//! downgraded to best-effort: a notification-bus failure must never change
//! the caller's result once the transaction has committed.

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use epcis_core::Capture;
use epcis_core::cancel::CancellationToken;
use epcis_core::validate::validate_capture;
use epcis_events::{EventBus, RepositoryNotification};
use epcis_storage::Storage;

use crate::error::{CaptureError, CaptureResult};

pub struct CaptureHandler<S, B> {
    storage: Arc<S>,
    bus: Arc<B>,
    max_events_per_call: usize,
}

impl<S, B> CaptureHandler<S, B>
where
    S: Storage,
    B: EventBus<RepositoryNotification>,
{
    pub fn new(storage: Arc<S>, bus: Arc<B>, max_events_per_call: usize) -> Self {
        Self {
            storage,
            bus,
            max_events_per_call,
        }
    }

    /// Orchestrate one capture submission. See module docs for the pipeline
    /// shape; `token` lets the caller abort before or during persistence
    /// (e.g. the client disconnected) without leaving a partial commit.
    #[instrument(skip(self, capture, token), fields(tenant_id = %capture.tenant_id, submitted_events = capture.events.len()))]
    pub async fn store(&self, mut capture: Capture, token: &CancellationToken) -> CaptureResult<Capture> {
        if capture.events.len() > self.max_events_per_call {
            return Err(CaptureError::CaptureLimitExceeded {
                submitted: capture.events.len(),
                limit: self.max_events_per_call,
            });
        }

        if token.is_canceled() {
            return Err(CaptureError::Canceled);
        }

        validate_capture(&capture)?;

        for event in &mut capture.events {
            if event.event_id.is_empty() {
                event.event_id = epcis_core::hash::hash(event).into();
            }
        }

        if token.is_canceled() {
            return Err(CaptureError::Canceled);
        }

        capture.record_time = Some(Utc::now());

        let tenant_id = capture.tenant_id.clone();
        let capture_id = capture.capture_id;
        let record_time = capture.record_time.expect("record_time assigned above");
        let event_count = capture.events.len();

        self.storage.insert_capture(capture.clone()).await?;

        let notification = RepositoryNotification::new(tenant_id, capture_id, record_time, event_count);
        if let Err(error) = self.bus.publish(notification) {
            tracing::warn!(?error, %capture_id, "capture notification failed to publish");
        }

        Ok(capture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc as ChronoUtc;
    use epcis_core::{Action, Event, EventType, SchemaVersion, TenantId};
    use epcis_events::InMemoryEventBus;
    use epcis_storage::InMemoryStore;

    fn handler() -> CaptureHandler<InMemoryStore, InMemoryEventBus<RepositoryNotification>> {
        CaptureHandler::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryEventBus::new()),
            100,
        )
    }

    fn capture_with_one_event(tenant: &str) -> Capture {
        let mut capture = Capture::new(TenantId::new(tenant), SchemaVersion::V2_0, ChronoUtc::now());
        let mut event = Event::new(EventType::ObjectEvent, ChronoUtc::now(), "+00:00");
        event.action = Some(Action::Observe);
        capture.events.push(event);
        capture
    }

    #[tokio::test]
    async fn assigns_hash_and_stamps_record_time() {
        let handler = handler();
        let capture = capture_with_one_event("acme");

        let stored = handler.store(capture, &CancellationToken::new()).await.unwrap();

        assert!(stored.record_time.is_some());
        assert!(!stored.events[0].event_id.is_empty());
        assert!(stored.events[0].event_id.as_str().starts_with("ni:///sha-256;"));
    }

    #[tokio::test]
    async fn preserves_a_caller_supplied_event_id() {
        let handler = handler();
        let mut capture = capture_with_one_event("acme");
        capture.events[0].event_id = "urn:uuid:caller-assigned".to_string().into();

        let stored = handler.store(capture, &CancellationToken::new()).await.unwrap();

        assert_eq!(stored.events[0].event_id.as_str(), "urn:uuid:caller-assigned");
    }

    #[tokio::test]
    async fn rejects_captures_over_the_event_limit() {
        let handler = CaptureHandler::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryEventBus::new()),
            1,
        );
        let mut capture = capture_with_one_event("acme");
        let extra = capture.events[0].clone();
        capture.events.push(extra);

        let err = handler.store(capture, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CaptureError::CaptureLimitExceeded { submitted: 2, limit: 1 }));
    }

    #[tokio::test]
    async fn rejects_invalid_captures_without_touching_storage() {
        let handler = handler();
        let mut capture = capture_with_one_event("acme");
        capture.events[0].action = None;

        let err = handler.store(capture, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CaptureError::ValidationFailed(_)));
        assert!(err.violations().iter().any(|v| v.rule == "ActionRequired"));
    }

    #[tokio::test]
    async fn canceled_token_short_circuits_before_storage() {
        let handler = handler();
        let capture = capture_with_one_event("acme");
        let token = CancellationToken::new();
        token.cancel();

        let err = handler.store(capture, &token).await.unwrap_err();
        assert!(matches!(err, CaptureError::Canceled));
    }

    #[tokio::test]
    async fn notifies_subscribers_on_successful_commit() {
        let storage = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let subscription = bus.subscribe();
        let handler = CaptureHandler::new(storage, bus, 100);

        let capture = capture_with_one_event("acme");
        let capture_id = capture.capture_id;
        handler.store(capture, &CancellationToken::new()).await.unwrap();

        let notification = subscription.try_recv().unwrap();
        assert_eq!(notification.capture_id, capture_id);
        assert_eq!(notification.event_count, 1);
    }
}
