//! Runs a single subscription to completion: query with the cursor folded
//! in as `GT_recordTime`, walk every page, deliver one payload with the
//! full batch, advance the cursor.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use epcis_codec::json::encode_document;
use epcis_codec::EpcisDocument;
use epcis_core::cancel::CancellationToken;
use epcis_core::{Event, SchemaVersion, Subscription};
use epcis_query::QueryEngine;
use epcis_storage::Storage;

use crate::backoff::RetryPolicy;
use crate::delivery::{deliver, DeliveryOutcome};
use crate::error::{SubscriptionError, SubscriptionResult};

/// Outcome of one subscription run, reported up to the caller for logging
/// and (in tests) assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Delivered, cursor advanced to `watermark`.
    Delivered { event_count: usize, watermark: DateTime<Utc> },
    /// Nothing matched and `reportIfEmpty` is false: no delivery, no cursor
    /// movement.
    NothingToReport,
    /// Matched nothing but `reportIfEmpty` is true: an empty payload was
    /// delivered; the cursor still does not move (there is no new
    /// watermark to advance to).
    DeliveredEmpty,
    /// Exhausted retries against the destination.
    Failed { detail: String },
}

pub struct SubscriptionRunner<S> {
    storage: Arc<S>,
    client: reqwest::Client,
    retry_policy: RetryPolicy,
}

impl<S> SubscriptionRunner<S>
where
    S: Storage,
{
    pub fn new(storage: Arc<S>, client: reqwest::Client, retry_policy: RetryPolicy) -> Self {
        Self { storage, client, retry_policy }
    }

    /// Run `subscription` once against `engine`, deliver, and persist any
    /// cursor advance through `self.storage`. `engine` is generic over the
    /// same storage backend so this can be reused against the in-memory
    /// store in tests and the Postgres store in production.
    pub async fn run_once<Q>(
        &self,
        engine: &QueryEngine<Q>,
        subscription: &Subscription,
        token: &CancellationToken,
    ) -> SubscriptionResult<RunOutcome>
    where
        Q: Storage,
    {
        if token.is_canceled() {
            return Err(SubscriptionError::Canceled);
        }

        let mut events: Vec<Event> = Vec::new();
        let mut watermark: Option<DateTime<Utc>> = None;
        let mut page_token: Option<String> = None;

        loop {
            if token.is_canceled() {
                return Err(SubscriptionError::Canceled);
            }

            let params = self.page_params(subscription, page_token.take());
            let page = engine.execute(&subscription.tenant_id, &params, token).await?;

            watermark = match (watermark, page.max_order_value) {
                (Some(current), Some(candidate)) => Some(current.max(candidate)),
                (current, None) => current,
                (None, Some(candidate)) => Some(candidate),
            };
            events.extend(page.events);

            match page.next_page_token {
                Some(tok) => page_token = Some(tok),
                None => break,
            }
        }

        if events.is_empty() {
            if !subscription.report_if_empty {
                return Ok(RunOutcome::NothingToReport);
            }
            return match self.send(subscription, events).await {
                Ok(()) => Ok(RunOutcome::DeliveredEmpty),
                Err(detail) => Ok(RunOutcome::Failed { detail }),
            };
        }

        let event_count = events.len();
        if let Err(detail) = self.send(subscription, events).await {
            return Ok(RunOutcome::Failed { detail });
        }

        match watermark {
            Some(watermark) => {
                self.storage
                    .advance_subscription_cursor(&subscription.tenant_id, &subscription.subscription_id, watermark)
                    .await?;
                Ok(RunOutcome::Delivered { event_count, watermark })
            }
            // Matched rows but no order value at all: shouldn't happen for
            // a non-empty result set, but don't silently drop the delivery
            // outcome if it somehow does.
            None => Ok(RunOutcome::DeliveredEmpty),
        }
    }

    /// Freeze the subscription's parameters, override ordering to
    /// `recordTime` ascending (needed to recover the watermark from
    /// `max_order_value`), and fold in the cursor and any continuation
    /// token.
    fn page_params(&self, subscription: &Subscription, page_token: Option<String>) -> Vec<(String, String)> {
        let mut params = subscription.parameters.clone();
        if let Some(cursor) = subscription.cursor() {
            params.push(("GT_recordTime".to_string(), cursor.to_rfc3339()));
        }
        params.push(("orderBy".to_string(), "recordTime".to_string()));
        params.push(("orderDirection".to_string(), "asc".to_string()));
        if let Some(token) = page_token {
            params.push(("nextPageToken".to_string(), token));
        }
        params
    }

    /// Deliver one payload. `Err` carries a human-readable detail for an
    /// exhausted retry budget — never a `SubscriptionError`, since running
    /// out of retries is an expected terminal outcome, not an
    /// infrastructure failure.
    async fn send(&self, subscription: &Subscription, events: Vec<Event>) -> Result<(), String> {
        let document = EpcisDocument {
            schema_version: SchemaVersion::V2_0,
            creation_date: Some(Utc::now()),
            standard_business_header: None,
            events,
            master_data: Vec::new(),
        };
        let body = encode_document(&document);

        match deliver(&self.client, &subscription.destination, &body, &self.retry_policy).await {
            DeliveryOutcome::Delivered { .. } => Ok(()),
            DeliveryOutcome::Failed { attempts, detail } => Err(format!(
                "delivery to {} failed after {attempts} attempt(s): {detail}",
                subscription.destination
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::immediate_retry_policy;
    use epcis_core::{Action, Capture, EventType, TenantId, Trigger};
    use epcis_query::CursorCodec;
    use epcis_storage::InMemoryStore;
    use serde_json::Value;

    fn engine(store: Arc<InMemoryStore>) -> QueryEngine<InMemoryStore> {
        QueryEngine::new(store, CursorCodec::new(b"test-secret".to_vec()), 20_000)
    }

    async fn seed(store: &InMemoryStore, tenant: &str, n: u32, base: DateTime<Utc>) {
        for i in 0..n {
            let t = base + chrono::Duration::seconds(i as i64);
            let mut capture = Capture::new(TenantId::new(tenant), SchemaVersion::V2_0, t);
            capture.record_time = Some(t);
            let mut event = Event::new(EventType::ObjectEvent, t, "+00:00");
            event.action = Some(Action::Observe);
            event.event_id = format!("urn:event:{tenant}:{i:05}").into();
            capture.events.push(event);
            store.insert_capture(capture).await.unwrap();
        }
    }

    #[tokio::test]
    async fn delivers_matching_events_and_advances_the_cursor() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", "/hook").with_status(200).create_async().await;

        let store = Arc::new(InMemoryStore::new());
        let base = Utc::now();
        seed(&store, "acme", 3, base).await;
        let engine = engine(store.clone());

        let subscription = Subscription::new(
            TenantId::new("acme"),
            "sub1",
            "SimpleEventQuery",
            vec![("eventType".to_string(), "ObjectEvent".to_string())],
            format!("{}/hook", server.url()),
            Trigger::OnCapture,
        );
        store.create_subscription(subscription.clone()).await.unwrap();

        let runner = SubscriptionRunner::new(store.clone(), reqwest::Client::new(), immediate_retry_policy(3));
        let outcome = runner.run_once(&engine, &subscription, &CancellationToken::new()).await.unwrap();

        mock.assert_async().await;
        match outcome {
            RunOutcome::Delivered { event_count, watermark } => {
                assert_eq!(event_count, 3);
                assert_eq!(watermark, base + chrono::Duration::seconds(2));
            }
            other => panic!("expected Delivered, got {other:?}"),
        }

        let persisted = store
            .get_subscription(&subscription.tenant_id, &subscription.subscription_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(persisted.last_executed_time, Some(base + chrono::Duration::seconds(2)));
    }

    #[tokio::test]
    async fn empty_results_with_report_if_empty_false_skip_delivery() {
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(store.clone());

        let subscription = Subscription::new(
            TenantId::new("acme"),
            "sub1",
            "SimpleEventQuery",
            vec![("eventType".to_string(), "ObjectEvent".to_string())],
            "https://unused.example/hook",
            Trigger::OnCapture,
        );

        let runner = SubscriptionRunner::new(store.clone(), reqwest::Client::new(), immediate_retry_policy(3));
        let outcome = runner.run_once(&engine, &subscription, &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome, RunOutcome::NothingToReport);
    }

    #[tokio::test]
    async fn empty_results_with_report_if_empty_true_deliver_an_empty_document() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .with_status(200)
            .match_body(mockito::Matcher::PartialJsonString("{\"epcisBody\":{\"eventList\":[]}}".to_string()))
            .create_async();
        let mock = mock.await;
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(store.clone());

        let mut subscription = Subscription::new(
            TenantId::new("acme"),
            "sub1",
            "SimpleEventQuery",
            vec![("eventType".to_string(), "ObjectEvent".to_string())],
            format!("{}/hook", server.url()),
            Trigger::OnCapture,
        );
        subscription.report_if_empty = true;

        let runner = SubscriptionRunner::new(store.clone(), reqwest::Client::new(), immediate_retry_policy(3));
        let outcome = runner.run_once(&engine, &subscription, &CancellationToken::new()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(outcome, RunOutcome::DeliveredEmpty);
        let _: Option<Value> = None;
    }

    #[tokio::test]
    async fn canceled_token_aborts_before_querying() {
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(store.clone());
        let subscription = Subscription::new(
            TenantId::new("acme"),
            "sub1",
            "SimpleEventQuery",
            vec![],
            "https://unused.example/hook",
            Trigger::OnCapture,
        );

        let runner = SubscriptionRunner::new(store.clone(), reqwest::Client::new(), immediate_retry_policy(3));
        let token = CancellationToken::new();
        token.cancel();

        let err = runner.run_once(&engine, &subscription, &token).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::Canceled));
    }
}
