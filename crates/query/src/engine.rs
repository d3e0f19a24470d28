//! The Query Engine: parameter parsing → filter chain → two-phase
//! retrieval → pagination (spec.md §4.6).
//!
//! Tenant enforcement (spec.md §4.6 "Tenant enforcement") is structural
//! rather than an extra predicate: every `Storage` method is scoped by a
//! `&TenantId` argument the caller cannot omit, so there is no parameter
//! combination that reaches across tenants. A super-user bypass, if a
//! deployment wants one, is the caller's job (`epcis-auth::IdentityOracle`
//! resolves `on_behalf_of` *before* this crate ever sees a tenant id —
//! spec.md §4.6 "MUST be explicit").

use std::collections::HashMap;
use std::sync::Arc;

use epcis_core::cancel::CancellationToken;
use epcis_core::{Event, EventId, TenantId};
use epcis_storage::Storage;
use epcis_storage::predicate::Predicate;
use tracing::instrument;

use crate::error::{QueryError, QueryResult};
use crate::pagination::CursorCodec;
use crate::params::{self, ParsedQuery};

/// One page of a query result: events in phase-1 order, plus an opaque
/// continuation token when more rows exist beyond this page.
#[derive(Debug, Clone)]
pub struct QueryResults {
    pub events: Vec<Event>,
    pub next_page_token: Option<String>,
    /// The largest `order.field` value among this page's rows, if any.
    /// `epcis-subscriptions` uses this to advance a subscription's
    /// `recordTime` cursor without needing `Event` to carry its own
    /// `recordTime` (it doesn't — see `Storage::select_event_ids`).
    pub max_order_value: Option<chrono::DateTime<chrono::Utc>>,
}

/// Ties parameter parsing, two-phase retrieval, and pagination together
/// behind one entry point (spec.md §4.6). Stateless between calls — every
/// piece of state a query needs (tenant id, parameters, cursor) arrives in
/// the call.
pub struct QueryEngine<S> {
    storage: Arc<S>,
    cursor_codec: CursorCodec,
    max_events_returned_in_query: u32,
}

impl<S> QueryEngine<S>
where
    S: Storage,
{
    pub fn new(storage: Arc<S>, cursor_codec: CursorCodec, max_events_returned_in_query: u32) -> Self {
        Self {
            storage,
            cursor_codec,
            max_events_returned_in_query,
        }
    }

    /// Run an ad-hoc or named/subscription query. `params` is the decoded
    /// `(name, value)` pair list from the request's query string (or a
    /// subscription's frozen `parameters`, with the cursor's
    /// `GT_recordTime` already folded in by the caller — see
    /// `epcis-subscriptions`).
    #[instrument(skip(self, params, token), fields(tenant_id = %tenant_id, param_count = params.len()))]
    pub async fn execute(
        &self,
        tenant_id: &TenantId,
        params: &[(String, String)],
        token: &CancellationToken,
    ) -> QueryResult<QueryResults> {
        if token.is_canceled() {
            return Err(QueryError::Canceled);
        }

        // Vocabulary state backs `WD_`/`HASATTR_`/`EQATTR_` descendant and
        // attribute resolution (spec.md §4.6); resolved once per query,
        // ahead of predicate construction.
        let master_data = self.storage.list_master_data(tenant_id, None).await?;
        let parsed = params::parse(params, &master_data)?;

        if token.is_canceled() {
            return Err(QueryError::Canceled);
        }

        self.run(tenant_id, parsed, token).await
    }

    async fn run(
        &self,
        tenant_id: &TenantId,
        parsed: ParsedQuery,
        token: &CancellationToken,
    ) -> QueryResult<QueryResults> {
        let ParsedQuery {
            predicate,
            order,
            event_count_limit,
            max_event_count,
            per_page,
            next_page_token,
        } = parsed;

        let mut conjuncts = vec![predicate];
        if let Some(raw_token) = &next_page_token {
            let cursor = self.cursor_codec.decode(raw_token)?;
            if cursor.order != order {
                return Err(QueryError::InvalidParameterValue {
                    name: "nextPageToken".to_string(),
                    detail: "cursor was issued for a different orderBy/orderDirection".to_string(),
                });
            }
            conjuncts.push(Predicate::SeekAfter {
                field: order.field,
                direction: order.direction,
                value: cursor.order_value,
                id: cursor.id,
            });
        }
        let predicate = match conjuncts.len() {
            1 => conjuncts.into_iter().next().expect("len checked above"),
            _ => Predicate::All(conjuncts),
        };

        // Spec.md §4.6 "Result caps": `eventCountLimit` fails rather than
        // truncates; `maxEventCount` truncates; absent either, the hard
        // configured cap applies. `perPage` additionally bounds a single
        // page's size (spec.md "Pagination") but never raises the other caps.
        let hard_cap = self.max_events_returned_in_query;
        let effective_cap = match (event_count_limit, max_event_count) {
            (Some(limit), _) => limit.min(hard_cap),
            (None, Some(max)) => max.min(hard_cap),
            (None, None) => hard_cap,
        };
        let page_size = per_page.map(|p| p.min(effective_cap));

        // Request one row beyond the page/effective boundary so we can
        // distinguish "exactly full" from "more pages exist" without a
        // second count query.
        let probe_cap = page_size.unwrap_or(effective_cap).saturating_add(1);

        if token.is_canceled() {
            return Err(QueryError::Canceled);
        }

        let mut rows = self.storage.select_event_ids(tenant_id, &predicate, order, probe_cap).await?;

        if let Some(limit) = event_count_limit {
            let bounded = limit.min(hard_cap);
            if rows.len() as u32 > bounded {
                return Err(QueryError::QueryTooLargeException {
                    limit: bounded,
                    matched: rows.len() as u32,
                });
            }
        }

        let page_cap = page_size.unwrap_or(effective_cap);
        let has_more = rows.len() as u32 > page_cap;
        rows.truncate(page_cap as usize);
        let max_order_value = rows.iter().map(|(_, value)| *value).max();

        if token.is_canceled() {
            return Err(QueryError::Canceled);
        }

        // Phase 2: hydrate exactly these ids, then restore phase-1 order
        // via an id → position map (spec.md §4.7: never a linear
        // `Vec::iter().position()`, which is O(n²) over thousands of rows).
        let ids: Vec<EventId> = rows.iter().map(|(id, _)| id.clone()).collect();
        let hydrated = self.storage.hydrate_events(tenant_id, &ids).await?;

        let position: HashMap<&EventId, usize> = ids.iter().enumerate().map(|(i, id)| (id, i)).collect();
        let mut ordered: Vec<Option<Event>> = (0..ids.len()).map(|_| None).collect();
        for event in hydrated {
            if let Some(&pos) = position.get(&event.event_id) {
                ordered[pos] = Some(event);
            }
        }
        let events: Vec<Event> = ordered.into_iter().flatten().collect();

        let next_page_token = has_more
            .then(|| rows.last().map(|(id, order_value)| self.cursor_codec.encode(order, *order_value, id)))
            .flatten();

        Ok(QueryResults { events, next_page_token, max_order_value })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use epcis_core::{Action, Capture, Event, EventType, SchemaVersion, TenantId};
    use epcis_storage::InMemoryStore;

    use super::*;

    fn engine(store: Arc<InMemoryStore>) -> QueryEngine<InMemoryStore> {
        QueryEngine::new(store, CursorCodec::new(b"test-secret".to_vec()), 20_000)
    }

    async fn seed(store: &InMemoryStore, tenant: &str, n: u32) {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
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
    async fn tenant_a_never_sees_tenant_bs_events() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "acme", 1).await;
        seed(&store, "globex", 1).await;
        let engine = engine(store);

        let params = vec![("eventType".to_string(), "ObjectEvent".to_string())];
        let a = engine.execute(&TenantId::new("acme"), &params, &CancellationToken::new()).await.unwrap();
        assert_eq!(a.events.len(), 1);
        assert!(a.events[0].event_id.as_str().starts_with("urn:event:acme:"));
    }

    #[tokio::test]
    async fn unsupported_parameter_is_rejected_before_touching_storage() {
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(store);
        let err = engine
            .execute(&TenantId::new("acme"), &[("totallyMadeUp".to_string(), "x".to_string())], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedParameter(_)));
    }

    #[tokio::test]
    async fn event_count_limit_fails_when_the_match_set_overflows() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "acme", 5).await;
        let engine = engine(store);

        let params = vec![
            ("eventType".to_string(), "ObjectEvent".to_string()),
            ("eventCountLimit".to_string(), "3".to_string()),
        ];
        let err = engine.execute(&TenantId::new("acme"), &params, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, QueryError::QueryTooLargeException { limit: 3, .. }));
    }

    #[tokio::test]
    async fn max_event_count_silently_truncates() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "acme", 5).await;
        let engine = engine(store);

        let params = vec![
            ("eventType".to_string(), "ObjectEvent".to_string()),
            ("maxEventCount".to_string(), "3".to_string()),
        ];
        let result = engine.execute(&TenantId::new("acme"), &params, &CancellationToken::new()).await.unwrap();
        assert_eq!(result.events.len(), 3);
        assert!(result.next_page_token.is_none());
    }

    #[tokio::test]
    async fn pagination_walks_the_full_result_set_in_order() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "acme", 25).await;
        let engine = engine(store);
        let tenant = TenantId::new("acme");

        let base_params = vec![
            ("eventType".to_string(), "ObjectEvent".to_string()),
            ("perPage".to_string(), "10".to_string()),
        ];

        let mut all_ids = Vec::new();
        let mut params = base_params.clone();
        loop {
            let page = engine.execute(&tenant, &params, &CancellationToken::new()).await.unwrap();
            all_ids.extend(page.events.iter().map(|e| e.event_id.clone()));
            match page.next_page_token {
                Some(tok) => {
                    params = base_params.clone();
                    params.push(("nextPageToken".to_string(), tok));
                }
                None => break,
            }
        }

        assert_eq!(all_ids.len(), 25);
        let mut sorted = all_ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 25, "every page must be disjoint from every other");

        let single = engine
            .execute(
                &tenant,
                &[
                    ("eventType".to_string(), "ObjectEvent".to_string()),
                    ("maxEventCount".to_string(), "25".to_string()),
                ],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let single_ids: Vec<EventId> = single.events.iter().map(|e| e.event_id.clone()).collect();
        assert_eq!(all_ids, single_ids, "paginated walk must match a single unpaginated run, in order");
    }

    #[tokio::test]
    async fn a_canceled_token_aborts_before_any_storage_call() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "acme", 1).await;
        let engine = engine(store);

        let token = CancellationToken::new();
        token.cancel();
        let err = engine
            .execute(&TenantId::new("acme"), &[("eventType".to_string(), "ObjectEvent".to_string())], &token)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Canceled));
    }
}
