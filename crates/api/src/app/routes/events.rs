//! `GET /events`: the ad-hoc query endpoint (spec.md §6.1, §4.6).
//!
//! Response encoding follows `Accept`: `application/json`/`application/ld+json`
//! encode each event through `epcis_codec::json::encode_event`, anything
//! else (including absent) falls back to the EPCIS XML 2.0 document shape.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Extension, RawQuery, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;

use epcis_core::cancel::CancellationToken;
use epcis_codec::document::EpcisDocument;

use crate::app::errors::query_error_response;
use crate::app::state::AppState;
use crate::context::TenantContext;

fn parse_query_pairs(raw: Option<&str>) -> Vec<(String, String)> {
    let Some(raw) = raw else { return Vec::new() };
    form_urlencoded_pairs(raw)
}

/// Minimal `application/x-www-form-urlencoded` pair decoder for the query
/// string; avoids pulling in a dedicated crate for something this small
/// while still handling `%XX`/`+` escaping the way query strings use it.
fn form_urlencoded_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|segment| !segment.is_empty())
        .filter_map(|segment| {
            let mut parts = segment.splitn(2, '=');
            let name = parts.next()?;
            let value = parts.next().unwrap_or("");
            Some((percent_decode(name), percent_decode(value)))
        })
        .collect()
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(&value[i + 1..i + 3], 16) {
                    out.push(byte);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

pub async fn query_events(
    State(state): State<Arc<AppState>>,
    Extension(tenant): Extension<TenantContext>,
    RawQuery(raw_query): RawQuery,
    headers: axum::http::HeaderMap,
) -> axum::response::Response {
    let params = parse_query_pairs(raw_query.as_deref());
    let token = CancellationToken::new();

    match state.query_engine.execute(tenant.tenant_id(), &params, &token).await {
        Ok(results) => encode_results(results, &headers),
        Err(error) => query_error_response(error),
    }
}

fn wants_json(headers: &axum::http::HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("json"))
        .unwrap_or(false)
}

fn encode_results(results: epcis_query::QueryResults, headers: &axum::http::HeaderMap) -> axum::response::Response {
    let event_count = results.events.len();
    let next_page_token = results.next_page_token.clone();

    let mut response = if wants_json(headers) {
        let prefixes = BTreeMap::new();
        let events: Vec<serde_json::Value> = results
            .events
            .iter()
            .map(|event| epcis_codec::json::encode_event(event, &prefixes))
            .collect();
        Json(serde_json::json!({ "events": events })).into_response()
    } else {
        let document = EpcisDocument {
            schema_version: epcis_core::SchemaVersion::V2_0,
            creation_date: Some(chrono::Utc::now()),
            standard_business_header: None,
            events: results.events,
            master_data: Vec::new(),
        };
        match epcis_codec::xml::encode(&document) {
            Ok(bytes) => {
                let mut response = (StatusCode::OK, bytes).into_response();
                response
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/xml"));
                response
            }
            Err(error) => crate::app::errors::codec_error_response(error),
        }
    };

    if let Ok(value) = header::HeaderValue::from_str(&event_count.to_string()) {
        response.headers_mut().insert("x-epcis-event-count", value);
    }
    if let Some(token) = next_page_token {
        if let Ok(value) = header::HeaderValue::from_str(&token) {
            response.headers_mut().insert("x-epcis-next-page-token", value);
        }
    }
    response
}
