//! `POST /capture`, `GET /capture`, `GET /capture/{id}` (spec.md §6.1/§6.4).
//!
//! Content-type routing: `application/xml`/`text/xml` decode through
//! `epcis_codec::xml` (which itself sniffs 1.x vs 2.0 on `schemaVersion`),
//! `application/json`/`application/ld+json` decode through
//! `epcis_codec::json`. The EPCIS 1.2 SOAP binding (`soap` module) only
//! covers the Query interface, not Capture, so this handler never needs to
//! sniff for a SOAP envelope.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::Json;

use epcis_core::cancel::CancellationToken;
use epcis_core::Capture;
use epcis_storage::Storage;

use crate::app::dto::{parse_capture_id, CaptureSummary, ListCapturesQuery};
use crate::app::errors::{capture_error_response, codec_error_response, json_error};
use crate::app::state::AppState;
use crate::context::TenantContext;

fn decode_body(content_type: &str, body: &[u8], byte_budget: usize) -> Result<epcis_codec::EpcisDocument, axum::response::Response> {
    if body.len() > byte_budget {
        return Err(codec_error_response(epcis_codec::CodecError::OversizedDocument {
            actual: body.len(),
            limit: byte_budget,
        }));
    }

    let essence = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match essence.as_str() {
        "application/xml" | "text/xml" => {
            epcis_codec::xml::decode(body, byte_budget).map_err(codec_error_response)
        }
        "application/json" | "application/ld+json" => {
            let value: serde_json::Value = serde_json::from_slice(body)
                .map_err(|e| codec_error_response(epcis_codec::CodecError::MalformedDocument(e.to_string())))?;
            epcis_codec::json::decode_document(&value).map_err(codec_error_response)
        }
        other => Err(codec_error_response(epcis_codec::CodecError::UnsupportedContentType(other.to_string()))),
    }
}

pub async fn capture(
    State(state): State<Arc<AppState>>,
    Extension(tenant): Extension<TenantContext>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let document = match decode_body(content_type, &body, state.config.capture_size_limit) {
        Ok(doc) => doc,
        Err(response) => return response,
    };

    let document_time = document.creation_date.unwrap_or_else(chrono::Utc::now);
    let mut capture = Capture::new(tenant.tenant_id().clone(), document.schema_version, document_time);
    capture.standard_business_header = document.standard_business_header;
    capture.events = document.events;
    capture.master_data = document.master_data;

    let token = CancellationToken::new();
    match state.capture_handler.store(capture, &token).await {
        Ok(stored) => {
            let mut response = (StatusCode::CREATED, Json(CaptureSummary::from(&stored))).into_response();
            if let Ok(value) = HeaderValue::from_str(&format!("/capture/{}", stored.capture_id)) {
                response.headers_mut().insert(header::LOCATION, value);
            }
            response
        }
        Err(error) => capture_error_response(error),
    }
}

pub async fn list_captures(
    State(state): State<Arc<AppState>>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<ListCapturesQuery>,
) -> axum::response::Response {
    let limit = query.limit.unwrap_or(50).min(state.config.max_events_returned_in_query);
    let offset = query.offset.unwrap_or(0);

    match state.storage.as_ref().list_captures(tenant.tenant_id(), limit, offset).await {
        Ok(captures) => {
            let summaries: Vec<CaptureSummary> = captures.iter().map(CaptureSummary::from).collect();
            Json(summaries).into_response()
        }
        Err(error) => crate::app::errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "storage_error",
            error.to_string(),
        ),
    }
}

pub async fn get_capture(
    State(state): State<Arc<AppState>>,
    Extension(tenant): Extension<TenantContext>,
    Path(capture_id): Path<String>,
) -> axum::response::Response {
    let capture_id = match parse_capture_id(&capture_id) {
        Ok(id) => id,
        Err(()) => return json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid capture id"),
    };

    match state.storage.as_ref().get_capture(tenant.tenant_id(), &capture_id).await {
        Ok(Some(capture)) => Json(CaptureSummary::from(&capture)).into_response(),
        Ok(None) => json_error(StatusCode::NOT_FOUND, "not_found", "capture not found"),
        Err(error) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", error.to_string()),
    }
}
