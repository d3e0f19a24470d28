//! Maps every crate-local error enum onto the HTTP status/body spec.md §7
//! requires: structured detail (rule identifiers, parameter names) in the
//! body, no raw storage-engine messages, no body at all for a canceled
//! request.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use epcis_capture::CaptureError;
use epcis_codec::CodecError;
use epcis_query::QueryError;
use epcis_storage::StorageError;
use epcis_subscriptions::SubscriptionError;

/// A single `(status, code, message, detail)` error response shape shared
/// across the capture, query, discovery, and subscription surfaces.
pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> axum::response::Response {
    json_error_with_detail(status, code, message, serde_json::Value::Null)
}

pub fn json_error_with_detail(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
    detail: serde_json::Value,
) -> axum::response::Response {
    let mut body = json!({
        "error": code,
        "message": message.into(),
    });
    if !detail.is_null() {
        body["detail"] = detail;
    }
    (status, axum::Json(body)).into_response()
}

fn storage_error_response(err: &StorageError) -> axum::response::Response {
    match err {
        StorageError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        StorageError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg.clone()),
        StorageError::UnsupportedProvider(provider) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "unsupported_storage_provider",
            format!("storage provider '{provider}' is not implemented"),
        ),
        StorageError::Unavailable(_) | StorageError::Internal(_) | StorageError::InvalidQuery(_) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", "storage error")
        }
    }
}

pub fn codec_error_response(err: CodecError) -> axum::response::Response {
    match err {
        CodecError::MalformedDocument(detail) => {
            json_error(StatusCode::BAD_REQUEST, "malformed_document", detail)
        }
        CodecError::SchemaInvalid(detail) => json_error(StatusCode::BAD_REQUEST, "schema_invalid", detail),
        CodecError::UnsupportedVersion(version) => {
            json_error(StatusCode::BAD_REQUEST, "unsupported_version", format!("unsupported schemaVersion '{version}'"))
        }
        CodecError::OversizedDocument { actual, limit } => json_error_with_detail(
            StatusCode::PAYLOAD_TOO_LARGE,
            "capture_size_limit_exceeded",
            format!("document is {actual} bytes, limit is {limit}"),
            json!({ "actual": actual, "limit": limit }),
        ),
        CodecError::UnsupportedContentType(ct) => json_error(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "unsupported_content_type",
            format!("unsupported content type '{ct}'"),
        ),
    }
}

pub fn capture_error_response(err: CaptureError) -> axum::response::Response {
    match err {
        CaptureError::CaptureLimitExceeded { submitted, limit } => json_error_with_detail(
            StatusCode::PAYLOAD_TOO_LARGE,
            "capture_limit_exceeded",
            format!("capture submitted {submitted} events, limit is {limit}"),
            json!({ "submitted": submitted, "limit": limit }),
        ),
        CaptureError::ValidationFailed(violations) => json_error_with_detail(
            StatusCode::BAD_REQUEST,
            "validation_failed",
            "one or more capture rules were violated",
            json!(violations),
        ),
        CaptureError::Storage(storage_error) => storage_error_response(&storage_error),
        CaptureError::Canceled => StatusCode::NO_CONTENT.into_response(),
    }
}

pub fn query_error_response(err: QueryError) -> axum::response::Response {
    match err {
        QueryError::UnsupportedParameter(name) => json_error(
            StatusCode::BAD_REQUEST,
            "unsupported_parameter",
            format!("unsupported query parameter: {name}"),
        ),
        QueryError::InvalidParameterValue { name, detail } => json_error_with_detail(
            StatusCode::BAD_REQUEST,
            "invalid_parameter_value",
            format!("invalid value for parameter {name}"),
            json!({ "name": name, "detail": detail }),
        ),
        QueryError::QueryTooLargeException { limit, matched } => json_error_with_detail(
            StatusCode::PAYLOAD_TOO_LARGE,
            "query_too_large",
            "eventCountLimit would truncate the result",
            json!({ "limit": limit, "matched": matched }),
        ),
        QueryError::Storage(storage_error) => storage_error_response(&storage_error),
        QueryError::Canceled => StatusCode::NO_CONTENT.into_response(),
        QueryError::SubscriptionAlreadyExists(name) => {
            json_error(StatusCode::CONFLICT, "subscription_already_exists", format!("subscription '{name}' already exists"))
        }
    }
}

pub fn subscription_error_response(err: SubscriptionError) -> axum::response::Response {
    match err {
        SubscriptionError::AlreadyExists(name) => {
            json_error(StatusCode::CONFLICT, "subscription_already_exists", format!("subscription '{name}' already exists"))
        }
        SubscriptionError::NotFound(name) => {
            json_error(StatusCode::NOT_FOUND, "subscription_not_found", format!("no subscription named '{name}'"))
        }
        SubscriptionError::InvalidSchedule { expression, detail } => json_error_with_detail(
            StatusCode::BAD_REQUEST,
            "invalid_schedule",
            format!("invalid cron expression '{expression}'"),
            json!({ "detail": detail }),
        ),
        SubscriptionError::Query(query_error) => query_error_response(query_error),
        SubscriptionError::Storage(storage_error) => storage_error_response(&storage_error),
        SubscriptionError::Canceled => StatusCode::NO_CONTENT.into_response(),
    }
}
