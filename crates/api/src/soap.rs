//! The EPCIS 1.2 SOAP `Query.svc` surface (SPEC_FULL.md §2.5): a thin,
//! same-engine alternative entry point to the REST surface in `app::routes`
//! for clients still speaking the 1.2 WSDL binding. Every operation maps
//! onto the same `QueryEngine`/`SubscriptionEngine` calls the REST handlers
//! use; only the envelope and the fault vocabulary differ.
//!
//! Request parsing is deliberately minimal: it reads the first child
//! element of `soap:Body` to dispatch on operation name, and for
//! `Poll`/`Subscribe` it walks `<param><name>.../name><value><string>...
//! </string></value></param>` elements into the same flat `(name, value)`
//! pairs the REST query string carries. It does not validate against the
//! full EPCIS WSDL schema — a production binding would use a generated
//! SOAP stub; this hand-rolled reader covers the shapes this reference
//! deployment emits and accepts.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Extension, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use quick_xml::events::Event;
use quick_xml::Reader;

use epcis_core::cancel::CancellationToken;
use epcis_core::{Subscription, SubscriptionId, Trigger};

use crate::app::state::AppState;
use crate::context::TenantContext;

const VENDOR_VERSION: &str = "1.0";
const STANDARD_VERSION: &str = "1.2";

/// The EPCIS 1.2 exception hierarchy (SPEC_FULL.md §2.5), mapped from the
/// same internal error kinds the REST surface maps to HTTP statuses.
enum QueryFault {
    QueryParameterException(String),
    NoSuchNameException(String),
    SubscriptionControlsException(String),
    DuplicateSubscriptionException(String),
    ImplementationException(String),
    SecurityException(String),
}

impl QueryFault {
    fn qname(&self) -> &'static str {
        match self {
            QueryFault::QueryParameterException(_) => "epcisq:QueryParameterException",
            QueryFault::NoSuchNameException(_) => "epcisq:NoSuchNameException",
            QueryFault::SubscriptionControlsException(_) => "epcisq:SubscriptionControlsException",
            QueryFault::DuplicateSubscriptionException(_) => "epcisq:DuplicateSubscriptionException",
            QueryFault::ImplementationException(_) => "epcisq:ImplementationException",
            QueryFault::SecurityException(_) => "epcisq:SecurityException",
        }
    }

    fn detail(&self) -> &str {
        match self {
            QueryFault::QueryParameterException(d)
            | QueryFault::NoSuchNameException(d)
            | QueryFault::SubscriptionControlsException(d)
            | QueryFault::DuplicateSubscriptionException(d)
            | QueryFault::ImplementationException(d)
            | QueryFault::SecurityException(d) => d,
        }
    }
}

fn soap_envelope(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\" xmlns:epcisq=\"urn:epcglobal:epcis-query:xsd:1\">\
<soap:Body>{body}</soap:Body></soap:Envelope>"
    )
}

fn fault_response(fault: QueryFault) -> Response {
    let body = format!(
        "<soap:Fault><faultcode>soap:Server</faultcode><faultstring>{}</faultstring>\
<detail><{qname} xmlns=\"urn:epcglobal:epcis-query:xsd:1\"><reason>{detail}</reason></{qname}></detail></soap:Fault>",
        xml_escape(fault.detail()),
        qname = fault.qname(),
        detail = xml_escape(fault.detail()),
    );
    let mut response = (StatusCode::INTERNAL_SERVER_ERROR, soap_envelope(&body)).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/xml; charset=utf-8"));
    response
}

fn ok_response(body: String) -> Response {
    let mut response = (StatusCode::OK, soap_envelope(&body)).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/xml; charset=utf-8"));
    response
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Reads the SOAP body's first child element's local name to dispatch on.
fn operation_name(bytes: &[u8]) -> Option<String> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);
    let mut in_body = false;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(e.name().as_ref());
                if name == "Body" {
                    in_body = true;
                } else if in_body {
                    return Some(name);
                }
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

fn local_name(qname: &[u8]) -> String {
    let s = String::from_utf8_lossy(qname);
    s.rsplit(':').next().unwrap_or(&s).to_string()
}

/// Walks `<param><name>X</name><value><string>Y</string></value></param>`
/// elements anywhere in the body into flat `(name, value)` pairs.
fn extract_params(bytes: &[u8]) -> Vec<(String, String)> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut pairs = Vec::new();
    let mut current_name: Option<String> = None;
    let mut current_value: Option<String> = None;
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => path.push(local_name(e.name().as_ref())),
            Ok(Event::End(_)) => {
                let closed = path.pop();
                if closed.as_deref() == Some("param") {
                    if let (Some(name), Some(value)) = (current_name.take(), current_value.take()) {
                        pairs.push((name, value));
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().unwrap_or_default().into_owned();
                match path.last().map(String::as_str) {
                    Some("name") => current_name = Some(text),
                    Some("string") => current_value = Some(text),
                    _ => {}
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    pairs
}

fn extract_first(bytes: &[u8], element: &str) -> Option<String> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_target = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if local_name(e.name().as_ref()) == element => in_target = true,
            Ok(Event::Text(t)) if in_target => {
                return Some(t.unescape().unwrap_or_default().into_owned());
            }
            Ok(Event::End(e)) if local_name(e.name().as_ref()) == element => in_target = false,
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

pub async fn query_service(
    State(state): State<Arc<AppState>>,
    Extension(tenant): Extension<TenantContext>,
    body: Bytes,
) -> Response {
    let Some(operation) = operation_name(&body) else {
        return fault_response(QueryFault::ImplementationException("unable to parse SOAP body".to_string()));
    };

    match operation.as_str() {
        "GetVendorVersion" => ok_response(format!("<epcisq:GetVendorVersionResult xmlns:epcisq=\"urn:epcglobal:epcis-query:xsd:1\">{VENDOR_VERSION}</epcisq:GetVendorVersionResult>")),
        "GetStandardVersion" => ok_response(format!("<epcisq:GetStandardVersionResult xmlns:epcisq=\"urn:epcglobal:epcis-query:xsd:1\">{STANDARD_VERSION}</epcisq:GetStandardVersionResult>")),
        "GetQueryNames" => get_query_names(&state, &tenant).await,
        "Poll" => poll(&state, &tenant, &body).await,
        "Subscribe" => subscribe(&state, &tenant, &body).await,
        "Unsubscribe" => unsubscribe(&state, &tenant, &body).await,
        "GetSubscriptionIDs" => get_subscription_ids(&state, &tenant, &body).await,
        other => fault_response(QueryFault::NoSuchNameException(format!("unknown operation '{other}'"))),
    }
}

async fn get_query_names(state: &AppState, tenant: &TenantContext) -> Response {
    match state.subscription_engine.list_subscriptions(tenant.tenant_id()).await {
        Ok(subscriptions) => {
            let names: String = subscriptions
                .iter()
                .map(|s| format!("<string>{}</string>", xml_escape(&s.name)))
                .collect();
            ok_response(format!("<epcisq:GetQueryNamesResult xmlns:epcisq=\"urn:epcglobal:epcis-query:xsd:1\">{names}</epcisq:GetQueryNamesResult>"))
        }
        Err(error) => fault_response(QueryFault::ImplementationException(error.to_string())),
    }
}

async fn poll(state: &AppState, tenant: &TenantContext, body: &[u8]) -> Response {
    let Some(query_name) = extract_first(body, "queryName") else {
        return fault_response(QueryFault::QueryParameterException("missing queryName".to_string()));
    };

    let mut params = extract_params(body);
    if query_name != "SimpleEventQuery" {
        if let Some(named) = state.named_queries.get(tenant.tenant_id(), &query_name) {
            params.extend(named);
        } else {
            return fault_response(QueryFault::NoSuchNameException(format!("no query named '{query_name}'")));
        }
    }

    let token = CancellationToken::new();
    match state.query_engine.execute(tenant.tenant_id(), &params, &token).await {
        Ok(results) => {
            let prefixes = Default::default();
            let events: String = results
                .events
                .iter()
                .map(|e| epcis_codec::json::encode_event(e, &prefixes).to_string())
                .collect::<Vec<_>>()
                .join(",");
            ok_response(format!(
                "<epcisq:PollResult xmlns:epcisq=\"urn:epcglobal:epcis-query:xsd:1\"><eventCount>{}</eventCount><events>[{}]</events></epcisq:PollResult>",
                results.events.len(),
                events
            ))
        }
        Err(error) => query_fault_from_query_error(error),
    }
}

fn query_fault_from_query_error(error: epcis_query::QueryError) -> Response {
    use epcis_query::QueryError;
    match error {
        QueryError::UnsupportedParameter(p) => fault_response(QueryFault::QueryParameterException(p)),
        QueryError::InvalidParameterValue { name, detail } => {
            fault_response(QueryFault::QueryParameterException(format!("{name}: {detail}")))
        }
        QueryError::QueryTooLargeException { limit, matched } => fault_response(QueryFault::QueryParameterException(format!(
            "eventCountLimit={limit} would truncate {matched} matches"
        ))),
        QueryError::SubscriptionAlreadyExists(name) => fault_response(QueryFault::DuplicateSubscriptionException(name)),
        other => fault_response(QueryFault::ImplementationException(other.to_string())),
    }
}

async fn subscribe(state: &AppState, tenant: &TenantContext, body: &[u8]) -> Response {
    let Some(query_name) = extract_first(body, "queryName") else {
        return fault_response(QueryFault::QueryParameterException("missing queryName".to_string()));
    };
    let Some(subscription_id) = extract_first(body, "subscriptionID") else {
        return fault_response(QueryFault::SubscriptionControlsException("missing subscriptionID".to_string()));
    };
    let Some(destination) = extract_first(body, "dest") else {
        return fault_response(QueryFault::SubscriptionControlsException("missing dest".to_string()));
    };

    let params = extract_params(body);
    let subscription = Subscription::new(
        tenant.tenant_id().clone(),
        subscription_id,
        query_name,
        params,
        destination,
        Trigger::OnCapture,
    );

    match state.subscription_engine.create_subscription(subscription).await {
        Ok(()) => ok_response("<epcisq:SubscribeResult xmlns:epcisq=\"urn:epcglobal:epcis-query:xsd:1\"/>".to_string()),
        Err(epcis_subscriptions::SubscriptionError::AlreadyExists(name)) => {
            fault_response(QueryFault::DuplicateSubscriptionException(name))
        }
        Err(error) => fault_response_from_subscription_error(error),
    }
}

async fn unsubscribe(state: &AppState, tenant: &TenantContext, body: &[u8]) -> Response {
    let Some(raw_id) = extract_first(body, "subscriptionID") else {
        return fault_response(QueryFault::SubscriptionControlsException("missing subscriptionID".to_string()));
    };

    match find_subscription_by_name(state, tenant, &raw_id).await {
        Some(id) => match state.subscription_engine.delete_subscription(tenant.tenant_id(), &id).await {
            Ok(()) => ok_response("<epcisq:UnsubscribeResult xmlns:epcisq=\"urn:epcglobal:epcis-query:xsd:1\"/>".to_string()),
            Err(error) => fault_response_from_subscription_error(error),
        },
        None => fault_response(QueryFault::NoSuchNameException(format!("no subscription named '{raw_id}'"))),
    }
}

async fn get_subscription_ids(state: &AppState, tenant: &TenantContext, body: &[u8]) -> Response {
    let query_name = extract_first(body, "queryName");
    match state.subscription_engine.list_subscriptions(tenant.tenant_id()).await {
        Ok(subscriptions) => {
            let ids: String = subscriptions
                .iter()
                .filter(|s| query_name.as_deref().map(|n| n == s.query_name).unwrap_or(true))
                .map(|s| format!("<string>{}</string>", xml_escape(&s.name)))
                .collect();
            ok_response(format!("<epcisq:GetSubscriptionIDsResult xmlns:epcisq=\"urn:epcglobal:epcis-query:xsd:1\">{ids}</epcisq:GetSubscriptionIDsResult>"))
        }
        Err(error) => fault_response(QueryFault::ImplementationException(error.to_string())),
    }
}

async fn find_subscription_by_name(state: &AppState, tenant: &TenantContext, name: &str) -> Option<SubscriptionId> {
    let subscriptions = state.subscription_engine.list_subscriptions(tenant.tenant_id()).await.ok()?;
    subscriptions.into_iter().find(|s| s.name == name).map(|s| s.subscription_id)
}

fn fault_response_from_subscription_error(error: epcis_subscriptions::SubscriptionError) -> Response {
    use epcis_subscriptions::SubscriptionError;
    match error {
        SubscriptionError::AlreadyExists(name) => fault_response(QueryFault::DuplicateSubscriptionException(name)),
        SubscriptionError::NotFound(name) => fault_response(QueryFault::NoSuchNameException(name)),
        SubscriptionError::InvalidSchedule { expression, detail } => {
            fault_response(QueryFault::SubscriptionControlsException(format!("{expression}: {detail}")))
        }
        SubscriptionError::Query(query_error) => query_fault_from_query_error(query_error),
        SubscriptionError::Storage(_) => fault_response(QueryFault::ImplementationException("storage error".to_string())),
        SubscriptionError::Canceled => fault_response(QueryFault::ImplementationException("canceled".to_string())),
    }
}
