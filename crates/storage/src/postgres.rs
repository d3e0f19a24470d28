//! Postgres-backed `Storage`.
//!
//! ## Schema
//!
//! No migration tooling ships with this crate (none did in the teacher
//! either); the DDL below is the contract `PostgresStore` assumes is already
//! applied:
//!
//! ```sql
//! CREATE TABLE captures (
//!     capture_id UUID PRIMARY KEY,
//!     tenant_id TEXT NOT NULL,
//!     document_time TIMESTAMPTZ NOT NULL,
//!     record_time TIMESTAMPTZ NOT NULL,
//!     schema_version TEXT NOT NULL,
//!     standard_business_header JSONB,
//!     master_data JSONB NOT NULL DEFAULT '[]',
//!     subscription_correlation TEXT
//! );
//!
//! CREATE TABLE events (
//!     tenant_id TEXT NOT NULL,
//!     event_id TEXT NOT NULL,
//!     capture_id UUID NOT NULL REFERENCES captures(capture_id),
//!     sequence_in_capture INT NOT NULL,
//!     event_type TEXT NOT NULL,
//!     action TEXT,
//!     event_time TIMESTAMPTZ NOT NULL,
//!     record_time TIMESTAMPTZ NOT NULL,
//!     business_step TEXT,
//!     disposition TEXT,
//!     read_point TEXT,
//!     business_location TEXT,
//!     transformation_id TEXT,
//!     epcs JSONB NOT NULL DEFAULT '[]',
//!     corrective_event_ids TEXT[] NOT NULL DEFAULT '{}',
//!     sensor_reports JSONB NOT NULL DEFAULT '[]',
//!     fields JSONB NOT NULL DEFAULT '[]',
//!     payload JSONB NOT NULL,
//!     PRIMARY KEY (tenant_id, event_id)
//! );
//!
//! CREATE TABLE master_data (
//!     tenant_id TEXT NOT NULL,
//!     vocabulary_type TEXT NOT NULL,
//!     id TEXT NOT NULL,
//!     payload JSONB NOT NULL,
//!     PRIMARY KEY (tenant_id, vocabulary_type, id)
//! );
//!
//! CREATE TABLE subscriptions (
//!     subscription_id UUID PRIMARY KEY,
//!     tenant_id TEXT NOT NULL,
//!     name TEXT NOT NULL,
//!     query_name TEXT NOT NULL,
//!     parameters JSONB NOT NULL,
//!     destination TEXT NOT NULL,
//!     report_if_empty BOOLEAN NOT NULL,
//!     initial_record_time TIMESTAMPTZ,
//!     last_executed_time TIMESTAMPTZ,
//!     trigger_kind TEXT NOT NULL,
//!     trigger_cron TEXT,
//!     active BOOLEAN NOT NULL,
//!     UNIQUE (tenant_id, name)
//! );
//! ```
//!
//! ## Error mapping
//!
//! | SQLx error | Postgres code | `StorageError` |
//! |---|---|---|
//! | unique violation | `23505` | `Conflict` |
//! | foreign key violation | `23503` | `InvalidQuery` |
//! | check violation | `23514` | `InvalidQuery` |
//! | pool closed / other | — | `Unavailable` / `Internal` |

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{instrument, Span};

use async_trait::async_trait;
use epcis_core::{Capture, CaptureId, Event, EventId, MasterData, Subscription, SubscriptionId, TenantId, Trigger};

use crate::error::StorageError;
use crate::predicate::{Comparator, OrderDirection, Predicate, SensorCmp, SensorField, TimeField};
use crate::store::Storage;

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("{operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StorageError::Conflict(msg),
                Some("23503") | Some("23514") => StorageError::InvalidQuery(msg),
                _ => StorageError::Internal(msg),
            }
        }
        sqlx::Error::PoolClosed => StorageError::Unavailable(format!("{operation}: pool closed")),
        sqlx::Error::RowNotFound => StorageError::NotFound,
        other => StorageError::Internal(format!("{operation}: {other}")),
    }
}

// --- dynamic Predicate -> SQL compilation -----------------------------------

enum Bind {
    Text(String),
    TextArray(Vec<String>),
    Number(f64),
    Time(DateTime<Utc>),
}

/// Builds a parameterized `WHERE` fragment from a `Predicate` tree. `$1` is
/// reserved by callers for `tenant_id`; every placeholder this struct hands
/// out starts at `$2`.
#[derive(Default)]
struct PredicateCompiler {
    binds: Vec<Bind>,
}

impl PredicateCompiler {
    fn placeholder(&mut self, bind: Bind) -> String {
        self.binds.push(bind);
        format!("${}", self.binds.len() + 1)
    }

    fn compile_sensor_condition(&mut self, cond: &crate::predicate::SensorFieldCondition) -> String {
        let column = sensor_column(cond.field);
        match cond.field {
            SensorField::Type
            | SensorField::DeviceId
            | SensorField::Uom
            | SensorField::Component
            | SensorField::StringValue
            | SensorField::UriValue => {
                if cond.cmp != SensorCmp::Eq {
                    return "FALSE".to_string();
                }
                match &cond.text {
                    Some(v) => format!("r->>'{column}' = {}", self.placeholder(Bind::Text(v.clone()))),
                    None => "FALSE".to_string(),
                }
            }
            SensorField::Time => {
                if cond.cmp == SensorCmp::Exists {
                    return format!("r ? '{column}'");
                }
                let Some(v) = cond.time else { return "FALSE".to_string() };
                let op = sensor_cmp_op(cond.cmp);
                format!("(r->>'{column}')::timestamptz {op} {}", self.placeholder(Bind::Time(v)))
            }
            _ => {
                if cond.cmp == SensorCmp::Exists {
                    return format!("r ? '{column}'");
                }
                let Some(v) = cond.numeric else { return "FALSE".to_string() };
                let op = sensor_cmp_op(cond.cmp);
                format!("(r->>'{column}')::double precision {op} {}", self.placeholder(Bind::Number(v)))
            }
        }
    }

    fn compile(&mut self, predicate: &Predicate) -> String {
        match predicate {
            Predicate::All(ps) => {
                if ps.is_empty() {
                    return "TRUE".to_string();
                }
                ps.iter()
                    .map(|p| format!("({})", self.compile(p)))
                    .collect::<Vec<_>>()
                    .join(" AND ")
            }

            Predicate::EventTypeIn(types) => {
                let values = types.iter().map(|t| t.as_str().to_string()).collect();
                format!("event_type = ANY({})", self.placeholder(Bind::TextArray(values)))
            }

            Predicate::ActionIn(actions) => {
                let values = actions.iter().map(|a| a.as_str().to_string()).collect();
                format!("action = ANY({})", self.placeholder(Bind::TextArray(values)))
            }

            Predicate::Time { field, cmp, value } => {
                let column = match field {
                    TimeField::EventTime => "event_time",
                    TimeField::RecordTime => "record_time",
                };
                let op = match cmp {
                    Comparator::Gt => ">",
                    Comparator::Gte => ">=",
                    Comparator::Lt => "<",
                    Comparator::Lte => "<=",
                };
                format!("{column} {op} {}", self.placeholder(Bind::Time(*value)))
            }

            Predicate::SeekAfter { field, direction, value, id } => {
                let column = match field {
                    TimeField::EventTime => "event_time",
                    TimeField::RecordTime => "record_time",
                };
                let op = match direction {
                    OrderDirection::Asc => ">",
                    OrderDirection::Desc => "<",
                };
                let time_ph = self.placeholder(Bind::Time(*value));
                let id_ph = self.placeholder(Bind::Text(id.as_str().to_string()));
                format!(
                    "({column} {op} {time_ph} OR ({column} = {time_ph} AND event_id {op} {id_ph}))"
                )
            }

            Predicate::BizStepIn(values) => format!(
                "business_step = ANY({})",
                self.placeholder(Bind::TextArray(values.clone()))
            ),
            Predicate::DispositionIn(values) => format!(
                "disposition = ANY({})",
                self.placeholder(Bind::TextArray(values.clone()))
            ),
            Predicate::ReadPointIn(values) => format!(
                "read_point = ANY({})",
                self.placeholder(Bind::TextArray(values.clone()))
            ),
            Predicate::BizLocationIn(values) => format!(
                "business_location = ANY({})",
                self.placeholder(Bind::TextArray(values.clone()))
            ),
            Predicate::TransformationIdIn(values) => format!(
                "transformation_id = ANY({})",
                self.placeholder(Bind::TextArray(values.clone()))
            ),

            Predicate::EpcMatches { epc_type, patterns } => {
                // Mirror `Epc::matches_prefix` (the in-memory reference,
                // spec.md §4.5): only a single trailing `*` is a wildcard,
                // translated to `%`; everything else, including a literal
                // `%`/`_`, is matched verbatim, so it must be escaped.
                let like_patterns = patterns.iter().map(|p| to_like_pattern(p)).collect();
                let patterns_ph = self.placeholder(Bind::TextArray(like_patterns));
                match epc_type {
                    Some(t) => {
                        let type_ph = self.placeholder(Bind::Text(epc_type_str(*t).to_string()));
                        format!(
                            "EXISTS (SELECT 1 FROM jsonb_array_elements(epcs) AS e \
                             WHERE e->>'epc_type' = {type_ph} AND e->>'id' LIKE ANY({patterns_ph}))"
                        )
                    }
                    None => format!(
                        "EXISTS (SELECT 1 FROM jsonb_array_elements(epcs) AS e WHERE e->>'id' LIKE ANY({patterns_ph}))"
                    ),
                }
            }

            Predicate::CorrectiveEventIdIn(ids) => {
                let values = ids.iter().map(|id| id.as_str().to_string()).collect();
                format!(
                    "corrective_event_ids && {}",
                    self.placeholder(Bind::TextArray(values))
                )
            }

            Predicate::SensorReportMatch(conditions) => {
                // spec.md §4.6 tie-break rule: every condition must hold on
                // the *same* report, hence one EXISTS with an AND-ed body
                // rather than one EXISTS per condition.
                let clauses: Vec<String> = conditions
                    .iter()
                    .map(|c| self.compile_sensor_condition(c))
                    .collect();
                let body = if clauses.is_empty() { "TRUE".to_string() } else { clauses.join(" AND ") };
                format!("EXISTS (SELECT 1 FROM jsonb_array_elements(sensor_reports) AS r WHERE {body})")
            }

            Predicate::FieldEq(m) => {
                let ns_ph = self.placeholder(Bind::Text(m.namespace.clone()));
                let name_ph = self.placeholder(Bind::Text(m.name.clone()));
                let value_clause = match m.comparator {
                    None => {
                        let mut clauses = Vec::new();
                        if let Some(tv) = &m.text_value {
                            clauses.push(format!("f->>'text_value' = {}", self.placeholder(Bind::Text(tv.clone()))));
                        }
                        if let Some(nv) = m.numeric_value {
                            clauses.push(format!(
                                "(f->>'numeric_value')::double precision = {}",
                                self.placeholder(Bind::Number(nv))
                            ));
                        }
                        if clauses.is_empty() {
                            "TRUE".to_string()
                        } else {
                            clauses.join(" AND ")
                        }
                    }
                    Some(cmp) => match (m.date_value, m.numeric_value) {
                        (Some(dv), _) => {
                            let op = match cmp {
                                Comparator::Gt => ">",
                                Comparator::Gte => ">=",
                                Comparator::Lt => "<",
                                Comparator::Lte => "<=",
                            };
                            format!(
                                "(f->>'date_value')::timestamptz {op} {}",
                                self.placeholder(Bind::Time(dv))
                            )
                        }
                        (None, Some(nv)) => {
                            let op = match cmp {
                                Comparator::Gt => ">",
                                Comparator::Gte => ">=",
                                Comparator::Lt => "<",
                                Comparator::Lte => "<=",
                            };
                            format!(
                                "(f->>'numeric_value')::double precision {op} {}",
                                self.placeholder(Bind::Number(nv))
                            )
                        }
                        (None, None) => "FALSE".to_string(),
                    },
                };
                format!(
                    "EXISTS (SELECT 1 FROM jsonb_array_elements(fields) AS f \
                     WHERE f->>'namespace' = {ns_ph} AND f->>'name' = {name_ph} AND {value_clause})"
                )
            }

            Predicate::FieldExists { namespace, name } => {
                let ns_ph = self.placeholder(Bind::Text(namespace.clone()));
                let name_ph = self.placeholder(Bind::Text(name.clone()));
                format!(
                    "EXISTS (SELECT 1 FROM jsonb_array_elements(fields) AS f \
                     WHERE f->>'namespace' = {ns_ph} AND f->>'name' = {name_ph})"
                )
            }

            Predicate::EventIdIn(ids) => {
                let values = ids.iter().map(|id| id.as_str().to_string()).collect();
                format!("event_id = ANY({})", self.placeholder(Bind::TextArray(values)))
            }
        }
    }
}

/// Escape `\`, `%`, and `_` so they match literally under Postgres's
/// default `LIKE` escape character, then translate a single trailing `*`
/// (spec.md §4.6's only wildcard) into the SQL `%` wildcard. A pattern with
/// no trailing `*` becomes an exact-match `LIKE` pattern with no wildcards
/// at all, matching `Epc::matches_prefix`'s literal-equality fallback.
fn to_like_pattern(raw: &str) -> String {
    fn escape_literal(s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        for c in s.chars() {
            if matches!(c, '\\' | '%' | '_') {
                out.push('\\');
            }
            out.push(c);
        }
        out
    }

    match raw.strip_suffix('*') {
        Some(prefix) => format!("{}%", escape_literal(prefix)),
        None => escape_literal(raw),
    }
}

fn sensor_column(field: SensorField) -> &'static str {
    match field {
        SensorField::Type => "sensor_type",
        SensorField::DeviceId => "device_id",
        SensorField::Value => "value",
        SensorField::MinValue => "min_value",
        SensorField::MaxValue => "max_value",
        SensorField::MeanValue => "mean_value",
        SensorField::Sdev => "sdev",
        SensorField::PercRank => "perc_rank",
        SensorField::PercValue => "perc_value",
        SensorField::Uom => "uom",
        SensorField::Time => "time",
        SensorField::Component => "component",
        SensorField::StringValue => "string_value",
        SensorField::UriValue => "uri_value",
    }
}

fn sensor_cmp_op(cmp: SensorCmp) -> &'static str {
    match cmp {
        SensorCmp::Eq => "=",
        SensorCmp::Gt => ">",
        SensorCmp::Gte => ">=",
        SensorCmp::Lt => "<",
        SensorCmp::Lte => "<=",
        SensorCmp::Exists => "IS NOT NULL",
    }
}

fn epc_type_str(t: epcis_core::EpcType) -> &'static str {
    use epcis_core::EpcType::*;
    match t {
        List => "list",
        ChildEpc => "child_epc",
        ParentId => "parent_id",
        InputEpc => "input_epc",
        OutputEpc => "output_epc",
        Quantity => "quantity",
    }
}

// --- row types ---------------------------------------------------------------

#[derive(FromRow)]
struct CaptureRow {
    capture_id: uuid::Uuid,
    tenant_id: String,
    document_time: DateTime<Utc>,
    record_time: DateTime<Utc>,
    schema_version: String,
    standard_business_header: Option<serde_json::Value>,
    master_data: serde_json::Value,
    subscription_correlation: Option<String>,
}

#[derive(FromRow)]
struct EventPayloadRow {
    event_id: String,
    payload: serde_json::Value,
}

#[derive(FromRow)]
struct MasterDataRow {
    payload: serde_json::Value,
}

#[derive(FromRow)]
struct SubscriptionRow {
    subscription_id: uuid::Uuid,
    tenant_id: String,
    name: String,
    query_name: String,
    parameters: serde_json::Value,
    destination: String,
    report_if_empty: bool,
    initial_record_time: Option<DateTime<Utc>>,
    last_executed_time: Option<DateTime<Utc>>,
    trigger_kind: String,
    trigger_cron: Option<String>,
    active: bool,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = StorageError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let parameters: Vec<(String, String)> = serde_json::from_value(row.parameters)
            .map_err(|e| StorageError::Internal(format!("decoding subscription parameters: {e}")))?;
        let trigger = match row.trigger_kind.as_str() {
            "on_capture" => Trigger::OnCapture,
            "on_schedule" => Trigger::OnSchedule(row.trigger_cron.unwrap_or_default()),
            other => return Err(StorageError::Internal(format!("unknown trigger_kind '{other}'"))),
        };
        Ok(Subscription {
            subscription_id: SubscriptionId::from_uuid(row.subscription_id),
            tenant_id: TenantId::new(row.tenant_id),
            name: row.name,
            query_name: row.query_name,
            parameters,
            destination: row.destination,
            report_if_empty: row.report_if_empty,
            initial_record_time: row.initial_record_time,
            last_executed_time: row.last_executed_time,
            trigger,
            active: row.active,
        })
    }
}

fn event_search_columns(event: &Event) -> (Option<&str>, serde_json::Value, Vec<String>, serde_json::Value, serde_json::Value) {
    let epcs = serde_json::json!(event
        .epcs
        .iter()
        .map(|e| serde_json::json!({ "epc_type": epc_type_str(e.epc_type), "id": e.id }))
        .collect::<Vec<_>>());
    let corrective_event_ids = event.corrective_event_ids.iter().map(|id| id.as_str().to_string()).collect();
    // Flattened so `select_event_ids`'s EXISTS join over `sensor_reports`
    // can bind every condition of a `SensorReportMatch` to one report row
    // (spec.md §4.6 tie-break rule) without re-deriving the struct shape.
    let sensor_reports: Vec<serde_json::Value> = event
        .all_sensor_reports()
        .map(|r| {
            serde_json::json!({
                "sensor_type": r.sensor_type,
                "device_id": r.device_id,
                "value": r.value,
                "min_value": r.min_value,
                "max_value": r.max_value,
                "mean_value": r.mean_value,
                "sdev": r.sdev,
                "perc_rank": r.perc_rank,
                "perc_value": r.perc_value,
                "uom": r.uom,
                "time": r.time,
                "component": r.component,
                "string_value": r.string_value,
                "uri_value": r.uri_value,
            })
        })
        .collect();
    let fields = serde_json::to_value(&event.fields).unwrap_or(serde_json::Value::Array(vec![]));
    (event.action.map(|a| a.as_str()), epcs, corrective_event_ids, serde_json::json!(sensor_reports), fields)
}

#[async_trait]
impl Storage for PostgresStore {
    #[instrument(skip(self, capture), fields(tenant_id = %capture.tenant_id, capture_id = %capture.capture_id), err)]
    async fn insert_capture(&self, capture: Capture) -> Result<(), StorageError> {
        let record_time = capture
            .record_time
            .ok_or_else(|| StorageError::Internal("capture has no record_time assigned".into()))?;

        let mut tx: Transaction<'_, Postgres> = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;

        sqlx::query(
            r#"
            INSERT INTO captures (
                capture_id, tenant_id, document_time, record_time,
                schema_version, standard_business_header, master_data, subscription_correlation
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(capture.capture_id.as_uuid())
        .bind(capture.tenant_id.as_str())
        .bind(capture.document_time)
        .bind(record_time)
        .bind(capture.schema_version.as_str())
        .bind(capture.standard_business_header.as_ref().map(|h| serde_json::json!(h)))
        .bind(serde_json::json!(capture.master_data))
        .bind(&capture.subscription_correlation)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_capture", e))?;

        for (sequence, event) in capture.events.iter().enumerate() {
            let (action, epcs, corrective_event_ids, sensor_reports, fields) =
                event_search_columns(event);
            let payload = serde_json::to_value(event)
                .map_err(|e| StorageError::Internal(format!("serializing event payload: {e}")))?;

            sqlx::query(
                r#"
                INSERT INTO events (
                    tenant_id, event_id, capture_id, sequence_in_capture,
                    event_type, action, event_time, record_time,
                    business_step, disposition, read_point, business_location, transformation_id,
                    epcs, corrective_event_ids, sensor_reports, fields, payload
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
                "#,
            )
            .bind(capture.tenant_id.as_str())
            .bind(event.event_id.as_str())
            .bind(capture.capture_id.as_uuid())
            .bind(sequence as i32)
            .bind(event.event_type.as_str())
            .bind(action)
            .bind(event.event_time)
            .bind(record_time)
            .bind(&event.business_step)
            .bind(&event.disposition)
            .bind(&event.read_point)
            .bind(&event.business_location)
            .bind(&event.transformation_id)
            .bind(epcs)
            .bind(corrective_event_ids)
            .bind(sensor_reports)
            .bind(fields)
            .bind(payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_event", e))?;
        }

        for entry in &capture.master_data {
            sqlx::query(
                r#"
                INSERT INTO master_data (tenant_id, vocabulary_type, id, payload)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (tenant_id, vocabulary_type, id)
                DO UPDATE SET payload = EXCLUDED.payload
                "#,
            )
            .bind(capture.tenant_id.as_str())
            .bind(&entry.vocabulary_type)
            .bind(&entry.id)
            .bind(serde_json::json!(entry))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("upsert_master_data", e))?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, capture_id = %id), err)]
    async fn get_capture(&self, tenant_id: &TenantId, id: &CaptureId) -> Result<Option<Capture>, StorageError> {
        let row = sqlx::query_as::<_, CaptureRow>(
            "SELECT capture_id, tenant_id, document_time, record_time, schema_version, \
             standard_business_header, master_data, subscription_correlation \
             FROM captures WHERE tenant_id = $1 AND capture_id = $2",
        )
        .bind(tenant_id.as_str())
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_capture", e))?;

        let Some(row) = row else { return Ok(None) };

        let event_rows = sqlx::query_as::<_, EventPayloadRow>(
            "SELECT event_id, payload FROM events WHERE tenant_id = $1 AND capture_id = $2 ORDER BY sequence_in_capture ASC",
        )
        .bind(tenant_id.as_str())
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_capture_events", e))?;

        let mut events = Vec::with_capacity(event_rows.len());
        for event_row in event_rows {
            let event: Event = serde_json::from_value(event_row.payload)
                .map_err(|e| StorageError::Internal(format!("decoding event payload: {e}")))?;
            events.push(event);
        }

        let master_data: Vec<MasterData> = serde_json::from_value(row.master_data)
            .map_err(|e| StorageError::Internal(format!("decoding capture master_data: {e}")))?;
        let standard_business_header = row
            .standard_business_header
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| StorageError::Internal(format!("decoding standard_business_header: {e}")))?;

        Ok(Some(Capture {
            capture_id: CaptureId::from_uuid(row.capture_id),
            tenant_id: TenantId::new(row.tenant_id),
            document_time: row.document_time,
            record_time: Some(row.record_time),
            schema_version: epcis_core::SchemaVersion::parse(&row.schema_version)
                .ok_or_else(|| StorageError::Internal(format!("unknown schema_version '{}'", row.schema_version)))?,
            standard_business_header,
            events,
            master_data,
            subscription_correlation: row.subscription_correlation,
        }))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn list_captures(
        &self,
        tenant_id: &TenantId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Capture>, StorageError> {
        let ids: Vec<uuid::Uuid> = sqlx::query(
            "SELECT capture_id FROM captures WHERE tenant_id = $1 ORDER BY record_time ASC LIMIT $2 OFFSET $3",
        )
        .bind(tenant_id.as_str())
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_captures", e))?
        .into_iter()
        .map(|row| row.try_get::<uuid::Uuid, _>("capture_id"))
        .collect::<Result<_, _>>()
        .map_err(|e| map_sqlx_error("list_captures", e))?;

        let mut captures = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(capture) = self.get_capture(tenant_id, &CaptureId::from_uuid(id)).await? {
                captures.push(capture);
            }
        }
        Ok(captures)
    }

    #[instrument(skip(self, predicate), fields(tenant_id = %tenant_id, cap), err)]
    async fn select_event_ids(
        &self,
        tenant_id: &TenantId,
        predicate: &Predicate,
        order: crate::predicate::Order,
        cap: u32,
    ) -> Result<Vec<(EventId, DateTime<Utc>)>, StorageError> {
        let span = Span::current();
        span.record("cap", cap);

        let mut compiler = PredicateCompiler::default();
        let where_clause = compiler.compile(predicate);
        let order_column = match order.field {
            TimeField::EventTime => "event_time",
            TimeField::RecordTime => "record_time",
        };
        let order_dir = match order.direction {
            crate::predicate::OrderDirection::Asc => "ASC",
            crate::predicate::OrderDirection::Desc => "DESC",
        };
        let limit_ph = format!("${}", compiler.binds.len() + 2);
        // Secondary ORDER BY on event_id: without it, rows tied on
        // event_time/record_time have no stable relative order across
        // pages (spec.md §4.6 "Pagination"; matches `SeekAfter`'s tie-break).
        // `{order_column}` is also projected so the caller can build a
        // `nextPageToken` without a second round-trip (see `Storage::
        // select_event_ids` doc comment).
        let sql = format!(
            "SELECT event_id, {order_column} AS order_value FROM events \
             WHERE tenant_id = $1 AND ({where_clause}) \
             ORDER BY {order_column} {order_dir}, event_id {order_dir} LIMIT {limit_ph}"
        );

        let mut query = sqlx::query(&sql).bind(tenant_id.as_str());
        for bind in compiler.binds {
            query = match bind {
                Bind::Text(v) => query.bind(v),
                Bind::TextArray(v) => query.bind(v),
                Bind::Number(v) => query.bind(v),
                Bind::Time(v) => query.bind(v),
            };
        }
        query = query.bind(cap as i64);

        let rows = query.fetch_all(&self.pool).await.map_err(|e| map_sqlx_error("select_event_ids", e))?;
        rows.into_iter()
            .map(|row| {
                let id = row.try_get::<String, _>("event_id").map(EventId::new)?;
                let order_value = row.try_get::<DateTime<Utc>, _>("order_value")?;
                Ok((id, order_value))
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("select_event_ids", e))
    }

    #[instrument(skip(self, ids), fields(tenant_id = %tenant_id, id_count = ids.len()), err)]
    async fn hydrate_events(&self, tenant_id: &TenantId, ids: &[EventId]) -> Result<Vec<Event>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let id_strs: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();

        let rows = sqlx::query_as::<_, EventPayloadRow>(
            "SELECT event_id, payload FROM events WHERE tenant_id = $1 AND event_id = ANY($2)",
        )
        .bind(tenant_id.as_str())
        .bind(&id_strs)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("hydrate_events", e))?;

        let mut by_id: HashMap<String, Event> = HashMap::with_capacity(rows.len());
        for row in rows {
            let event: Event = serde_json::from_value(row.payload)
                .map_err(|e| StorageError::Internal(format!("decoding event payload: {e}")))?;
            by_id.insert(row.event_id, event);
        }

        // Preserve `ids`' order via the map above; never `Vec::iter().position()`.
        Ok(ids.iter().filter_map(|id| by_id.remove(id.as_str())).collect())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn list_master_data(
        &self,
        tenant_id: &TenantId,
        vocabulary_type: Option<&str>,
    ) -> Result<Vec<MasterData>, StorageError> {
        let rows = sqlx::query_as::<_, MasterDataRow>(
            "SELECT payload FROM master_data WHERE tenant_id = $1 AND ($2::text IS NULL OR vocabulary_type = $2)",
        )
        .bind(tenant_id.as_str())
        .bind(vocabulary_type)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_master_data", e))?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row.payload).map_err(|e| StorageError::Internal(e.to_string())))
            .collect()
    }

    #[instrument(skip(self, entries), fields(tenant_id = %tenant_id, entry_count = entries.len()), err)]
    async fn upsert_master_data(&self, tenant_id: &TenantId, entries: Vec<MasterData>) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO master_data (tenant_id, vocabulary_type, id, payload)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (tenant_id, vocabulary_type, id)
                DO UPDATE SET payload = EXCLUDED.payload
                "#,
            )
            .bind(tenant_id.as_str())
            .bind(&entry.vocabulary_type)
            .bind(&entry.id)
            .bind(serde_json::json!(entry))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("upsert_master_data", e))?;
        }
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(())
    }

    #[instrument(skip(self, subscription), fields(tenant_id = %subscription.tenant_id, name = %subscription.name), err)]
    async fn create_subscription(&self, subscription: Subscription) -> Result<(), StorageError> {
        let (trigger_kind, trigger_cron) = match &subscription.trigger {
            Trigger::OnCapture => ("on_capture", None),
            Trigger::OnSchedule(cron) => ("on_schedule", Some(cron.as_str())),
        };
        let parameters = serde_json::to_value(&subscription.parameters)
            .map_err(|e| StorageError::Internal(format!("serializing subscription parameters: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                subscription_id, tenant_id, name, query_name, parameters, destination,
                report_if_empty, initial_record_time, last_executed_time, trigger_kind, trigger_cron, active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(subscription.subscription_id.as_uuid())
        .bind(subscription.tenant_id.as_str())
        .bind(&subscription.name)
        .bind(&subscription.query_name)
        .bind(parameters)
        .bind(&subscription.destination)
        .bind(subscription.report_if_empty)
        .bind(subscription.initial_record_time)
        .bind(subscription.last_executed_time)
        .bind(trigger_kind)
        .bind(trigger_cron)
        .bind(subscription.active)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_subscription", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, subscription_id = %id), err)]
    async fn get_subscription(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, StorageError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT subscription_id, tenant_id, name, query_name, parameters, destination, report_if_empty, \
             initial_record_time, last_executed_time, trigger_kind, trigger_cron, active \
             FROM subscriptions WHERE tenant_id = $1 AND subscription_id = $2",
        )
        .bind(tenant_id.as_str())
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn list_subscriptions(&self, tenant_id: &TenantId) -> Result<Vec<Subscription>, StorageError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT subscription_id, tenant_id, name, query_name, parameters, destination, report_if_empty, \
             initial_record_time, last_executed_time, trigger_kind, trigger_cron, active \
             FROM subscriptions WHERE tenant_id = $1",
        )
        .bind(tenant_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_subscriptions", e))?;

        rows.into_iter().map(Subscription::try_from).collect()
    }

    #[instrument(skip(self), err)]
    async fn list_active_subscriptions(&self) -> Result<Vec<Subscription>, StorageError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT subscription_id, tenant_id, name, query_name, parameters, destination, report_if_empty, \
             initial_record_time, last_executed_time, trigger_kind, trigger_cron, active \
             FROM subscriptions WHERE active",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_active_subscriptions", e))?;

        rows.into_iter().map(Subscription::try_from).collect()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, subscription_id = %id), err)]
    async fn delete_subscription(&self, tenant_id: &TenantId, id: &SubscriptionId) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE tenant_id = $1 AND subscription_id = $2")
            .bind(tenant_id.as_str())
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_subscription", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, subscription_id = %id), err)]
    async fn advance_subscription_cursor(
        &self,
        tenant_id: &TenantId,
        id: &SubscriptionId,
        watermark: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        // Monotonic advance (spec.md §8 invariant 7) enforced in the WHERE
        // clause itself, so a racing older watermark is a silent no-op
        // instead of a lost update.
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET last_executed_time = $3
            WHERE tenant_id = $1 AND subscription_id = $2
              AND (last_executed_time IS NULL OR last_executed_time <= $3)
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(id.as_uuid())
        .bind(watermark)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("advance_subscription_cursor", e))?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod like_pattern_tests {
    use super::to_like_pattern;

    #[test]
    fn trailing_star_becomes_an_anchored_wildcard() {
        assert_eq!(to_like_pattern("urn:epc:id:sgtin:8901213.105919.*"), "urn:epc:id:sgtin:8901213.105919.%");
    }

    #[test]
    fn pattern_without_a_star_is_an_exact_match_with_no_wildcards() {
        assert_eq!(to_like_pattern("urn:epc:id:sgtin:8901213.105919.000000"), "urn:epc:id:sgtin:8901213.105919.000000");
    }

    #[test]
    fn literal_percent_and_underscore_are_escaped_not_treated_as_wildcards() {
        assert_eq!(to_like_pattern("100%_done"), "100\\%\\_done");
        assert_eq!(to_like_pattern("100%_done*"), "100\\%\\_done%");
    }

    #[test]
    fn an_interior_star_is_literal_matching_the_in_memory_reference() {
        assert_eq!(to_like_pattern("urn:epc:*:sgtin"), "urn:epc:*:sgtin");
    }
}
