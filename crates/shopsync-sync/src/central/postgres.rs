//! # PostgreSQL Central Link
//!
//! Talks to the central database with sqlx. Column lists come from the table
//! schemas; values are always bound, never spliced.
//!
//! ## Central Table Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  <table> ( id           BIGINT or TEXT  PRIMARY KEY,                    │
//! │            <fields...>  castable to bigint / double precision /         │
//! │                         text / boolean,                                 │
//! │            updated_at   TIMESTAMPTZ NOT NULL )                          │
//! │                                                                         │
//! │  Comparisons use date_trunc('milliseconds', updated_at) so central's    │
//! │  microseconds never make a row look newer than the store's copy.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pull filters on the raw column, as millisecond ranges around the
//! checkpoint, so a plain index on `updated_at` bounds the scan to rows
//! changed since the last pull. Only that slice is sorted by the truncated
//! timestamp.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Utc};
use shopsync_core::schema::{FieldType, IdKind, TableSchema};
use shopsync_core::{clock, FieldMap, FieldValue, HealthReport, RecordId, SyncCheckpoint, SyncableRecord};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{CentralError, CentralLink, CentralResult, PushAck};
use crate::config::CentralConfig;
use crate::error::SyncResult;

const UPDATED_AT_MS: &str = "date_trunc('milliseconds', updated_at)";

// =============================================================================
// Error Classification
// =============================================================================

/// Splits sqlx errors into "central is unreachable" and "this data is bad".
fn classify(err: sqlx::Error) -> CentralError {
    let unavailable = match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Configuration(_) => true,
        sqlx::Error::Database(db) => db.code().as_deref().is_some_and(is_unavailable_code),
        _ => false,
    };

    if unavailable {
        CentralError::Unavailable(err.to_string())
    } else {
        CentralError::Data(err.to_string())
    }
}

/// SQLSTATE classes for connection loss, resource exhaustion and shutdown.
fn is_unavailable_code(code: &str) -> bool {
    code.starts_with("08") || code.starts_with("53") || code.starts_with("57P")
}

/// Worth another connect attempt within the same window.
fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db.code().as_deref().is_some_and(is_unavailable_code),
        _ => false,
    }
}

// =============================================================================
// SQL Builders
// =============================================================================

fn pg_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Integer => "bigint",
        FieldType::Real => "double precision",
        FieldType::Text => "text",
        FieldType::Boolean => "boolean",
    }
}

/// Text ids compare bytewise, matching the store's ordering.
fn id_expr(schema: &TableSchema) -> &'static str {
    match schema.id_kind {
        IdKind::Integer => "id",
        IdKind::Text => "id COLLATE \"C\"",
    }
}

fn push_id(qb: &mut QueryBuilder<'static, Postgres>, id: &RecordId) {
    match id {
        RecordId::Int(v) => qb.push_bind(*v),
        RecordId::Text(v) => qb.push_bind(v.clone()),
    };
}

fn push_value(qb: &mut QueryBuilder<'static, Postgres>, value: &FieldValue) {
    match value {
        FieldValue::Null => qb.push("NULL"),
        FieldValue::Boolean(v) => qb.push_bind(*v),
        FieldValue::Integer(v) => qb.push_bind(*v),
        FieldValue::Real(v) => qb.push_bind(*v),
        FieldValue::Text(v) => qb.push_bind(v.clone()),
    };
}

pub(crate) fn pull_query(
    schema: &TableSchema,
    checkpoint: &SyncCheckpoint,
    limit: u32,
) -> QueryBuilder<'static, Postgres> {
    let id_cast = match schema.id_kind {
        IdKind::Integer => "id::bigint AS id",
        IdKind::Text => "id::text AS id",
    };
    let mut select = format!("SELECT {id_cast}");
    for def in schema.fields {
        select.push_str(&format!(", {0}::{1} AS {0}", def.name, pg_type(def.field_type)));
    }
    select.push_str(&format!(", {UPDATED_AT_MS} AS updated_at FROM {} WHERE ", schema.name));

    // truncated(updated_at) > cp  <=>  updated_at >= cp + 1ms, for a millisecond cp
    let from = clock::truncate_millis(checkpoint.updated_at);
    let next_ms = from + chrono::Duration::milliseconds(1);

    let mut qb = QueryBuilder::<Postgres>::new(select);
    match &checkpoint.last_id {
        None => {
            qb.push("updated_at >= ").push_bind(next_ms);
        }
        Some(last_id) => {
            qb.push("updated_at >= ")
                .push_bind(from)
                .push(" AND (updated_at >= ")
                .push_bind(next_ms)
                .push(" OR ")
                .push(id_expr(schema))
                .push(" > ");
            push_id(&mut qb, last_id);
            qb.push(")");
        }
    }

    qb.push(" ORDER BY ")
        .push(UPDATED_AT_MS)
        .push(", ")
        .push(id_expr(schema))
        .push(" LIMIT ")
        .push_bind(i64::from(limit));
    qb
}

/// Upsert that leaves a strictly newer central row alone (0 rows affected).
pub(crate) fn push_query(schema: &TableSchema, record: &SyncableRecord) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::<Postgres>::new(format!("INSERT INTO {} (id", schema.name));
    for def in schema.fields {
        qb.push(", ").push(def.name);
    }
    qb.push(", updated_at) VALUES (");
    push_id(&mut qb, &record.id);
    for def in schema.fields {
        qb.push(", ");
        push_value(&mut qb, record.fields.get(def.name).unwrap_or(&FieldValue::Null));
    }
    qb.push(", ").push_bind(record.updated_at).push(") ON CONFLICT (id) DO UPDATE SET ");
    for def in schema.fields {
        qb.push(format!("{0} = EXCLUDED.{0}, ", def.name));
    }
    qb.push(format!(
        "updated_at = EXCLUDED.updated_at WHERE date_trunc('milliseconds', {}.updated_at) <= EXCLUDED.updated_at",
        schema.name
    ));
    qb
}

fn decode_row(schema: &TableSchema, row: &PgRow) -> CentralResult<SyncableRecord> {
    let id = match schema.id_kind {
        IdKind::Integer => RecordId::Int(row.try_get::<i64, _>("id").map_err(classify)?),
        IdKind::Text => RecordId::Text(row.try_get::<String, _>("id").map_err(classify)?),
    };

    let mut fields = FieldMap::new();
    for def in schema.fields {
        let value = match def.field_type {
            FieldType::Integer => row.try_get::<Option<i64>, _>(def.name).map(FieldValue::from),
            FieldType::Real => row.try_get::<Option<f64>, _>(def.name).map(FieldValue::from),
            FieldType::Text => row.try_get::<Option<String>, _>(def.name).map(FieldValue::from),
            FieldType::Boolean => row.try_get::<Option<bool>, _>(def.name).map(FieldValue::from),
        }
        .map_err(classify)?;
        fields.insert(def.name.to_string(), value);
    }

    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(classify)?;
    Ok(SyncableRecord {
        id,
        fields,
        updated_at: clock::truncate_millis(updated_at),
        synced_at: None,
    })
}

// =============================================================================
// Link
// =============================================================================

pub struct PgCentralLink {
    url: String,
    /// URL without credentials, for logs.
    display_url: String,
    max_connections: u32,
    connect_timeout: Duration,
    pool: RwLock<Option<PgPool>>,
}

impl std::fmt::Debug for PgCentralLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgCentralLink")
            .field("url", &self.display_url)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl PgCentralLink {
    pub fn new(url: url::Url, max_connections: u32, connect_timeout: Duration) -> Self {
        let mut display = url.clone();
        let _ = display.set_password(None);
        PgCentralLink {
            url: url.to_string(),
            display_url: display.to_string(),
            max_connections,
            connect_timeout,
            pool: RwLock::new(None),
        }
    }

    pub fn from_config(config: &CentralConfig) -> SyncResult<Self> {
        Ok(Self::new(
            config.connection_url()?,
            config.max_connections,
            config.connect_timeout(),
        ))
    }

    /// Open pool, connecting first when needed.
    async fn pool(&self) -> CentralResult<PgPool> {
        if let Some(pool) = self.pool.read().await.as_ref() {
            if !pool.is_closed() {
                return Ok(pool.clone());
            }
        }
        self.connect(self.connect_timeout).await?;
        self.pool
            .read()
            .await
            .clone()
            .ok_or_else(|| CentralError::Unavailable("not connected".to_string()))
    }

    pub async fn close(&self) {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
            info!(central = %self.display_url, "Central pool closed");
        }
    }
}

#[async_trait]
impl CentralLink for PgCentralLink {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn connect(&self, timeout: Duration) -> CentralResult<()> {
        if let Some(pool) = self.pool.read().await.as_ref() {
            if !pool.is_closed() {
                return Ok(());
            }
        }

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(200))
            .with_max_interval(Duration::from_secs(2))
            .with_max_elapsed_time(Some(timeout))
            .build();

        let url = self.url.clone();
        let max_connections = self.max_connections;
        let attempt = move || {
            let url = url.clone();
            async move {
                PgPoolOptions::new()
                    .max_connections(max_connections)
                    .acquire_timeout(timeout)
                    .connect(&url)
                    .await
                    .map_err(|e| {
                        if is_transient(&e) {
                            debug!(error = %e, "Central connect attempt failed, retrying");
                            backoff::Error::transient(classify(e))
                        } else {
                            backoff::Error::permanent(classify(e))
                        }
                    })
            }
        };

        let pool = match tokio::time::timeout(timeout, backoff::future::retry(policy, attempt)).await {
            Ok(Ok(pool)) => pool,
            Ok(Err(e)) => {
                warn!(central = %self.display_url, error = %e, "Central connect failed");
                return Err(e);
            }
            Err(_) => {
                warn!(central = %self.display_url, ?timeout, "Central connect timed out");
                return Err(CentralError::Unavailable(format!(
                    "connect timed out after {}ms",
                    timeout.as_millis()
                )));
            }
        };

        info!(central = %self.display_url, "Connected to central database");
        *self.pool.write().await = Some(pool);
        Ok(())
    }

    async fn health_check(&self) -> HealthReport {
        let started = Instant::now();
        let pool = match self.pool().await {
            Ok(pool) => pool,
            Err(e) => return HealthReport::unreachable(e.to_string()),
        };

        match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&pool).await {
            Ok(_) => HealthReport::reachable(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)),
            Err(e) => HealthReport::unreachable(classify(e).to_string()),
        }
    }

    async fn pull_since(
        &self,
        schema: &TableSchema,
        checkpoint: &SyncCheckpoint,
        limit: u32,
    ) -> CentralResult<Vec<SyncableRecord>> {
        let pool = self.pool().await?;
        let rows = pull_query(schema, checkpoint, limit)
            .build()
            .fetch_all(&pool)
            .await
            .map_err(classify)?;

        debug!(table = schema.name, count = rows.len(), "Pulled from central");
        rows.iter().map(|row| decode_row(schema, row)).collect()
    }

    async fn push(&self, schema: &TableSchema, record: &SyncableRecord) -> CentralResult<PushAck> {
        let pool = self.pool().await?;
        let result = push_query(schema, record)
            .build()
            .execute(&pool)
            .await
            .map_err(classify)?;

        Ok(if result.rows_affected() == 0 {
            PushAck::CentralNewer
        } else {
            PushAck::Applied
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopsync_core::schema::{CATEGORIES, TRANSACTIONS};

    #[test]
    fn test_error_classification() {
        let io = sqlx::Error::Io(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"));
        assert!(is_transient(&io));
        assert!(classify(io).is_unavailable());

        assert!(classify(sqlx::Error::PoolTimedOut).is_unavailable());
        assert!(classify(sqlx::Error::PoolClosed).is_unavailable());
        assert!(!is_transient(&sqlx::Error::PoolClosed));

        assert!(matches!(classify(sqlx::Error::RowNotFound), CentralError::Data(_)));
        assert!(matches!(
            classify(sqlx::Error::ColumnNotFound("price".into())),
            CentralError::Data(_)
        ));
    }

    #[test]
    fn test_unavailable_sqlstates() {
        assert!(is_unavailable_code("08006"));
        assert!(is_unavailable_code("53300"));
        assert!(is_unavailable_code("57P01"));
        assert!(!is_unavailable_code("23505"));
        assert!(!is_unavailable_code("22P02"));
    }

    #[test]
    fn test_pull_query_uses_compound_cursor() {
        let initial = pull_query(&CATEGORIES, &SyncCheckpoint::initial("categories"), 50);
        let sql = initial.sql();
        assert!(sql.starts_with("SELECT id::bigint AS id, name::text AS name"));
        assert!(sql.contains("FROM categories WHERE updated_at >= $1 ORDER BY"));
        assert!(sql.ends_with("ORDER BY date_trunc('milliseconds', updated_at), id LIMIT $2"));

        let record = SyncableRecord::new("abc", FieldMap::new(), clock::from_millis(1_000).unwrap());
        let cp = SyncCheckpoint::after("transactions", &record);
        let resumed = pull_query(&TRANSACTIONS, &cp, 50);
        let sql = resumed.sql();
        assert!(sql.contains("id::text AS id"));
        assert!(sql.contains("WHERE updated_at >= $1 AND (updated_at >= $2 OR id COLLATE \"C\" > $3)"));
        assert!(sql.ends_with("LIMIT $4"));
        assert!(!sql.contains("WHERE date_trunc"));
    }

    #[test]
    fn test_push_query_guards_newer_central_rows() {
        let record = SyncableRecord::new(7, FieldMap::new(), clock::from_millis(1_000).unwrap())
            .with_field("name", "Frozen");
        let qb = push_query(&CATEGORIES, &record);
        let sql = qb.sql();
        assert!(sql.starts_with("INSERT INTO categories (id, name, parent_id, sort_order, updated_at) VALUES ($1, $2, NULL, NULL, $3)"));
        assert!(sql.contains("ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name"));
        assert!(sql.ends_with("WHERE date_trunc('milliseconds', categories.updated_at) <= EXCLUDED.updated_at"));
    }
}
