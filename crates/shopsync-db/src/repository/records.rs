//! # Record Repository
//!
//! Schema-driven SQL for the synchronizable business tables.
//!
//! ## Statement Shapes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SELECT id, <fields...>, updated_at, synced_at FROM <table>            │
//! │         WHERE <filters> [AND synced_at IS NULL] ORDER BY .. LIMIT ..   │
//! │                                                                         │
//! │  INSERT INTO <table> (id, <fields...>, updated_at, synced_at)          │
//! │                                                                         │
//! │  UPDATE <table> SET <fields...>, updated_at = ?, synced_at = ?         │
//! │         WHERE id = ?                                                   │
//! │                                                                         │
//! │  Table and column names come from TableSchema, values are bound.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `*_in` functions take a connection so callers can compose them inside
//! one transaction; the methods on [`RecordRepository`] run on the pool.

use chrono::{DateTime, Utc};
use shopsync_core::query::{self, Filter};
use shopsync_core::schema::{self, FieldType, IdKind, TableSchema};
use shopsync_core::{clock, FieldMap, FieldValue, Query, RecordId, SyncableRecord};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};

use crate::error::{DbError, DbResult};

// =============================================================================
// SQL Building Blocks
// =============================================================================

pub(crate) fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: &FieldValue) {
    match value {
        FieldValue::Null => {
            qb.push("NULL");
        }
        FieldValue::Boolean(v) => {
            qb.push_bind(*v);
        }
        FieldValue::Integer(v) => {
            qb.push_bind(*v);
        }
        FieldValue::Real(v) => {
            qb.push_bind(*v);
        }
        FieldValue::Text(v) => {
            qb.push_bind(v.clone());
        }
    }
}

pub(crate) fn push_id(qb: &mut QueryBuilder<'_, Sqlite>, id: &RecordId) {
    match id {
        RecordId::Int(v) => {
            qb.push_bind(*v);
        }
        RecordId::Text(v) => {
            qb.push_bind(v.clone());
        }
    }
}

fn select_prefix(schema: &TableSchema) -> String {
    let mut sql = String::from("SELECT id");
    for name in schema.field_names() {
        sql.push_str(", ");
        sql.push_str(name);
    }
    sql.push_str(", updated_at, synced_at FROM ");
    sql.push_str(schema.name);
    sql
}

/// Appends ` WHERE ...` for `filters` (and the unsynced flag). Filters must
/// already be validated against `schema`.
pub(crate) fn push_where(qb: &mut QueryBuilder<'_, Sqlite>, filters: &[Filter], unsynced_only: bool) {
    let mut joiner = " WHERE ";

    for filter in filters {
        qb.push(joiner);
        joiner = " AND ";
        qb.push(filter.field.as_str());
        qb.push(filter.op.sql());
        if filter.op.takes_value() {
            push_value(qb, &filter.value);
        }
    }

    if unsynced_only {
        qb.push(joiner);
        qb.push("synced_at IS NULL");
    }
}

/// Decodes a row selected with [`select_prefix`].
pub(crate) fn decode_row(schema: &TableSchema, row: &SqliteRow) -> DbResult<SyncableRecord> {
    let id = match schema.id_kind {
        IdKind::Integer => RecordId::Int(row.try_get::<i64, _>("id")?),
        IdKind::Text => RecordId::Text(row.try_get::<String, _>("id")?),
    };

    let mut fields = FieldMap::new();
    for def in schema.fields {
        let value = match def.field_type {
            FieldType::Integer => row.try_get::<Option<i64>, _>(def.name)?.map(FieldValue::Integer),
            FieldType::Real => row.try_get::<Option<f64>, _>(def.name)?.map(FieldValue::Real),
            FieldType::Text => row.try_get::<Option<String>, _>(def.name)?.map(FieldValue::Text),
            FieldType::Boolean => row.try_get::<Option<bool>, _>(def.name)?.map(FieldValue::Boolean),
        };
        fields.insert(def.name.to_string(), value.unwrap_or(FieldValue::Null));
    }

    let updated_at = clock::from_millis(row.try_get::<i64, _>("updated_at")?)
        .map_err(|e| DbError::corrupt(schema.name, e.to_string()))?;
    let synced_at = row
        .try_get::<Option<i64>, _>("synced_at")?
        .map(clock::from_millis)
        .transpose()
        .map_err(|e| DbError::corrupt(schema.name, e.to_string()))?;

    Ok(SyncableRecord {
        id,
        fields,
        updated_at,
        synced_at,
    })
}

fn field_value<'a>(record: &'a SyncableRecord, name: &str) -> &'a FieldValue {
    record.fields.get(name).unwrap_or(&FieldValue::Null)
}

// =============================================================================
// Connection-Level Operations
// =============================================================================

/// Fetches one row by id.
pub async fn fetch_in(
    conn: &mut SqliteConnection,
    schema: &TableSchema,
    id: &RecordId,
) -> DbResult<Option<SyncableRecord>> {
    let mut qb = QueryBuilder::<Sqlite>::new(select_prefix(schema));
    qb.push(" WHERE id = ");
    push_id(&mut qb, id);

    let row = qb.build().fetch_optional(&mut *conn).await?;
    row.map(|r| decode_row(schema, &r)).transpose()
}

/// Runs a validated query.
pub async fn query_in(
    conn: &mut SqliteConnection,
    schema: &TableSchema,
    query: &Query,
) -> DbResult<Vec<SyncableRecord>> {
    query.validate(schema)?;

    let mut qb = QueryBuilder::<Sqlite>::new(select_prefix(schema));
    push_where(&mut qb, &query.filters, query.unsynced_only);

    match &query.order_by {
        Some((field, direction)) => {
            qb.push(" ORDER BY ");
            qb.push(field.as_str());
            qb.push(direction.sql());
            qb.push(", id ASC");
        }
        None => {
            qb.push(" ORDER BY id ASC");
        }
    }

    // SQLite needs a LIMIT before OFFSET; -1 means unbounded
    if query.limit.is_some() || query.offset.is_some() {
        qb.push(" LIMIT ");
        qb.push_bind(query.limit.map(i64::from).unwrap_or(-1));
        if let Some(offset) = query.offset {
            qb.push(" OFFSET ");
            qb.push_bind(i64::from(offset));
        }
    }

    let rows = qb.build().fetch_all(&mut *conn).await?;
    rows.iter().map(|r| decode_row(schema, r)).collect()
}

/// Rows matching `filters`, used by bulk updates.
pub async fn matching_in(
    conn: &mut SqliteConnection,
    schema: &TableSchema,
    filters: &[Filter],
) -> DbResult<Vec<SyncableRecord>> {
    query::validate_filters(schema, filters)?;

    let mut qb = QueryBuilder::<Sqlite>::new(select_prefix(schema));
    push_where(&mut qb, filters, false);
    qb.push(" ORDER BY id ASC");

    let rows = qb.build().fetch_all(&mut *conn).await?;
    rows.iter().map(|r| decode_row(schema, r)).collect()
}

/// Inserts a whole record, bookkeeping columns included.
pub async fn insert_in(
    conn: &mut SqliteConnection,
    schema: &TableSchema,
    record: &SyncableRecord,
) -> DbResult<()> {
    let mut qb = QueryBuilder::<Sqlite>::new("INSERT INTO ");
    qb.push(schema.name);
    qb.push(" (id");
    for name in schema.field_names() {
        qb.push(", ");
        qb.push(name);
    }
    qb.push(", updated_at, synced_at) VALUES (");
    push_id(&mut qb, &record.id);
    for name in schema.field_names() {
        qb.push(", ");
        push_value(&mut qb, field_value(record, name));
    }
    qb.push(", ");
    qb.push_bind(clock::to_millis(record.updated_at));
    qb.push(", ");
    qb.push_bind(record.synced_at.map(clock::to_millis));
    qb.push(")");

    qb.build().execute(&mut *conn).await?;
    Ok(())
}

/// Overwrites every column of an existing row.
pub async fn update_in(
    conn: &mut SqliteConnection,
    schema: &TableSchema,
    record: &SyncableRecord,
) -> DbResult<()> {
    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE ");
    qb.push(schema.name);
    qb.push(" SET ");
    for name in schema.field_names() {
        qb.push(name);
        qb.push(" = ");
        push_value(&mut qb, field_value(record, name));
        qb.push(", ");
    }
    qb.push("updated_at = ");
    qb.push_bind(clock::to_millis(record.updated_at));
    qb.push(", synced_at = ");
    qb.push_bind(record.synced_at.map(clock::to_millis));
    qb.push(" WHERE id = ");
    push_id(&mut qb, &record.id);

    let result = qb.build().execute(&mut *conn).await?;
    if result.rows_affected() == 0 {
        return Err(DbError::not_found(schema.name, record.id.to_string()));
    }
    Ok(())
}

/// Sets `synced_at` only if the row still carries `expected_updated_at`.
///
/// Returns false when a local write landed after the snapshot was taken;
/// that write stays pending.
pub async fn mark_synced_in(
    conn: &mut SqliteConnection,
    schema: &TableSchema,
    id: &RecordId,
    expected_updated_at: DateTime<Utc>,
    synced_at: DateTime<Utc>,
) -> DbResult<bool> {
    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE ");
    qb.push(schema.name);
    qb.push(" SET synced_at = ");
    qb.push_bind(clock::to_millis(synced_at));
    qb.push(" WHERE id = ");
    push_id(&mut qb, id);
    qb.push(" AND updated_at = ");
    qb.push_bind(clock::to_millis(expected_updated_at));

    let result = qb.build().execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Repository
// =============================================================================

/// Pool-level access to business rows.
#[derive(Debug, Clone)]
pub struct RecordRepository {
    pool: SqlitePool,
}

impl RecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RecordRepository { pool }
    }

    pub async fn get(&self, schema: &TableSchema, id: &RecordId) -> DbResult<Option<SyncableRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_in(&mut conn, schema, id).await
    }

    pub async fn query(&self, query: &Query) -> DbResult<Vec<SyncableRecord>> {
        let schema = schema::table(&query.table).ok_or_else(|| DbError::UnknownTable(query.table.clone()))?;
        let mut conn = self.pool.acquire().await?;
        query_in(&mut conn, schema, query).await
    }

    /// Row count of a table.
    pub async fn count_total(&self, schema: &TableSchema) -> DbResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", schema.name);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    /// Rows not yet reconciled.
    pub async fn count_unsynced(&self, schema: &TableSchema) -> DbResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE synced_at IS NULL", schema.name);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count as u64)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use shopsync_core::schema::{PRODUCTS, USERS};
    use shopsync_core::{FilterOp, SortDirection};

    fn product(id: i64, sku: &str, quantity: i64, ms: i64) -> SyncableRecord {
        SyncableRecord::new(id, FieldMap::new(), clock::from_millis(ms).unwrap())
            .with_field("sku", sku)
            .with_field("name", format!("Product {sku}"))
            .with_field("price", 2.5)
            .with_field("quantity", quantity)
            .with_field("is_active", true)
    }

    async fn seeded() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        for (id, sku, qty) in [(1, "A", 10), (2, "B", 3), (3, "C", 0)] {
            let record = PRODUCTS.validate_record(&product(id, sku, qty, 1_000 + id)).unwrap();
            insert_in(&mut conn, &PRODUCTS, &record).await.unwrap();
        }
        drop(conn);
        db
    }

    #[tokio::test]
    async fn test_insert_and_fetch_round_trip() {
        let db = seeded().await;
        let got = db.records().get(&PRODUCTS, &RecordId::Int(2)).await.unwrap().unwrap();

        assert_eq!(got.fields["sku"], FieldValue::Text("B".into()));
        assert_eq!(got.fields["quantity"], FieldValue::Integer(3));
        assert_eq!(got.fields["price"], FieldValue::Real(2.5));
        assert_eq!(got.fields["is_active"], FieldValue::Boolean(true));
        assert_eq!(got.fields["store_id"], FieldValue::Null);
        assert_eq!(clock::to_millis(got.updated_at), 1_002);
        assert_eq!(got.synced_at, None);
    }

    #[tokio::test]
    async fn test_query_filters_and_order() {
        let db = seeded().await;
        let q = Query::table("products")
            .filter("quantity", FilterOp::Lt, 5)
            .order_by("sku", SortDirection::Desc);
        let rows = db.records().query(&q).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![RecordId::Int(3), RecordId::Int(2)]);

        let rows = db.records().query(&Query::table("products").offset(1)).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_query_rejects_unknown_table() {
        let db = seeded().await;
        let err = db.records().query(&Query::table("widgets")).await.unwrap_err();
        assert!(matches!(err, DbError::UnknownTable(_)));
    }

    #[tokio::test]
    async fn test_mark_synced_requires_matching_version() {
        let db = seeded().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let id = RecordId::Int(1);
        let stale = clock::from_millis(999).unwrap();
        let current = clock::from_millis(1_001).unwrap();
        let now = clock::from_millis(5_000).unwrap();

        assert!(!mark_synced_in(&mut conn, &PRODUCTS, &id, stale, now).await.unwrap());
        assert!(mark_synced_in(&mut conn, &PRODUCTS, &id, current, now).await.unwrap());
        drop(conn);

        assert_eq!(db.records().count_unsynced(&PRODUCTS).await.unwrap(), 2);
        assert_eq!(db.records().count_total(&PRODUCTS).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_text_ids() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let record = SyncableRecord::new("user-1", FieldMap::new(), clock::now())
            .with_field("email", "a@example.com")
            .with_field("display_name", "A")
            .with_field("role", "cashier")
            .with_field("is_active", true);
        let record = USERS.validate_record(&record).unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        insert_in(&mut conn, &USERS, &record).await.unwrap();
        let got = fetch_in(&mut conn, &USERS, &RecordId::from("user-1")).await.unwrap().unwrap();
        assert_eq!(got, record);
    }
}
