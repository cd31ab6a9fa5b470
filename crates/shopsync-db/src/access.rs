//! # Hybrid Data Access
//!
//! The only read/write path application code uses. Reads come from the
//! local store; writes land locally and are queued for the central database
//! in the same transaction. Nothing here talks to the network, so the store
//! keeps selling while the central database is unreachable.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  write("products", {id: 42, quantity: 9})                               │
//! │       │                                                                 │
//! │       ▼  validate against TableSchema (types, unknown fields, id kind)  │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  BEGIN                                                          │   │
//! │  │   1. load row 42 (if any), merge the given fields               │   │
//! │  │   2. updated_at = now (strictly newer than before)              │   │
//! │  │      synced_at  = NULL                                          │   │
//! │  │   3. INSERT or UPDATE products                                  │   │
//! │  │   4. capacity check + INSERT INTO sync_queue (full snapshot)    │   │
//! │  │  COMMIT                                                         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  WriteReceipt { record, operation, queue_seq }                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Raw Statements
//! [`HybridDataAccess::execute`] passes SQL straight to SQLite, but only for
//! local-only tables such as `local_settings`. A statement naming a
//! synchronizable or bookkeeping table is refused with
//! [`DbError::SyncBypass`], since such a write would never be queued.

use shopsync_core::query::Filter;
use shopsync_core::schema::{self, IdKind, TableSchema, BOOKKEEPING_TABLES, SYNC_TABLES};
use shopsync_core::{
    clock, FieldMap, FieldValue, Query, QueueOperation, RecordId, SyncableRecord, ValidationError,
};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::pool::{begin_write, Database};
use crate::repository::{queue, records};

/// Default cap on queued entries (pending + dead).
pub const DEFAULT_MAX_QUEUE_SIZE: u64 = 10_000;

// =============================================================================
// Inputs & Receipts
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLimits {
    pub max_queue_size: u64,
}

impl Default for QueueLimits {
    fn default() -> Self {
        QueueLimits {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
        }
    }
}

/// Fields to write. Absent fields keep their stored value on update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordInput {
    /// Required for integer-keyed tables; generated for text-keyed ones.
    pub id: Option<RecordId>,
    pub fields: FieldMap,
}

impl RecordInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<RecordId>) -> Self {
        Self {
            id: Some(id.into()),
            fields: FieldMap::new(),
        }
    }

    pub fn set(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteReceipt {
    pub table: String,
    /// The row as stored, including its new `updated_at`.
    pub record: SyncableRecord,
    pub operation: QueueOperation,
    pub queue_seq: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkUpdateReceipt {
    pub table: String,
    pub affected: Vec<RecordId>,
    pub queue_seqs: Vec<i64>,
}

// =============================================================================
// Facade
// =============================================================================

/// Application-facing data access over the local store.
#[derive(Debug, Clone)]
pub struct HybridDataAccess {
    db: Database,
    limits: QueueLimits,
}

impl HybridDataAccess {
    pub fn new(db: Database, limits: QueueLimits) -> Self {
        HybridDataAccess { db, limits }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn schema(table: &str) -> DbResult<&'static TableSchema> {
        schema::table(table).ok_or_else(|| DbError::UnknownTable(table.to_string()))
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// First row matching `query`.
    pub async fn read(&self, query: &Query) -> DbResult<Option<SyncableRecord>> {
        let single = query.clone().limit(1);
        Ok(self.db.records().query(&single).await?.into_iter().next())
    }

    /// Every row matching `query`.
    pub async fn read_all(&self, query: &Query) -> DbResult<Vec<SyncableRecord>> {
        self.db.records().query(query).await
    }

    pub async fn get(&self, table: &str, id: &RecordId) -> DbResult<Option<SyncableRecord>> {
        let schema = Self::schema(table)?;
        self.db.records().get(schema, id).await
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Inserts or partially updates one row and queues it for sync.
    ///
    /// All-or-nothing: validation, capacity or storage failure leaves both
    /// the row and the queue unchanged.
    pub async fn write(&self, table: &str, input: RecordInput) -> DbResult<WriteReceipt> {
        let schema = Self::schema(table)?;
        let changes = schema.validate_partial(&input.fields)?;

        let id = match input.id {
            Some(id) => {
                schema.validate_id(&id)?;
                id
            }
            None => match schema.id_kind {
                IdKind::Text => RecordId::new_text(),
                IdKind::Integer => {
                    return Err(ValidationError::Required {
                        field: "id".to_string(),
                    }
                    .into())
                }
            },
        };

        let now = clock::now();
        let mut tx = begin_write(self.db.pool()).await?;

        let (record, operation) = match records::fetch_in(&mut tx, schema, &id).await? {
            Some(mut current) => {
                current.fields.extend(changes);
                current.fields = schema.validate_complete(&current.fields)?;
                current.updated_at = clock::next_version(now, current.updated_at);
                current.synced_at = None;
                records::update_in(&mut tx, schema, &current).await?;
                (current, QueueOperation::Update)
            }
            None => {
                let record = SyncableRecord {
                    id,
                    fields: schema.validate_complete(&changes)?,
                    updated_at: now,
                    synced_at: None,
                };
                records::insert_in(&mut tx, schema, &record).await?;
                (record, QueueOperation::Insert)
            }
        };

        let entry = queue::enqueue_in(
            &mut tx,
            self.limits.max_queue_size,
            schema.name,
            operation,
            &record,
            now,
        )
        .await?;

        tx.commit().await?;

        debug!(
            table = schema.name,
            record_id = %record.id,
            seq = entry.seq,
            op = operation.as_str(),
            "Local write queued"
        );

        Ok(WriteReceipt {
            table: schema.name.to_string(),
            record,
            operation,
            queue_seq: entry.seq,
        })
    }

    /// Applies `set` to every row matching `filters`, queueing each row.
    ///
    /// Capacity is checked for the whole batch before any row changes.
    pub async fn bulk_update(&self, table: &str, filters: &[Filter], set: FieldMap) -> DbResult<BulkUpdateReceipt> {
        let schema = Self::schema(table)?;
        if set.is_empty() {
            return Err(ValidationError::Required {
                field: "set".to_string(),
            }
            .into());
        }
        let changes = schema.validate_partial(&set)?;

        let now = clock::now();
        let mut tx = begin_write(self.db.pool()).await?;

        let matches = records::matching_in(&mut tx, schema, filters).await?;
        queue::ensure_capacity_in(&mut tx, self.limits.max_queue_size, matches.len() as u64).await?;

        let mut affected = Vec::with_capacity(matches.len());
        let mut queue_seqs = Vec::with_capacity(matches.len());

        for mut record in matches {
            record.fields.extend(changes.clone());
            record.updated_at = clock::next_version(now, record.updated_at);
            record.synced_at = None;
            records::update_in(&mut tx, schema, &record).await?;

            let entry = queue::enqueue_in(
                &mut tx,
                self.limits.max_queue_size,
                schema.name,
                QueueOperation::Update,
                &record,
                now,
            )
            .await?;

            queue_seqs.push(entry.seq);
            affected.push(record.id);
        }

        tx.commit().await?;
        info!(table = schema.name, rows = affected.len(), "Bulk update queued");

        Ok(BulkUpdateReceipt {
            table: schema.name.to_string(),
            affected,
            queue_seqs,
        })
    }

    /// Raw statement against local-only tables. Returns rows affected.
    pub async fn execute(&self, sql: &str, params: &[FieldValue]) -> DbResult<u64> {
        if let Some(table) = protected_table_in(sql) {
            return Err(DbError::SyncBypass {
                table: table.to_string(),
            });
        }

        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                FieldValue::Null => query.bind(None::<String>),
                FieldValue::Boolean(v) => query.bind(*v),
                FieldValue::Integer(v) => query.bind(*v),
                FieldValue::Real(v) => query.bind(*v),
                FieldValue::Text(v) => query.bind(v.clone()),
            };
        }

        let result = query.execute(self.db.pool()).await?;
        Ok(result.rows_affected())
    }
}

/// First synchronizable or bookkeeping table named anywhere in `sql`.
fn protected_table_in(sql: &str) -> Option<&'static str> {
    let lowered = sql.to_ascii_lowercase();
    lowered
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
        .find_map(|token| {
            SYNC_TABLES
                .iter()
                .map(|t| t.name)
                .chain(BOOKKEEPING_TABLES.iter().copied())
                .find(|name| *name == token)
        })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbConfig;
    use shopsync_core::FilterOp;

    async fn access(max_queue_size: u64) -> HybridDataAccess {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        HybridDataAccess::new(db, QueueLimits { max_queue_size })
    }

    fn new_product(id: i64, quantity: i64) -> RecordInput {
        RecordInput::with_id(id)
            .set("sku", format!("SKU-{id}"))
            .set("name", "Cola")
            .set("price", 1.25)
            .set("quantity", quantity)
            .set("is_active", true)
    }

    #[tokio::test]
    async fn test_insert_then_partial_update() {
        let hda = access(100).await;

        let first = hda.write("products", new_product(42, 10)).await.unwrap();
        assert_eq!(first.operation, QueueOperation::Insert);
        assert_eq!(first.record.synced_at, None);

        let second = hda
            .write("products", RecordInput::with_id(42).set("quantity", 9))
            .await
            .unwrap();
        assert_eq!(second.operation, QueueOperation::Update);
        assert!(second.record.updated_at > first.record.updated_at);
        assert!(second.queue_seq > first.queue_seq);

        let stored = hda.get("products", &RecordId::Int(42)).await.unwrap().unwrap();
        assert_eq!(stored.fields["quantity"], FieldValue::Integer(9));
        assert_eq!(stored.fields["name"], FieldValue::Text("Cola".into()));
        assert_eq!(stored, second.record);

        let queued = hda.database().sync_queue().peek_batch(10).await.unwrap();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[1].payload, second.record);
    }

    #[tokio::test]
    async fn test_queue_full_rejects_without_mutation() {
        let hda = access(1).await;
        hda.write("products", new_product(1, 5)).await.unwrap();

        let err = hda
            .write("products", RecordInput::with_id(1).set("quantity", 4))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::QueueFull { max: 1 }));

        let err = hda.write("products", new_product(2, 5)).await.unwrap_err();
        assert!(matches!(err, DbError::QueueFull { .. }));

        let stored = hda.get("products", &RecordId::Int(1)).await.unwrap().unwrap();
        assert_eq!(stored.fields["quantity"], FieldValue::Integer(5));
        assert!(hda.get("products", &RecordId::Int(2)).await.unwrap().is_none());
        assert_eq!(hda.database().sync_queue().total().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_validation_failures_write_nothing() {
        let hda = access(100).await;

        // Missing required fields on insert
        let err = hda
            .write("products", RecordInput::with_id(1).set("quantity", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(ValidationError::Required { .. })));

        // Integer-keyed tables need an id
        let err = hda.write("products", RecordInput::new().set("quantity", 1)).await.unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));

        let err = hda.write("widgets", RecordInput::with_id(1)).await.unwrap_err();
        assert!(matches!(err, DbError::UnknownTable(_)));

        assert_eq!(hda.database().sync_queue().total().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_text_ids_are_generated() {
        let hda = access(100).await;
        let receipt = hda
            .write(
                "transactions",
                RecordInput::new()
                    .set("store_id", 1)
                    .set("product_id", 42)
                    .set("quantity", 1)
                    .set("total", 1.25)
                    .set("payment_method", "cash"),
            )
            .await
            .unwrap();

        let id = receipt.record.id.clone();
        assert!(id.as_text().is_some_and(|s| !s.is_empty()));
        assert!(hda.get("transactions", &id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reads_use_query_model() {
        let hda = access(100).await;
        for (id, qty) in [(1, 10), (2, 2), (3, 1)] {
            hda.write("products", new_product(id, qty)).await.unwrap();
        }

        let low = hda
            .read_all(&Query::table("products").filter("quantity", FilterOp::Le, 2))
            .await
            .unwrap();
        assert_eq!(low.len(), 2);

        let one = hda.read(&Query::table("products").eq("sku", "SKU-1")).await.unwrap();
        assert_eq!(one.map(|r| r.id), Some(RecordId::Int(1)));

        let unsynced = hda.read_all(&Query::table("products").unsynced()).await.unwrap();
        assert_eq!(unsynced.len(), 3);
    }

    #[tokio::test]
    async fn test_bulk_update_queues_every_row() {
        let hda = access(100).await;
        for id in 1..=3 {
            hda.write("products", new_product(id, 0)).await.unwrap();
        }

        let mut set = FieldMap::new();
        set.insert("is_active".into(), false.into());
        let filters = [Filter {
            field: "id".into(),
            op: FilterOp::Ge,
            value: FieldValue::Integer(2),
        }];
        let receipt = hda.bulk_update("products", &filters, set.clone()).await.unwrap();
        assert_eq!(receipt.affected, vec![RecordId::Int(2), RecordId::Int(3)]);
        assert_eq!(receipt.queue_seqs.len(), 2);
        assert_eq!(hda.database().sync_queue().size().await.unwrap(), 5);

        // Not enough room for both rows: nothing changes
        let tight = HybridDataAccess::new(hda.database().clone(), QueueLimits { max_queue_size: 6 });
        let err = tight.bulk_update("products", &filters, set).await.unwrap_err();
        assert!(matches!(err, DbError::QueueFull { .. }));
        assert_eq!(hda.database().sync_queue().size().await.unwrap(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_on_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("store.db"))).await.unwrap();
        let hda = HybridDataAccess::new(db, QueueLimits { max_queue_size: 1_000 });

        let mut tasks = Vec::new();
        for t in 0..4i64 {
            let hda = hda.clone();
            tasks.push(tokio::spawn(async move {
                let mut failed = Vec::new();
                for i in 0..50i64 {
                    let input = RecordInput::with_id((t + i) % 4 + 1).set("name", format!("Shelf {t}-{i}"));
                    if let Err(e) = hda.write("categories", input).await {
                        failed.push(e.to_string());
                    }
                }
                failed
            }));
        }

        let mut failed = Vec::new();
        for task in tasks {
            failed.extend(task.await.unwrap());
        }
        assert!(failed.is_empty(), "{} writes failed, first: {:?}", failed.len(), failed.first());
        assert_eq!(hda.database().sync_queue().size().await.unwrap(), 200);

        // Every row's version is strictly increasing across its queue entries
        let queued = hda.database().sync_queue().peek_batch(200).await.unwrap();
        for id in 1..=4i64 {
            let versions: Vec<_> = queued
                .iter()
                .filter(|e| e.record_id == RecordId::Int(id))
                .map(|e| e.payload.updated_at)
                .collect();
            assert_eq!(versions.len(), 50);
            assert!(versions.windows(2).all(|w| w[0] < w[1]));
        }
        hda.database().close().await;
    }

    #[tokio::test]
    async fn test_execute_limited_to_local_tables() {
        let hda = access(100).await;

        let rows = hda
            .execute(
                "INSERT INTO local_settings (key, value) VALUES (?1, ?2)",
                &["receipt_footer".into(), "Thanks!".into()],
            )
            .await
            .unwrap();
        assert_eq!(rows, 1);

        let err = hda
            .execute("UPDATE Products SET quantity = 0", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::SyncBypass { table } if table == "products"));

        let err = hda.execute("DELETE FROM \"sync_queue\"", &[]).await.unwrap_err();
        assert!(matches!(err, DbError::SyncBypass { .. }));
    }

    #[test]
    fn test_protected_table_detection() {
        assert_eq!(protected_table_in("select * from users"), Some("users"));
        assert_eq!(protected_table_in("UPDATE local_settings SET value = 'x'"), None);
        // Substrings of other identifiers are not matches
        assert_eq!(protected_table_in("SELECT * FROM product_notes"), None);
    }
}
