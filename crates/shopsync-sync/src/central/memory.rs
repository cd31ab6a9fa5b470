//! In-process central database.
//!
//! Behaves like the PostgreSQL link (ordering, strictly-newer rule, error
//! classes) and adds switches for driving failure paths: going offline,
//! adding latency, and rejecting pushes for chosen records.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use shopsync_core::lww;
use shopsync_core::schema::TableSchema;
use shopsync_core::{HealthReport, RecordId, SyncCheckpoint, SyncableRecord};
use tokio::sync::Mutex;
use tracing::debug;

use super::{CentralError, CentralLink, CentralResult, PushAck};

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, BTreeMap<RecordId, SyncableRecord>>,
    rejected: BTreeSet<(String, RecordId)>,
    pushes: Vec<(String, RecordId)>,
}

#[derive(Debug)]
pub struct MemoryCentralLink {
    online: AtomicBool,
    latency_ms: AtomicU64,
    state: Mutex<MemoryState>,
}

impl Default for MemoryCentralLink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCentralLink {
    pub fn new() -> Self {
        MemoryCentralLink {
            online: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Delay applied to every call.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Writes a row directly, as another store or the back office would.
    pub async fn seed(&self, table: &str, record: SyncableRecord) {
        let mut record = record;
        record.synced_at = None;
        let mut state = self.state.lock().await;
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(record.id.clone(), record);
    }

    pub async fn get(&self, table: &str, id: &RecordId) -> Option<SyncableRecord> {
        let state = self.state.lock().await;
        state.tables.get(table).and_then(|rows| rows.get(id)).cloned()
    }

    pub async fn count(&self, table: &str) -> usize {
        let state = self.state.lock().await;
        state.tables.get(table).map_or(0, BTreeMap::len)
    }

    /// Makes every push of this record fail with a data error.
    pub async fn reject_pushes_for(&self, table: &str, id: impl Into<RecordId>) {
        let mut state = self.state.lock().await;
        state.rejected.insert((table.to_string(), id.into()));
    }

    pub async fn accept_pushes_for(&self, table: &str, id: impl Into<RecordId>) {
        let mut state = self.state.lock().await;
        state.rejected.remove(&(table.to_string(), id.into()));
    }

    /// Every accepted push, in arrival order.
    pub async fn pushes(&self) -> Vec<(String, RecordId)> {
        self.state.lock().await.pushes.clone()
    }

    async fn simulate_call(&self) -> CentralResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if !self.is_online() {
            return Err(CentralError::Unavailable("memory central is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CentralLink for MemoryCentralLink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(&self, timeout: Duration) -> CentralResult<()> {
        match tokio::time::timeout(timeout, self.simulate_call()).await {
            Ok(result) => result,
            Err(_) => Err(CentralError::Unavailable(format!(
                "connect timed out after {}ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn health_check(&self) -> HealthReport {
        let started = std::time::Instant::now();
        match self.simulate_call().await {
            Ok(()) => HealthReport::reachable(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)),
            Err(e) => HealthReport::unreachable(e.to_string()),
        }
    }

    async fn pull_since(
        &self,
        schema: &TableSchema,
        checkpoint: &SyncCheckpoint,
        limit: u32,
    ) -> CentralResult<Vec<SyncableRecord>> {
        self.simulate_call().await?;

        let state = self.state.lock().await;
        let mut rows: Vec<SyncableRecord> = state
            .tables
            .get(schema.name)
            .map(|rows| rows.values().filter(|r| checkpoint.is_before(r)).cloned().collect())
            .unwrap_or_default();

        rows.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then_with(|| a.id.cmp(&b.id)));
        rows.truncate(limit as usize);

        debug!(table = schema.name, count = rows.len(), "Memory central pull");
        Ok(rows)
    }

    async fn push(&self, schema: &TableSchema, record: &SyncableRecord) -> CentralResult<PushAck> {
        self.simulate_call().await?;

        let mut state = self.state.lock().await;
        if state.rejected.contains(&(schema.name.to_string(), record.id.clone())) {
            return Err(CentralError::Data(format!(
                "push rejected for {}/{}",
                schema.name, record.id
            )));
        }

        let rows = state.tables.entry(schema.name.to_string()).or_default();
        if let Some(existing) = rows.get(&record.id) {
            if lww::central_wins(existing.updated_at, record.updated_at) {
                return Ok(PushAck::CentralNewer);
            }
        }

        let mut stored = record.clone();
        stored.synced_at = None;
        rows.insert(record.id.clone(), stored);
        state.pushes.push((schema.name.to_string(), record.id.clone()));
        Ok(PushAck::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopsync_core::schema::CATEGORIES;
    use shopsync_core::{clock, FieldMap};

    fn category(id: i64, ms: i64) -> SyncableRecord {
        SyncableRecord::new(id, FieldMap::new(), clock::from_millis(ms).unwrap()).with_field("name", "c")
    }

    #[tokio::test]
    async fn test_pull_orders_by_timestamp_then_id() {
        let link = MemoryCentralLink::new();
        link.seed("categories", category(9, 1_000)).await;
        link.seed("categories", category(3, 2_000)).await;
        link.seed("categories", category(4, 1_000)).await;

        let all = link
            .pull_since(&CATEGORIES, &SyncCheckpoint::initial("categories"), 10)
            .await
            .unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![RecordId::Int(4), RecordId::Int(9), RecordId::Int(3)]);

        let cp = SyncCheckpoint::after("categories", &all[0]);
        let rest = link.pull_since(&CATEGORIES, &cp, 1).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, RecordId::Int(9));
    }

    #[tokio::test]
    async fn test_push_keeps_strictly_newer_central_row() {
        let link = MemoryCentralLink::new();
        link.seed("categories", category(1, 5_000)).await;

        assert_eq!(link.push(&CATEGORIES, &category(1, 4_000)).await.unwrap(), PushAck::CentralNewer);
        // Equal timestamps: the pushed copy is accepted
        assert_eq!(link.push(&CATEGORIES, &category(1, 5_000)).await.unwrap(), PushAck::Applied);
        assert_eq!(link.push(&CATEGORIES, &category(1, 6_000)).await.unwrap(), PushAck::Applied);
        assert_eq!(link.pushes().await.len(), 2);
    }

    #[tokio::test]
    async fn test_offline_and_rejections() {
        let link = MemoryCentralLink::new();
        link.reject_pushes_for("categories", 1).await;
        let err = link.push(&CATEGORIES, &category(1, 1)).await.unwrap_err();
        assert!(matches!(err, CentralError::Data(_)));

        link.set_online(false);
        assert!(!link.health_check().await.reachable);
        let err = link.push(&CATEGORIES, &category(2, 1)).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_connect_respects_timeout() {
        let link = MemoryCentralLink::new();
        link.set_latency(Duration::from_millis(200));
        let err = link.connect(Duration::from_millis(10)).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
