//! # Checkpoint Repository
//!
//! Per-table pull positions, stored next to the records they describe so a
//! pulled batch and its checkpoint commit together.

use shopsync_core::{clock, RecordId, SyncCheckpoint};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::error::{DbError, DbResult};

/// Upserts a checkpoint inside the caller's transaction.
pub async fn save_in(conn: &mut SqliteConnection, checkpoint: &SyncCheckpoint) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sync_checkpoints (table_name, updated_at, last_id, saved_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(table_name) DO UPDATE SET
            updated_at = excluded.updated_at,
            last_id = excluded.last_id,
            saved_at = excluded.saved_at
        "#,
    )
    .bind(&checkpoint.table)
    .bind(clock::to_millis(checkpoint.updated_at))
    .bind(checkpoint.last_id.as_ref().map(RecordId::to_json))
    .bind(clock::to_millis(clock::now()))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CheckpointRepository {
    pool: SqlitePool,
}

impl CheckpointRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CheckpointRepository { pool }
    }

    /// Stored checkpoint, or the epoch default for a never-pulled table.
    pub async fn load(&self, table: &str) -> DbResult<SyncCheckpoint> {
        let row = sqlx::query("SELECT updated_at, last_id FROM sync_checkpoints WHERE table_name = ?1")
            .bind(table)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(SyncCheckpoint::initial(table));
        };

        let corrupt = |e: shopsync_core::CoreError| DbError::corrupt("sync_checkpoints", format!("{table}: {e}"));
        let updated_at = clock::from_millis(row.try_get("updated_at")?).map_err(corrupt)?;
        let last_id = row
            .try_get::<Option<String>, _>("last_id")?
            .map(|raw| RecordId::from_json(&raw))
            .transpose()
            .map_err(corrupt)?;

        Ok(SyncCheckpoint {
            table: table.to_string(),
            updated_at,
            last_id,
        })
    }

    pub async fn save(&self, checkpoint: &SyncCheckpoint) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        save_in(&mut conn, checkpoint).await
    }

    /// Every stored checkpoint, by table name.
    pub async fn all(&self) -> DbResult<Vec<SyncCheckpoint>> {
        let tables: Vec<String> = sqlx::query_scalar("SELECT table_name FROM sync_checkpoints ORDER BY table_name")
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(tables.len());
        for table in tables {
            out.push(self.load(&table).await?);
        }
        Ok(out)
    }

    /// Forgets a table's position; the next pull starts from the epoch.
    pub async fn reset(&self, table: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM sync_checkpoints WHERE table_name = ?1")
            .bind(table)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_default_is_epoch() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let cp = db.checkpoints().load("products").await.unwrap();
        assert_eq!(cp, SyncCheckpoint::initial("products"));
    }

    #[tokio::test]
    async fn test_save_load_keeps_id_kind() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.checkpoints();

        let users = SyncCheckpoint {
            table: "users".into(),
            updated_at: clock::from_millis(1_234).unwrap(),
            last_id: Some(RecordId::from("17")),
        };
        let products = SyncCheckpoint {
            table: "products".into(),
            updated_at: clock::from_millis(5_000).unwrap(),
            last_id: Some(RecordId::Int(17)),
        };
        repo.save(&users).await.unwrap();
        repo.save(&products).await.unwrap();

        assert_eq!(repo.load("users").await.unwrap(), users);
        assert_eq!(repo.load("products").await.unwrap(), products);
        assert_eq!(repo.all().await.unwrap().len(), 2);

        assert!(repo.reset("users").await.unwrap());
        assert_eq!(repo.load("users").await.unwrap(), SyncCheckpoint::initial("users"));
    }
}
