//! `JournalStore` backed by the `journal` table.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::db::{unix_millis, TaskDb};
use crate::journal::{
    CheckpointOutcome, JournalEntry, JournalPhase, JournalRecord, JournalStore, TaskSnapshot,
};
use crate::track::TrackHash;

const JOURNAL_COLUMNS: &str =
    "track_hash, generation, phase, byte_offset, heartbeat_at, snapshot_json, failure_reason, created_at";

#[async_trait]
impl JournalStore for TaskDb {
    async fn prepare(&self, entry: &JournalEntry) -> Result<()> {
        let snapshot_json = serde_json::to_string(&entry.snapshot)?;
        sqlx::query(
            r#"
            INSERT INTO journal (
                track_hash, generation, phase, byte_offset, heartbeat_at,
                snapshot_json, failure_reason, created_at
            ) VALUES (?1, ?2, 'prepare', ?3, ?4, ?5, NULL, ?6)
            ON CONFLICT(track_hash) DO UPDATE SET
                generation = excluded.generation,
                phase = 'prepare',
                byte_offset = excluded.byte_offset,
                heartbeat_at = excluded.heartbeat_at,
                snapshot_json = excluded.snapshot_json,
                failure_reason = NULL,
                created_at = excluded.created_at
            "#,
        )
        .bind(entry.hash.as_str())
        .bind(i64::from(entry.generation))
        .bind(i64::try_from(entry.offset).unwrap_or(i64::MAX))
        .bind(entry.heartbeat_at)
        .bind(snapshot_json)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn checkpoint(
        &self,
        hash: &TrackHash,
        generation: u32,
        offset: u64,
    ) -> Result<CheckpointOutcome> {
        let res = sqlx::query(
            r#"
            UPDATE journal
            SET phase = 'checkpoint', byte_offset = ?1, heartbeat_at = ?2
            WHERE track_hash = ?3 AND generation = ?4 AND phase IN ('prepare', 'checkpoint')
            "#,
        )
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .bind(unix_millis())
        .bind(hash.as_str())
        .bind(i64::from(generation))
        .execute(&self.pool)
        .await?;
        Ok(if res.rows_affected() == 1 {
            CheckpointOutcome::Written
        } else {
            CheckpointOutcome::Superseded
        })
    }

    async fn commit(&self, hash: &TrackHash) -> Result<bool> {
        let res = sqlx::query("DELETE FROM journal WHERE track_hash = ?1")
            .bind(hash.as_str())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn abort(&self, hash: &TrackHash, reason: &str) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE journal SET phase = 'aborted', failure_reason = ?1, heartbeat_at = ?2
            WHERE track_hash = ?3
            "#,
        )
        .bind(reason)
        .bind(unix_millis())
        .bind(hash.as_str())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn get(&self, hash: &TrackHash) -> Result<Option<JournalRecord>> {
        let sql = format!("SELECT {JOURNAL_COLUMNS} FROM journal WHERE track_hash = ?1");
        let row = sqlx::query(&sql)
            .bind(hash.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn load(&self) -> Result<Vec<JournalRecord>> {
        let sql = format!("SELECT {JOURNAL_COLUMNS} FROM journal ORDER BY created_at ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn invalidate(&self, hash: &TrackHash) -> Result<bool> {
        self.commit(hash).await
    }
}

/// Decode one row. Only a missing key column is a hard error; anything
/// else wrong with the row makes it a `Corrupt` record.
fn record_from_row(row: &SqliteRow) -> Result<JournalRecord> {
    let hash = TrackHash::from_stored(row.try_get::<String, _>("track_hash")?);
    Ok(match decode_entry(&hash, row) {
        Ok(entry) => JournalRecord::Valid(entry),
        Err(reason) => JournalRecord::Corrupt { hash, reason },
    })
}

fn decode_entry(hash: &TrackHash, row: &SqliteRow) -> Result<JournalEntry, String> {
    let field = |name: &str| -> Result<Option<i64>, String> {
        row.try_get::<Option<i64>, _>(name)
            .map_err(|e| format!("column {name}: {e}"))
    };
    let generation = field("generation")?.ok_or("missing generation")?;
    let offset = field("byte_offset")?.ok_or("missing byte_offset")?;
    let heartbeat_at = field("heartbeat_at")?.ok_or("missing heartbeat_at")?;
    let created_at = field("created_at")?.ok_or("missing created_at")?;
    let phase: String = row
        .try_get("phase")
        .map_err(|e| format!("column phase: {e}"))?;
    let snapshot_json: String = row
        .try_get("snapshot_json")
        .map_err(|e| format!("column snapshot_json: {e}"))?;
    let failure_reason: Option<String> = row
        .try_get("failure_reason")
        .map_err(|e| format!("column failure_reason: {e}"))?;

    let phase: JournalPhase = phase.parse()?;
    let generation = u32::try_from(generation).map_err(|_| format!("bad generation {generation}"))?;
    let offset = u64::try_from(offset).map_err(|_| format!("negative offset {offset}"))?;
    let snapshot: TaskSnapshot =
        serde_json::from_str(&snapshot_json).map_err(|e| format!("snapshot: {e}"))?;
    if snapshot.request.hash() != *hash {
        return Err("snapshot belongs to a different track".to_string());
    }
    if offset > snapshot.candidate.size_bytes {
        return Err(format!(
            "offset {offset} beyond candidate size {}",
            snapshot.candidate.size_bytes
        ));
    }

    Ok(JournalEntry {
        hash: hash.clone(),
        generation,
        phase,
        offset,
        heartbeat_at,
        snapshot,
        failure_reason,
        created_at,
    })
}
