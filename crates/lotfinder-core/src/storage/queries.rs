use super::sqlite::Database;
use crate::model::{FileCategory, FileRecord, IndexState, IndexStatus, JobKind};
use rusqlite::{params, OptionalExtension, Result};
use tracing::warn;

impl Database {
    // ── File records ─────────────────────────────────────────────

    /// Replace the durable index with a freshly-scanned set, in one
    /// transaction so readers of the file never see a partial rewrite.
    pub fn replace_all_file_records(&self, records: &[FileRecord]) -> Result<usize> {
        let tx = self.connection().unchecked_transaction()?;
        tx.execute("DELETE FROM file_record", [])?;
        let count = insert_records(&tx, records)?;
        tx.commit()?;
        Ok(count)
    }

    /// Insert or update records by path without touching unrelated rows.
    pub fn upsert_file_records(&self, records: &[FileRecord]) -> Result<usize> {
        let tx = self.connection().unchecked_transaction()?;
        let count = insert_records(&tx, records)?;
        tx.commit()?;
        Ok(count)
    }

    pub fn delete_file_records(&self, paths: &[String]) -> Result<usize> {
        let tx = self.connection().unchecked_transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM file_record WHERE absolute_path = ?1")?;
            for path in paths {
                count += stmt.execute(params![path])?;
            }
        }
        tx.commit()?;
        Ok(count)
    }

    pub fn load_all_file_records(&self) -> Result<Vec<FileRecord>> {
        let mut stmt = self.connection().prepare(
            "SELECT lot_number, category, absolute_path, size_bytes, modified_at, indexed_at \
             FROM file_record",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (lot_number, category, absolute_path, size_bytes, modified_at, indexed_at) = row?;
            let Some(category) = FileCategory::parse(&category) else {
                warn!("Unknown category '{}' for {}, skipping row", category, absolute_path);
                continue;
            };
            records.push(FileRecord {
                lot_number,
                category,
                absolute_path,
                size_bytes: size_bytes as u64,
                modified_at,
                indexed_at,
            });
        }
        Ok(records)
    }

    // ── Index state ──────────────────────────────────────────────

    /// Load the persisted job state; `Default` when none was saved yet.
    pub fn load_index_state(&self) -> Result<IndexState> {
        let row = self
            .connection()
            .query_row(
                "SELECT status, progress, last_full_index_at, last_incremental_index_at, last_error \
                 FROM index_state WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((status, progress, last_full, last_incremental, last_error)) = row else {
            return Ok(IndexState::default());
        };

        Ok(IndexState {
            status: parse_status(&status, last_error.as_deref()),
            progress_percent: progress as i32,
            last_full_index_at: last_full,
            last_incremental_index_at: last_incremental,
            last_error,
        })
    }

    pub fn save_index_state(&self, state: &IndexState) -> Result<()> {
        self.connection().execute(
            "INSERT INTO index_state \
             (id, status, progress, last_full_index_at, last_incremental_index_at, last_error) \
             VALUES (1, ?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(id) DO UPDATE SET \
                 status = excluded.status, \
                 progress = excluded.progress, \
                 last_full_index_at = excluded.last_full_index_at, \
                 last_incremental_index_at = excluded.last_incremental_index_at, \
                 last_error = excluded.last_error",
            params![
                format_status(&state.status),
                state.progress_percent as i64,
                state.last_full_index_at,
                state.last_incremental_index_at,
                state.last_error,
            ],
        )?;
        Ok(())
    }
}

fn insert_records(tx: &rusqlite::Transaction<'_>, records: &[FileRecord]) -> Result<usize> {
    let mut count = 0;
    let mut stmt = tx.prepare_cached(
        "INSERT INTO file_record \
         (lot_number, category, absolute_path, size_bytes, modified_at, indexed_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
         ON CONFLICT(absolute_path) DO UPDATE SET \
             lot_number = excluded.lot_number, \
             category = excluded.category, \
             size_bytes = excluded.size_bytes, \
             modified_at = excluded.modified_at, \
             indexed_at = excluded.indexed_at",
    )?;
    for record in records {
        count += stmt.execute(params![
            record.lot_number,
            record.category.as_str(),
            record.absolute_path,
            record.size_bytes as i64,
            record.modified_at,
            record.indexed_at,
        ])?;
    }
    Ok(count)
}

fn format_status(status: &IndexStatus) -> String {
    match status {
        IndexStatus::Idle => "idle".to_string(),
        IndexStatus::Running(kind) => format!("running:{}", kind.as_str()),
        IndexStatus::Failed(_) => "failed".to_string(),
    }
}

fn parse_status(value: &str, last_error: Option<&str>) -> IndexStatus {
    match value {
        "idle" => IndexStatus::Idle,
        "running:full" => IndexStatus::Running(JobKind::Full),
        "running:incremental" => IndexStatus::Running(JobKind::Incremental),
        "running:validating" => IndexStatus::Running(JobKind::Validating),
        "failed" => IndexStatus::Failed(last_error.unwrap_or("unknown error").to_string()),
        other => {
            warn!("Unknown persisted index status '{}', treating as idle", other);
            IndexStatus::Idle
        }
    }
}
