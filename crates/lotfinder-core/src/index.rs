use crate::error::Error;
use crate::model::{FileCategory, FileRecord, IndexStats, SearchResult};
use crate::storage::Database;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

/// Immutable mapping from lot number to that lot's records. Owned
/// exclusively by the store and replaced wholesale, never mutated in
/// place, so readers always see a complete snapshot.
pub type IndexSnapshot = HashMap<String, Vec<FileRecord>>;

/// Holds the current consistent snapshot of the index, backed by SQLite.
///
/// Writers persist to the database first and publish the new snapshot
/// second; a failed write leaves the previous snapshot visible. Readers
/// clone the snapshot `Arc` and are never blocked by an in-progress scan.
pub struct IndexStore {
    snapshot: RwLock<Arc<IndexSnapshot>>,
    db: Arc<Mutex<Database>>,
}

impl IndexStore {
    /// Open the store, restoring the snapshot persisted by the last run.
    pub fn open(db: Database) -> Result<Self, Error> {
        let records = db.load_all_file_records()?;
        let count = records.len();
        let snapshot = build_snapshot(records);
        if count > 0 {
            info!("Restored {} file records across {} lots", count, snapshot.len());
        }
        Ok(IndexStore {
            snapshot: RwLock::new(Arc::new(snapshot)),
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Shared handle to the backing database, for the job controller's
    /// state persistence.
    pub fn database(&self) -> Arc<Mutex<Database>> {
        Arc::clone(&self.db)
    }

    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.snapshot.read().unwrap().clone()
    }

    /// Atomically swap in a full snapshot built from a complete scan.
    pub fn replace(&self, records: Vec<FileRecord>) -> Result<usize, Error> {
        let count = records.len();
        {
            let db = self.db.lock().unwrap();
            db.replace_all_file_records(&records)?;
        }
        let next = Arc::new(build_snapshot(records));
        *self.snapshot.write().unwrap() = next;
        debug!("Index snapshot replaced ({} records)", count);
        Ok(count)
    }

    /// Insert or update records without discarding unrelated entries.
    /// Copy-on-write: the current snapshot is cloned, patched, and
    /// swapped in as a whole.
    pub fn merge(&self, records: Vec<FileRecord>) -> Result<usize, Error> {
        if records.is_empty() {
            return Ok(0);
        }
        {
            let db = self.db.lock().unwrap();
            db.upsert_file_records(&records)?;
        }

        let current = self.snapshot();
        let mut next: IndexSnapshot = (*current).clone();

        // A path may have moved to a different lot since it was last
        // indexed; evict it from its previous owner first.
        let mut owner_by_path: HashMap<String, String> = HashMap::new();
        for (lot, lot_records) in next.iter() {
            for record in lot_records {
                owner_by_path.insert(record.absolute_path.clone(), lot.clone());
            }
        }

        let count = records.len();
        for record in records {
            if let Some(previous_lot) = owner_by_path.get(&record.absolute_path) {
                let mut now_empty = false;
                if let Some(lot_records) = next.get_mut(previous_lot) {
                    lot_records.retain(|r| r.absolute_path != record.absolute_path);
                    now_empty = lot_records.is_empty();
                }
                if now_empty {
                    next.remove(previous_lot);
                }
            }
            owner_by_path.insert(record.absolute_path.clone(), record.lot_number.clone());
            next.entry(record.lot_number.clone()).or_default().push(record);
        }

        *self.snapshot.write().unwrap() = Arc::new(next);
        debug!("Index snapshot merged ({} records)", count);
        Ok(count)
    }

    /// Existence-check sweep: drop every record whose file is gone.
    /// Checks metadata only, never content. Returns the number removed.
    pub fn validate(&self) -> Result<usize, Error> {
        let current = self.snapshot();

        let mut removed_paths: Vec<String> = Vec::new();
        for lot_records in current.values() {
            for record in lot_records {
                if !Path::new(&record.absolute_path).exists() {
                    removed_paths.push(record.absolute_path.clone());
                }
            }
        }
        if removed_paths.is_empty() {
            return Ok(0);
        }

        {
            let db = self.db.lock().unwrap();
            db.delete_file_records(&removed_paths)?;
        }

        let removed: HashSet<&str> = removed_paths.iter().map(|p| p.as_str()).collect();
        let mut next: IndexSnapshot = (*current).clone();
        for lot_records in next.values_mut() {
            lot_records.retain(|r| !removed.contains(r.absolute_path.as_str()));
        }
        next.retain(|_, lot_records| !lot_records.is_empty());

        *self.snapshot.write().unwrap() = Arc::new(next);
        info!("Validation pruned {} stale records", removed_paths.len());
        Ok(removed_paths.len())
    }

    /// Read-only lookup against the last fully-swapped snapshot.
    pub fn lookup(&self, lot_number: &str) -> SearchResult {
        let snapshot = self.snapshot();
        match snapshot.get(lot_number) {
            Some(records) => SearchResult::from_records(records.iter().cloned()),
            None => SearchResult::default(),
        }
    }

    /// Path → mtime map of everything currently indexed, used to filter
    /// unchanged files out of an incremental scan.
    pub fn known_mtimes(&self) -> HashMap<String, i64> {
        let snapshot = self.snapshot();
        let mut known = HashMap::new();
        for lot_records in snapshot.values() {
            for record in lot_records {
                known.insert(record.absolute_path.clone(), record.modified_at);
            }
        }
        known
    }

    /// Aggregate counts for dashboards.
    pub fn stats(&self) -> Result<IndexStats, Error> {
        let snapshot = self.snapshot();
        let mut stats = IndexStats {
            lots: snapshot.len(),
            ..IndexStats::default()
        };
        for lot_records in snapshot.values() {
            for record in lot_records {
                stats.total_size_bytes += record.size_bytes;
                match record.category {
                    FileCategory::PolishVideo => stats.polish_videos += 1,
                    FileCategory::RoughVideo => stats.rough_videos += 1,
                    FileCategory::TensionVideo => stats.tension_videos += 1,
                    FileCategory::Advisor => stats.advisor_files += 1,
                    FileCategory::Scan => stats.scan_files += 1,
                }
            }
        }

        let state = self.db.lock().unwrap().load_index_state()?;
        stats.last_full_index_at = state.last_full_index_at;
        stats.last_incremental_index_at = state.last_incremental_index_at;
        Ok(stats)
    }
}

fn build_snapshot(records: Vec<FileRecord>) -> IndexSnapshot {
    let mut snapshot: IndexSnapshot = HashMap::new();
    for record in records {
        snapshot
            .entry(record.lot_number.clone())
            .or_default()
            .push(record);
    }
    snapshot
}
