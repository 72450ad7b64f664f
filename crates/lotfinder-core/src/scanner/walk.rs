use crate::config::{AllowedDirectory, AppConfig, ExtensionPolicy};
use crate::error::Error;
use crate::model::{FileCategory, FileRecord};
use crate::scanner::classify;
use crossbeam_channel::Sender;
use glob::Pattern;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs::{self, Metadata};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::UNIX_EPOCH;
use tracing::{debug, error};

pub enum ScanMode {
    /// Visit every file under every root.
    Full,
    /// Skip subtrees whose directory mtime predates `since`, and files
    /// already indexed with an unchanged mtime.
    Incremental {
        since: i64,
        known_mtimes: HashMap<String, i64>,
    },
}

/// Narrows a scan to one lot and/or category; used by live search probes.
#[derive(Debug, Default, Clone)]
pub struct ScanFilter {
    pub lot_number: Option<String>,
    pub category: Option<FileCategory>,
}

/// Parallel directory traversal over allow-listed roots. Emits
/// `FileRecord`s through a channel sink as the walk proceeds; re-invoking
/// re-walks from scratch. Unreadable entries are logged and skipped.
pub struct Scanner {
    policy: ExtensionPolicy,
    ignore_patterns: Vec<Pattern>,
}

impl Scanner {
    pub fn new(config: &AppConfig) -> Self {
        let ignore_patterns = config
            .ignore_patterns
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    error!("Invalid glob pattern '{}': {}", glob, err);
                    None
                }
            })
            .collect();

        Scanner {
            policy: config.extensions.clone(),
            ignore_patterns,
        }
    }

    /// Walk a single root. Returns the number of records emitted, or an
    /// error when the root itself is unreachable (per-root isolation:
    /// the caller decides whether that is fatal for the run).
    pub fn scan_root(
        &self,
        root: &AllowedDirectory,
        mode: &ScanMode,
        filter: &ScanFilter,
        cancel: &AtomicBool,
        sink: &Sender<FileRecord>,
    ) -> Result<usize, Error> {
        let path = Path::new(&root.root_path);
        if !path.is_dir() {
            return Err(Error::ScanFatal(format!(
                "root {} is not reachable",
                path.display()
            )));
        }

        let emitted = AtomicUsize::new(0);
        self.visit_dir(path, root.category_hint, mode, filter, cancel, sink, &emitted);
        Ok(emitted.load(Ordering::Relaxed))
    }

    #[allow(clippy::too_many_arguments)]
    fn visit_dir(
        &self,
        dir: &Path,
        hint: Option<FileCategory>,
        mode: &ScanMode,
        filter: &ScanFilter,
        cancel: &AtomicBool,
        sink: &Sender<FileRecord>,
        emitted: &AtomicUsize,
    ) {
        // Cancellation is cooperative, checked at directory boundaries.
        if cancel.load(Ordering::Relaxed) {
            return;
        }

        if self.is_ignored(dir) {
            return;
        }

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                error!("Error reading directory {}: {}", dir.display(), err);
                return;
            }
        };

        entries.par_bridge().for_each(|entry_result| {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(err) => {
                    error!("Error reading entry in {}: {}", dir.display(), err);
                    return;
                }
            };

            let path = entry.path();
            let metadata = match fs::symlink_metadata(&path) {
                Ok(metadata) => metadata,
                Err(err) => {
                    error!("Error getting metadata for {}: {}", path.display(), err);
                    return;
                }
            };

            if metadata.is_dir() {
                if self.should_descend(&metadata, mode) {
                    self.visit_dir(&path, hint, mode, filter, cancel, sink, emitted);
                }
            } else if !metadata.file_type().is_symlink() && metadata.len() > 0 {
                if self.is_ignored(&path) {
                    return;
                }
                self.emit_file(&path, &metadata, hint, mode, filter, cancel, sink, emitted);
            }
        });
    }

    /// Incremental subtree pruning: an untouched directory mtime means no
    /// direct children were added or removed since the last index.
    fn should_descend(&self, metadata: &Metadata, mode: &ScanMode) -> bool {
        match mode {
            ScanMode::Full => true,
            ScanMode::Incremental { since, .. } => epoch_secs(metadata) > *since,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_file(
        &self,
        path: &Path,
        metadata: &Metadata,
        hint: Option<FileCategory>,
        mode: &ScanMode,
        filter: &ScanFilter,
        cancel: &AtomicBool,
        sink: &Sender<FileRecord>,
        emitted: &AtomicUsize,
    ) {
        let Some(category) = classify::classify(path, hint, &self.policy) else {
            return;
        };
        if let Some(wanted) = filter.category {
            if wanted != category {
                return;
            }
        }

        let stem = match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem,
            None => return,
        };
        let Some(lot_number) = classify::extract_lot_number(stem) else {
            debug!("No lot number in {}, skipping", path.display());
            return;
        };
        if let Some(wanted) = &filter.lot_number {
            if *wanted != lot_number {
                return;
            }
        }

        let canonical = match fs::canonicalize(path) {
            Ok(canonical) => canonical,
            Err(err) => {
                error!("Error canonicalizing {}: {}", path.display(), err);
                return;
            }
        };
        let absolute_path = canonical.to_string_lossy().into_owned();

        let modified_at = epoch_secs(metadata);
        if let ScanMode::Incremental { known_mtimes, .. } = mode {
            if known_mtimes.get(&absolute_path) == Some(&modified_at) {
                return;
            }
        }

        let record = FileRecord {
            lot_number,
            category,
            absolute_path,
            size_bytes: metadata.len(),
            modified_at,
            indexed_at: chrono::Utc::now().timestamp(),
        };

        // A dropped receiver means the consumer gave up (e.g. a search
        // deadline elapsed); stop the walk instead of scanning into the void.
        if sink.send(record).is_err() {
            cancel.store(true, Ordering::Relaxed);
            return;
        }
        emitted.fetch_add(1, Ordering::Relaxed);
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
    }
}

fn epoch_secs(metadata: &Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
