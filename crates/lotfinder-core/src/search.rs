use crate::config::{AllowedDirectory, AppConfig};
use crate::index::IndexStore;
use crate::model::{FileCategory, FileRecord, SearchResult};
use crate::scanner::{ScanFilter, ScanMode, Scanner};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Answers "give me everything for lot X", either from the index store
/// (cache path) or by probing the shares live (bypass path).
pub struct SearchService {
    store: Arc<IndexStore>,
    config: Arc<AppConfig>,
}

impl SearchService {
    pub fn new(store: Arc<IndexStore>, config: Arc<AppConfig>) -> Self {
        SearchService { store, config }
    }

    /// Cached searches never touch the filesystem; live searches probe
    /// each category concurrently under `timeout` and report categories
    /// that miss the deadline as not-found.
    pub fn search_all_files(
        &self,
        lot_number: &str,
        use_cache: bool,
        timeout: Duration,
    ) -> SearchResult {
        let lot_number = lot_number.trim();
        if lot_number.is_empty() {
            return SearchResult::default();
        }
        if use_cache {
            return self.store.lookup(lot_number);
        }
        self.search_live(lot_number, timeout)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.config.search_timeout_ms)
    }

    fn search_live(&self, lot_number: &str, timeout: Duration) -> SearchResult {
        let cancel = Arc::new(AtomicBool::new(false));
        let (result_tx, result_rx) = crossbeam_channel::unbounded();

        let mut probes = 0;
        for category in FileCategory::ALL {
            let roots: Vec<AllowedDirectory> = self
                .config
                .allowed_directories
                .iter()
                .filter(|d| d.enabled && d.matches_category(category))
                .cloned()
                .collect();
            if roots.is_empty() {
                continue;
            }
            probes += 1;

            let config = Arc::clone(&self.config);
            let lot = lot_number.to_string();
            let cancel = Arc::clone(&cancel);
            let result_tx = result_tx.clone();
            thread::spawn(move || {
                let records = probe_category(&config, &roots, category, &lot, &cancel);
                let _ = result_tx.send((category, records));
            });
        }
        drop(result_tx);

        let deadline = Instant::now() + timeout;
        let mut collected: Vec<FileRecord> = Vec::new();
        let mut completed = 0;
        while completed < probes {
            match result_rx.recv_deadline(deadline) {
                Ok((category, records)) => {
                    completed += 1;
                    debug!(
                        "Probe for {} returned {} records",
                        category.as_str(),
                        records.len()
                    );
                    collected.extend(records);
                }
                Err(_) => {
                    // Late probes are cancelled and their results
                    // discarded; the caller sees not-found for those
                    // categories. Latency bound wins over completeness.
                    cancel.store(true, Ordering::Relaxed);
                    warn!(
                        "Live search for lot {} timed out with {}/{} probes done",
                        lot_number, completed, probes
                    );
                    break;
                }
            }
        }

        // Backfill the index with whatever the live walk discovered,
        // without holding up the response.
        if !collected.is_empty() {
            let store = Arc::clone(&self.store);
            let records = collected.clone();
            thread::spawn(move || {
                if let Err(err) = store.merge(records) {
                    warn!("Index backfill after live search failed: {}", err);
                }
            });
        }

        SearchResult::from_records(collected)
    }
}

/// Walk the roots relevant to one category, keeping only records for the
/// requested lot. Unreachable roots are logged and skipped; a live
/// search degrades to empty rather than erroring.
fn probe_category(
    config: &AppConfig,
    roots: &[AllowedDirectory],
    category: FileCategory,
    lot_number: &str,
    cancel: &AtomicBool,
) -> Vec<FileRecord> {
    let scanner = Scanner::new(config);
    let filter = ScanFilter {
        lot_number: Some(lot_number.to_string()),
        category: Some(category),
    };

    let (record_tx, record_rx) = crossbeam_channel::unbounded();
    for root in roots {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        if let Err(err) = scanner.scan_root(root, &ScanMode::Full, &filter, cancel, &record_tx) {
            warn!(
                "Probe for {} skipped root {}: {}",
                category.as_str(),
                root.root_path,
                err
            );
        }
    }
    drop(record_tx);

    record_rx.into_iter().collect()
}
