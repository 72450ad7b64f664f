use crate::config::{self, AllowedDirectory, AppConfig};
use crate::error::Error;
use crate::index::IndexStore;
use crate::model::{FileRecord, IndexState, IndexStatus, JobKind};
use crate::scanner::{ScanFilter, ScanMode, Scanner};
use crate::storage::Database;
use crossbeam_channel::{Receiver, Sender};
use rayon::prelude::*;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{error, info, warn};

/// Progress notification published to every subscriber during a run.
/// `percent` is 0..=100 while running, 100 on success, -1 on failure or
/// cancellation.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Started { kind: JobKind },
    Progress { percent: i32, status: String },
    Completed { kind: JobKind, records: usize },
    Cancelled { kind: JobKind },
    Failed { message: String },
}

impl JobEvent {
    pub fn percent(&self) -> i32 {
        match self {
            JobEvent::Started { .. } => 0,
            JobEvent::Progress { percent, .. } => *percent,
            JobEvent::Completed { .. } => 100,
            JobEvent::Cancelled { .. } | JobEvent::Failed { .. } => -1,
        }
    }
}

/// Immediate acknowledgment of an accepted trigger; the job itself runs
/// in the background.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerAck {
    pub accepted: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub removed_count: usize,
    pub message: String,
}

enum JobOutcome {
    Completed { records: usize },
    Cancelled,
}

/// Serializes indexing operations, tracks `IndexState`, and publishes
/// progress to subscribers. Exactly one job (full, incremental, or
/// validating) may run system-wide; competing triggers get `IndexLocked`
/// and are never queued.
pub struct JobController {
    store: Arc<IndexStore>,
    config: Arc<AppConfig>,
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    busy: AtomicBool,
    cancel: AtomicBool,
    state: Mutex<IndexState>,
    subscribers: Mutex<Vec<Sender<JobEvent>>>,
    db: Arc<Mutex<Database>>,
}

impl JobController {
    /// Restore the persisted job state. A `Running` status left behind by
    /// a dead process is coerced to `Failed` so the UI is not stuck on a
    /// phantom job.
    pub fn new(store: Arc<IndexStore>, config: Arc<AppConfig>) -> Result<Self, Error> {
        let db = store.database();
        let mut state = db.lock().unwrap().load_index_state()?;
        if let IndexStatus::Running(kind) = &state.status {
            warn!(
                "Found interrupted {} job from a previous run, marking failed",
                kind.as_str()
            );
            let message = "interrupted by restart".to_string();
            state.status = IndexStatus::Failed(message.clone());
            state.progress_percent = -1;
            state.last_error = Some(message);
            db.lock().unwrap().save_index_state(&state)?;
        }

        Ok(JobController {
            store,
            config,
            inner: Arc::new(ControllerInner {
                busy: AtomicBool::new(false),
                cancel: AtomicBool::new(false),
                state: Mutex::new(state),
                subscribers: Mutex::new(Vec::new()),
                db,
            }),
        })
    }

    /// Register a progress subscriber. Disconnected receivers are pruned
    /// on the next publish.
    pub fn subscribe(&self) -> Receiver<JobEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.inner.subscribers.lock().unwrap().push(tx);
        rx
    }

    pub fn state(&self) -> IndexState {
        self.inner.state.lock().unwrap().clone()
    }

    /// `Failed → Idle`. Returns false when there is nothing to clear.
    pub fn acknowledge_failure(&self) -> bool {
        let mut state = self.inner.state.lock().unwrap();
        if !matches!(&state.status, IndexStatus::Failed(_)) {
            return false;
        }
        state.status = IndexStatus::Idle;
        state.progress_percent = 0;
        self.inner.persist(&state);
        true
    }

    /// Request cooperative cancellation of the running job, if any.
    pub fn cancel(&self) -> bool {
        if self.inner.busy.load(Ordering::Acquire) {
            self.inner.cancel.store(true, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    pub fn trigger_full(&self) -> Result<TriggerAck, Error> {
        self.trigger(JobKind::Full)
    }

    pub fn trigger_incremental(&self) -> Result<TriggerAck, Error> {
        self.trigger(JobKind::Incremental)
    }

    fn trigger(&self, kind: JobKind) -> Result<TriggerAck, Error> {
        self.inner
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| Error::IndexLocked)?;
        self.inner.cancel.store(false, Ordering::Relaxed);

        {
            let mut state = self.inner.state.lock().unwrap();
            state.status = IndexStatus::Running(kind);
            state.progress_percent = 0;
            self.inner.persist(&state);
        }
        self.inner.publish(JobEvent::Started { kind });
        info!("{} indexing started", kind.as_str());

        let store = Arc::clone(&self.store);
        let config = Arc::clone(&self.config);
        let inner = Arc::clone(&self.inner);
        thread::spawn(move || {
            let result = run_index_job(&inner, &store, &config, kind).map_err(|e| e.to_string());
            let terminal = finalize_job(&inner, kind, result);
            // Release the lock before announcing completion, so a
            // subscriber reacting to the terminal event can re-trigger.
            inner.busy.store(false, Ordering::Release);
            inner.publish(terminal);
        });

        Ok(TriggerAck {
            accepted: true,
            message: format!("{} indexing accepted", kind.as_str()),
        })
    }

    /// Existence-check sweep over the current snapshot. Runs under the
    /// same advisory lock as indexing, but synchronously, so the caller
    /// gets the removed count back.
    pub fn run_validation(&self) -> Result<ValidationReport, Error> {
        self.inner
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| Error::IndexLocked)?;

        {
            let mut state = self.inner.state.lock().unwrap();
            state.status = IndexStatus::Running(JobKind::Validating);
            state.progress_percent = 0;
            self.inner.persist(&state);
        }
        self.inner.publish(JobEvent::Started {
            kind: JobKind::Validating,
        });

        let (report, terminal) = match self.store.validate() {
            Ok(removed_count) => {
                let terminal = finalize_job(
                    &self.inner,
                    JobKind::Validating,
                    Ok(JobOutcome::Completed {
                        records: removed_count,
                    }),
                );
                let report = ValidationReport {
                    removed_count,
                    message: format!("removed {} stale records", removed_count),
                };
                (Ok(report), terminal)
            }
            Err(err) => {
                let terminal = finalize_job(&self.inner, JobKind::Validating, Err(err.to_string()));
                (Err(err), terminal)
            }
        };
        self.inner.busy.store(false, Ordering::Release);
        self.inner.publish(terminal);
        report
    }
}

impl ControllerInner {
    fn publish(&self, event: JobEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn persist(&self, state: &IndexState) {
        if let Err(err) = self.db.lock().unwrap().save_index_state(state) {
            warn!("Failed to persist index state: {}", err);
        }
    }

    fn set_progress(&self, percent: i32, status: String) {
        self.state.lock().unwrap().progress_percent = percent;
        self.publish(JobEvent::Progress { percent, status });
    }
}

fn run_index_job(
    inner: &ControllerInner,
    store: &IndexStore,
    config: &AppConfig,
    kind: JobKind,
) -> Result<JobOutcome, Error> {
    let enabled: Vec<AllowedDirectory> = config
        .allowed_directories
        .iter()
        .filter(|d| d.enabled)
        .cloned()
        .collect();
    let reachable: Vec<AllowedDirectory> = config::non_overlapping_roots(enabled)
        .into_iter()
        .filter(|d| {
            let ok = Path::new(&d.root_path).is_dir();
            if !ok {
                warn!("Root {} is not reachable, skipping", d.root_path);
            }
            ok
        })
        .collect();
    if reachable.is_empty() {
        return Err(Error::ScanFatal(
            "no configured root is reachable".to_string(),
        ));
    }

    let mode = if kind == JobKind::Full {
        ScanMode::Full
    } else {
        let state = inner.state.lock().unwrap().clone();
        let since = state
            .last_incremental_index_at
            .as_deref()
            .or(state.last_full_index_at.as_deref())
            .and_then(parse_rfc3339_secs)
            .unwrap_or(0);
        ScanMode::Incremental {
            since,
            known_mtimes: store.known_mtimes(),
        }
    };

    let scanner = Scanner::new(config);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.scan_threads.max(1))
        .build()
        .map_err(|err| Error::ScanFatal(format!("could not build scan pool: {}", err)))?;

    let (record_tx, record_rx) = crossbeam_channel::unbounded();
    let collector = thread::spawn(move || record_rx.into_iter().collect::<Vec<FileRecord>>());

    let total = reachable.len();
    let done = AtomicUsize::new(0);
    pool.install(|| {
        reachable.par_iter().for_each(|root| {
            if inner.cancel.load(Ordering::Relaxed) {
                return;
            }
            match scanner.scan_root(root, &mode, &ScanFilter::default(), &inner.cancel, &record_tx)
            {
                Ok(count) => info!("Scanned root {} ({} records)", root.root_path, count),
                // Per-root failures are isolated; the rest of the run
                // proceeds.
                Err(err) => warn!("Root {} failed: {}", root.root_path, err),
            }
            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            let percent = (finished * 90 / total) as i32;
            inner.set_progress(percent, format!("scanned {}", root.root_path));
        });
    });
    drop(record_tx);

    let records = collector
        .join()
        .map_err(|_| Error::ScanFatal("record collector panicked".to_string()))?;

    // A cancelled run must leave the store at its last consistent
    // snapshot; whatever was collected is discarded.
    if inner.cancel.load(Ordering::Relaxed) {
        return Ok(JobOutcome::Cancelled);
    }

    inner.set_progress(95, "writing index".to_string());
    let count = if kind == JobKind::Full {
        store.replace(records)?
    } else {
        store.merge(records)?
    };

    Ok(JobOutcome::Completed { records: count })
}

/// Record the outcome in `IndexState` and hand back the terminal event.
/// The caller publishes it once the advisory lock is released.
fn finalize_job(
    inner: &ControllerInner,
    kind: JobKind,
    result: Result<JobOutcome, String>,
) -> JobEvent {
    let now = chrono::Utc::now().to_rfc3339();
    let mut state = inner.state.lock().unwrap();
    match result {
        Ok(JobOutcome::Completed { records }) => {
            state.status = IndexStatus::Idle;
            state.progress_percent = 100;
            state.last_error = None;
            match kind {
                JobKind::Full => state.last_full_index_at = Some(now),
                JobKind::Incremental => state.last_incremental_index_at = Some(now),
                JobKind::Validating => {}
            }
            inner.persist(&state);
            info!("{} job completed ({} records)", kind.as_str(), records);
            JobEvent::Completed { kind, records }
        }
        Ok(JobOutcome::Cancelled) => {
            state.status = IndexStatus::Idle;
            state.progress_percent = 0;
            inner.persist(&state);
            info!("{} job cancelled", kind.as_str());
            JobEvent::Cancelled { kind }
        }
        Err(message) => {
            state.status = IndexStatus::Failed(message.clone());
            state.progress_percent = -1;
            state.last_error = Some(message.clone());
            inner.persist(&state);
            error!("{} job failed: {}", kind.as_str(), message);
            JobEvent::Failed { message }
        }
    }
}

fn parse_rfc3339_secs(value: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.timestamp())
}
