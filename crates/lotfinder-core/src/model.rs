use serde::{Deserialize, Serialize};

/// Classification of an indexed file. Video categories hold at most one
/// current record per lot; `Advisor` and `Scan` are multi-valued sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    PolishVideo,
    RoughVideo,
    TensionVideo,
    Advisor,
    Scan,
}

impl FileCategory {
    pub const ALL: [FileCategory; 5] = [
        FileCategory::PolishVideo,
        FileCategory::RoughVideo,
        FileCategory::TensionVideo,
        FileCategory::Advisor,
        FileCategory::Scan,
    ];

    /// Database column value and config hint spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::PolishVideo => "polish_video",
            FileCategory::RoughVideo => "rough_video",
            FileCategory::TensionVideo => "tension_video",
            FileCategory::Advisor => "advisor",
            FileCategory::Scan => "scan",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "polish_video" => Some(FileCategory::PolishVideo),
            "rough_video" => Some(FileCategory::RoughVideo),
            "tension_video" => Some(FileCategory::TensionVideo),
            "advisor" => Some(FileCategory::Advisor),
            "scan" => Some(FileCategory::Scan),
            _ => None,
        }
    }

    /// Whether a lot surfaces at most one current record for this category.
    pub fn is_single_valued(&self) -> bool {
        matches!(
            self,
            FileCategory::PolishVideo | FileCategory::RoughVideo | FileCategory::TensionVideo
        )
    }

    pub fn is_video(&self) -> bool {
        self.is_single_valued()
    }
}

/// A file discovered under an allowed root, keyed by lot number.
///
/// Identity is `(lot_number, category, absolute_path)`. Timestamps are
/// UNIX epoch seconds read from filesystem metadata at scan time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    pub lot_number: String,
    pub category: FileCategory,
    pub absolute_path: String,
    pub size_bytes: u64,
    pub modified_at: i64,
    pub indexed_at: i64,
}

/// Per-category aggregation for one lot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResult {
    pub polish_video: Option<FileRecord>,
    pub rough_video: Option<FileRecord>,
    pub tension_video: Option<FileRecord>,
    pub advisor_files: Vec<FileRecord>,
    pub scan_files: Vec<FileRecord>,
    pub has_results: bool,
}

impl SearchResult {
    /// Aggregate raw records into the per-category shape. For video
    /// categories duplicate records collapse to the latest `modified_at`.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = FileRecord>,
    {
        let mut result = SearchResult::default();
        for record in records {
            match record.category {
                FileCategory::PolishVideo => keep_latest(&mut result.polish_video, record),
                FileCategory::RoughVideo => keep_latest(&mut result.rough_video, record),
                FileCategory::TensionVideo => keep_latest(&mut result.tension_video, record),
                FileCategory::Advisor => result.advisor_files.push(record),
                FileCategory::Scan => result.scan_files.push(record),
            }
        }
        result.advisor_files.sort_by(|a, b| a.absolute_path.cmp(&b.absolute_path));
        result.scan_files.sort_by(|a, b| a.absolute_path.cmp(&b.absolute_path));
        result.has_results = result.polish_video.is_some()
            || result.rough_video.is_some()
            || result.tension_video.is_some()
            || !result.advisor_files.is_empty()
            || !result.scan_files.is_empty();
        result
    }
}

fn keep_latest(slot: &mut Option<FileRecord>, record: FileRecord) {
    match slot {
        Some(current) if current.modified_at >= record.modified_at => {}
        _ => *slot = Some(record),
    }
}

/// Kind of indexing job owned by the job controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Full,
    Incremental,
    Validating,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Full => "full",
            JobKind::Incremental => "incremental",
            JobKind::Validating => "validating",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexStatus {
    Idle,
    Running(JobKind),
    Failed(String),
}

/// Controller-owned job state, persisted so a restarted process reports
/// the last known status without re-indexing.
#[derive(Debug, Clone)]
pub struct IndexState {
    pub status: IndexStatus,
    /// 0..=100 during a run, 100 after success, -1 after a failure.
    pub progress_percent: i32,
    /// RFC 3339 timestamps of the last successful runs.
    pub last_full_index_at: Option<String>,
    pub last_incremental_index_at: Option<String>,
    pub last_error: Option<String>,
}

impl Default for IndexState {
    fn default() -> Self {
        IndexState {
            status: IndexStatus::Idle,
            progress_percent: 0,
            last_full_index_at: None,
            last_incremental_index_at: None,
            last_error: None,
        }
    }
}

/// Read-only aggregate projection over the index, for dashboards.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub lots: usize,
    pub polish_videos: usize,
    pub rough_videos: usize,
    pub tension_videos: usize,
    pub advisor_files: usize,
    pub scan_files: usize,
    pub total_size_bytes: u64,
    pub last_full_index_at: Option<String>,
    pub last_incremental_index_at: Option<String>,
}
