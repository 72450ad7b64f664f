use crate::model::FileCategory;
use config::{Config, ConfigError, File as ConfigFile};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub allowed_directories: Vec<AllowedDirectory>,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default)]
    pub extensions: ExtensionPolicy,
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,
    /// Upper bound on concurrently-walked roots, to keep slow network
    /// shares from being saturated by one reindex.
    #[serde(default = "default_scan_threads")]
    pub scan_threads: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            allowed_directories: Vec::new(),
            ignore_patterns: Vec::new(),
            extensions: ExtensionPolicy::default(),
            max_file_size_bytes: default_max_file_size(),
            database_path: default_database_path(),
            search_timeout_ms: default_search_timeout_ms(),
            scan_threads: default_scan_threads(),
        }
    }
}

/// One allow-listed root. The sole authorization boundary for file
/// access; loaded once and treated as read-only afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct AllowedDirectory {
    pub root_path: String,
    #[serde(default)]
    pub category_hint: Option<FileCategory>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl AllowedDirectory {
    /// Whether this root is a candidate location for `category`.
    /// Roots without a hint may hold anything.
    pub fn matches_category(&self, category: FileCategory) -> bool {
        match self.category_hint {
            Some(hint) => hint == category,
            None => true,
        }
    }
}

/// Allowed file extensions per access context, lowercase, no dot.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtensionPolicy {
    #[serde(default = "default_media_extensions")]
    pub media: Vec<String>,
    #[serde(default = "default_scan_extensions")]
    pub scan: Vec<String>,
    #[serde(default = "default_document_extensions")]
    pub document: Vec<String>,
}

impl Default for ExtensionPolicy {
    fn default() -> Self {
        ExtensionPolicy {
            media: default_media_extensions(),
            scan: default_scan_extensions(),
            document: default_document_extensions(),
        }
    }
}

pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Remove roots that are subdirectories of other roots in the list, so a
/// scan never visits the same subtree twice.
pub fn non_overlapping_roots(dirs: Vec<AllowedDirectory>) -> Vec<AllowedDirectory> {
    let mut result: Vec<AllowedDirectory> = Vec::new();

    for dir in dirs {
        let dir_path = Path::new(&dir.root_path);
        let mut should_add = true;
        let result_clone = result.clone();

        for res_dir in &result_clone {
            let res_dir_path = Path::new(&res_dir.root_path);

            if dir_path.starts_with(res_dir_path) {
                should_add = false;
                break;
            }

            if res_dir_path.starts_with(dir_path) {
                result.retain(|x| x.root_path != res_dir.root_path);
                break;
            }
        }

        if should_add {
            result.push(dir);
        }
    }

    result
}

fn default_enabled() -> bool {
    true
}

fn default_max_file_size() -> u64 {
    // 2 GiB, the practical ceiling for serving a single video over the UI
    2 * 1024 * 1024 * 1024
}

fn default_database_path() -> String {
    "lotfinder.db".to_string()
}

fn default_search_timeout_ms() -> u64 {
    15_000
}

fn default_scan_threads() -> usize {
    4
}

fn default_media_extensions() -> Vec<String> {
    ["mp4", "avi", "mov", "wmv", "mkv", "mpg"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_scan_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "bmp", "tif", "tiff"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_document_extensions() -> Vec<String> {
    ["pdf", "doc", "docx", "xls", "xlsx", "txt"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir(path: &str) -> AllowedDirectory {
        AllowedDirectory {
            root_path: path.to_string(),
            category_hint: None,
            enabled: true,
        }
    }

    #[test]
    fn test_non_overlapping_no_overlap() {
        let dirs = vec![
            dir("/shares/videos"),
            dir("/shares/advisor"),
            dir("/archive/scans"),
        ];
        let result = non_overlapping_roots(dirs);
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_non_overlapping_with_subdirectory() {
        let dirs = vec![
            dir("/shares"),
            dir("/shares/videos"),
            dir("/archive/scans"),
        ];
        let result = non_overlapping_roots(dirs);
        assert_eq!(result.len(), 2);
        assert!(result.iter().any(|d| d.root_path == "/shares"));
        assert!(result.iter().any(|d| d.root_path == "/archive/scans"));
        // /shares/videos is covered by /shares
        assert!(!result.iter().any(|d| d.root_path == "/shares/videos"));
    }

    #[test]
    fn test_hintless_root_matches_every_category() {
        let d = dir("/shares/mixed");
        for category in FileCategory::ALL {
            assert!(d.matches_category(category));
        }
    }

    #[test]
    fn test_hinted_root_matches_only_its_category() {
        let mut d = dir("/shares/polish");
        d.category_hint = Some(FileCategory::PolishVideo);
        assert!(d.matches_category(FileCategory::PolishVideo));
        assert!(!d.matches_category(FileCategory::Scan));
    }
}
