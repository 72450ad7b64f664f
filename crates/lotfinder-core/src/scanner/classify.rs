use crate::config::ExtensionPolicy;
use crate::model::FileCategory;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

lazy_static! {
    /// Lot-number extraction patterns, in precedence order:
    /// a digit token adjacent to a category marker beats a leading token,
    /// which beats a trailing one.
    static ref LOT_BEFORE_MARKER: Regex =
        Regex::new(r"(?i)(\d{4,})[_\-. ]*(?:polish|rough|tension|advisor|scan)").unwrap();
    static ref MARKER_BEFORE_LOT: Regex =
        Regex::new(r"(?i)(?:polish|rough|tension|advisor|scan)[_\-. ]*(\d{4,})").unwrap();
    static ref LEADING_LOT: Regex = Regex::new(r"^(\d{4,})").unwrap();
    static ref TRAILING_LOT: Regex = Regex::new(r"(\d{4,})$").unwrap();
}

/// Extract the lot number from a file stem. Returns `None` when no
/// pattern matches; such files are skipped by the scanner, not errors.
pub fn extract_lot_number(stem: &str) -> Option<String> {
    for pattern in [
        &*LOT_BEFORE_MARKER,
        &*MARKER_BEFORE_LOT,
        &*LEADING_LOT,
        &*TRAILING_LOT,
    ] {
        if let Some(caps) = pattern.captures(stem) {
            return Some(caps[1].to_string());
        }
    }
    None
}

/// Classify a file by extension, name/location markers, and the root's
/// category hint. Returns `None` for files the index does not track.
pub fn classify(
    path: &Path,
    hint: Option<FileCategory>,
    policy: &ExtensionPolicy,
) -> Option<FileCategory> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let listed = |list: &[String]| list.iter().any(|allowed| allowed == &ext);

    if listed(&policy.media) {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if let Some(category) = video_marker(&stem) {
            return Some(category);
        }
        // Fall back to the directory chain: shares are commonly laid out
        // as <root>/polish/<lot>.mp4.
        let parent = path
            .parent()
            .map(|p| p.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if let Some(category) = video_marker(&parent) {
            return Some(category);
        }
        return hint.filter(|h| h.is_video());
    }

    if listed(&policy.scan) {
        return Some(FileCategory::Scan);
    }
    if listed(&policy.document) {
        return Some(FileCategory::Advisor);
    }
    None
}

fn video_marker(text: &str) -> Option<FileCategory> {
    if text.contains("polish") {
        Some(FileCategory::PolishVideo)
    } else if text.contains("rough") {
        Some(FileCategory::RoughVideo)
    } else if text.contains("tension") {
        Some(FileCategory::TensionVideo)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lot_adjacent_to_marker_wins() {
        assert_eq!(
            extract_lot_number("21156281_polish").as_deref(),
            Some("21156281")
        );
        assert_eq!(
            extract_lot_number("scan_21156281").as_deref(),
            Some("21156281")
        );
        // The marker-adjacent token beats the leading one.
        assert_eq!(
            extract_lot_number("9999_then_21156281_rough").as_deref(),
            Some("21156281")
        );
    }

    #[test]
    fn test_leading_and_trailing_tokens() {
        assert_eq!(
            extract_lot_number("21156281_copy2").as_deref(),
            Some("21156281")
        );
        assert_eq!(
            extract_lot_number("batch_export_21156281").as_deref(),
            Some("21156281")
        );
        assert_eq!(extract_lot_number("21156281").as_deref(), Some("21156281"));
    }

    #[test]
    fn test_no_lot_number() {
        assert_eq!(extract_lot_number("readme"), None);
        // Short digit runs are revision counters, not lot numbers.
        assert_eq!(extract_lot_number("img_001"), None);
    }

    #[test]
    fn test_classify_videos_by_marker() {
        let policy = ExtensionPolicy::default();
        assert_eq!(
            classify(Path::new("/r/21156281_polish.mp4"), None, &policy),
            Some(FileCategory::PolishVideo)
        );
        assert_eq!(
            classify(Path::new("/r/rough/21156281.mp4"), None, &policy),
            Some(FileCategory::RoughVideo)
        );
        assert_eq!(
            classify(Path::new("/r/tension_21156281.avi"), None, &policy),
            Some(FileCategory::TensionVideo)
        );
    }

    #[test]
    fn test_classify_video_falls_back_to_hint() {
        let policy = ExtensionPolicy::default();
        assert_eq!(
            classify(
                Path::new("/r/21156281.mp4"),
                Some(FileCategory::PolishVideo),
                &policy
            ),
            Some(FileCategory::PolishVideo)
        );
        // A non-video hint cannot claim a media file.
        assert_eq!(
            classify(
                Path::new("/r/21156281.mp4"),
                Some(FileCategory::Scan),
                &policy
            ),
            None
        );
    }

    #[test]
    fn test_classify_by_extension_class() {
        let policy = ExtensionPolicy::default();
        assert_eq!(
            classify(Path::new("/r/21156281_a.jpg"), None, &policy),
            Some(FileCategory::Scan)
        );
        assert_eq!(
            classify(Path::new("/r/21156281.pdf"), None, &policy),
            Some(FileCategory::Advisor)
        );
        assert_eq!(classify(Path::new("/r/21156281.exe"), None, &policy), None);
        assert_eq!(classify(Path::new("/r/noext"), None, &policy), None);
    }
}
