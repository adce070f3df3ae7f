/// Download-name construction for finished artifacts.
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

/// Used when a title sanitizes down to nothing.
pub const FALLBACK_TITLE: &str = "ytm4a_audio";

/// Extension used when the artifact path has none.
pub const DEFAULT_EXTENSION: &str = "m4a";

const MAX_TITLE_CHARS: usize = 180;

static INVALID_FS_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[\\/:*?"<>|]"#).unwrap()
});

/// Make a title safe to use as a file name.
pub fn sanitize_title(title: &str) -> String {
    let replaced = INVALID_FS_CHARS.replace_all(title, "_");
    let trimmed = replaced.trim().trim_end_matches('.');
    let capped: String = trimmed.chars().take(MAX_TITLE_CHARS).collect();
    if capped.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        capped
    }
}

/// Attachment name for an artifact: sanitized title (or the file stem when the
/// title is empty) plus the artifact's own extension.
pub fn download_name(title: &str, path: &Path) -> String {
    let base = if title.is_empty() {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        title.to_string()
    };
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
    format!("{}.{}", sanitize_title(&base), ext)
}
