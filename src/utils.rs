//! Utility functions

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// Valid audio extensions for URL parsing
const VALID_AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "aac", "ogg", "wav", "opus"];

/// Extension used when the audio URL carries none
pub const DEFAULT_AUDIO_EXTENSION: &str = "mp3";

/// Extension of in-progress download files
pub const PARTIAL_EXTENSION: &str = "part";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "mezmur", "Mezmur")
}

/// Base data directory for mezmur
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".mezmur"))
}

/// Default directory for downloaded tracks
pub fn downloads_dir() -> PathBuf {
    data_dir().join("downloads")
}

/// Default location of the local SQLite database
pub fn database_path() -> PathBuf {
    data_dir().join("mezmur.db")
}

/// Default location of the settings file
pub fn settings_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("settings.json"))
}

/// Encode a backend id as a file name component
///
/// Characters outside `[A-Za-z0-9_-]` are written as `%XX` per UTF-8 byte,
/// so distinct ids always give distinct names and path separators never
/// survive.
pub fn sanitize_file_component(raw: &str) -> String {
    if raw.is_empty() {
        return "%".to_string();
    }
    let mut encoded = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            encoded.push(ch);
        } else {
            let mut buf = [0u8; 4];
            for byte in ch.encode_utf8(&mut buf).bytes() {
                encoded.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    encoded
}

/// Extract audio file extension from URL path
///
/// # Example
/// ```
/// use mezmur::utils::extract_extension_from_url;
/// let ext = extract_extension_from_url("http://example.com/song.flac?token=xxx");
/// assert_eq!(ext, Some("flac".to_string()));
/// ```
pub fn extract_extension_from_url(url: &str) -> Option<String> {
    let url_parsed = reqwest::Url::parse(url).ok()?;
    let path = url_parsed.path();

    let filename = path.rsplit('/').next()?;
    if !filename.contains('.') {
        return None;
    }

    let ext = filename.rsplit('.').next()?.to_lowercase();

    if VALID_AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        Some(ext)
    } else {
        None
    }
}

/// Whether a path is an in-progress download
pub fn is_partial_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == PARTIAL_EXTENSION)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_component() {
        assert_eq!(sanitize_file_component("abc-123_X"), "abc-123_X");
        assert_eq!(
            sanitize_file_component("../etc/passwd"),
            "%2E%2E%2Fetc%2Fpasswd"
        );
        assert_eq!(sanitize_file_component("né"), "n%C3%A9");
        assert_eq!(sanitize_file_component(""), "%");
    }

    #[test]
    fn test_sanitize_file_component_keeps_ids_apart() {
        let ids = ["x.1", "x_1", "x%2E1", "x 1", "", "%"];
        let names: std::collections::HashSet<_> =
            ids.iter().map(|id| sanitize_file_component(id)).collect();
        assert_eq!(names.len(), ids.len());
    }

    #[test]
    fn test_extract_extension_from_url() {
        assert_eq!(
            extract_extension_from_url("http://example.com/song.mp3"),
            Some("mp3".to_string())
        );
        assert_eq!(
            extract_extension_from_url("http://example.com/song.FLAC?token=xxx"),
            Some("flac".to_string())
        );
        assert_eq!(
            extract_extension_from_url("http://example.com/song.m4a#section"),
            Some("m4a".to_string())
        );
        assert_eq!(
            extract_extension_from_url("http://example.com/song.txt"),
            None
        );
        assert_eq!(extract_extension_from_url("http://example.com/song"), None);
        assert_eq!(extract_extension_from_url("not a url"), None);
    }

    #[test]
    fn test_is_partial_file() {
        assert!(is_partial_file(Path::new("/tmp/abc.part")));
        assert!(is_partial_file(Path::new("/tmp/x%2E1.4242-7.part")));
        assert!(!is_partial_file(Path::new("/tmp/abc.mp3")));
        assert!(!is_partial_file(Path::new("/tmp/part")));
    }
}
