//! Utility functions for file names, paths and URL inspection

use std::path::{Path, PathBuf};

/// Maximum length of a sanitized title, in characters
pub const MAX_TITLE_LEN: usize = 100;

/// Characters that are not allowed in file names on at least one supported platform
const ILLEGAL_FILENAME_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Turn an arbitrary title into a safe base file name
///
/// Illegal characters and control characters become `_`, runs of whitespace
/// collapse into a single space, and the result is trimmed and capped at
/// [`MAX_TITLE_LEN`] characters. Returns a timestamp placeholder instead of an
/// empty string.
///
/// # Examples
///
/// ```
/// use fetch_dl::utils::sanitize_title;
///
/// assert_eq!(sanitize_title("My: Video / Title?"), "My_ Video _ Title_");
/// assert!(sanitize_title("   ").starts_with("download_"));
/// ```
pub fn sanitize_title(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| {
            if ILLEGAL_FILENAME_CHARS.contains(&c) || (c.is_control() && !c.is_whitespace()) {
                '_'
            } else {
                c
            }
        })
        .collect();

    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let capped: String = collapsed.chars().take(MAX_TITLE_LEN).collect();
    let trimmed = capped.trim_end();

    if trimmed.is_empty() {
        fallback_title()
    } else {
        trimmed.to_string()
    }
}

/// Placeholder base name used when no title can be determined
pub fn fallback_title() -> String {
    format!("download_{}", chrono::Local::now().format("%Y%m%d_%H%M%S"))
}

/// Whether a URL should be handled by the external media downloader
///
/// Matches YouTube hosts, case-insensitively.
///
/// # Examples
///
/// ```
/// use fetch_dl::utils::is_media_url;
///
/// assert!(is_media_url("https://www.YouTube.com/watch?v=dQw4w9WgXcQ"));
/// assert!(is_media_url("https://youtu.be/dQw4w9WgXcQ"));
/// assert!(!is_media_url("https://www.example.com/file.pdf"));
/// ```
pub fn is_media_url(url: &str) -> bool {
    if let Ok(parsed) = url::Url::parse(url)
        && let Some(host) = parsed.host_str()
    {
        let host = host.to_ascii_lowercase();
        return host == "youtu.be"
            || host == "youtube.com"
            || host.ends_with(".youtube.com")
            || host.ends_with(".youtu.be");
    }

    let lower = url.to_lowercase();
    lower.contains("youtube.com") || lower.contains("youtu.be")
}

/// Files the external downloader may leave behind for an expected output
///
/// Includes the output itself, its `.part` and `.ytdl` siblings, and in the
/// same directory:
/// - in-progress intermediates `<stem>.<anything>.part` / `.ytdl`
/// - finished per-stream files awaiting the merge, `<stem>.f<format id>.<ext>`
/// - the merger's `<stem>.temp.<ext>`
///
/// The naming follows what current yt-dlp releases write and is best effort.
pub async fn partial_artifacts(expected_output: &Path) -> Vec<PathBuf> {
    let mut paths = vec![
        expected_output.to_path_buf(),
        append_extension(expected_output, "part"),
        append_extension(expected_output, "ytdl"),
    ];

    let (Some(dir), Some(stem)) = (
        expected_output.parent(),
        expected_output.file_stem().and_then(|s| s.to_str()),
    ) else {
        return paths;
    };
    let prefix = format!("{stem}.");

    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return paths;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let Some(rest) = name.to_str().and_then(|n| n.strip_prefix(&prefix)) else {
            continue;
        };
        let path = entry.path();
        if is_intermediate(rest) && !paths.contains(&path) {
            paths.push(path);
        }
    }

    paths
}

/// `rest` is a file name with the `<stem>.` prefix removed
fn is_intermediate(rest: &str) -> bool {
    if rest.ends_with(".part") || rest.ends_with(".ytdl") {
        return true;
    }
    let Some((first, ext)) = rest.split_once('.') else {
        return false;
    };
    if ext.is_empty() || ext.contains('.') {
        return false;
    }
    first == "temp"
        || first
            .strip_prefix('f')
            .and_then(|id| id.chars().next())
            .is_some_and(|c| c.is_ascii_digit())
}

/// Append an extra extension (`a.mp4` -> `a.mp4.part`)
pub fn append_extension(path: &Path, extension: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".");
    os.push(extension);
    PathBuf::from(os)
}

/// Remove a file, ignoring every error
pub async fn remove_file_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed partial file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "could not remove partial file")
        }
    }
}

/// Create the parent directory of `path` if it has one
pub async fn ensure_parent_dir(path: &Path) -> crate::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent).await,
        _ => Ok(()),
    }
}

/// Create a directory and all of its parents
pub async fn ensure_dir(dir: &Path) -> crate::Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| crate::Error::CreateDir {
            path: dir.to_path_buf(),
            source,
        })
}
