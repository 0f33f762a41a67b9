use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Result;

/// File extensions considered when scanning a directory for episodes.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "webm", "mkv", "avi", "mts", "m2ts", "ts", "mov", "wmv", "mp4", "m4v", "mpg", "mpeg", "m2v",
];

/// Formats the given [Duration] as "H:MM:SS".
pub fn format_timestamp(t: Duration) -> String {
    let secs = t.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Returns a filesystem-safe slug for `path`: its ASCII letters and digits, followed by
/// the first 8 hex digits of the MD5 of the full path.
pub fn path_slug(path: impl AsRef<Path>) -> String {
    let path = path.as_ref().to_string_lossy();
    let name: String = path.chars().filter(char::is_ascii_alphanumeric).collect();
    let digest = format!("{:x}", md5::compute(path.as_bytes()));
    format!("{}_{}", name, &digest[..8])
}

/// Returns a stable key for the season that contains the given episodes.
///
/// The key is the MD5 of the sorted set of parent directories, so adding an episode to a
/// season directory does not change the key.
pub fn season_key<P: AsRef<Path>>(episodes: &[P]) -> String {
    let parents: BTreeSet<PathBuf> = episodes
        .iter()
        .map(|p| p.as_ref().parent().map(Path::to_path_buf).unwrap_or_default())
        .collect();
    let joined = parents
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("\n");
    format!("{:x}", md5::compute(joined.as_bytes()))
}

/// Checks if the given path points to a video file by inspecting its header.
pub fn is_video_file(path: impl AsRef<Path>) -> bool {
    let mut buf = [0u8; 8192];
    let n = match std::fs::File::open(path.as_ref()).and_then(|mut f| f.read(&mut buf)) {
        Ok(n) => n,
        Err(_) => return false,
    };
    infer::is_video(&buf[..n])
}

fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Returns the sorted list of video files in `dir` (non-recursive). Hidden files are
/// skipped. If `check_headers` is set, files are also checked with [is_video_file].
pub fn find_video_files(dir: impl AsRef<Path>, check_headers: bool) -> Result<Vec<PathBuf>> {
    let mut videos = Vec::new();
    for entry in std::fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with('.'))
            .unwrap_or(true);
        if hidden || !path.is_file() || !has_video_extension(&path) {
            continue;
        }
        if check_headers && !is_video_file(&path) {
            tracing::debug!(path = %path.display(), "skipping file with non-video header");
            continue;
        }
        videos.push(path);
    }
    videos.sort();
    Ok(videos)
}

/// Returns the underlying FFmpeg version string.
#[cfg(feature = "ffmpeg")]
pub fn ffmpeg_version_string() -> String {
    let version_int = ffmpeg_next::util::version();

    // Reference: https://github.com/FFmpeg/FFmpeg/blob/130d19bf2044ac76372d1b97ab87ab283c8b37f8/libavutil/version.h#L64
    format!(
        "{}.{}.{}",
        version_int >> 16,             // MAJOR
        (version_int & 0x00FF00) >> 8, // MINOR
        version_int & 0xFF             // MICRO
    )
}
