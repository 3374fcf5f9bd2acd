//! Local video file requests.
//!
//! The file source is responsible for:
//! - Accepting only `video/*` MIME types
//! - Accepting only local paths (no URL schemes)
//! - Producing a locally addressable `file://` reference for playback

use std::path::{Path, PathBuf};

use crate::error::SessionError;

const FILE_HINT: &str = "select a valid video file";

/// Handle on an uploaded or picked video file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoFile {
    pub name: String,
    pub mime_type: String,
    pub path: PathBuf,
}

impl VideoFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            path,
        }
    }

    /// Build a handle from a path, guessing the MIME type from its extension.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            mime_type: guess_mime(path).to_string(),
            path: path.to_path_buf(),
        }
    }

    /// `file://` URL for the handle, when the path can be made absolute.
    pub fn playable_url(&self) -> Option<String> {
        let absolute = std::fs::canonicalize(&self.path).ok()?;
        url::Url::from_file_path(absolute)
            .ok()
            .map(|url| url.to_string())
    }
}

pub fn validate_video_file(file: &VideoFile) -> Result<(), SessionError> {
    if !file.mime_type.starts_with("video/") {
        return Err(SessionError::validation(
            format!("'{}' is not a video file ({})", file.name, file.mime_type),
            FILE_HINT,
        ));
    }
    if !is_local_file_path(&file.path.to_string_lossy()) {
        return Err(SessionError::validation(
            format!("'{}' is not a local path", file.path.display()),
            FILE_HINT,
        ));
    }
    Ok(())
}

fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "ogv" => "video/ogg",
        _ => "application/octet-stream",
    }
}

fn is_local_file_path(path: &str) -> bool {
    !path.trim().is_empty() && !path.contains("://")
}
