//! Media path resolution and cleanup
//!
//! Posts store media paths as uploaded, which may be relative to the upload
//! root. The resolver turns them into absolute paths for the platform
//! clients and removes files once a post no longer references them.

use std::path::{Path, PathBuf};

use crate::error::{DbError, Result};
use crate::platforms::{MediaFile, MediaKind};
use crate::types::PostType;

#[derive(Debug, Clone)]
pub struct MediaResolver {
    base_dir: PathBuf,
}

impl MediaResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Absolute paths pass through; relative ones are joined onto the base dir
    pub fn resolve(&self, stored: &str) -> PathBuf {
        let path = Path::new(stored.trim_start_matches("./"));
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Resolve a stored path into something a platform client can upload
    pub fn media_file(&self, stored: &str, post_type: PostType) -> MediaFile {
        let kind = match post_type {
            PostType::Video => MediaKind::Video,
            _ => MediaKind::Image,
        };
        MediaFile {
            path: self.resolve(stored),
            kind,
        }
    }

    /// Delete the file behind a stored path.
    ///
    /// Returns `Ok(false)` when there was nothing to delete.
    pub fn remove(&self, stored: &str) -> Result<bool> {
        let path = self.resolve(stored);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Media file already gone");
            return Ok(false);
        }

        std::fs::remove_file(&path).map_err(DbError::IoError)?;
        tracing::debug!(path = %path.display(), "Removed media file");
        Ok(true)
    }
}
