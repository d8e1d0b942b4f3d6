use std::{
    io,
    path::{Path, PathBuf},
};

use time::OffsetDateTime;

const MEDIA_SUBDIR: &str = "water_readings";
const DEFAULT_EXTENSION: &str = "jpg";
const HASH_PREFIX_LEN: usize = 16;

/// Content-addressed photo storage below the configured media directory.
/// Readings keep the path relative to the root, always with `/` separators.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn absolute(&self, relative: &str) -> PathBuf {
        relative.split('/').fold(self.root.clone(), |p, part| p.join(part))
    }

    /// Stores `bytes` under the month of `ts`. Identical content for the
    /// same month maps to the same file, so `created` is false when it was
    /// already there.
    pub async fn save(&self, bytes: &[u8], ts: OffsetDateTime, file_name: Option<&str>) -> io::Result<StoredPhoto> {
        let relative = relative_path(bytes, ts, file_name);
        let target = self.absolute(&relative);
        if let Some(dir) = target.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let created = if tokio::fs::try_exists(&target).await? {
            tracing::debug!(path = %relative, "photo already stored");
            false
        } else {
            tokio::fs::write(&target, bytes).await?;
            true
        };
        Ok(StoredPhoto { relative, created })
    }

    /// Drop a photo written by [`save`](Self::save) whose reading never made
    /// it into the store. Files that existed before are left alone.
    pub async fn discard(&self, photo: &StoredPhoto) {
        if !photo.created {
            return;
        }
        if let Err(e) = tokio::fs::remove_file(self.absolute(&photo.relative)).await {
            tracing::warn!(path = %photo.relative, error = %e, "failed to remove orphaned photo");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPhoto {
    pub relative: String,
    pub created: bool,
}

fn extension(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

pub fn relative_path(bytes: &[u8], ts: OffsetDateTime, file_name: Option<&str>) -> String {
    let hash = blake3::hash(bytes).to_hex();
    format!(
        "{MEDIA_SUBDIR}/{:04}/{:02}/{}.{}",
        ts.year(),
        u8::from(ts.month()),
        &hash[..HASH_PREFIX_LEN],
        extension(file_name)
    )
}
