use std::{
    path::{Path, PathBuf},
    pin::Pin,
};

use futures::Stream;

use super::ImportError;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "heic", "heif", "tif", "tiff"];

/// A photo read from disk, waiting to become a reading.
#[derive(Debug, Clone)]
pub struct PendingPhoto {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

impl PendingPhoto {
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Image files of one directory (not recursive), in file name order.
pub struct PhotoDirSource {
    dir: PathBuf,
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl PhotoDirSource {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    async fn list(dir: &Path) -> Result<Vec<PathBuf>, ImportError> {
        let dir_err = |source| ImportError::Dir {
            path: dir.to_path_buf(),
            source,
        };
        let mut entries = tokio::fs::read_dir(dir).await.map_err(dir_err)?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(dir_err)? {
            let path = entry.path();
            if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) && is_image(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Unreadable files come through as `Err` items; a missing directory
    /// ends the stream after a single error.
    pub fn stream(&self) -> Pin<Box<dyn Stream<Item = Result<PendingPhoto, ImportError>> + Send>> {
        let dir = self.dir.clone();
        let s = async_stream::stream! {
            let paths = match Self::list(&dir).await {
                Ok(paths) => paths,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            tracing::info!(dir = %dir.display(), photos = paths.len(), "scanning photo directory");

            for path in paths {
                match tokio::fs::read(&path).await {
                    Ok(bytes) => yield Ok(PendingPhoto { path, bytes }),
                    Err(source) => yield Err(ImportError::Photo { path, source }),
                }
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn yields_images_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.JPG", "a.jpeg", "notes.txt", "c.png"] {
            std::fs::write(dir.path().join(name), name.as_bytes()).unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.jpg")).unwrap();

        let photos: Vec<PendingPhoto> = PhotoDirSource::new(dir.path())
            .stream()
            .map(|r| r.unwrap())
            .collect()
            .await;

        let names: Vec<&str> = photos.iter().filter_map(PendingPhoto::file_name).collect();
        assert_eq!(names, vec!["a.jpeg", "b.JPG", "c.png"]);
        assert_eq!(photos[1].bytes, b"b.JPG");
    }

    #[tokio::test]
    async fn missing_directory_is_one_error() {
        let dir = tempfile::tempdir().unwrap();
        let items: Vec<_> = PhotoDirSource::new(dir.path().join("missing")).stream().collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(ImportError::Dir { .. })));
    }
}
