use std::path::Path;

use crate::state::ImageUri;

/// Filesystem access used by the edit session.
pub trait FileStore: Send + Sync {
    fn write(&self, path: &Path, bytes: &[u8]) -> anyhow::Result<()>;

    /// Best-effort removal. Failures are swallowed.
    fn delete(&self, uri: &ImageUri);

    /// Fetch a remote image into `dest` and return its local reference.
    fn download(&self, url: &ImageUri, dest: &Path) -> anyhow::Result<ImageUri>;
}

pub struct LocalFileStore {
    client: reqwest::blocking::Client,
}

impl LocalFileStore {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for LocalFileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FileStore for LocalFileStore {
    fn write(&self, path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn delete(&self, uri: &ImageUri) {
        let Some(path) = uri.local_path() else {
            return;
        };
        if let Err(err) = std::fs::remove_file(path) {
            tracing::debug!(path = %path.display(), %err, "ignoring failed delete");
        }
    }

    fn download(&self, url: &ImageUri, dest: &Path) -> anyhow::Result<ImageUri> {
        let bytes = self
            .client
            .get(url.as_str())
            .send()?
            .error_for_status()?
            .bytes()?;
        self.write(dest, &bytes)?;
        tracing::info!(%url, dest = %dest.display(), size = bytes.len(), "downloaded remote image");
        Ok(ImageUri::from(dest.to_path_buf()))
    }
}

/// `<unix millis>-<source file name>` inside `dir`.
pub fn timestamped_path(dir: &Path, source: &ImageUri) -> std::path::PathBuf {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    dir.join(format!("{}-{}", millis, source.file_name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.bin");
        LocalFileStore::new().write(&path, b"abc").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }

    #[test]
    fn delete_removes_file_and_ignores_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.png");
        std::fs::write(&path, b"x").unwrap();

        let store = LocalFileStore::new();
        store.delete(&ImageUri::from(path.clone()));
        assert!(!path.exists());
        store.delete(&ImageUri::from(path));
        store.delete(&ImageUri::from("https://example.com/never-touched.png"));
    }

    #[test]
    fn timestamped_path_keeps_source_name() {
        let path = timestamped_path(
            Path::new("/work"),
            &ImageUri::from("/photos/holiday/IMG_2.png"),
        );
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        let (stamp, rest) = name.split_once('-').unwrap();
        assert!(stamp.parse::<u128>().is_ok());
        assert_eq!(rest, "IMG_2.png");
        assert!(path.starts_with("/work"));
    }
}
