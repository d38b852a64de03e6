//! Local filesystem source

use std::path::PathBuf;

use async_trait::async_trait;
use walkdir::WalkDir;

use super::SourceReader;
use super::error::SourceError;
use crate::core::constants::SOURCE_FILE_EXTENSION;
use crate::utils::file::relative_key;

/// Reads `*.json` files below a local root directory
#[derive(Debug, Clone)]
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl SourceReader for LocalSource {
    fn describe(&self, key: &str) -> String {
        if key.is_empty() {
            self.root.display().to_string()
        } else {
            self.root.join(key).display().to_string()
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, SourceError> {
        let root = self.root.clone();
        let start = root.join(prefix.trim_matches('/'));

        tokio::task::spawn_blocking(move || {
            if !start.exists() {
                return Err(SourceError::NotFound(start.display().to_string()));
            }

            let mut keys = Vec::new();
            for entry in WalkDir::new(&start).follow_links(true) {
                let entry = entry.map_err(|e| SourceError::Walk {
                    root: start.display().to_string(),
                    message: e.to_string(),
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy();
                // Skip editor/OS artefacts such as `.ipynb_checkpoints` copies
                if name.starts_with('.') || !name.ends_with(SOURCE_FILE_EXTENSION) {
                    continue;
                }
                if let Some(key) = relative_key(&root, entry.path()) {
                    keys.push(key);
                }
            }
            keys.sort();
            Ok(keys)
        })
        .await
        .map_err(|e| SourceError::Walk {
            root: self.root.display().to_string(),
            message: e.to_string(),
        })?
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, SourceError> {
        let path = self.root.join(key);
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SourceError::NotFound(path.display().to_string())
            } else {
                SourceError::Io {
                    path: path.display().to_string(),
                    source: e,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &std::path::Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "song_data/B/b.json", "{}");
        write(dir.path(), "song_data/A/a.json", "{}");
        write(dir.path(), "song_data/A/notes.txt", "x");
        write(dir.path(), "song_data/A/.hidden.json", "{}");
        write(dir.path(), "log_data/2018/11/x.json", "{}");

        let source = LocalSource::new(dir.path().to_path_buf());
        let keys = source.list("song_data").await.unwrap();
        assert_eq!(keys, vec!["song_data/A/a.json", "song_data/B/b.json"]);
    }

    #[tokio::test]
    async fn test_list_missing_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalSource::new(dir.path().to_path_buf());
        let err = source.list("song_data").await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_read_round_trip_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "log_data/x.json", "{\"a\":1}");
        let source = LocalSource::new(dir.path().to_path_buf());

        let bytes = source.read("log_data/x.json").await.unwrap();
        assert_eq!(bytes, b"{\"a\":1}");

        let err = source.read("log_data/missing.json").await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
    }
}
