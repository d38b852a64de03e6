//! Source readers for song-catalog and activity-log JSON files
//!
//! - `local` - walks a directory tree
//! - `s3` - lists and fetches objects below a bucket prefix
//! - `parse` - decodes file bodies into records
//!
//! Listing returns keys relative to the source root, sorted, so every run
//! visits files in the same order. Reading applies the skip-and-log policy:
//! a file that cannot be read or decoded is logged with its location and
//! counted, and the remaining files are still processed.

pub mod error;
mod local;
mod parse;
mod s3;

pub use error::SourceError;
pub use local::LocalSource;
pub use parse::{parse_log_file, parse_song_file};
pub use s3::{S3Source, build_client};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use futures::StreamExt;

use crate::data::types::{LogEvent, SongRecord};
use crate::utils::location::Location;

/// Files fetched concurrently by `read_all`
const READ_CONCURRENCY: usize = 16;

/// A root location that can list and fetch source files
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Display form of `key` below the root (`""` is the root itself)
    fn describe(&self, key: &str) -> String;

    /// All `*.json` keys below `prefix`, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>, SourceError>;

    /// Raw body of one file
    async fn read(&self, key: &str) -> Result<Vec<u8>, SourceError>;
}

/// Open a reader for a local directory or `s3://` location
pub async fn open(
    location: &Location,
    region: Option<&str>,
    endpoint: Option<&str>,
) -> Arc<dyn SourceReader> {
    match location {
        Location::Local(path) => Arc::new(LocalSource::new(path.clone())),
        Location::S3 { bucket, prefix } => {
            let client = build_client(region, endpoint).await;
            Arc::new(S3Source::new(client, bucket.clone(), prefix.clone()))
        }
    }
}

/// Which record shape a file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Song,
    Log,
}

/// Records gathered from many files plus per-file outcome counts
#[derive(Debug)]
pub struct Batch<T> {
    pub records: Vec<T>,
    pub files_read: usize,
    pub files_failed: usize,
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            files_read: 0,
            files_failed: 0,
        }
    }
}

/// Read and decode one song-catalog file
pub async fn read_song_file(
    source: &dyn SourceReader,
    key: &str,
) -> Result<Vec<SongRecord>, SourceError> {
    let bytes = source.read(key).await?;
    parse_song_file(&source.describe(key), &bytes)
}

/// Read and decode one log file (`NextSong` events only)
pub async fn read_log_file(
    source: &dyn SourceReader,
    key: &str,
) -> Result<Vec<LogEvent>, SourceError> {
    let bytes = source.read(key).await?;
    parse_log_file(&source.describe(key), &bytes)
}

/// Read every song file in `keys`, skipping files that fail
pub async fn read_songs(source: &dyn SourceReader, keys: &[String]) -> Batch<SongRecord> {
    read_all(source, keys, FileKind::Song, parse_song_file).await
}

/// Read every log file in `keys`, skipping files that fail
pub async fn read_events(source: &dyn SourceReader, keys: &[String]) -> Batch<LogEvent> {
    read_all(source, keys, FileKind::Log, parse_log_file).await
}

type Decoder<T> = fn(&str, &[u8]) -> Result<Vec<T>, SourceError>;

async fn read_all<T>(
    source: &dyn SourceReader,
    keys: &[String],
    kind: FileKind,
    decode: Decoder<T>,
) -> Batch<T> {
    let mut batch = Batch::default();

    // `buffered` keeps input order so results stay deterministic
    let mut results = futures::stream::iter(keys.iter())
        .map(|key| async move {
            let result = match source.read(key).await {
                Ok(bytes) => decode(&source.describe(key), &bytes),
                Err(e) => Err(e),
            };
            (key, result)
        })
        .buffered(READ_CONCURRENCY);

    while let Some((key, result)) = results.next().await {
        match result {
            Ok(records) => {
                batch.files_read += 1;
                batch.records.extend(records);
            }
            Err(e) => {
                batch.files_failed += 1;
                tracing::error!(
                    path = %source.describe(key),
                    kind = ?kind,
                    error = %e,
                    "Skipping unreadable source file"
                );
            }
        }
    }

    tracing::debug!(
        kind = ?kind,
        files_read = batch.files_read,
        files_failed = batch.files_failed,
        records = batch.records.len(),
        "Source files read"
    );
    batch
}

/// Keep only log files for a single execution date.
///
/// Log files are laid out as `.../{YYYY}/{MM}/{YYYY-MM-DD}-events.json`.
pub fn keys_for_date(keys: &[String], date: NaiveDate) -> Vec<String> {
    let needle = format!(
        "{}/{:02}/{}",
        date.year(),
        date.month(),
        date.format("%Y-%m-%d")
    );
    keys.iter().filter(|k| k.contains(&needle)).cloned().collect()
}
