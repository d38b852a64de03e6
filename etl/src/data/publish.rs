//! Upload of locally written output to object storage
//!
//! The lake export always writes to a local directory first; for an
//! `s3://` output root every file below that directory is put under the
//! output prefix with the same relative key. Objects left under a table's
//! prefix by an earlier run are deleted before the upload.

use std::path::{Path, PathBuf};

use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use walkdir::WalkDir;

use crate::data::error::DataError;
use crate::data::types::Table;
use crate::utils::file::relative_key;
use crate::utils::location::{S3_SCHEME, join_key};

/// Every file below `dir` with its object key under `prefix`, sorted by key
pub fn object_keys(dir: &Path, prefix: &str) -> Result<Vec<(PathBuf, String)>, DataError> {
    let mut objects = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| DataError::Io(std::io::Error::other(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(key) = relative_key(dir, entry.path()) {
            objects.push((entry.path().to_path_buf(), join_key(prefix, &key)));
        }
    }
    objects.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(objects)
}

/// Key prefix holding the objects of one table, with a trailing `/` so
/// `songs/` never matches `songplays/`
pub fn table_prefix(prefix: &str, table: Table) -> String {
    format!("{}/", join_key(prefix, table.name()))
}

/// Delete every object under `s3://bucket/prefix`; returns the number of
/// objects deleted
pub async fn delete_prefix(client: &Client, bucket: &str, prefix: &str) -> Result<usize, DataError> {
    let location = format!("{}{}/{}", S3_SCHEME, bucket, prefix);
    let mut keys = Vec::new();
    let mut token: Option<String> = None;

    loop {
        let resp = client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(token.take())
            .send()
            .await
            .map_err(|e| DataError::s3(&location, e.into_service_error()))?;

        keys.extend(resp.contents().iter().filter_map(|o| o.key().map(str::to_string)));

        match resp.next_continuation_token() {
            Some(next) if resp.is_truncated() == Some(true) => token = Some(next.to_string()),
            _ => break,
        }
    }

    for key in &keys {
        client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                DataError::s3(
                    format!("{}{}/{}", S3_SCHEME, bucket, key),
                    e.into_service_error(),
                )
            })?;
    }

    if !keys.is_empty() {
        tracing::debug!(bucket, prefix, objects = keys.len(), "Stale objects deleted");
    }
    Ok(keys.len())
}

/// Put every file below `dir` into `s3://bucket/prefix/...`; returns the
/// number of objects written
pub async fn upload_dir(
    client: &Client,
    bucket: &str,
    prefix: &str,
    dir: &Path,
) -> Result<usize, DataError> {
    let objects = object_keys(dir, prefix)?;

    for (path, key) in &objects {
        let data = tokio::fs::read(path).await?;
        client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                DataError::s3(
                    format!("{}{}/{}", S3_SCHEME, bucket, key),
                    e.into_service_error(),
                )
            })?;
        tracing::trace!(bucket, key = %key, "Object uploaded");
    }

    tracing::debug!(bucket, prefix, objects = objects.len(), "Directory uploaded");
    Ok(objects.len())
}
