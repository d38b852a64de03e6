//! S3 source (AWS S3 or S3-compatible services such as MinIO)

use async_trait::async_trait;
use aws_sdk_s3::Client;

use super::SourceReader;
use super::error::SourceError;
use crate::core::constants::SOURCE_FILE_EXTENSION;
use crate::utils::location::{S3_SCHEME, join_key};

/// Build an S3 client from the default AWS credential chain
pub async fn build_client(region: Option<&str>, endpoint: Option<&str>) -> Client {
    let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

    if let Some(region) = region {
        config_loader = config_loader.region(aws_sdk_s3::config::Region::new(region.to_string()));
    }

    let config = config_loader.load().await;

    let mut s3_config = aws_sdk_s3::config::Builder::from(&config);
    if let Some(endpoint_url) = endpoint {
        // Path-style addressing is required by most S3-compatible services
        s3_config = s3_config.endpoint_url(endpoint_url).force_path_style(true);
    }

    Client::from_conf(s3_config.build())
}

/// Reads `*.json` objects below `s3://bucket/prefix`
#[derive(Debug, Clone)]
pub struct S3Source {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Source {
    pub fn new(client: Client, bucket: String, prefix: String) -> Self {
        tracing::debug!(bucket = %bucket, prefix = %prefix, "S3 source initialized");
        Self {
            client,
            bucket,
            prefix,
        }
    }

    /// Strip the root prefix so keys stay relative like local ones
    fn relative<'a>(&self, key: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            return key;
        }
        key.strip_prefix(self.prefix.as_str())
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(key)
    }
}

#[async_trait]
impl SourceReader for S3Source {
    fn describe(&self, key: &str) -> String {
        let full = join_key(&self.prefix, key);
        if full.is_empty() {
            format!("{}{}", S3_SCHEME, self.bucket)
        } else {
            format!("{}{}/{}", S3_SCHEME, self.bucket, full)
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, SourceError> {
        let full_prefix = join_key(&self.prefix, prefix);
        // Trailing slash keeps `song_data` from matching `song_data_old`
        let list_prefix = if full_prefix.is_empty() {
            full_prefix
        } else {
            format!("{}/", full_prefix)
        };

        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&list_prefix)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| SourceError::s3(&self.bucket, &list_prefix, e.into_service_error()))?;

            for object in resp.contents() {
                if let Some(key) = object.key()
                    && key.ends_with(SOURCE_FILE_EXTENSION)
                {
                    keys.push(self.relative(key).to_string());
                }
            }

            match resp.next_continuation_token() {
                Some(next) if resp.is_truncated() == Some(true) => token = Some(next.to_string()),
                _ => break,
            }
        }

        keys.sort();
        tracing::debug!(bucket = %self.bucket, prefix = %list_prefix, count = keys.len(), "Listed S3 objects");
        Ok(keys)
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, SourceError> {
        let full_key = join_key(&self.prefix, key);
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| {
                let service_err = e.into_service_error();
                if service_err.is_no_such_key() {
                    SourceError::NotFound(format!("{}{}/{}", S3_SCHEME, self.bucket, full_key))
                } else {
                    SourceError::s3(&self.bucket, &full_key, service_err)
                }
            })?;

        let bytes = resp
            .body
            .collect()
            .await
            .map_err(|e| SourceError::s3(&self.bucket, &full_key, e))?
            .into_bytes();

        Ok(bytes.to_vec())
    }
}
