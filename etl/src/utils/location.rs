//! Source/destination location parsing for `s3://bucket/prefix` URIs and
//! local paths.

use std::fmt;
use std::path::PathBuf;

use super::file::expand_path;

/// URI scheme for object storage locations
pub const S3_SCHEME: &str = "s3://";

/// Where a pipeline reads from or writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Local directory (tilde and relative paths expanded)
    Local(PathBuf),
    /// Object storage bucket and key prefix (no leading or trailing `/`)
    S3 { bucket: String, prefix: String },
}

impl Location {
    /// Parse a location string.
    ///
    /// - `s3://bucket` -> bucket root
    /// - `s3://bucket/some/prefix/` -> prefix `some/prefix`
    /// - anything else -> local path
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("location must not be empty".to_string());
        }
        match raw.strip_prefix(S3_SCHEME) {
            Some(rest) => {
                let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
                if bucket.is_empty() {
                    return Err(format!("missing bucket in '{}'", raw));
                }
                Ok(Location::S3 {
                    bucket: bucket.to_string(),
                    prefix: prefix.trim_matches('/').to_string(),
                })
            }
            None => Ok(Location::Local(expand_path(raw))),
        }
    }

    pub fn is_s3(&self) -> bool {
        matches!(self, Location::S3 { .. })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::S3 { bucket, prefix } if prefix.is_empty() => {
                write!(f, "{}{}", S3_SCHEME, bucket)
            }
            Location::S3 { bucket, prefix } => write!(f, "{}{}/{}", S3_SCHEME, bucket, prefix),
        }
    }
}

/// Join two `/`-separated key fragments without doubling separators
pub fn join_key(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let key = key.trim_matches('/');
    match (prefix.is_empty(), key.is_empty()) {
        (true, _) => key.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{}/{}", prefix, key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_s3_with_prefix() {
        let loc = Location::parse("s3://udacity-dend/song_data/").unwrap();
        assert_eq!(
            loc,
            Location::S3 {
                bucket: "udacity-dend".to_string(),
                prefix: "song_data".to_string()
            }
        );
        assert!(loc.is_s3());
    }

    #[test]
    fn test_parse_s3_bucket_only() {
        let loc = Location::parse("s3://bucket").unwrap();
        assert_eq!(loc.to_string(), "s3://bucket");
    }

    #[test]
    fn test_parse_s3_missing_bucket() {
        assert!(Location::parse("s3:///prefix").is_err());
        assert!(Location::parse("  ").is_err());
    }

    #[test]
    fn test_parse_local_absolute() {
        let loc = Location::parse("/data/sparkify").unwrap();
        assert_eq!(loc, Location::Local(PathBuf::from("/data/sparkify")));
        assert!(!loc.is_s3());
    }

    #[test]
    fn test_join_key() {
        assert_eq!(join_key("", "a/b"), "a/b");
        assert_eq!(join_key("p/", "/a"), "p/a");
        assert_eq!(join_key("p", ""), "p");
    }
}
