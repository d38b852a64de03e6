use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::utils::file::expand_path;
use crate::utils::location::Location;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_AWS_REGION, DEFAULT_CLUSTER_ALLOWED_CIDR,
    DEFAULT_CLUSTER_DB_NAME, DEFAULT_CLUSTER_DB_USER, DEFAULT_CLUSTER_IDENTIFIER,
    DEFAULT_CLUSTER_PORT, DEFAULT_CLUSTER_TYPE, DEFAULT_CLUSTER_WAIT_TIMEOUT_SECS,
    DEFAULT_LAKE_OUTPUT, DEFAULT_LOG_PREFIX, DEFAULT_NODE_TYPE, DEFAULT_NUM_NODES,
    DEFAULT_ROLE_NAME, DEFAULT_SONG_PREFIX, DEFAULT_SOURCE_ROOT, DEFAULT_TASK_RETRIES,
    DEFAULT_TASK_RETRY_DELAY_MS, POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS,
    POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS, POSTGRES_DEFAULT_MAX_CONNECTIONS,
    POSTGRES_DEFAULT_MAX_LIFETIME_SECS, POSTGRES_DEFAULT_MIN_CONNECTIONS,
    POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS,
};

// =============================================================================
// Database Backend Enum (SQLite or PostgreSQL)
// =============================================================================

/// Row-wise destination backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Sqlite,
    Postgres,
}

impl fmt::Display for DatabaseBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseBackend::Sqlite => write!(f, "sqlite"),
            DatabaseBackend::Postgres => write!(f, "postgres"),
        }
    }
}

// =============================================================================
// Warehouse Target Enum (DuckDB or Redshift)
// =============================================================================

/// Destination of the staging + transform pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseTarget {
    #[default]
    Duckdb,
    Redshift,
}

impl fmt::Display for WarehouseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarehouseTarget::Duckdb => write!(f, "duckdb"),
            WarehouseTarget::Redshift => write!(f, "redshift"),
        }
    }
}

// =============================================================================
// Lake Compression Enum
// =============================================================================

/// Parquet codec of the lake export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LakeCompression {
    #[default]
    Snappy,
    Gzip,
    Zstd,
}

impl LakeCompression {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LakeCompression::Snappy => "snappy",
            LakeCompression::Gzip => "gzip",
            LakeCompression::Zstd => "zstd",
        }
    }
}

impl fmt::Display for LakeCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// File Config Structs
// =============================================================================

/// Source section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SourceFileConfig {
    /// Directory or `s3://bucket/prefix` holding `song_data` and `log_data`
    pub root: Option<String>,
    pub song_prefix: Option<String>,
    pub log_prefix: Option<String>,
    /// S3 URI of the JSONPaths file Redshift uses for events
    pub log_jsonpath: Option<String>,
    pub region: Option<String>,
    /// Custom S3 endpoint (MinIO, localstack)
    pub endpoint: Option<String>,
}

/// PostgreSQL connection section, shared by the row-wise database and the
/// Redshift warehouse
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PostgresFileConfig {
    pub url: Option<String>,
    /// Maximum number of connections in the pool (default: 5)
    pub max_connections: Option<u32>,
    /// Minimum number of connections to keep warm (default: 1)
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub max_lifetime_secs: Option<u64>,
    /// Statement timeout in seconds, 0 to disable (default: 300)
    pub statement_timeout_secs: Option<u64>,
}

/// Row-wise database section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DatabaseFileConfig {
    /// sqlite (default) or postgres
    pub backend: Option<DatabaseBackend>,
    pub sqlite_path: Option<String>,
    pub postgres: Option<PostgresFileConfig>,
}

/// Warehouse section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct WarehouseFileConfig {
    /// duckdb (default) or redshift
    pub target: Option<WarehouseTarget>,
    pub duckdb_path: Option<String>,
    pub redshift: Option<PostgresFileConfig>,
    /// IAM role ARN the cluster assumes for COPY
    pub iam_role: Option<String>,
    pub append: Option<bool>,
    pub retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    /// Execution dates before this day stage only that day's events
    pub start_date: Option<NaiveDate>,
}

/// Lake export section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct LakeFileConfig {
    pub output: Option<String>,
    pub compression: Option<LakeCompression>,
}

/// Cluster provisioning section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ClusterFileConfig {
    pub identifier: Option<String>,
    pub cluster_type: Option<String>,
    pub node_type: Option<String>,
    pub num_nodes: Option<i32>,
    pub db_name: Option<String>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    pub port: Option<u16>,
    pub role_name: Option<String>,
    pub allowed_cidr: Option<String>,
    pub region: Option<String>,
    pub wait_timeout_secs: Option<u64>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub source: Option<SourceFileConfig>,
    pub database: Option<DatabaseFileConfig>,
    pub warehouse: Option<WarehouseFileConfig>,
    pub lake: Option<LakeFileConfig>,
    pub cluster: Option<ClusterFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// Overwrite `current` when `other` is set
fn merge_value<T: fmt::Debug>(current: &mut Option<T>, other: Option<T>, field: &str) {
    if other.is_some() {
        tracing::trace!(field, value = ?other, "Merging config value");
        *current = other;
    }
}

impl PostgresFileConfig {
    fn merge(&mut self, other: PostgresFileConfig, section: &str) {
        if other.url.is_some() {
            // The URL can carry a password, so only its presence is traced
            tracing::trace!(section, "Merging postgres url");
            self.url = other.url;
        }
        merge_value(&mut self.max_connections, other.max_connections, "max_connections");
        merge_value(&mut self.min_connections, other.min_connections, "min_connections");
        merge_value(
            &mut self.acquire_timeout_secs,
            other.acquire_timeout_secs,
            "acquire_timeout_secs",
        );
        merge_value(
            &mut self.idle_timeout_secs,
            other.idle_timeout_secs,
            "idle_timeout_secs",
        );
        merge_value(
            &mut self.max_lifetime_secs,
            other.max_lifetime_secs,
            "max_lifetime_secs",
        );
        merge_value(
            &mut self.statement_timeout_secs,
            other.statement_timeout_secs,
            "statement_timeout_secs",
        );
    }
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(source) = other.source {
            let current = self.source.get_or_insert_with(SourceFileConfig::default);
            merge_value(&mut current.root, source.root, "source.root");
            merge_value(&mut current.song_prefix, source.song_prefix, "source.song_prefix");
            merge_value(&mut current.log_prefix, source.log_prefix, "source.log_prefix");
            merge_value(
                &mut current.log_jsonpath,
                source.log_jsonpath,
                "source.log_jsonpath",
            );
            merge_value(&mut current.region, source.region, "source.region");
            merge_value(&mut current.endpoint, source.endpoint, "source.endpoint");
        }

        if let Some(database) = other.database {
            let current = self.database.get_or_insert_with(DatabaseFileConfig::default);
            merge_value(&mut current.backend, database.backend, "database.backend");
            merge_value(
                &mut current.sqlite_path,
                database.sqlite_path,
                "database.sqlite_path",
            );
            if let Some(postgres) = database.postgres {
                current
                    .postgres
                    .get_or_insert_with(PostgresFileConfig::default)
                    .merge(postgres, "database.postgres");
            }
        }

        if let Some(warehouse) = other.warehouse {
            let current = self
                .warehouse
                .get_or_insert_with(WarehouseFileConfig::default);
            merge_value(&mut current.target, warehouse.target, "warehouse.target");
            merge_value(
                &mut current.duckdb_path,
                warehouse.duckdb_path,
                "warehouse.duckdb_path",
            );
            if let Some(redshift) = warehouse.redshift {
                current
                    .redshift
                    .get_or_insert_with(PostgresFileConfig::default)
                    .merge(redshift, "warehouse.redshift");
            }
            merge_value(&mut current.iam_role, warehouse.iam_role, "warehouse.iam_role");
            merge_value(&mut current.append, warehouse.append, "warehouse.append");
            merge_value(&mut current.retries, warehouse.retries, "warehouse.retries");
            merge_value(
                &mut current.retry_delay_ms,
                warehouse.retry_delay_ms,
                "warehouse.retry_delay_ms",
            );
            merge_value(
                &mut current.start_date,
                warehouse.start_date,
                "warehouse.start_date",
            );
        }

        if let Some(lake) = other.lake {
            let current = self.lake.get_or_insert_with(LakeFileConfig::default);
            merge_value(&mut current.output, lake.output, "lake.output");
            merge_value(&mut current.compression, lake.compression, "lake.compression");
        }

        if let Some(cluster) = other.cluster {
            let current = self.cluster.get_or_insert_with(ClusterFileConfig::default);
            merge_value(&mut current.identifier, cluster.identifier, "cluster.identifier");
            merge_value(
                &mut current.cluster_type,
                cluster.cluster_type,
                "cluster.cluster_type",
            );
            merge_value(&mut current.node_type, cluster.node_type, "cluster.node_type");
            merge_value(&mut current.num_nodes, cluster.num_nodes, "cluster.num_nodes");
            merge_value(&mut current.db_name, cluster.db_name, "cluster.db_name");
            merge_value(&mut current.db_user, cluster.db_user, "cluster.db_user");
            if cluster.db_password.is_some() {
                tracing::trace!("Merging cluster.db_password");
                current.db_password = cluster.db_password;
            }
            merge_value(&mut current.port, cluster.port, "cluster.port");
            merge_value(&mut current.role_name, cluster.role_name, "cluster.role_name");
            merge_value(
                &mut current.allowed_cidr,
                cluster.allowed_cidr,
                "cluster.allowed_cidr",
            );
            merge_value(&mut current.region, cluster.region, "cluster.region");
            merge_value(
                &mut current.wait_timeout_secs,
                cluster.wait_timeout_secs,
                "cluster.wait_timeout_secs",
            );
        }
    }
}

// =============================================================================
// Runtime Config Structs
// =============================================================================

/// Where the song and log files are read from
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub root: Location,
    pub song_prefix: String,
    pub log_prefix: String,
    pub log_jsonpath: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

/// PostgreSQL-protocol connection (final/runtime)
#[derive(Debug, Clone, Default)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    /// Statement timeout in seconds (0 = disabled)
    pub statement_timeout_secs: u64,
    /// Send `statement_timeout` as a startup parameter (PostgreSQL only)
    pub send_statement_timeout: bool,
}

impl PostgresConfig {
    /// Runtime config from a URL and the optional file section; `None`
    /// when no non-empty URL is known
    fn build(url: Option<String>, file: PostgresFileConfig) -> Option<Self> {
        let url = url.or(file.url.clone()).filter(|u| !u.trim().is_empty())?;
        Some(Self::with_pool(url, file))
    }

    /// Pool defaults for a URL only known at runtime
    pub fn from_url(url: String) -> Self {
        Self::with_pool(url, PostgresFileConfig::default())
    }

    fn with_pool(url: String, file: PostgresFileConfig) -> Self {
        Self {
            url,
            max_connections: file
                .max_connections
                .unwrap_or(POSTGRES_DEFAULT_MAX_CONNECTIONS),
            min_connections: file
                .min_connections
                .unwrap_or(POSTGRES_DEFAULT_MIN_CONNECTIONS),
            acquire_timeout_secs: file
                .acquire_timeout_secs
                .unwrap_or(POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS),
            idle_timeout_secs: file
                .idle_timeout_secs
                .unwrap_or(POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS),
            max_lifetime_secs: file
                .max_lifetime_secs
                .unwrap_or(POSTGRES_DEFAULT_MAX_LIFETIME_SECS),
            statement_timeout_secs: file
                .statement_timeout_secs
                .unwrap_or(POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS),
            send_statement_timeout: true,
        }
    }
}

/// Row-wise destination (final/runtime)
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    /// SQLite file; the data directory default applies when unset
    pub sqlite_path: Option<PathBuf>,
    /// Only used if backend = postgres
    pub postgres: Option<PostgresConfig>,
}

/// Warehouse pipeline (final/runtime)
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub target: WarehouseTarget,
    /// DuckDB file; the data directory default applies when unset
    pub duckdb_path: Option<PathBuf>,
    /// Only used if target = redshift and no cluster is provisioned
    pub redshift: Option<PostgresConfig>,
    pub iam_role: Option<String>,
    pub append: bool,
    /// Attempts per task, at least 1
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub start_date: Option<NaiveDate>,
}

/// Lake export (final/runtime)
#[derive(Debug, Clone)]
pub struct LakeConfig {
    pub output: Location,
    pub compression: LakeCompression,
}

/// Cluster provisioning (final/runtime)
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub identifier: String,
    pub cluster_type: String,
    pub node_type: String,
    pub num_nodes: i32,
    pub db_name: String,
    pub db_user: String,
    /// Required by `cluster up` and `warehouse --provision` only
    pub db_password: Option<String>,
    pub port: u16,
    pub role_name: String,
    pub allowed_cidr: String,
    pub region: String,
    pub wait_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub database: DatabaseConfig,
    pub warehouse: WarehouseConfig,
    pub lake: LakeConfig,
    pub cluster: ClusterConfig,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.sparkify/sparkify.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        let config = Self::from_layers(cli, file_config)?;
        config.validate()?;

        tracing::debug!(
            source = %config.source.root,
            database = %config.database.backend,
            warehouse = %config.warehouse.target,
            lake = %config.lake.output,
            cluster = %config.cluster.identifier,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Layer defaults -> file config -> CLI/env overrides
    fn from_layers(cli: &CliConfig, file_config: FileConfig) -> Result<Self> {
        let file_source = file_config.source.unwrap_or_default();
        let file_database = file_config.database.unwrap_or_default();
        let file_warehouse = file_config.warehouse.unwrap_or_default();
        let file_lake = file_config.lake.unwrap_or_default();
        let file_cluster = file_config.cluster.unwrap_or_default();

        // source: CLI/env overrides file config
        let root = cli
            .source_root
            .clone()
            .or(file_source.root)
            .unwrap_or_else(|| DEFAULT_SOURCE_ROOT.to_string());
        let root = Location::parse(&root)
            .map_err(|e| anyhow::anyhow!("Configuration error: source.root: {}", e))?;
        let source_region = cli.aws_region.clone().or(file_source.region);

        let source = SourceConfig {
            root,
            song_prefix: file_source
                .song_prefix
                .unwrap_or_else(|| DEFAULT_SONG_PREFIX.to_string()),
            log_prefix: file_source
                .log_prefix
                .unwrap_or_else(|| DEFAULT_LOG_PREFIX.to_string()),
            log_jsonpath: file_source.log_jsonpath.filter(|p| !p.is_empty()),
            region: source_region.clone(),
            endpoint: cli.s3_endpoint.clone().or(file_source.endpoint),
        };

        // database: backend and postgres URL from CLI/env first
        let database = DatabaseConfig {
            backend: cli
                .database_backend
                .or(file_database.backend)
                .unwrap_or_default(),
            sqlite_path: cli
                .sqlite_path
                .clone()
                .or(file_database.sqlite_path)
                .map(|p| expand_path(&p)),
            postgres: PostgresConfig::build(
                cli.postgres_url.clone(),
                file_database.postgres.unwrap_or_default(),
            ),
        };

        // warehouse: --append only ever turns append on
        let warehouse = WarehouseConfig {
            target: cli
                .warehouse_target
                .or(file_warehouse.target)
                .unwrap_or_default(),
            duckdb_path: file_warehouse.duckdb_path.map(|p| expand_path(&p)),
            redshift: PostgresConfig::build(
                cli.redshift_url.clone(),
                file_warehouse.redshift.unwrap_or_default(),
            ),
            iam_role: cli
                .redshift_iam_role
                .clone()
                .or(file_warehouse.iam_role)
                .filter(|r| !r.is_empty()),
            append: cli.append || file_warehouse.append.unwrap_or(false),
            retries: file_warehouse
                .retries
                .unwrap_or(DEFAULT_TASK_RETRIES)
                .max(1),
            retry_delay_ms: file_warehouse
                .retry_delay_ms
                .unwrap_or(DEFAULT_TASK_RETRY_DELAY_MS),
            start_date: file_warehouse.start_date,
        };

        let output = cli
            .lake_output
            .clone()
            .or(file_lake.output)
            .unwrap_or_else(|| DEFAULT_LAKE_OUTPUT.to_string());
        let lake = LakeConfig {
            output: Location::parse(&output)
                .map_err(|e| anyhow::anyhow!("Configuration error: lake.output: {}", e))?,
            compression: cli
                .lake_compression
                .or(file_lake.compression)
                .unwrap_or_default(),
        };

        // cluster region falls back to the source region
        let cluster = ClusterConfig {
            identifier: file_cluster
                .identifier
                .unwrap_or_else(|| DEFAULT_CLUSTER_IDENTIFIER.to_string()),
            cluster_type: file_cluster
                .cluster_type
                .unwrap_or_else(|| DEFAULT_CLUSTER_TYPE.to_string()),
            node_type: file_cluster
                .node_type
                .unwrap_or_else(|| DEFAULT_NODE_TYPE.to_string()),
            num_nodes: file_cluster.num_nodes.unwrap_or(DEFAULT_NUM_NODES),
            db_name: file_cluster
                .db_name
                .unwrap_or_else(|| DEFAULT_CLUSTER_DB_NAME.to_string()),
            db_user: file_cluster
                .db_user
                .unwrap_or_else(|| DEFAULT_CLUSTER_DB_USER.to_string()),
            db_password: cli
                .cluster_db_password
                .clone()
                .or(file_cluster.db_password)
                .filter(|p| !p.is_empty()),
            port: file_cluster.port.unwrap_or(DEFAULT_CLUSTER_PORT),
            role_name: file_cluster
                .role_name
                .unwrap_or_else(|| DEFAULT_ROLE_NAME.to_string()),
            allowed_cidr: cli
                .cluster_allowed_cidr
                .clone()
                .or(file_cluster.allowed_cidr)
                .unwrap_or_else(|| DEFAULT_CLUSTER_ALLOWED_CIDR.to_string()),
            region: cli
                .aws_region
                .clone()
                .or(file_cluster.region)
                .or(source_region)
                .unwrap_or_else(|| DEFAULT_AWS_REGION.to_string()),
            wait_timeout_secs: file_cluster
                .wait_timeout_secs
                .unwrap_or(DEFAULT_CLUSTER_WAIT_TIMEOUT_SECS),
        };

        Ok(Self {
            source,
            database,
            warehouse,
            lake,
            cluster,
        })
    }

    /// Region used for COPY and the cluster APIs
    pub fn aws_region(&self) -> &str {
        self.source.region.as_deref().unwrap_or(&self.cluster.region)
    }

    fn validate(&self) -> Result<()> {
        if self.source.song_prefix.trim_matches('/').is_empty() {
            anyhow::bail!("Configuration error: source.song_prefix must not be empty");
        }
        if self.source.log_prefix.trim_matches('/').is_empty() {
            anyhow::bail!("Configuration error: source.log_prefix must not be empty");
        }

        if self.database.backend == DatabaseBackend::Postgres && self.database.postgres.is_none() {
            anyhow::bail!(
                "Configuration error: database.postgres.url is required when database.backend is 'postgres'"
            );
        }

        // COPY reads straight from object storage
        if self.warehouse.target == WarehouseTarget::Redshift && !self.source.root.is_s3() {
            anyhow::bail!(
                "Configuration error: source.root must be an s3:// location when warehouse.target is 'redshift'"
            );
        }
        // JSON 'auto' cannot map camelCase event keys onto staging columns
        if self.warehouse.target == WarehouseTarget::Redshift && self.source.log_jsonpath.is_none() {
            anyhow::bail!(
                "Configuration error: source.log_jsonpath is required when warehouse.target is 'redshift'"
            );
        }

        if self.cluster.num_nodes < 1 {
            anyhow::bail!("Configuration error: cluster.num_nodes must be at least 1");
        }
        if !matches!(self.cluster.cluster_type.as_str(), "single-node" | "multi-node") {
            anyhow::bail!(
                "Configuration error: cluster.cluster_type must be 'single-node' or 'multi-node', got '{}'",
                self.cluster.cluster_type
            );
        }
        if self.cluster.port == 0 {
            anyhow::bail!("Configuration error: cluster.port must be greater than 0");
        }
        if self.cluster.wait_timeout_secs == 0 {
            anyhow::bail!("Configuration error: cluster.wait_timeout_secs must be greater than 0");
        }

        Ok(())
    }
}

/// Get the profile config path (~/.sparkify/sparkify.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layered(cli: &CliConfig, json: &str) -> Result<AppConfig> {
        let file: FileConfig = serde_json::from_str(json).unwrap();
        let config = AppConfig::from_layers(cli, file)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_enum_serde() {
        let backend: DatabaseBackend = serde_json::from_str(r#""postgres""#).unwrap();
        assert_eq!(backend, DatabaseBackend::Postgres);
        let target: WarehouseTarget = serde_json::from_str(r#""redshift""#).unwrap();
        assert_eq!(target, WarehouseTarget::Redshift);
        let codec: LakeCompression = serde_json::from_str(r#""zstd""#).unwrap();
        assert_eq!(codec, LakeCompression::Zstd);
        assert!(serde_json::from_str::<LakeCompression>(r#""brotli""#).is_err());
    }

    #[test]
    fn test_enum_display() {
        assert_eq!(DatabaseBackend::Sqlite.to_string(), "sqlite");
        assert_eq!(WarehouseTarget::Duckdb.to_string(), "duckdb");
        assert_eq!(LakeCompression::default().to_string(), "snappy");
    }

    #[test]
    fn test_file_config_parse_full() {
        let json = r#"{
            "source": { "root": "s3://udacity-dend", "log_jsonpath": "s3://udacity-dend/log_json_path.json" },
            "database": { "backend": "postgres", "postgres": { "url": "postgres://localhost/sparkifydb", "max_connections": 2 } },
            "warehouse": { "target": "redshift", "append": true, "start_date": "2018-11-01" },
            "lake": { "output": "/tmp/lake", "compression": "gzip" },
            "cluster": { "num_nodes": 2, "cluster_type": "multi-node" }
        }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();

        let source = config.source.unwrap();
        assert_eq!(source.root.as_deref(), Some("s3://udacity-dend"));
        let database = config.database.unwrap();
        assert_eq!(database.backend, Some(DatabaseBackend::Postgres));
        assert_eq!(database.postgres.unwrap().max_connections, Some(2));
        let warehouse = config.warehouse.unwrap();
        assert_eq!(
            warehouse.start_date,
            NaiveDate::from_ymd_opt(2018, 11, 1)
        );
        assert_eq!(config.lake.unwrap().compression, Some(LakeCompression::Gzip));
        assert_eq!(config.cluster.unwrap().num_nodes, Some(2));
    }

    #[test]
    fn test_file_config_parse_empty() {
        let config: FileConfig = serde_json::from_str("{}").unwrap();
        assert!(config.source.is_none());
        assert!(config.warehouse.is_none());
    }

    #[test]
    fn test_file_config_extra_fields() {
        let json = r#"{ "lake": { "output": "/tmp/lake" }, "sever": {} }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();
        let serde_json::Value::Object(map) = &config.extra else {
            panic!("extra should be an object");
        };
        assert!(map.contains_key("sever"));
    }

    #[test]
    fn test_merge_overlay_wins() {
        let mut base: FileConfig = serde_json::from_str(
            r#"{ "source": { "root": "/data", "song_prefix": "songs" },
                 "database": { "postgres": { "url": "postgres://a/db", "max_connections": 9 } } }"#,
        )
        .unwrap();
        let overlay: FileConfig = serde_json::from_str(
            r#"{ "source": { "root": "/other" },
                 "database": { "postgres": { "url": "postgres://b/db" } } }"#,
        )
        .unwrap();
        base.merge(overlay);

        let source = base.source.unwrap();
        assert_eq!(source.root.as_deref(), Some("/other"));
        assert_eq!(source.song_prefix.as_deref(), Some("songs"));
        let postgres = base.database.unwrap().postgres.unwrap();
        assert_eq!(postgres.url.as_deref(), Some("postgres://b/db"));
        assert_eq!(postgres.max_connections, Some(9));
    }

    #[test]
    fn test_app_config_defaults() {
        let config = layered(&CliConfig::default(), "{}").unwrap();

        assert_eq!(config.source.song_prefix, DEFAULT_SONG_PREFIX);
        assert_eq!(config.source.log_prefix, DEFAULT_LOG_PREFIX);
        assert!(!config.source.root.is_s3());
        assert_eq!(config.database.backend, DatabaseBackend::Sqlite);
        assert!(config.database.postgres.is_none());
        assert_eq!(config.warehouse.target, WarehouseTarget::Duckdb);
        assert!(!config.warehouse.append);
        assert_eq!(config.warehouse.retries, DEFAULT_TASK_RETRIES);
        assert_eq!(config.lake.compression, LakeCompression::Snappy);
        assert_eq!(config.cluster.identifier, DEFAULT_CLUSTER_IDENTIFIER);
        assert_eq!(config.cluster.port, DEFAULT_CLUSTER_PORT);
        assert_eq!(config.cluster.region, DEFAULT_AWS_REGION);
        assert!(config.cluster.db_password.is_none());
    }

    #[test]
    fn test_cli_overrides_file() {
        let cli = CliConfig {
            source_root: Some("s3://bucket/input".to_string()),
            aws_region: Some("eu-west-1".to_string()),
            warehouse_target: Some(WarehouseTarget::Redshift),
            lake_compression: Some(LakeCompression::Zstd),
            append: true,
            ..Default::default()
        };
        let config = layered(
            &cli,
            r#"{ "source": { "root": "/local", "region": "us-east-1", "log_jsonpath": "s3://bucket/paths.json" },
                 "lake": { "compression": "gzip" } }"#,
        )
        .unwrap();

        assert_eq!(config.source.root.to_string(), "s3://bucket/input");
        assert_eq!(config.source.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.cluster.region, "eu-west-1");
        assert_eq!(config.aws_region(), "eu-west-1");
        assert_eq!(config.warehouse.target, WarehouseTarget::Redshift);
        assert_eq!(config.lake.compression, LakeCompression::Zstd);
        assert!(config.warehouse.append);
    }

    #[test]
    fn test_postgres_backend_requires_url() {
        let cli = CliConfig {
            database_backend: Some(DatabaseBackend::Postgres),
            ..Default::default()
        };
        let err = layered(&cli, "{}").unwrap_err();
        assert!(err.to_string().contains("database.postgres.url"));

        let cli = CliConfig {
            postgres_url: Some("postgres://student@localhost/sparkifydb".to_string()),
            ..cli
        };
        let config = layered(&cli, "{}").unwrap();
        let postgres = config.database.postgres.unwrap();
        assert_eq!(postgres.max_connections, POSTGRES_DEFAULT_MAX_CONNECTIONS);
        assert!(postgres.send_statement_timeout);

        let runtime = PostgresConfig::from_url("postgres://u:p@cluster:5439/db".to_string());
        assert_eq!(runtime.min_connections, POSTGRES_DEFAULT_MIN_CONNECTIONS);
        assert_eq!(runtime.statement_timeout_secs, POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS);
    }

    #[test]
    fn test_redshift_requires_s3_source() {
        let cli = CliConfig {
            warehouse_target: Some(WarehouseTarget::Redshift),
            ..Default::default()
        };
        let err = layered(&cli, r#"{ "source": { "root": "/data" } }"#).unwrap_err();
        assert!(err.to_string().contains("s3://"));
    }

    #[test]
    fn test_redshift_requires_log_jsonpath() {
        let cli = CliConfig {
            warehouse_target: Some(WarehouseTarget::Redshift),
            ..Default::default()
        };
        let err = layered(&cli, r#"{ "source": { "root": "s3://udacity-dend" } }"#).unwrap_err();
        assert!(err.to_string().contains("source.log_jsonpath"));

        let config = layered(
            &cli,
            r#"{ "source": { "root": "s3://udacity-dend", "log_jsonpath": "s3://udacity-dend/log_json_path.json" } }"#,
        )
        .unwrap();
        assert_eq!(
            config.source.log_jsonpath.as_deref(),
            Some("s3://udacity-dend/log_json_path.json")
        );
    }

    #[test]
    fn test_invalid_cluster_shape() {
        let err = layered(&CliConfig::default(), r#"{ "cluster": { "num_nodes": 0 } }"#)
            .unwrap_err();
        assert!(err.to_string().contains("num_nodes"));

        let err = layered(
            &CliConfig::default(),
            r#"{ "cluster": { "cluster_type": "huge" } }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cluster_type"));
    }

    #[test]
    fn test_retries_at_least_one() {
        let config = layered(&CliConfig::default(), r#"{ "warehouse": { "retries": 0 } }"#)
            .unwrap();
        assert_eq!(config.warehouse.retries, 1);
    }
}
