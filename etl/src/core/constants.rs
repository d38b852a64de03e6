// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display and platform directories)
pub const APP_NAME: &str = "Sparkify";

/// Tracing target of this crate (used in the default log filter)
pub const APP_CRATE_TARGET: &str = "sparkify_etl";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".sparkify";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "sparkify.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "SPARKIFY_CONFIG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "SPARKIFY_LOG";

/// Environment variable to override data directory
pub const ENV_DATA_DIR: &str = "SPARKIFY_DATA_DIR";

// =============================================================================
// Environment Variables - Source
// =============================================================================

/// Environment variable for the source root (directory or s3://bucket/prefix)
pub const ENV_SOURCE_ROOT: &str = "SPARKIFY_SOURCE_ROOT";

/// Environment variable for the AWS region used by S3 and the cluster APIs
pub const ENV_AWS_REGION: &str = "SPARKIFY_AWS_REGION";

/// Environment variable for a custom S3 endpoint (MinIO, localstack)
pub const ENV_S3_ENDPOINT: &str = "SPARKIFY_S3_ENDPOINT";

// =============================================================================
// Source Defaults
// =============================================================================

/// Default source root
pub const DEFAULT_SOURCE_ROOT: &str = "./data";

/// Default prefix of song catalog files below the source root
pub const DEFAULT_SONG_PREFIX: &str = "song_data";

/// Default prefix of activity log files below the source root
pub const DEFAULT_LOG_PREFIX: &str = "log_data";

/// Extension of source files
pub const SOURCE_FILE_EXTENSION: &str = ".json";

/// Log page value that marks a song play
pub const NEXT_SONG_PAGE: &str = "NextSong";

// =============================================================================
// Extraction
// =============================================================================

/// Maximum difference (seconds) between a log event's length and a catalog
/// song's duration for the two to match
pub const DURATION_TOLERANCE_SECS: f64 = 0.01;

// =============================================================================
// Environment Variables - Database (row-wise loader)
// =============================================================================

/// Environment variable for the row-wise destination backend
pub const ENV_DATABASE_BACKEND: &str = "SPARKIFY_DATABASE_BACKEND";

/// Environment variable for the PostgreSQL connection URL
pub const ENV_POSTGRES_URL: &str = "SPARKIFY_POSTGRES_URL";

/// Environment variable for the SQLite database file
pub const ENV_SQLITE_PATH: &str = "SPARKIFY_SQLITE_PATH";

// =============================================================================
// SQLite
// =============================================================================

/// SQLite database filename inside the data directory
pub const SQLITE_DB_FILENAME: &str = "sparkifydb.sqlite";

/// Maximum SQLite pool connections
pub const SQLITE_MAX_CONNECTIONS: u32 = 5;

/// SQLite busy timeout
pub const SQLITE_BUSY_TIMEOUT_SECS: u64 = 30;

/// SQLite page cache size (negative = KiB)
pub const SQLITE_CACHE_SIZE: &str = "-64000";

// =============================================================================
// PostgreSQL
// =============================================================================

/// Maximum connections in the PostgreSQL pool
pub const POSTGRES_DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Minimum connections kept in the PostgreSQL pool
pub const POSTGRES_DEFAULT_MIN_CONNECTIONS: u32 = 1;

/// Connection acquire timeout
pub const POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Idle connection timeout
pub const POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Maximum connection lifetime
pub const POSTGRES_DEFAULT_MAX_LIFETIME_SECS: u64 = 1800;

/// Statement timeout (0 disables)
pub const POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 300;

// =============================================================================
// Environment Variables - Warehouse
// =============================================================================

/// Environment variable for the warehouse target (duckdb or redshift)
pub const ENV_WAREHOUSE_TARGET: &str = "SPARKIFY_WAREHOUSE_TARGET";

/// Environment variable for the Redshift connection URL
pub const ENV_REDSHIFT_URL: &str = "SPARKIFY_REDSHIFT_URL";

/// Environment variable for the IAM role ARN used by Redshift COPY
pub const ENV_REDSHIFT_IAM_ROLE: &str = "SPARKIFY_REDSHIFT_IAM_ROLE";

// =============================================================================
// Warehouse Defaults
// =============================================================================

/// DuckDB warehouse filename inside the data directory
pub const DUCKDB_DB_FILENAME: &str = "sparkify.duckdb";

/// Upper bound on a single blocking DuckDB call
pub const DUCKDB_QUERY_TIMEOUT_SECS: u64 = 600;

/// Default attempts per warehouse task
pub const DEFAULT_TASK_RETRIES: u32 = 3;

/// Default base delay for task retry backoff
pub const DEFAULT_TASK_RETRY_DELAY_MS: u64 = 500;

// =============================================================================
// Environment Variables - Lake
// =============================================================================

/// Environment variable for the lake output root (directory or s3://bucket/prefix)
pub const ENV_LAKE_OUTPUT: &str = "SPARKIFY_LAKE_OUTPUT";

/// Default lake output root
pub const DEFAULT_LAKE_OUTPUT: &str = "./lake";

// =============================================================================
// Cluster Defaults
// =============================================================================

/// Default Redshift cluster identifier
pub const DEFAULT_CLUSTER_IDENTIFIER: &str = "sparkify-cluster";

/// Default cluster type
pub const DEFAULT_CLUSTER_TYPE: &str = "multi-node";

/// Default node type
pub const DEFAULT_NODE_TYPE: &str = "dc2.large";

/// Default number of nodes
pub const DEFAULT_NUM_NODES: i32 = 4;

/// Default database name
pub const DEFAULT_CLUSTER_DB_NAME: &str = "sparkify";

/// Default database user
pub const DEFAULT_CLUSTER_DB_USER: &str = "sparkify";

/// Default database port
pub const DEFAULT_CLUSTER_PORT: u16 = 5439;

/// Default IAM role name
pub const DEFAULT_ROLE_NAME: &str = "sparkifyRedshiftRole";

/// Managed policy granting the cluster read access to S3
pub const S3_READ_ONLY_POLICY_ARN: &str = "arn:aws:iam::aws:policy/AmazonS3ReadOnlyAccess";

/// Service principal allowed to assume the cluster role
pub const REDSHIFT_SERVICE_PRINCIPAL: &str = "redshift.amazonaws.com";

/// Default deadline for the cluster to reach a target state
pub const DEFAULT_CLUSTER_WAIT_TIMEOUT_SECS: u64 = 1800;

/// Interval between cluster status polls
pub const CLUSTER_POLL_INTERVAL_SECS: u64 = 15;

/// Environment variable for the cluster master password
pub const ENV_CLUSTER_DB_PASSWORD: &str = "SPARKIFY_CLUSTER_DB_PASSWORD";

/// Environment variable for the CIDR allowed to reach the cluster
pub const ENV_CLUSTER_ALLOWED_CIDR: &str = "SPARKIFY_CLUSTER_ALLOWED_CIDR";

/// Region used when neither the config nor the environment names one
pub const DEFAULT_AWS_REGION: &str = "us-west-2";

/// Default CIDR allowed to reach the cluster port
pub const DEFAULT_CLUSTER_ALLOWED_CIDR: &str = "0.0.0.0/0";
