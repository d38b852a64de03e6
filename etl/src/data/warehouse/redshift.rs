//! Redshift warehouse
//!
//! Staging uses `COPY ... FORMAT AS JSON` straight from S3, so the cluster
//! reads the files itself; transforms are the shared `INSERT ... SELECT`
//! statements in the Redshift dialect. Statements go through the simple
//! query protocol (`raw_sql`), which Redshift handles for COPY and DDL.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;

use crate::core::config::PostgresConfig;
use crate::data::error::DataError;
use crate::data::postgres::connect_pool;
use crate::data::sql::{LoadMode, RedshiftDialect, transforms};
use crate::data::traits::{TableCatalog, checked_column};
use crate::data::types::{StagingTable, Table};
use crate::utils::location::join_key;

use super::{StageOutcome, Warehouse, WarehouseError, day_prefix};

/// Where COPY reads from and how it authenticates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySettings {
    pub bucket: String,
    /// Key prefix of the source root inside the bucket
    pub prefix: String,
    pub song_prefix: String,
    pub log_prefix: String,
    /// S3 URI of the JSONPaths file mapping camelCase event keys onto
    /// the snake_case staging columns
    pub log_jsonpath: String,
    pub iam_role: String,
    pub region: String,
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl CopySettings {
    fn uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, join_key(&self.prefix, key))
    }

    /// `COPY` statement for one staging table
    pub fn copy_statement(&self, table: StagingTable, date: Option<NaiveDate>) -> String {
        let (from, format) = match table {
            StagingTable::Songs => (self.uri(&self.song_prefix), "auto".to_string()),
            StagingTable::Events => {
                let key = match date {
                    Some(date) => day_prefix(&self.log_prefix, date),
                    None => self.log_prefix.clone(),
                };
                (self.uri(&key), self.log_jsonpath.clone())
            }
        };
        format!(
            "COPY {} FROM {} IAM_ROLE {} FORMAT AS JSON {} REGION {}",
            table.name(),
            quote(&from),
            quote(&self.iam_role),
            quote(&format),
            quote(&self.region)
        )
    }
}

pub struct RedshiftWarehouse {
    pool: PgPool,
    copy: CopySettings,
}

impl RedshiftWarehouse {
    pub async fn connect(config: &PostgresConfig, copy: CopySettings) -> Result<Self, DataError> {
        let config = PostgresConfig {
            send_statement_timeout: false,
            ..config.clone()
        };
        let pool = connect_pool(&config).await.map_err(|e| match e {
            crate::data::postgres::PostgresError::Database(e) => DataError::from_redshift(e),
            other => other.into(),
        })?;
        tracing::debug!(bucket = %copy.bucket, "Redshift warehouse connected");
        Ok(Self { pool, copy })
    }

    async fn run(&self, table: &'static str, sql: &str) -> Result<u64, WarehouseError> {
        let result = sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| WarehouseError::on(table)(DataError::from_redshift(e)))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Warehouse for RedshiftWarehouse {
    fn target(&self) -> &'static str {
        "redshift"
    }

    fn catalog(&self) -> &dyn TableCatalog {
        self
    }

    async fn create_tables(&self) -> Result<(), WarehouseError> {
        for sql in transforms::create_all(&RedshiftDialect) {
            self.run("schema", &sql).await?;
        }
        Ok(())
    }

    async fn stage(
        &self,
        table: StagingTable,
        date: Option<NaiveDate>,
    ) -> Result<StageOutcome, WarehouseError> {
        let copy = self.copy.copy_statement(table, date);
        let on_table = |e: sqlx::Error| WarehouseError::on(table.name())(DataError::from_redshift(e));

        // pg_last_copy_* are per session, so COPY and the counts share a connection
        let mut conn = self.pool.acquire().await.map_err(on_table)?;
        sqlx::raw_sql(&transforms::delete_staging(table))
            .execute(&mut *conn)
            .await
            .map_err(on_table)?;
        tracing::debug!(table = %table, "Running COPY");
        sqlx::raw_sql(&copy)
            .execute(&mut *conn)
            .await
            .map_err(on_table)?;

        let rows: i64 = sqlx::query_scalar("SELECT pg_last_copy_count()")
            .fetch_one(&mut *conn)
            .await
            .map_err(on_table)?;
        let files: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM stl_load_commits WHERE query = pg_last_copy_id()",
        )
        .fetch_one(&mut *conn)
        .await
        .map_err(on_table)?;

        Ok(StageOutcome {
            rows: rows.max(0) as u64,
            files_read: files.max(0) as usize,
            files_failed: 0,
        })
    }

    async fn load(&self, table: Table, mode: LoadMode) -> Result<u64, WarehouseError> {
        let on_table = |e: sqlx::Error| WarehouseError::on(table.name())(DataError::from_redshift(e));
        let statements = transforms::load_statements(&RedshiftDialect, table, mode);

        let mut tx = self.pool.begin().await.map_err(on_table)?;
        let mut rows = 0;
        for sql in &statements {
            rows = sqlx::raw_sql(sql)
                .execute(&mut *tx)
                .await
                .map_err(on_table)?
                .rows_affected();
        }
        tx.commit().await.map_err(on_table)?;
        Ok(rows)
    }

    async fn close(&self) -> Result<(), WarehouseError> {
        self.pool.close().await;
        Ok(())
    }
}

#[async_trait]
impl TableCatalog for RedshiftWarehouse {
    fn backend(&self) -> &'static str {
        "redshift"
    }

    async fn not_null_columns(&self, table: Table) -> Result<Vec<String>, DataError> {
        sqlx::query_scalar(
            "SELECT column_name::text FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 AND is_nullable = 'NO' \
             ORDER BY ordinal_position",
        )
        .bind(table.name())
        .fetch_all(&self.pool)
        .await
        .map_err(DataError::from_redshift)
    }

    async fn count_rows(&self, table: Table) -> Result<i64, DataError> {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table.ident()))
            .fetch_one(&self.pool)
            .await
            .map_err(DataError::from_redshift)
    }

    async fn count_nulls(&self, table: Table, column: &str) -> Result<i64, DataError> {
        let column = checked_column(table, column)?;
        sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE {} IS NULL",
            table.ident(),
            column
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(DataError::from_redshift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CopySettings {
        CopySettings {
            bucket: "udacity-dend".to_string(),
            prefix: String::new(),
            song_prefix: "song_data".to_string(),
            log_prefix: "log_data".to_string(),
            log_jsonpath: "s3://udacity-dend/log_json_path.json".to_string(),
            iam_role: "arn:aws:iam::123456789012:role/sparkifyRedshiftRole".to_string(),
            region: "us-west-2".to_string(),
        }
    }

    #[test]
    fn test_copy_songs_uses_auto() {
        let sql = settings().copy_statement(StagingTable::Songs, None);
        assert_eq!(
            sql,
            "COPY staging_songs FROM 's3://udacity-dend/song_data' \
             IAM_ROLE 'arn:aws:iam::123456789012:role/sparkifyRedshiftRole' \
             FORMAT AS JSON 'auto' REGION 'us-west-2'"
        );
    }

    #[test]
    fn test_copy_events_for_one_day() {
        let date = NaiveDate::from_ymd_opt(2018, 11, 2).unwrap();
        let sql = settings().copy_statement(StagingTable::Events, Some(date));
        assert!(sql.contains("FROM 's3://udacity-dend/log_data/2018/11/2018-11-02'"));
        assert!(sql.contains("FORMAT AS JSON 's3://udacity-dend/log_json_path.json'"));
    }

    #[test]
    fn test_copy_quotes_config_values() {
        let mut s = settings();
        s.prefix = "team's/raw".to_string();
        let sql = s.copy_statement(StagingTable::Songs, None);
        assert!(sql.contains("'s3://udacity-dend/team''s/raw/song_data'"));
    }
}
