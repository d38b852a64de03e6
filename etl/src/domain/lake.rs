//! Bulk pipeline: star schema as partitioned Parquet
//!
//! Reads every source file once, extracts all row-sets in memory, lands them
//! in an in-memory DuckDB star schema, runs the quality gate there and
//! exports each table below `<output>/<table>/`. An `s3://` output is
//! written to a temporary directory and uploaded afterwards.

use std::path::PathBuf;
use std::sync::Arc;

use crate::core::config::LakeCompression;
use crate::core::shutdown::ShutdownService;
use crate::data::DataError;
use crate::data::DuckdbService;
use crate::data::duckdb::repositories::export::{ExportedTable, export_table};
use crate::data::duckdb::repositories::star::{StarRows, append_star, apply_ddl};
use crate::data::publish::{delete_prefix, table_prefix, upload_dir};
use crate::data::source::{self, SourceReader, build_client};
use crate::data::sql::{DuckdbDialect, transforms};
use crate::data::types::Table;
use crate::utils::location::Location;

use super::error::PipelineError;
use super::extract::{artist_rows, song_rows, time_rows, user_rows};
use super::facts::{SongCatalog, assign_songplay_ids, songplay_rows};
use super::quality;
use super::summary::RunSummary;

pub struct LakePipeline {
    source: Arc<dyn SourceReader>,
    song_prefix: String,
    log_prefix: String,
    output: Location,
    compression: LakeCompression,
    region: Option<String>,
    endpoint: Option<String>,
    shutdown: ShutdownService,
}

impl LakePipeline {
    pub fn new(
        source: Arc<dyn SourceReader>,
        song_prefix: &str,
        log_prefix: &str,
        output: Location,
        compression: LakeCompression,
        shutdown: ShutdownService,
    ) -> Self {
        Self {
            source,
            song_prefix: song_prefix.to_string(),
            log_prefix: log_prefix.to_string(),
            output,
            compression,
            region: None,
            endpoint: None,
            shutdown,
        }
    }

    /// Region and endpoint of the S3 client used for an `s3://` output
    pub fn with_s3(mut self, region: Option<String>, endpoint: Option<String>) -> Self {
        self.region = region;
        self.endpoint = endpoint;
        self
    }

    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::default();

        let song_keys = self.source.list(&self.song_prefix).await?;
        tracing::info!("{} files found in {}", song_keys.len(), self.source.describe(&self.song_prefix));
        let songs = source::read_songs(self.source.as_ref(), &song_keys).await;

        let log_keys = self.source.list(&self.log_prefix).await?;
        tracing::info!("{} files found in {}", log_keys.len(), self.source.describe(&self.log_prefix));
        let events = source::read_events(self.source.as_ref(), &log_keys).await;

        summary.files_processed = songs.files_read + events.files_read;
        summary.files_failed = songs.files_failed + events.files_failed;
        if self.shutdown.is_triggered() {
            return Err(PipelineError::Interrupted);
        }

        let song_table = song_rows(&songs.records);
        let artist_table = artist_rows(&songs.records);
        let user_table = user_rows(&events.records).rows;
        let time_table = time_rows(&events.records);
        let facts = songplay_rows(&events.records, &SongCatalog::from_records(&songs.records));
        let songplay_table = assign_songplay_ids(facts.rows, 0);

        summary.rejected = facts.rejected;
        summary.unmatched = facts.unmatched;
        summary.add_rows(Table::Songs, song_table.len() as u64);
        summary.add_rows(Table::Artists, artist_table.len() as u64);
        summary.add_rows(Table::Users, user_table.len() as u64);
        summary.add_rows(Table::Time, time_table.len() as u64);
        summary.add_rows(Table::Songplays, songplay_table.len() as u64);

        let db = Arc::new(DuckdbService::open(None).await.map_err(DataError::from)?);
        let ddl: Vec<String> = Table::STAR
            .iter()
            .map(|t| transforms::create_star_table(&DuckdbDialect, *t))
            .collect();
        db.with_conn(move |conn| {
            apply_ddl(conn, &ddl)?;
            append_star(
                conn,
                StarRows {
                    songs: &song_table,
                    artists: &artist_table,
                    users: &user_table,
                    time: &time_table,
                    songplays: &songplay_table,
                },
            )
        })
        .await
        .map_err(DataError::from)?;

        quality::enforce(&db).await?;

        if self.shutdown.is_triggered() {
            return Err(PipelineError::Interrupted);
        }

        match &self.output {
            Location::Local(root) => {
                self.export(&db, root.clone()).await?;
            }
            Location::S3 { bucket, prefix } => {
                let staging = tempfile::tempdir().map_err(DataError::from)?;
                self.export(&db, staging.path().to_path_buf()).await?;
                let client = build_client(self.region.as_deref(), self.endpoint.as_deref()).await;
                for table in Table::STAR {
                    delete_prefix(&client, bucket, &table_prefix(prefix, table)).await?;
                }
                let objects = upload_dir(&client, bucket, prefix, staging.path()).await?;
                tracing::info!(objects, output = %self.output, "Lake uploaded");
            }
        }

        db.close().await.map_err(DataError::from)?;
        summary.log("lake");
        Ok(summary)
    }

    /// Export every table below `root`. A failed table does not stop the
    /// others; the run fails afterwards.
    async fn export(&self, db: &Arc<DuckdbService>, root: PathBuf) -> Result<(), PipelineError> {
        let codec = self.compression.as_str();
        let results = db
            .with_conn(move |conn| {
                Ok(Table::STAR
                    .iter()
                    .map(|t| (*t, export_table(conn, *t, &root, codec)))
                    .collect::<Vec<_>>())
            })
            .await
            .map_err(DataError::from)?;

        let mut failed = Vec::new();
        for (table, result) in results {
            match result {
                Ok(ExportedTable { rows, dir, .. }) => {
                    tracing::info!(table = %table, rows, dir = %dir.display(), "Table exported");
                }
                Err(e) => {
                    tracing::error!(table = %table, error = %e, "Table export failed");
                    failed.push(format!("export_{}", table));
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::TasksFailed(failed))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::data::source::LocalSource;
    use crate::domain::fixtures::{kids_play, kids_song, song, write_source_tree};

    fn pipeline(root: &Path, output: &Path) -> LakePipeline {
        LakePipeline::new(
            Arc::new(LocalSource::new(root.to_path_buf())),
            "song_data",
            "log_data",
            Location::Local(output.to_path_buf()),
            LakeCompression::Snappy,
            ShutdownService::new(),
        )
    }

    #[tokio::test]
    async fn test_lake_export_kids_scenario() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_source_tree(
            input.path(),
            &[kids_song(), song("SO2", "AR2", "Other", "Air", 100.0)],
            &[("2018-11-02-events.json", vec![kids_play(1541121934796)])],
        );

        let summary = pipeline(input.path(), output.path()).run().await.unwrap();

        assert_eq!(summary.files_processed, 3);
        assert_eq!(summary.rows(Table::Songplays), 1);
        assert_eq!(summary.rows(Table::Songs), 2);
        assert!(output.path().join("users/data_0.parquet").is_file());
        assert!(output.path().join("artists/data_0.parquet").is_file());
        assert!(
            output
                .path()
                .join("songs/year=1996/artist_id=ARNF6401187FB57032")
                .is_dir()
        );
        assert!(output.path().join("time/year=2018/month=11").is_dir());

        let db = Arc::new(DuckdbService::open(None).await.unwrap());
        let glob = output.path().join("songplays/**/*.parquet");
        let sql = format!(
            "SELECT songplay_id, song_id, month FROM read_parquet('{}', hive_partitioning = true)",
            glob.display()
        );
        let row: (i64, String, i64) = db
            .with_conn(move |conn| Ok(conn.query_row(&sql, [], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?))
            .await
            .unwrap();
        assert_eq!(row, (1, "SOSXLTC12AF72A7F54".to_string(), 11));
    }

    #[tokio::test]
    async fn test_quality_gate_blocks_export() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        // no catalog match, so songplays stays empty
        let mut play = kids_play(1541121934796);
        play.song = Some("Unknown".to_string());
        write_source_tree(
            input.path(),
            &[kids_song()],
            &[("2018-11-02-events.json", vec![play])],
        );

        let err = pipeline(input.path(), output.path()).run().await.unwrap_err();

        let PipelineError::Quality(report) = err else {
            panic!("expected a quality failure");
        };
        assert!(report.to_string().contains("songplays has no rows"));
        assert!(!output.path().join("songs").exists());
    }
}
