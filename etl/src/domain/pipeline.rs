//! Row-wise load pipeline
//!
//! Visits song files, then log files, in sorted key order and commits one
//! destination transaction per file. Unreadable files are skipped and
//! counted; a failed write aborts the run.

use std::sync::Arc;

use crate::core::shutdown::ShutdownService;
use crate::data::StarRepository;
use crate::data::source::{self, FileKind, SourceReader};

use super::error::PipelineError;
use super::extract::{artist_rows, song_rows, time_rows, user_rows};
use super::facts::pending_songplays;
use super::summary::RunSummary;

pub struct LoadPipeline<'a> {
    repository: &'a dyn StarRepository,
    source: Arc<dyn SourceReader>,
    song_prefix: String,
    log_prefix: String,
    shutdown: ShutdownService,
}

impl<'a> LoadPipeline<'a> {
    pub fn new(
        repository: &'a dyn StarRepository,
        source: Arc<dyn SourceReader>,
        song_prefix: &str,
        log_prefix: &str,
        shutdown: ShutdownService,
    ) -> Self {
        Self {
            repository,
            source,
            song_prefix: song_prefix.to_string(),
            log_prefix: log_prefix.to_string(),
            shutdown,
        }
    }

    /// Load every file. With `truncate`, the star tables are emptied first
    /// so repeated runs produce the same tables.
    pub async fn run(&self, truncate: bool) -> Result<RunSummary, PipelineError> {
        if truncate {
            self.repository.truncate_all().await?;
            tracing::info!("Star tables truncated");
        }

        let mut summary = RunSummary::default();
        self.process(FileKind::Song, &self.song_prefix, &mut summary)
            .await?;
        // Songs must be committed before plays are matched against them
        self.process(FileKind::Log, &self.log_prefix, &mut summary)
            .await?;

        summary.log("load");
        Ok(summary)
    }

    async fn process(
        &self,
        kind: FileKind,
        prefix: &str,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError> {
        let keys = self.source.list(prefix).await?;
        let total = keys.len();
        tracing::info!("{} files found in {}", total, self.source.describe(prefix));

        for (i, key) in keys.iter().enumerate() {
            if self.shutdown.is_triggered() {
                tracing::warn!(processed = i, total, "Stopping before the next file");
                return Err(PipelineError::Interrupted);
            }

            let path = self.source.describe(key);
            let loaded = match kind {
                FileKind::Song => self.load_song_file(key, summary).await,
                FileKind::Log => self.load_log_file(key, summary).await,
            };
            match loaded {
                Ok(true) => summary.files_processed += 1,
                Ok(false) => summary.files_failed += 1,
                Err(e) => {
                    tracing::error!(path = %path, error = %e, "Write failed, aborting run");
                    return Err(e);
                }
            }
            tracing::info!("{}/{} files processed.", i + 1, total);
        }
        Ok(())
    }

    /// `Ok(false)` when the file was skipped as unreadable
    async fn load_song_file(
        &self,
        key: &str,
        summary: &mut RunSummary,
    ) -> Result<bool, PipelineError> {
        let records = match source::read_song_file(self.source.as_ref(), key).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(path = %self.source.describe(key), error = %e, "Skipping unreadable song file");
                return Ok(false);
            }
        };

        let load = self
            .repository
            .load_song_file(&song_rows(&records), &artist_rows(&records))
            .await?;
        summary.add_load(&load);
        Ok(true)
    }

    async fn load_log_file(
        &self,
        key: &str,
        summary: &mut RunSummary,
    ) -> Result<bool, PipelineError> {
        let events = match source::read_log_file(self.source.as_ref(), key).await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!(path = %self.source.describe(key), error = %e, "Skipping unreadable log file");
                return Ok(false);
            }
        };

        let pending = pending_songplays(&events);
        let load = self
            .repository
            .load_log_file(&time_rows(&events), &user_rows(&events).rows, &pending.plays)
            .await?;

        summary.add_load(&load);
        summary.rejected += pending.rejected;
        summary.unmatched += pending.unmatched;
        tracing::debug!(
            path = %self.source.describe(key),
            events = events.len(),
            songplays = load.songplays,
            unmatched = pending.unmatched + load.unmatched as usize,
            "Log file loaded"
        );
        Ok(true)
    }
}
