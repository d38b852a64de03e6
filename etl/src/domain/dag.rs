//! Warehouse task graph
//!
//! A fixed DAG run in topological waves:
//!
//! ```text
//! create_tables -> {stage_events, stage_songs}
//!               -> {load_users, load_songs, load_artists, load_time}
//!               -> load_songplays -> quality_checks
//! ```
//!
//! Every task of a wave depends on every task of the previous wave. Tasks
//! of one wave run concurrently, each retried with exponential backoff up to
//! the retry budget. A task whose upstream did not succeed is marked
//! `upstream_failed` and never started.

use std::fmt;

use chrono::NaiveDate;
use futures::future::join_all;
use uuid::Uuid;

use crate::core::shutdown::ShutdownService;
use crate::data::sql::LoadMode;
use crate::data::types::{StagingTable, Table};
use crate::data::warehouse::{StageOutcome, Warehouse};
use crate::utils::retry::retry_with_backoff_async;

use super::error::PipelineError;
use super::quality;
use super::summary::RunSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    CreateTables,
    Stage(StagingTable),
    Load(Table),
    QualityChecks,
}

impl Task {
    pub fn name(&self) -> String {
        match self {
            Task::CreateTables => "create_tables".to_string(),
            Task::Stage(t) => format!("stage_{}", t.name().trim_start_matches("staging_")),
            Task::Load(t) => format!("load_{}", t.name()),
            Task::QualityChecks => "quality_checks".to_string(),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Topological waves of the graph
pub const WAVES: &[&[Task]] = &[
    &[Task::CreateTables],
    &[
        Task::Stage(StagingTable::Events),
        Task::Stage(StagingTable::Songs),
    ],
    &[
        Task::Load(Table::Users),
        Task::Load(Table::Songs),
        Task::Load(Table::Artists),
        Task::Load(Table::Time),
    ],
    &[Task::Load(Table::Songplays)],
    &[Task::QualityChecks],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Success,
    Failed,
    UpstreamFailed,
    /// Not started because shutdown was requested
    Skipped,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskState::Success => "success",
            TaskState::Failed => "failed",
            TaskState::UpstreamFailed => "upstream_failed",
            TaskState::Skipped => "skipped",
        })
    }
}

#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub task: Task,
    pub state: TaskState,
    pub attempts: u32,
    pub error: Option<String>,
}

/// Outcome of one graph run
#[derive(Debug, Clone)]
pub struct DagRun {
    pub run_id: Uuid,
    pub tasks: Vec<TaskRecord>,
    pub summary: RunSummary,
    pub interrupted: bool,
}

impl DagRun {
    pub fn state(&self, task: Task) -> Option<TaskState> {
        self.tasks.iter().find(|r| r.task == task).map(|r| r.state)
    }

    pub fn failed_tasks(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|r| r.state == TaskState::Failed)
            .map(|r| r.task.name())
            .collect()
    }

    pub fn into_result(self) -> Result<RunSummary, PipelineError> {
        let failed = self.failed_tasks();
        if !failed.is_empty() {
            return Err(PipelineError::TasksFailed(failed));
        }
        if self.interrupted {
            return Err(PipelineError::Interrupted);
        }
        Ok(self.summary)
    }
}

/// Run options of the warehouse graph
#[derive(Debug, Clone, Copy)]
pub struct DagOptions {
    pub mode: LoadMode,
    pub execution_date: Option<NaiveDate>,
    /// Execution dates before this day stage only that day's events
    pub start_date: Option<NaiveDate>,
    /// Attempts per task
    pub retries: u32,
    pub retry_delay_ms: u64,
}

/// Day whose log files are staged, `None` for the whole log prefix.
///
/// An execution date stages a single day when no start date is configured
/// or when it falls before the start date (backfill).
pub fn stage_date(execution_date: Option<NaiveDate>, start_date: Option<NaiveDate>) -> Option<NaiveDate> {
    let date = execution_date?;
    match start_date {
        Some(start) if date >= start => None,
        _ => Some(date),
    }
}

enum TaskOutput {
    Done,
    Staged(StageOutcome),
    Loaded(u64),
}

pub struct WarehouseDag<'a> {
    warehouse: &'a dyn Warehouse,
    options: DagOptions,
    shutdown: ShutdownService,
}

impl<'a> WarehouseDag<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, options: DagOptions, shutdown: ShutdownService) -> Self {
        Self {
            warehouse,
            options,
            shutdown,
        }
    }

    /// Run the graph and fail if any task failed
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        self.execute().await.into_result()
    }

    /// Run every wave; task failures are recorded, never returned
    pub async fn execute(&self) -> DagRun {
        let run_id = Uuid::new_v4();
        let stage_date = stage_date(self.options.execution_date, self.options.start_date);
        tracing::info!(
            run_id = %run_id,
            warehouse = self.warehouse.target(),
            mode = %self.options.mode,
            execution_date = ?self.options.execution_date,
            stage_date = ?stage_date,
            "Warehouse run started"
        );

        let mut run = DagRun {
            run_id,
            tasks: Vec::new(),
            summary: RunSummary::default(),
            interrupted: false,
        };
        let mut upstream_ok = true;

        for wave in WAVES {
            if !run.interrupted && self.shutdown.is_triggered() {
                tracing::warn!(run_id = %run_id, "Shutdown requested, skipping remaining tasks");
                run.interrupted = true;
            }
            if run.interrupted || !upstream_ok {
                let state = if run.interrupted {
                    TaskState::Skipped
                } else {
                    TaskState::UpstreamFailed
                };
                for task in wave.iter() {
                    tracing::warn!(run_id = %run_id, task = %task, state = %state, "Task not started");
                    run.tasks.push(TaskRecord {
                        task: *task,
                        state,
                        attempts: 0,
                        error: None,
                    });
                }
                continue;
            }

            let results = join_all(wave.iter().map(|task| self.run_with_retry(*task, stage_date))).await;

            for (task, result) in wave.iter().zip(results) {
                let record = match result {
                    Ok((output, attempts)) => {
                        let rows = match output {
                            TaskOutput::Done => None,
                            TaskOutput::Staged(staged) => {
                                run.summary.files_processed += staged.files_read;
                                run.summary.files_failed += staged.files_failed;
                                Some(staged.rows)
                            }
                            TaskOutput::Loaded(rows) => {
                                if let Task::Load(table) = task {
                                    run.summary.add_rows(*table, rows);
                                }
                                Some(rows)
                            }
                        };
                        tracing::info!(run_id = %run_id, task = %task, attempts, rows = ?rows, "Task succeeded");
                        TaskRecord {
                            task: *task,
                            state: TaskState::Success,
                            attempts,
                            error: None,
                        }
                    }
                    Err((e, attempts)) => {
                        tracing::error!(run_id = %run_id, task = %task, attempts, error = %e, "Task failed");
                        upstream_ok = false;
                        TaskRecord {
                            task: *task,
                            state: TaskState::Failed,
                            attempts,
                            error: Some(e.to_string()),
                        }
                    }
                };
                run.tasks.push(record);
            }
        }

        run.summary.log("warehouse");
        tracing::info!(
            run_id = %run_id,
            failed = run.failed_tasks().len(),
            interrupted = run.interrupted,
            "Warehouse run finished"
        );
        run
    }

    async fn run_with_retry(
        &self,
        task: Task,
        stage_date: Option<NaiveDate>,
    ) -> Result<(TaskOutput, u32), (PipelineError, u32)> {
        retry_with_backoff_async(self.options.retries, self.options.retry_delay_ms, |attempt| {
            tracing::debug!(task = %task, attempt, "Task attempt");
            self.run_task(task, stage_date)
        })
        .await
    }

    async fn run_task(&self, task: Task, stage_date: Option<NaiveDate>) -> Result<TaskOutput, PipelineError> {
        match task {
            Task::CreateTables => {
                self.warehouse.create_tables().await?;
                Ok(TaskOutput::Done)
            }
            Task::Stage(table) => {
                let date = match table {
                    StagingTable::Events => stage_date,
                    StagingTable::Songs => None,
                };
                let staged = self.warehouse.stage(table, date).await?;
                Ok(TaskOutput::Staged(staged))
            }
            Task::Load(table) => {
                let rows = self.warehouse.load(table, self.options.mode).await?;
                Ok(TaskOutput::Loaded(rows))
            }
            Task::QualityChecks => {
                quality::enforce(self.warehouse.catalog()).await?;
                Ok(TaskOutput::Done)
            }
        }
    }
}
