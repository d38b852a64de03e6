//! DuckDB warehouse
//!
//! Staging reads the source tree through a `SourceReader` and appends the
//! parsed records; transforms run as plain SQL inside DuckDB.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::data::duckdb::DuckdbService;
use crate::data::duckdb::in_transaction;
use crate::data::duckdb::repositories::{staging, star};
use crate::data::error::DataError;
use crate::data::source::{self, SourceReader};
use crate::data::sql::{DuckdbDialect, LoadMode, transforms};
use crate::data::traits::TableCatalog;
use crate::data::types::{StagingTable, Table};

use super::{StageOutcome, Warehouse, WarehouseError};

pub struct DuckdbWarehouse {
    db: Arc<DuckdbService>,
    source: Arc<dyn SourceReader>,
    song_prefix: String,
    log_prefix: String,
}

impl DuckdbWarehouse {
    /// Open (or create) the warehouse database file
    pub async fn open(
        path: &Path,
        source: Arc<dyn SourceReader>,
        song_prefix: &str,
        log_prefix: &str,
    ) -> Result<Self, DataError> {
        let db = Arc::new(DuckdbService::open(Some(path)).await?);
        Ok(Self::new(db, source, song_prefix, log_prefix))
    }

    pub fn new(
        db: Arc<DuckdbService>,
        source: Arc<dyn SourceReader>,
        song_prefix: &str,
        log_prefix: &str,
    ) -> Self {
        Self {
            db,
            source,
            song_prefix: song_prefix.to_string(),
            log_prefix: log_prefix.to_string(),
        }
    }

    async fn list(&self, prefix: &str, table: StagingTable) -> Result<Vec<String>, WarehouseError> {
        self.source
            .list(prefix)
            .await
            .map_err(|e| WarehouseError::on(table.name())(e.into()))
    }
}

#[async_trait]
impl Warehouse for DuckdbWarehouse {
    fn target(&self) -> &'static str {
        "duckdb"
    }

    fn catalog(&self) -> &dyn TableCatalog {
        &self.db
    }

    async fn create_tables(&self) -> Result<(), WarehouseError> {
        let statements = transforms::create_all(&DuckdbDialect);
        self.db
            .with_conn(move |conn| star::apply_ddl(conn, &statements))
            .await
            .map_err(DataError::from)?;
        Ok(())
    }

    async fn stage(
        &self,
        table: StagingTable,
        date: Option<NaiveDate>,
    ) -> Result<StageOutcome, WarehouseError> {
        let outcome = match table {
            StagingTable::Songs => {
                let keys = self.list(&self.song_prefix, table).await?;
                let batch = source::read_songs(self.source.as_ref(), &keys).await;
                let records = batch.records;
                let rows = self
                    .db
                    .with_conn(move |conn| staging::replace_songs(conn, &records))
                    .await
                    .map_err(|e| WarehouseError::on(table.name())(e.into()))?;
                StageOutcome {
                    rows,
                    files_read: batch.files_read,
                    files_failed: batch.files_failed,
                }
            }
            StagingTable::Events => {
                let mut keys = self.list(&self.log_prefix, table).await?;
                if let Some(date) = date {
                    keys = source::keys_for_date(&keys, date);
                    tracing::info!(%date, files = keys.len(), "Staging a single day of events");
                }
                let batch = source::read_events(self.source.as_ref(), &keys).await;
                let records = batch.records;
                let rows = self
                    .db
                    .with_conn(move |conn| staging::replace_events(conn, &records))
                    .await
                    .map_err(|e| WarehouseError::on(table.name())(e.into()))?;
                StageOutcome {
                    rows,
                    files_read: batch.files_read,
                    files_failed: batch.files_failed,
                }
            }
        };
        Ok(outcome)
    }

    async fn load(&self, table: Table, mode: LoadMode) -> Result<u64, WarehouseError> {
        let statements = transforms::load_statements(&DuckdbDialect, table, mode);
        self.db
            .with_conn(move |conn| {
                in_transaction(conn, |conn| {
                    let mut rows = 0;
                    for sql in &statements {
                        rows = star::execute(conn, sql)?;
                    }
                    Ok(rows)
                })
            })
            .await
            .map_err(|e| WarehouseError::on(table.name())(e.into()))
    }

    async fn close(&self) -> Result<(), WarehouseError> {
        self.db.checkpoint().await.map_err(DataError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::source::LocalSource;
    use crate::domain::extract::time_row;
    use crate::domain::fixtures::{kids_play, kids_song, play, song, write_source_tree};

    async fn setup(root: &Path) -> DuckdbWarehouse {
        let db = Arc::new(DuckdbService::open(None).await.unwrap());
        let source: Arc<dyn SourceReader> = Arc::new(LocalSource::new(root.to_path_buf()));
        let warehouse = DuckdbWarehouse::new(db, source, "song_data", "log_data");
        warehouse.create_tables().await.unwrap();
        warehouse
    }

    async fn load_all(warehouse: &DuckdbWarehouse, mode: LoadMode) {
        for table in Table::STAR {
            warehouse.load(table, mode).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_stage_and_load_kids_scenario() {
        let dir = tempfile::tempdir().unwrap();
        write_source_tree(
            dir.path(),
            &[kids_song(), song("SO2", "AR2", "Other", "Air", 100.0)],
            &[("2018-11-02-events.json", vec![kids_play(1541121934796)])],
        );
        let warehouse = setup(dir.path()).await;

        let songs = warehouse.stage(StagingTable::Songs, None).await.unwrap();
        assert_eq!(songs.rows, 2);
        assert_eq!(songs.files_read, 2);
        let events = warehouse.stage(StagingTable::Events, None).await.unwrap();
        assert_eq!(events.rows, 1);

        load_all(&warehouse, LoadMode::Replace).await;

        let catalog = warehouse.catalog();
        assert_eq!(catalog.count_rows(Table::Songplays).await.unwrap(), 1);
        assert_eq!(catalog.count_rows(Table::Songs).await.unwrap(), 2);
        assert_eq!(catalog.count_rows(Table::Users).await.unwrap(), 1);

        let (id, song_id, start): (i64, String, String) = warehouse
            .db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT songplay_id, song_id, strftime(start_time, '%Y-%m-%dT%H:%M:%S.%g') FROM songplays",
                    [],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(id, 1);
        assert_eq!(song_id, "SOSXLTC12AF72A7F54");
        assert_eq!(start, "2018-11-02T01:25:34.796");
    }

    #[tokio::test]
    async fn test_replace_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_source_tree(
            dir.path(),
            &[kids_song()],
            &[(
                "2018-11-02-events.json",
                vec![kids_play(1541121934796), play(1541121999000, Some(11), "paid")],
            )],
        );
        let warehouse = setup(dir.path()).await;
        warehouse.stage(StagingTable::Songs, None).await.unwrap();
        warehouse.stage(StagingTable::Events, None).await.unwrap();

        load_all(&warehouse, LoadMode::Replace).await;
        load_all(&warehouse, LoadMode::Replace).await;

        let catalog = warehouse.catalog();
        assert_eq!(catalog.count_rows(Table::Songplays).await.unwrap(), 2);
        assert_eq!(catalog.count_rows(Table::Time).await.unwrap(), 2);
        assert_eq!(catalog.count_rows(Table::Users).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_append_by_execution_date() {
        let dir = tempfile::tempdir().unwrap();
        let mut second = kids_play(1541203200000);
        second.session_id = 400;
        write_source_tree(
            dir.path(),
            &[kids_song()],
            &[
                ("2018-11-02-events.json", vec![kids_play(1541121934796)]),
                ("2018-11-03-events.json", vec![second]),
            ],
        );
        let warehouse = setup(dir.path()).await;
        warehouse.stage(StagingTable::Songs, None).await.unwrap();

        let day_one = NaiveDate::from_ymd_opt(2018, 11, 2).unwrap();
        let day_two = NaiveDate::from_ymd_opt(2018, 11, 3).unwrap();
        for date in [day_one, day_two, day_two] {
            let staged = warehouse.stage(StagingTable::Events, Some(date)).await.unwrap();
            assert_eq!(staged.files_read, 1);
            load_all(&warehouse, LoadMode::Append).await;
        }

        let ids: Vec<i64> = warehouse
            .db
            .with_conn(|conn| {
                let mut stmt = conn.prepare("SELECT songplay_id FROM songplays ORDER BY songplay_id")?;
                let ids = stmt
                    .query_map([], |r| r.get(0))?
                    .collect::<Result<Vec<i64>, _>>()?;
                Ok(ids)
            })
            .await
            .unwrap();
        assert_eq!(ids, vec![1, 2]);
        let catalog = warehouse.catalog();
        assert_eq!(catalog.count_rows(Table::Songs).await.unwrap(), 1);
        assert_eq!(catalog.count_rows(Table::Time).await.unwrap(), 2);
    }

    async fn user_level(warehouse: &DuckdbWarehouse, user_id: i64) -> String {
        warehouse
            .db
            .with_conn(move |conn| {
                Ok(conn.query_row(
                    "SELECT level FROM users WHERE user_id = ?",
                    [user_id],
                    |r| r.get(0),
                )?)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_time_decomposition_matches_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let sunday = 1541289600000;
        let monday = 1541376000000;
        write_source_tree(
            dir.path(),
            &[kids_song()],
            &[
                ("2018-11-04-events.json", vec![kids_play(sunday)]),
                ("2018-11-05-events.json", vec![kids_play(monday)]),
            ],
        );
        let warehouse = setup(dir.path()).await;
        warehouse.stage(StagingTable::Songs, None).await.unwrap();
        warehouse.stage(StagingTable::Events, None).await.unwrap();
        load_all(&warehouse, LoadMode::Replace).await;

        let rows: Vec<(i64, i32, i32, i32, i32, i32, i32)> = warehouse
            .db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT epoch_ms(start_time), hour, day, week, month, year, weekday \
                     FROM \"time\" ORDER BY start_time",
                )?;
                let rows = stmt
                    .query_map([], |r| {
                        Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?, r.get(6)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .unwrap();

        let expected: Vec<_> = [sunday, monday]
            .into_iter()
            .map(|ts| {
                let t = time_row(ts).unwrap();
                (ts, t.hour, t.day, t.week, t.month, t.year, t.weekday)
            })
            .collect();
        assert_eq!(rows, expected);
        assert_eq!(rows.iter().map(|r| r.6).collect::<Vec<_>>(), vec![6, 0]);
        assert_eq!(rows.iter().map(|r| r.3).collect::<Vec<_>>(), vec![44, 45]);
    }

    #[tokio::test]
    async fn test_replace_keeps_latest_user_event() {
        let dir = tempfile::tempdir().unwrap();
        let mut later = play(1541121999000, Some(10), "paid");
        later.item_in_session = 1;
        write_source_tree(
            dir.path(),
            &[kids_song()],
            &[("2018-11-02-events.json", vec![later, kids_play(1541121934796)])],
        );
        let warehouse = setup(dir.path()).await;
        warehouse.stage(StagingTable::Events, None).await.unwrap();
        warehouse.load(Table::Users, LoadMode::Replace).await.unwrap();

        assert_eq!(user_level(&warehouse, 10).await, "paid");
    }

    #[tokio::test]
    async fn test_append_refreshes_user_level() {
        let dir = tempfile::tempdir().unwrap();
        let mut paid = play(1541203200000, Some(10), "paid");
        paid.session_id = 400;
        write_source_tree(
            dir.path(),
            &[kids_song()],
            &[
                ("2018-11-02-events.json", vec![kids_play(1541121934796)]),
                ("2018-11-03-events.json", vec![paid]),
            ],
        );
        let warehouse = setup(dir.path()).await;
        let day_one = NaiveDate::from_ymd_opt(2018, 11, 2).unwrap();
        let day_two = NaiveDate::from_ymd_opt(2018, 11, 3).unwrap();

        warehouse.stage(StagingTable::Events, Some(day_one)).await.unwrap();
        assert_eq!(warehouse.load(Table::Users, LoadMode::Append).await.unwrap(), 1);
        assert_eq!(user_level(&warehouse, 10).await, "free");

        warehouse.stage(StagingTable::Events, Some(day_two)).await.unwrap();
        assert_eq!(warehouse.load(Table::Users, LoadMode::Append).await.unwrap(), 1);
        assert_eq!(user_level(&warehouse, 10).await, "paid");

        // backfilling an older day leaves the newer state in place
        warehouse.stage(StagingTable::Events, Some(day_one)).await.unwrap();
        assert_eq!(warehouse.load(Table::Users, LoadMode::Append).await.unwrap(), 0);
        assert_eq!(user_level(&warehouse, 10).await, "paid");
        assert_eq!(warehouse.catalog().count_rows(Table::Users).await.unwrap(), 1);
    }
}
