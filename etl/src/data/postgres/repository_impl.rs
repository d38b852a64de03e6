//! Repository trait implementations for PostgreSQL

use std::sync::Arc;

use async_trait::async_trait;

use crate::data::error::DataError;
use crate::data::traits::{FileLoad, StarRepository, TableCatalog, checked_column};
use crate::data::types::{ArtistRow, PendingSongplay, SongRow, Table, TimeRow, UserRow};

use super::PostgresService;
use super::repositories::star;

#[async_trait]
impl StarRepository for Arc<PostgresService> {
    async fn truncate_all(&self) -> Result<(), DataError> {
        star::truncate_all(self.pool()).await.map_err(Into::into)
    }

    async fn load_song_file(
        &self,
        songs: &[SongRow],
        artists: &[ArtistRow],
    ) -> Result<FileLoad, DataError> {
        star::load_song_file(self.pool(), songs, artists)
            .await
            .map_err(Into::into)
    }

    async fn load_log_file(
        &self,
        time: &[TimeRow],
        users: &[UserRow],
        plays: &[PendingSongplay],
    ) -> Result<FileLoad, DataError> {
        star::load_log_file(self.pool(), time, users, plays)
            .await
            .map_err(Into::into)
    }
}

#[async_trait]
impl TableCatalog for Arc<PostgresService> {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn not_null_columns(&self, table: Table) -> Result<Vec<String>, DataError> {
        star::not_null_columns(self.pool(), table)
            .await
            .map_err(Into::into)
    }

    async fn count_rows(&self, table: Table) -> Result<i64, DataError> {
        star::count_rows(self.pool(), table)
            .await
            .map_err(Into::into)
    }

    async fn count_nulls(&self, table: Table, column: &str) -> Result<i64, DataError> {
        let column = checked_column(table, column)?;
        star::count_nulls(self.pool(), table, &column)
            .await
            .map_err(Into::into)
    }
}
