//! Staging loads using the Appender API
//!
//! Replaces the contents of `staging_events` and `staging_songs` with parsed
//! source records. Column order must match `transforms::create_staging_table`.

use duckdb::{Connection, params};

use crate::data::duckdb::{DuckdbError, in_transaction};
use crate::data::sql::transforms::delete_staging;
use crate::data::types::{LogEvent, SongRecord, StagingTable};

/// Replace `staging_events` with `events`; returns rows written
pub fn replace_events(conn: &Connection, events: &[LogEvent]) -> Result<u64, DuckdbError> {
    in_transaction(conn, |conn| {
        conn.execute_batch(&delete_staging(StagingTable::Events))?;
        let mut appender = conn.appender(StagingTable::Events.name())?;
        for e in events {
            // auth, method, registration and status are not carried by LogEvent
            appender.append_row(params![
                e.artist.as_deref(),
                None::<&str>,
                e.first_name.as_deref(),
                e.gender.as_deref(),
                e.item_in_session,
                e.last_name.as_deref(),
                e.length,
                e.level.as_deref(),
                e.location.as_deref(),
                None::<&str>,
                e.page.as_str(),
                None::<f64>,
                e.session_id,
                e.song.as_deref(),
                None::<i32>,
                e.ts,
                e.user_agent.as_deref(),
                e.user_id.map(|id| id.to_string()),
            ])?;
        }
        appender.flush()?;
        Ok(events.len() as u64)
    })
}

/// Replace `staging_songs` with `songs`; returns rows written
pub fn replace_songs(conn: &Connection, songs: &[SongRecord]) -> Result<u64, DuckdbError> {
    in_transaction(conn, |conn| {
        conn.execute_batch(&delete_staging(StagingTable::Songs))?;
        let mut appender = conn.appender(StagingTable::Songs.name())?;
        for s in songs {
            appender.append_row(params![
                s.num_songs,
                s.artist_id.as_str(),
                s.artist_latitude,
                s.artist_longitude,
                s.artist_location.as_deref(),
                s.artist_name.as_str(),
                s.song_id.as_str(),
                s.title.as_str(),
                s.duration,
                s.year,
            ])?;
        }
        appender.flush()?;
        Ok(songs.len() as u64)
    })
}
