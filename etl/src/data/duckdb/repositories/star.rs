//! Star schema writes for the in-memory lake database

use duckdb::{Connection, params};

use crate::data::duckdb::sql_types::SqlTimestamp;
use crate::data::duckdb::{DuckdbError, in_transaction};
use crate::data::types::{ArtistRow, SongRow, SongplayRow, Table, TimeRow, UserRow};

/// Run DDL statements in order
pub fn apply_ddl(conn: &Connection, statements: &[String]) -> Result<(), DuckdbError> {
    for sql in statements {
        conn.execute_batch(sql)?;
    }
    Ok(())
}

/// Row-sets of one lake run, already deduplicated and keyed
#[derive(Debug, Clone, Copy)]
pub struct StarRows<'a> {
    pub songs: &'a [SongRow],
    pub artists: &'a [ArtistRow],
    pub users: &'a [UserRow],
    pub time: &'a [TimeRow],
    pub songplays: &'a [(i64, SongplayRow)],
}

/// Append every row-set in one transaction
pub fn append_star(conn: &Connection, rows: StarRows<'_>) -> Result<(), DuckdbError> {
    in_transaction(conn, |conn| {
        let mut appender = conn.appender(Table::Songs.name())?;
        for s in rows.songs {
            appender.append_row(params![
                s.song_id.as_str(),
                s.title.as_str(),
                s.artist_id.as_str(),
                s.year,
                s.duration,
            ])?;
        }
        appender.flush()?;
        drop(appender);

        let mut appender = conn.appender(Table::Artists.name())?;
        for a in rows.artists {
            appender.append_row(params![
                a.artist_id.as_str(),
                a.name.as_str(),
                a.location.as_deref(),
                a.latitude,
                a.longitude,
            ])?;
        }
        appender.flush()?;
        drop(appender);

        let mut appender = conn.appender(Table::Users.name())?;
        for u in rows.users {
            appender.append_row(params![
                u.user_id,
                u.first_name.as_str(),
                u.last_name.as_str(),
                u.gender.as_deref(),
                u.level.as_str(),
                u.recency.0,
                u.recency.1,
                u.recency.2,
            ])?;
        }
        appender.flush()?;
        drop(appender);

        let mut appender = conn.appender(Table::Time.name())?;
        for t in rows.time {
            appender.append_row(params![
                SqlTimestamp(t.start_time),
                t.hour,
                t.day,
                t.week,
                t.month,
                t.year,
                t.weekday,
            ])?;
        }
        appender.flush()?;
        drop(appender);

        let mut appender = conn.appender(Table::Songplays.name())?;
        for (id, p) in rows.songplays {
            appender.append_row(params![
                *id,
                SqlTimestamp(p.start_time),
                p.user_id,
                p.level.as_str(),
                p.song_id.as_deref(),
                p.artist_id.as_deref(),
                p.session_id,
                p.location.as_deref(),
                p.user_agent.as_deref(),
            ])?;
        }
        appender.flush()?;
        Ok(())
    })
}

/// Run a transform statement; returns affected rows
pub fn execute(conn: &Connection, sql: &str) -> Result<u64, DuckdbError> {
    Ok(conn.execute(sql, [])? as u64)
}
