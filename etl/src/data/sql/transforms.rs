//! Warehouse DDL and staging-to-star transforms
//!
//! Every statement is built from the fixed table catalog; no row data is
//! ever part of the SQL text. Transforms apply the same rules as the
//! in-memory extractors:
//! - only `NextSong` events count
//! - events without a user id, name or level never reach `users` or `songplays`
//! - a play matches the catalog song with the same title and artist name whose
//!   duration is closest to the event length, within the tolerance, smallest
//!   `song_id` on ties
//! - `songplay_id` follows `(start_time, session_id, item_in_session, user_id, song_id)`

use crate::core::constants::{DURATION_TOLERANCE_SECS, NEXT_SONG_PAGE};
use crate::data::types::{StagingTable, Table};

use super::{LoadMode, SqlDialect};

/// Column name, type and nullability in schema order
fn star_columns(d: &dyn SqlDialect, table: Table) -> Vec<(&'static str, &'static str, bool)> {
    let text = d.text_type();
    let double = d.double_type();
    match table {
        Table::Songplays => vec![
            ("songplay_id", "BIGINT", true),
            ("start_time", "TIMESTAMP", true),
            ("user_id", "BIGINT", true),
            ("level", text, true),
            ("song_id", text, false),
            ("artist_id", text, false),
            ("session_id", "BIGINT", true),
            ("location", text, false),
            ("user_agent", text, false),
        ],
        Table::Users => vec![
            ("user_id", "BIGINT", true),
            ("first_name", text, true),
            ("last_name", text, true),
            ("gender", text, false),
            ("level", text, true),
            ("last_ts", "BIGINT", false),
            ("last_session_id", "BIGINT", false),
            ("last_item_in_session", "BIGINT", false),
        ],
        Table::Songs => vec![
            ("song_id", text, true),
            ("title", text, true),
            ("artist_id", text, true),
            ("year", "INTEGER", true),
            ("duration", double, true),
        ],
        Table::Artists => vec![
            ("artist_id", text, true),
            ("name", text, true),
            ("location", text, false),
            ("latitude", double, false),
            ("longitude", double, false),
        ],
        Table::Time => vec![
            ("start_time", "TIMESTAMP", true),
            ("hour", "INTEGER", true),
            ("day", "INTEGER", true),
            ("week", "INTEGER", true),
            ("month", "INTEGER", true),
            ("year", "INTEGER", true),
            ("weekday", "INTEGER", true),
        ],
    }
}

fn staging_columns(d: &dyn SqlDialect, table: StagingTable) -> Vec<(&'static str, &'static str)> {
    let text = d.text_type();
    let double = d.double_type();
    match table {
        // Order matches the JSONPaths file used by Redshift COPY
        StagingTable::Events => vec![
            ("artist", text),
            ("auth", text),
            ("first_name", text),
            ("gender", text),
            ("item_in_session", "BIGINT"),
            ("last_name", text),
            ("length", double),
            ("level", text),
            ("location", text),
            ("method", text),
            ("page", text),
            ("registration", double),
            ("session_id", "BIGINT"),
            ("song", text),
            ("status", "INTEGER"),
            ("ts", "BIGINT"),
            ("user_agent", text),
            ("user_id", text),
        ],
        StagingTable::Songs => vec![
            ("num_songs", "BIGINT"),
            ("artist_id", text),
            ("artist_latitude", double),
            ("artist_longitude", double),
            ("artist_location", text),
            ("artist_name", text),
            ("song_id", text),
            ("title", text),
            ("duration", double),
            ("year", "INTEGER"),
        ],
    }
}

pub fn create_star_table(d: &dyn SqlDialect, table: Table) -> String {
    let columns: Vec<String> = star_columns(d, table)
        .into_iter()
        .map(|(name, ty, not_null)| {
            if not_null {
                format!("{} {} NOT NULL", name, ty)
            } else {
                format!("{} {}", name, ty)
            }
        })
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({}){}",
        table.ident(),
        columns.join(", "),
        d.table_layout(table)
    )
}

pub fn create_staging_table(d: &dyn SqlDialect, table: StagingTable) -> String {
    let columns: Vec<String> = staging_columns(d, table)
        .into_iter()
        .map(|(name, ty)| format!("{} {}", name, ty))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table.name(),
        columns.join(", ")
    )
}

/// Every table of the warehouse, staging first
pub fn create_all(d: &dyn SqlDialect) -> Vec<String> {
    StagingTable::ALL
        .iter()
        .map(|t| create_staging_table(d, *t))
        .chain(Table::STAR.iter().map(|t| create_star_table(d, *t)))
        .collect()
}

pub fn delete_all(table: Table) -> String {
    format!("DELETE FROM {}", table.ident())
}

pub fn delete_staging(table: StagingTable) -> String {
    format!("DELETE FROM {}", table.name())
}

/// Predicate shared by `users` and `songplays`: a play with a complete user.
/// `p` qualifies the staging columns (`""` or `"e."`).
fn valid_play(p: &str) -> String {
    format!(
        "{p}page = '{page}' \
        AND NULLIF({p}user_id, '') IS NOT NULL \
        AND {p}first_name IS NOT NULL \
        AND {p}last_name IS NOT NULL \
        AND {p}level IS NOT NULL \
        AND {p}ts IS NOT NULL",
        p = p,
        page = NEXT_SONG_PAGE
    )
}

/// The `SELECT` producing the rows of `table` from the staging tables,
/// aliased as `src` with the table's columns in schema order, then its
/// recency columns
fn source_select(d: &dyn SqlDialect, table: Table) -> String {
    match table {
        Table::Users => format!(
            "SELECT user_id, first_name, last_name, gender, level, \
                last_ts, last_session_id, last_item_in_session FROM (\
                SELECT CAST(NULLIF(user_id, '') AS BIGINT) AS user_id, first_name, last_name, gender, level, \
                ts AS last_ts, session_id AS last_session_id, item_in_session AS last_item_in_session, \
                ROW_NUMBER() OVER (PARTITION BY CAST(NULLIF(user_id, '') AS BIGINT) \
                    ORDER BY ts DESC, session_id DESC, item_in_session DESC) AS rn \
                FROM staging_events WHERE {valid}\
            ) ranked WHERE rn = 1",
            valid = valid_play("")
        ),
        Table::Songs => "SELECT song_id, title, artist_id, year, duration FROM (\
                SELECT song_id, title, artist_id, COALESCE(year, 0) AS year, duration, \
                ROW_NUMBER() OVER (PARTITION BY song_id ORDER BY artist_id, title, duration) AS rn \
                FROM staging_songs \
                WHERE song_id IS NOT NULL AND title IS NOT NULL AND artist_id IS NOT NULL AND duration IS NOT NULL\
            ) ranked WHERE rn = 1"
            .to_string(),
        Table::Artists => "SELECT artist_id, name, location, latitude, longitude FROM (\
                SELECT artist_id, artist_name AS name, NULLIF(artist_location, '') AS location, \
                artist_latitude AS latitude, artist_longitude AS longitude, \
                ROW_NUMBER() OVER (PARTITION BY artist_id ORDER BY song_id) AS rn \
                FROM staging_songs WHERE artist_id IS NOT NULL AND artist_name IS NOT NULL\
            ) ranked WHERE rn = 1"
            .to_string(),
        Table::Time => {
            let st = "start_time";
            format!(
                "SELECT {st}, \
                    CAST(EXTRACT(hour FROM {st}) AS INTEGER) AS hour, \
                    CAST(EXTRACT(day FROM {st}) AS INTEGER) AS day, \
                    {week} AS week, \
                    CAST(EXTRACT(month FROM {st}) AS INTEGER) AS month, \
                    CAST(EXTRACT(year FROM {st}) AS INTEGER) AS year, \
                    {weekday} AS weekday \
                FROM (SELECT DISTINCT {ts} AS {st} FROM staging_events \
                    WHERE page = '{page}' AND ts IS NOT NULL) stamps",
                st = st,
                week = d.iso_week(st),
                weekday = d.weekday(st),
                ts = d.epoch_ms_to_timestamp("ts"),
                page = NEXT_SONG_PAGE,
            )
        }
        Table::Songplays => format!(
            "SELECT start_time, user_id, level, song_id, artist_id, session_id, item_in_session, location, user_agent FROM (\
                SELECT {ts} AS start_time, CAST(NULLIF(e.user_id, '') AS BIGINT) AS user_id, e.level, \
                s.song_id, s.artist_id, e.session_id, e.item_in_session, e.location, e.user_agent, \
                ROW_NUMBER() OVER (\
                    PARTITION BY e.ts, e.session_id, e.item_in_session, e.user_id \
                    ORDER BY ABS(s.duration - e.length), s.song_id) AS rn \
                FROM staging_events e \
                JOIN staging_songs s \
                    ON e.song = s.title AND e.artist = s.artist_name \
                    AND ABS(s.duration - e.length) <= {tolerance} \
                WHERE {valid}\
            ) matched WHERE rn = 1",
            ts = d.epoch_ms_to_timestamp("e.ts"),
            tolerance = DURATION_TOLERANCE_SECS,
            valid = valid_play("e."),
        ),
    }
}

fn not_present(table: Table) -> String {
    let conditions: Vec<String> = table
        .natural_key()
        .iter()
        .map(|k| format!("t.{k} = src.{k}"))
        .collect();
    format!(
        "NOT EXISTS (SELECT 1 FROM {} t WHERE {})",
        table.ident(),
        conditions.join(" AND ")
    )
}

/// Staged `users` whose latest event is at least as recent as the stored
/// row's. A stored row without recency counts as older.
fn staged_users_newer(d: &dyn SqlDialect) -> String {
    format!(
        "SELECT src.user_id FROM ({source}) src JOIN {users} t ON t.user_id = src.user_id \
         WHERE t.last_ts IS NULL \
            OR src.last_ts > t.last_ts \
            OR (src.last_ts = t.last_ts AND (src.last_session_id > t.last_session_id \
                OR (src.last_session_id = t.last_session_id \
                    AND src.last_item_in_session >= t.last_item_in_session)))",
        source = source_select(d, Table::Users),
        users = Table::Users.ident(),
    )
}

/// `INSERT ... SELECT` filling `table` from the staging tables.
///
/// Append mode skips rows whose natural key is already present; songplay
/// ids then continue from the current maximum.
pub fn insert_select(d: &dyn SqlDialect, table: Table, mode: LoadMode) -> String {
    let columns = table
        .columns()
        .iter()
        .chain(table.recency_columns())
        .copied()
        .collect::<Vec<_>>()
        .join(", ");
    let source = source_select(d, table);
    let filter = match mode {
        LoadMode::Replace => String::new(),
        LoadMode::Append => format!(" WHERE {}", not_present(table)),
    };

    if table != Table::Songplays {
        return format!(
            "INSERT INTO {} ({}) SELECT {} FROM ({}) src{}",
            table.ident(),
            columns,
            columns,
            source,
            filter
        );
    }

    let offset = match mode {
        LoadMode::Replace => "0".to_string(),
        LoadMode::Append => format!(
            "(SELECT COALESCE(MAX(songplay_id), 0) FROM {})",
            table.ident()
        ),
    };
    format!(
        "INSERT INTO {ident} ({columns}) \
         SELECT {offset} + ROW_NUMBER() OVER (\
            ORDER BY src.start_time, src.session_id, src.item_in_session, src.user_id, src.song_id), \
            src.start_time, src.user_id, src.level, src.song_id, src.artist_id, \
            src.session_id, src.location, src.user_agent \
         FROM ({source}) src{filter}",
        ident = table.ident(),
        columns = columns,
        offset = offset,
        source = source,
        filter = filter,
    )
}

/// Statements of one star-table load, run in order in one transaction.
/// The last one is the insert whose row count is reported.
///
/// - replace: empty the table, then insert everything staged
/// - append: insert rows whose natural key is new. Staged users with a more
///   recent event are deleted first so their insert refreshes `level`.
pub fn load_statements(d: &dyn SqlDialect, table: Table, mode: LoadMode) -> Vec<String> {
    let insert = insert_select(d, table, mode);
    match (mode, table) {
        (LoadMode::Replace, _) => vec![delete_all(table), insert],
        (LoadMode::Append, Table::Users) => vec![
            format!(
                "DELETE FROM {} WHERE user_id IN ({})",
                table.ident(),
                staged_users_newer(d)
            ),
            insert,
        ],
        (LoadMode::Append, _) => vec![insert],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sql::{DuckdbDialect, RedshiftDialect};

    #[test]
    fn test_create_star_table_marks_not_null() {
        let sql = create_star_table(&DuckdbDialect, Table::Songplays);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"songplays\" ("));
        assert!(sql.contains("songplay_id BIGINT NOT NULL"));
        assert!(sql.contains("song_id VARCHAR,"));

        let redshift = create_star_table(&RedshiftDialect, Table::Time);
        assert!(redshift.ends_with(") DISTSTYLE ALL SORTKEY(start_time)"));
    }

    #[test]
    fn test_create_all_stages_first() {
        let statements = create_all(&DuckdbDialect);
        assert_eq!(statements.len(), 7);
        assert!(statements[0].contains("staging_events"));
        assert!(statements[1].contains("staging_songs"));
    }

    #[test]
    fn test_append_filters_on_natural_key() {
        let sql = insert_select(&DuckdbDialect, Table::Songplays, LoadMode::Append);
        assert!(sql.contains(
            "NOT EXISTS (SELECT 1 FROM \"songplays\" t WHERE t.start_time = src.start_time AND t.user_id = src.user_id AND t.session_id = src.session_id)"
        ));
        assert!(sql.contains("COALESCE(MAX(songplay_id), 0)"));

        let replace = insert_select(&DuckdbDialect, Table::Users, LoadMode::Replace);
        assert!(!replace.contains("NOT EXISTS"));
    }

    #[test]
    fn test_load_statements_per_mode() {
        let replace = load_statements(&DuckdbDialect, Table::Time, LoadMode::Replace);
        assert_eq!(replace.len(), 2);
        assert_eq!(replace[0], "DELETE FROM \"time\"");

        let append = load_statements(&DuckdbDialect, Table::Time, LoadMode::Append);
        assert_eq!(append.len(), 1);
        assert!(append[0].starts_with("INSERT INTO \"time\""));

        let users = load_statements(&RedshiftDialect, Table::Users, LoadMode::Append);
        assert_eq!(users.len(), 2);
        assert!(users[0].starts_with("DELETE FROM \"users\" WHERE user_id IN (SELECT src.user_id"));
        assert!(users[0].contains("src.last_ts > t.last_ts"));
        assert!(users[1].contains("last_ts, last_session_id, last_item_in_session"));
    }

    #[test]
    fn test_songplays_qualifies_event_columns() {
        let sql = insert_select(&RedshiftDialect, Table::Songplays, LoadMode::Replace);
        assert!(sql.contains("e.page = 'NextSong'"));
        assert!(sql.contains("NULLIF(e.user_id, '') IS NOT NULL"));
        assert!(sql.contains("e.level IS NOT NULL"));
        assert!(sql.contains("e.ts IS NOT NULL"));
        assert!(sql.contains("<= 0.01"));
    }
}
