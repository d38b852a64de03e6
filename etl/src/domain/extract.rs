//! Dimension extraction
//!
//! Pure projections from source records to dimension rows. Every output is
//! sorted by primary key so repeated runs over the same input produce the
//! same rows in the same order.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::data::types::{ArtistRow, LogEvent, SongRecord, SongRow, TimeRow, UserRow};

/// Convert epoch milliseconds to a UTC instant
pub fn timestamp_from_millis(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ts)
}

/// `songs` rows, one per `song_id` (first record in input order wins)
pub fn song_rows(records: &[SongRecord]) -> Vec<SongRow> {
    let mut rows: BTreeMap<&str, SongRow> = BTreeMap::new();
    for r in records {
        rows.entry(r.song_id.as_str()).or_insert_with(|| SongRow {
            song_id: r.song_id.clone(),
            title: r.title.clone(),
            artist_id: r.artist_id.clone(),
            year: r.year,
            duration: r.duration,
            artist_name: r.artist_name.clone(),
        });
    }
    rows.into_values().collect()
}

/// `artists` rows, one per `artist_id` (first record in input order wins)
pub fn artist_rows(records: &[SongRecord]) -> Vec<ArtistRow> {
    let mut rows: BTreeMap<&str, ArtistRow> = BTreeMap::new();
    for r in records {
        rows.entry(r.artist_id.as_str()).or_insert_with(|| ArtistRow {
            artist_id: r.artist_id.clone(),
            name: r.artist_name.clone(),
            location: r.artist_location.clone(),
            latitude: r.artist_latitude,
            longitude: r.artist_longitude,
        });
    }
    rows.into_values().collect()
}

/// Decompose one event timestamp into calendar fields
pub fn time_row(ts: i64) -> Option<TimeRow> {
    let start_time = timestamp_from_millis(ts)?;
    Some(TimeRow {
        start_time,
        hour: start_time.hour() as i32,
        day: start_time.day() as i32,
        week: start_time.iso_week().week() as i32,
        month: start_time.month() as i32,
        year: start_time.year(),
        weekday: start_time.weekday().num_days_from_monday() as i32,
    })
}

/// `time` rows, one per distinct event timestamp
pub fn time_rows(events: &[LogEvent]) -> Vec<TimeRow> {
    let mut rows: BTreeMap<i64, TimeRow> = BTreeMap::new();
    for e in events {
        if rows.contains_key(&e.ts) {
            continue;
        }
        if let Some(row) = time_row(e.ts) {
            rows.insert(e.ts, row);
        }
    }
    rows.into_values().collect()
}

/// User state carried by a play event, if it has every required field
pub fn user_of(event: &LogEvent) -> Option<UserRow> {
    Some(UserRow {
        user_id: event.user_id?,
        first_name: event.first_name.clone()?,
        last_name: event.last_name.clone()?,
        gender: event.gender.clone(),
        level: event.level.clone()?,
        recency: (event.ts, event.session_id, event.item_in_session),
    })
}

/// Users extracted from a set of events
#[derive(Debug, Default)]
pub struct UserExtraction {
    pub rows: Vec<UserRow>,
    /// Events without a user id, name or level
    pub rejected: usize,
}

/// `users` rows, one per `user_id`, holding the state of that user's most
/// recent event: highest `(ts, session_id, item_in_session)`, and on a full
/// tie the later event in input order
pub fn user_rows(events: &[LogEvent]) -> UserExtraction {
    let mut latest: BTreeMap<i64, UserRow> = BTreeMap::new();
    let mut rejected = 0;

    for e in events {
        let Some(user) = user_of(e) else {
            rejected += 1;
            continue;
        };
        match latest.get(&user.user_id) {
            Some(seen) if seen.recency > user.recency => {}
            _ => {
                latest.insert(user.user_id, user);
            }
        }
    }

    UserExtraction {
        rows: latest.into_values().collect(),
        rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::{play as event, song as catalog_song};
    use chrono::TimeZone;

    fn song(song_id: &str, artist_id: &str, title: &str) -> SongRecord {
        catalog_song(song_id, artist_id, title, "MGMT", 215.3)
    }

    #[test]
    fn test_song_and_artist_rows_are_deterministic() {
        let records = vec![
            song("SO2", "AR1", "B"),
            song("SO1", "AR1", "A"),
            song("SO2", "AR9", "dup"),
        ];
        let first = song_rows(&records);
        let second = song_rows(&records);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].song_id, "SO1");
        // First occurrence wins on duplicate keys
        assert_eq!(first[1].title, "B");

        let artists = artist_rows(&records);
        assert_eq!(artists.len(), 1);
        assert_eq!(artists[0].name, "MGMT");
    }

    #[test]
    fn test_time_row_decomposition() {
        // 2018-11-02T01:25:34.796Z, a Friday in ISO week 44
        let row = time_row(1541121934796).unwrap();
        assert_eq!(
            row.start_time,
            Utc.with_ymd_and_hms(2018, 11, 2, 1, 25, 34).unwrap()
                + chrono::Duration::milliseconds(796)
        );
        assert_eq!(row.hour, 1);
        assert_eq!(row.day, 2);
        assert_eq!(row.week, 44);
        assert_eq!(row.month, 11);
        assert_eq!(row.year, 2018);
        assert_eq!(row.weekday, 4);
    }

    #[test]
    fn test_weekday_starts_on_monday() {
        // 2018-11-05 was a Monday, 2018-11-04 a Sunday
        assert_eq!(time_row(1541376000000).unwrap().weekday, 0);
        assert_eq!(time_row(1541289600000).unwrap().weekday, 6);
    }

    #[test]
    fn test_iso_week_at_year_boundary() {
        // 2018-12-31 belongs to ISO week 1 of 2019
        let row = time_row(1546214400000).unwrap();
        assert_eq!(row.week, 1);
        assert_eq!(row.year, 2018);
    }

    #[test]
    fn test_time_rows_one_per_distinct_ts() {
        let events = vec![
            event(3000, Some(1), "free"),
            event(1000, Some(1), "free"),
            event(3000, Some(2), "paid"),
        ];
        let rows = time_rows(&events);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].start_time < rows[1].start_time);
    }

    #[test]
    fn test_user_rows_keep_latest_level() {
        let events = vec![
            event(2000, Some(10), "paid"),
            event(1000, Some(10), "free"),
            event(1500, Some(11), "free"),
        ];
        let users = user_rows(&events);
        assert_eq!(users.rows.len(), 2);
        assert_eq!(users.rows[0].user_id, 10);
        assert_eq!(users.rows[0].level, "paid");
        assert_eq!(users.rejected, 0);
    }

    #[test]
    fn test_user_rows_tie_on_ts_later_event_wins() {
        let events = vec![event(1000, Some(10), "free"), event(1000, Some(10), "paid")];
        let users = user_rows(&events);
        assert_eq!(users.rows[0].level, "paid");
    }

    #[test]
    fn test_user_rows_tie_on_ts_later_item_wins() {
        let mut upgrade = event(1000, Some(10), "paid");
        upgrade.item_in_session = 5;
        let events = vec![upgrade, event(1000, Some(10), "free")];
        let users = user_rows(&events);
        assert_eq!(users.rows[0].level, "paid");
    }

    #[test]
    fn test_user_rows_drop_incomplete_events() {
        let mut nameless = event(1000, Some(12), "free");
        nameless.first_name = None;
        let events = vec![event(1000, None, "free"), nameless, event(1000, Some(13), "free")];
        let users = user_rows(&events);
        assert_eq!(users.rows.len(), 1);
        assert_eq!(users.rows[0].user_id, 13);
        assert_eq!(users.rejected, 2);
    }
}
