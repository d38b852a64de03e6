//! Star schema rows

use chrono::{DateTime, Utc};

/// `songs` dimension row
#[derive(Debug, Clone, PartialEq)]
pub struct SongRow {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    pub year: i32,
    pub duration: f64,
    /// Artist name on the catalog record, matched against play events.
    /// Not exported; `artists.name` keeps only the first spelling per id.
    pub artist_name: String,
}

/// `artists` dimension row
#[derive(Debug, Clone, PartialEq)]
pub struct ArtistRow {
    pub artist_id: String,
    pub name: String,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// `users` dimension row (latest observed state of a user)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub gender: Option<String>,
    pub level: String,
    /// `(ts, session_id, item_in_session)` of the event this state comes from
    pub recency: (i64, i64, i64),
}

/// `time` dimension row, a pure decomposition of `start_time` in UTC.
///
/// `week` is the ISO-8601 week number, `weekday` counts from 0 = Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeRow {
    pub start_time: DateTime<Utc>,
    pub hour: i32,
    pub day: i32,
    pub week: i32,
    pub month: i32,
    pub year: i32,
    pub weekday: i32,
}

/// `songplays` fact row before a surrogate key is assigned
#[derive(Debug, Clone, PartialEq)]
pub struct SongplayRow {
    pub start_time: DateTime<Utc>,
    pub user_id: i64,
    pub level: String,
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
    pub session_id: i64,
    pub item_in_session: i64,
    pub location: Option<String>,
    pub user_agent: Option<String>,
}

/// A play event with its user fields resolved, awaiting a catalog match.
///
/// `row.song_id` and `row.artist_id` are filled in by whichever side owns
/// the catalog (in-memory lookup or a destination query).
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSongplay {
    pub title: String,
    pub artist_name: String,
    pub length: f64,
    pub row: SongplayRow,
}
