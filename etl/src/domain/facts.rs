//! Fact extraction
//!
//! Joins `NextSong` events against the song catalog to build `songplays`
//! rows. An event matches a catalog song when title and artist name are
//! equal (case-sensitive) and the durations differ by at most
//! `DURATION_TOLERANCE_SECS`.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::core::constants::DURATION_TOLERANCE_SECS;
use crate::data::types::{LogEvent, PendingSongplay, SongRecord, SongplayRow};

use super::extract::{timestamp_from_millis, user_of};

#[derive(Debug, Clone)]
struct CatalogEntry {
    song_id: String,
    artist_id: String,
    duration: f64,
}

/// Song lookup keyed by `(title, artist_name)`
#[derive(Debug, Default)]
pub struct SongCatalog {
    entries: HashMap<(String, String), Vec<CatalogEntry>>,
}

impl SongCatalog {
    pub fn from_records(records: &[SongRecord]) -> Self {
        let mut catalog = Self::default();
        for r in records {
            catalog.insert(r);
        }
        catalog
    }

    pub fn insert(&mut self, record: &SongRecord) {
        self.entries
            .entry((record.title.clone(), record.artist_name.clone()))
            .or_default()
            .push(CatalogEntry {
                song_id: record.song_id.clone(),
                artist_id: record.artist_id.clone(),
                duration: record.duration,
            });
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(song_id, artist_id)` of the closest-duration song within tolerance.
    /// Equal distances resolve to the smallest `song_id`.
    pub fn lookup(&self, title: &str, artist: &str, length: f64) -> Option<(&str, &str)> {
        let candidates = self.entries.get(&(title.to_string(), artist.to_string()))?;
        candidates
            .iter()
            .map(|c| ((c.duration - length).abs(), c))
            .filter(|(distance, _)| *distance <= DURATION_TOLERANCE_SECS)
            .min_by(|(da, a), (db, b)| {
                da.partial_cmp(db)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.song_id.cmp(&b.song_id))
            })
            .map(|(_, c)| (c.song_id.as_str(), c.artist_id.as_str()))
    }
}

/// Play events ready for a catalog lookup
#[derive(Debug, Default)]
pub struct PendingPlays {
    pub plays: Vec<PendingSongplay>,
    /// Events missing song title, artist name or length
    pub unmatched: usize,
    /// Events missing user fields or carrying an unrepresentable `ts`
    pub rejected: usize,
}

/// Resolve user fields and timestamps of every event, keeping input order
pub fn pending_songplays(events: &[LogEvent]) -> PendingPlays {
    let mut out = PendingPlays::default();

    for e in events {
        let (Some(user), Some(start_time)) = (user_of(e), timestamp_from_millis(e.ts)) else {
            out.rejected += 1;
            continue;
        };
        let (Some(title), Some(artist_name), Some(length)) = (&e.song, &e.artist, e.length) else {
            out.unmatched += 1;
            continue;
        };

        out.plays.push(PendingSongplay {
            title: title.clone(),
            artist_name: artist_name.clone(),
            length,
            row: SongplayRow {
                start_time,
                user_id: user.user_id,
                level: user.level,
                song_id: None,
                artist_id: None,
                session_id: e.session_id,
                item_in_session: e.item_in_session,
                location: e.location.clone(),
                user_agent: e.user_agent.clone(),
            },
        });
    }

    out
}

/// Songplay rows extracted from a set of events
#[derive(Debug, Default)]
pub struct FactExtraction {
    pub rows: Vec<SongplayRow>,
    /// Events with no catalog match
    pub unmatched: usize,
    /// Events missing user fields or carrying an unrepresentable `ts`
    pub rejected: usize,
}

/// Build `songplays` rows for every event that has a catalog match.
///
/// Output follows input order; ids are assigned separately.
pub fn songplay_rows(events: &[LogEvent], catalog: &SongCatalog) -> FactExtraction {
    let pending = pending_songplays(events);
    let mut out = FactExtraction {
        rows: Vec::with_capacity(pending.plays.len()),
        unmatched: pending.unmatched,
        rejected: pending.rejected,
    };

    for play in pending.plays {
        match catalog.lookup(&play.title, &play.artist_name, play.length) {
            Some((song_id, artist_id)) => out.rows.push(SongplayRow {
                song_id: Some(song_id.to_string()),
                artist_id: Some(artist_id.to_string()),
                ..play.row
            }),
            None => out.unmatched += 1,
        }
    }

    out
}

/// Total order used for surrogate keys
fn songplay_order(a: &SongplayRow, b: &SongplayRow) -> Ordering {
    a.start_time
        .cmp(&b.start_time)
        .then(a.session_id.cmp(&b.session_id))
        .then(a.item_in_session.cmp(&b.item_in_session))
        .then(a.user_id.cmp(&b.user_id))
        .then_with(|| a.song_id.cmp(&b.song_id))
}

/// Sort rows by `(start_time, session_id, item_in_session, user_id, song_id)`
/// and number them from `offset + 1`
pub fn assign_songplay_ids(mut rows: Vec<SongplayRow>, offset: i64) -> Vec<(i64, SongplayRow)> {
    rows.sort_by(songplay_order);
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| (offset + i as i64 + 1, row))
        .collect()
}
