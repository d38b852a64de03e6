//! JSON decoding of song-catalog and activity-log files
//!
//! Both shapes are a whitespace-separated sequence of JSON objects (one per
//! line in practice). A single malformed object rejects the whole file.

use serde::de::DeserializeOwned;

use super::error::SourceError;
use crate::core::constants::NEXT_SONG_PAGE;
use crate::data::types::{LogEvent, SongRecord};

/// Decode all song records in a catalog file
pub fn parse_song_file(path: &str, bytes: &[u8]) -> Result<Vec<SongRecord>, SourceError> {
    parse_objects(path, bytes)
}

/// Decode a log file, keeping only `NextSong` page views
pub fn parse_log_file(path: &str, bytes: &[u8]) -> Result<Vec<LogEvent>, SourceError> {
    let events: Vec<LogEvent> = parse_objects(path, bytes)?;
    let total = events.len();
    let plays: Vec<LogEvent> = events
        .into_iter()
        .filter(|e| e.page == NEXT_SONG_PAGE)
        .collect();
    tracing::trace!(path, total, plays = plays.len(), "Parsed log file");
    Ok(plays)
}

fn parse_objects<T: DeserializeOwned>(path: &str, bytes: &[u8]) -> Result<Vec<T>, SourceError> {
    serde_json::Deserializer::from_slice(bytes)
        .into_iter::<T>()
        .map(|item| {
            item.map_err(|e| SourceError::Parse {
                path: path.to_string(),
                line: e.line(),
                source: e,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SONG: &str = r#"{"num_songs": 1, "artist_id": "ARJIE2Y1187B994AB7", "artist_latitude": null, "artist_longitude": null, "artist_location": "", "artist_name": "Line Renaud", "song_id": "SOUPIRU12A6D4FA1E1", "title": "Der Kleine Dompfaff", "duration": 152.92036, "year": 0}"#;

    #[test]
    fn test_parse_song_file_single_object() {
        let songs = parse_song_file("a.json", SONG.as_bytes()).unwrap();
        assert_eq!(songs.len(), 1);
        assert_eq!(songs[0].artist_name, "Line Renaud");
    }

    #[test]
    fn test_parse_song_file_pretty_printed() {
        let pretty = "{\n  \"artist_id\": \"AR1\",\n  \"artist_name\": \"A\",\n  \"song_id\": \"SO1\",\n  \"title\": \"T\",\n  \"duration\": 1.5,\n  \"year\": 1999\n}\n";
        let songs = parse_song_file("p.json", pretty.as_bytes()).unwrap();
        assert_eq!(songs[0].year, 1999);
    }

    #[test]
    fn test_parse_log_file_filters_next_song() {
        let body = concat!(
            r#"{"page":"Home","ts":1541105830796,"userId":"39","sessionId":38}"#,
            "\n",
            r#"{"artist":"MGMT","page":"NextSong","song":"Kids","length":215.3,"ts":1541121934796,"userId":"10","sessionId":345,"level":"free","firstName":"Sylvie","lastName":"Cruz"}"#,
            "\n",
            r#"{"page":"Logout","ts":1541106106796,"userId":"8"}"#,
            "\n"
        );
        let events = parse_log_file("log.json", body.as_bytes()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].song.as_deref(), Some("Kids"));
    }

    #[test]
    fn test_parse_log_file_malformed_line_rejects_file() {
        let body = "{\"page\":\"NextSong\",\"ts\":1}\n{\"page\": \n";
        let err = parse_log_file("bad.json", body.as_bytes()).unwrap_err();
        match err {
            SourceError::Parse { path, line, .. } => {
                assert_eq!(path, "bad.json");
                assert!(line >= 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_empty_file() {
        assert!(parse_log_file("empty.json", b"").unwrap().is_empty());
        assert!(parse_song_file("empty.json", b"\n\n").unwrap().is_empty());
    }
}
