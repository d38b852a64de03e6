//! Test fixtures shared by domain and data tests

use crate::data::types::{LogEvent, SongRecord};

/// The catalog entry for MGMT - Kids
pub fn kids_song() -> SongRecord {
    SongRecord {
        song_id: "SOSXLTC12AF72A7F54".to_string(),
        title: "Kids".to_string(),
        artist_id: "ARNF6401187FB57032".to_string(),
        year: 1996,
        duration: 215.3,
        artist_name: "MGMT".to_string(),
        artist_location: Some("Brooklyn, NY".to_string()),
        artist_latitude: Some(40.65),
        artist_longitude: Some(-73.95),
        num_songs: Some(1),
    }
}

pub fn song(
    song_id: &str,
    artist_id: &str,
    title: &str,
    artist_name: &str,
    duration: f64,
) -> SongRecord {
    SongRecord {
        song_id: song_id.to_string(),
        title: title.to_string(),
        artist_id: artist_id.to_string(),
        year: 2004,
        duration,
        artist_name: artist_name.to_string(),
        artist_location: None,
        artist_latitude: None,
        artist_longitude: None,
        num_songs: Some(1),
    }
}

/// A complete `NextSong` play of MGMT - Kids by user 10
pub fn kids_play(ts: i64) -> LogEvent {
    LogEvent {
        artist: Some("MGMT".to_string()),
        first_name: Some("Sylvie".to_string()),
        gender: Some("F".to_string()),
        item_in_session: 0,
        last_name: Some("Cruz".to_string()),
        length: Some(215.3),
        level: Some("free".to_string()),
        location: Some("Washington-Arlington-Alexandria, DC-VA-MD-WV".to_string()),
        page: "NextSong".to_string(),
        session_id: 345,
        song: Some("Kids".to_string()),
        ts,
        user_agent: Some("Mozilla/5.0".to_string()),
        user_id: Some(10),
    }
}

pub fn play(ts: i64, user_id: Option<i64>, level: &str) -> LogEvent {
    LogEvent {
        user_id,
        level: Some(level.to_string()),
        ..kids_play(ts)
    }
}

/// JSON line form of a song record as found in `song_data`
pub fn song_json(song: &SongRecord) -> String {
    serde_json::json!({
        "num_songs": song.num_songs,
        "artist_id": song.artist_id,
        "artist_latitude": song.artist_latitude,
        "artist_longitude": song.artist_longitude,
        "artist_location": song.artist_location,
        "artist_name": song.artist_name,
        "song_id": song.song_id,
        "title": song.title,
        "duration": song.duration,
        "year": song.year,
    })
    .to_string()
}

/// JSON line form of a log event as found in `log_data`
pub fn event_json(event: &LogEvent) -> String {
    serde_json::json!({
        "artist": event.artist,
        "auth": "Logged In",
        "firstName": event.first_name,
        "gender": event.gender,
        "itemInSession": event.item_in_session,
        "lastName": event.last_name,
        "length": event.length,
        "level": event.level,
        "location": event.location,
        "method": "PUT",
        "page": event.page,
        "registration": 1540266185796.0,
        "sessionId": event.session_id,
        "song": event.song,
        "status": 200,
        "ts": event.ts,
        "userAgent": event.user_agent,
        "userId": event.user_id.map(|id| id.to_string()).unwrap_or_default(),
    })
    .to_string()
}

/// Write a small source tree: one file per song plus the given log files
pub fn write_source_tree(
    root: &std::path::Path,
    songs: &[SongRecord],
    logs: &[(&str, Vec<LogEvent>)],
) {
    for (i, s) in songs.iter().enumerate() {
        let path = root.join(format!("song_data/A/B/C/TR{:04}.json", i));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, song_json(s)).unwrap();
    }
    for (name, events) in logs {
        let path = root.join("log_data/2018/11").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let body: Vec<String> = events.iter().map(event_json).collect();
        std::fs::write(path, body.join("\n")).unwrap();
    }
}
