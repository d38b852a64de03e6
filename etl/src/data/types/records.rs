//! Raw source records as they appear in the JSON input files

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One song-catalog record (`song_data/**/*.json`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SongRecord {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    #[serde(default)]
    pub year: i32,
    pub duration: f64,
    pub artist_name: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub artist_location: Option<String>,
    #[serde(default)]
    pub artist_latitude: Option<f64>,
    #[serde(default)]
    pub artist_longitude: Option<f64>,
    #[serde(default)]
    pub num_songs: Option<i64>,
}

/// One activity-log event (`log_data/**/*.json`, one object per line)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub gender: Option<String>,
    #[serde(default)]
    pub item_in_session: i64,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub length: Option<f64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub level: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub location: Option<String>,
    pub page: String,
    #[serde(default)]
    pub session_id: i64,
    #[serde(default)]
    pub song: Option<String>,
    /// Epoch milliseconds
    pub ts: i64,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub user_agent: Option<String>,
    /// Arrives as `"10"`, `""` or `10`
    #[serde(default, deserialize_with = "user_id_from_any")]
    pub user_id: Option<i64>,
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

fn user_id_from_any<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_song_record_parse() {
        let json = r#"{"num_songs": 1, "artist_id": "ARD7TVE1187B99BFB1", "artist_latitude": null,
            "artist_longitude": null, "artist_location": "California - LA",
            "artist_name": "Casual", "song_id": "SOMZWCG12A8C13C480",
            "title": "I Didn't Mean To", "duration": 218.93179, "year": 0}"#;
        let record: SongRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.song_id, "SOMZWCG12A8C13C480");
        assert_eq!(record.artist_location.as_deref(), Some("California - LA"));
        assert_eq!(record.artist_latitude, None);
        assert_eq!(record.year, 0);
    }

    #[test]
    fn test_song_record_empty_location_is_none() {
        let json = r#"{"artist_id": "AR1", "artist_location": "", "artist_name": "A",
            "song_id": "SO1", "title": "T", "duration": 1.0, "year": 2001}"#;
        let record: SongRecord = serde_json::from_str(json).unwrap();
        assert!(record.artist_location.is_none());
    }

    #[test]
    fn test_log_event_string_user_id() {
        let json = r#"{"artist":"MGMT","auth":"Logged In","firstName":"Sylvie","gender":"F",
            "itemInSession":0,"lastName":"Cruz","length":215.3,"level":"free",
            "location":"Washington-Arlington-Alexandria, DC-VA-MD-WV","method":"PUT",
            "page":"NextSong","registration":1540266185796.0,"sessionId":345,"song":"Kids",
            "status":200,"ts":1541121934796,"userAgent":"Mozilla/5.0","userId":"10"}"#;
        let event: LogEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.user_id, Some(10));
        assert_eq!(event.session_id, 345);
        assert_eq!(event.first_name.as_deref(), Some("Sylvie"));
    }

    #[test]
    fn test_log_event_user_id_variants() {
        let empty: LogEvent =
            serde_json::from_str(r#"{"page":"Home","ts":1,"userId":""}"#).unwrap();
        assert_eq!(empty.user_id, None);

        let numeric: LogEvent =
            serde_json::from_str(r#"{"page":"Home","ts":1,"userId":26}"#).unwrap();
        assert_eq!(numeric.user_id, Some(26));

        let missing: LogEvent = serde_json::from_str(r#"{"page":"Home","ts":1}"#).unwrap();
        assert_eq!(missing.user_id, None);
    }
}
