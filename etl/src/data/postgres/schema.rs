//! PostgreSQL schema definitions

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Complete schema SQL
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at BIGINT NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS users (
    user_id BIGINT PRIMARY KEY,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    gender TEXT,
    level TEXT NOT NULL,
    -- (ts, session_id, item_in_session) of the event the row was taken from
    last_ts BIGINT,
    last_session_id BIGINT,
    last_item_in_session BIGINT
);

CREATE TABLE IF NOT EXISTS artists (
    artist_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    location TEXT,
    latitude DOUBLE PRECISION,
    longitude DOUBLE PRECISION
);

CREATE TABLE IF NOT EXISTS songs (
    song_id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    artist_id TEXT NOT NULL,
    year INTEGER NOT NULL,
    duration DOUBLE PRECISION NOT NULL,
    -- artist name of the catalog record, used to match plays
    artist_name TEXT
);

CREATE INDEX IF NOT EXISTS idx_songs_title_artist ON songs(title, artist_name);

CREATE TABLE IF NOT EXISTS "time" (
    start_time TIMESTAMPTZ PRIMARY KEY,
    hour INTEGER NOT NULL,
    day INTEGER NOT NULL,
    week INTEGER NOT NULL,
    month INTEGER NOT NULL,
    year INTEGER NOT NULL,
    weekday INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS songplays (
    songplay_id BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,
    start_time TIMESTAMPTZ NOT NULL REFERENCES "time"(start_time),
    user_id BIGINT NOT NULL REFERENCES users(user_id),
    level TEXT NOT NULL,
    song_id TEXT REFERENCES songs(song_id),
    artist_id TEXT REFERENCES artists(artist_id),
    session_id BIGINT NOT NULL,
    location TEXT,
    user_agent TEXT
);

CREATE INDEX IF NOT EXISTS idx_songplays_start_time ON songplays(start_time);
"#;
