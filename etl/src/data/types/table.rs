//! Fixed catalog of destination tables
//!
//! Every identifier that reaches SQL text comes from here; row values are
//! always bound as parameters.

use std::fmt;

/// Star schema table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Songplays,
    Users,
    Songs,
    Artists,
    Time,
}

impl Table {
    /// Dimensions first, fact last (load and check order)
    pub const STAR: [Table; 5] = [
        Table::Users,
        Table::Songs,
        Table::Artists,
        Table::Time,
        Table::Songplays,
    ];

    pub const DIMENSIONS: [Table; 4] = [Table::Users, Table::Songs, Table::Artists, Table::Time];

    pub const fn name(&self) -> &'static str {
        match self {
            Table::Songplays => "songplays",
            Table::Users => "users",
            Table::Songs => "songs",
            Table::Artists => "artists",
            Table::Time => "time",
        }
    }

    /// Quoted identifier (`time` is a keyword in several dialects)
    pub const fn ident(&self) -> &'static str {
        match self {
            Table::Songplays => "\"songplays\"",
            Table::Users => "\"users\"",
            Table::Songs => "\"songs\"",
            Table::Artists => "\"artists\"",
            Table::Time => "\"time\"",
        }
    }

    /// Columns in schema order
    pub const fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Songplays => &[
                "songplay_id",
                "start_time",
                "user_id",
                "level",
                "song_id",
                "artist_id",
                "session_id",
                "location",
                "user_agent",
            ],
            Table::Users => &["user_id", "first_name", "last_name", "gender", "level"],
            Table::Songs => &["song_id", "title", "artist_id", "year", "duration"],
            Table::Artists => &["artist_id", "name", "location", "latitude", "longitude"],
            Table::Time => &[
                "start_time",
                "hour",
                "day",
                "week",
                "month",
                "year",
                "weekday",
            ],
        }
    }

    /// Nullable columns stored beside the catalog columns and never exported.
    /// On `users` they hold the `(ts, session_id, item_in_session)` of the
    /// event the row was taken from, so a later load only overwrites a user
    /// with a more recent state.
    pub const fn recency_columns(&self) -> &'static [&'static str] {
        match self {
            Table::Users => &["last_ts", "last_session_id", "last_item_in_session"],
            _ => &[],
        }
    }

    /// Natural key used to skip rows that are already present in append mode
    pub const fn natural_key(&self) -> &'static [&'static str] {
        match self {
            Table::Songplays => &["start_time", "user_id", "session_id"],
            Table::Users => &["user_id"],
            Table::Songs => &["song_id"],
            Table::Artists => &["artist_id"],
            Table::Time => &["start_time"],
        }
    }

    /// Partition columns of the columnar export
    pub const fn partition_by(&self) -> &'static [&'static str] {
        match self {
            Table::Songs => &["year", "artist_id"],
            Table::Time | Table::Songplays => &["year", "month"],
            Table::Users | Table::Artists => &[],
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::STAR.into_iter().find(|t| t.name() == name)
    }

    /// Whether `column` belongs to this table
    pub fn has_column(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Raw landing tables of the warehouse pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StagingTable {
    Events,
    Songs,
}

impl StagingTable {
    pub const ALL: [StagingTable; 2] = [StagingTable::Events, StagingTable::Songs];

    pub const fn name(&self) -> &'static str {
        match self {
            StagingTable::Events => "staging_events",
            StagingTable::Songs => "staging_songs",
        }
    }
}

impl fmt::Display for StagingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
