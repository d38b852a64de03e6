//! Shared data types across sources, extractors and destinations

mod records;
mod rows;
mod table;

pub use records::{LogEvent, SongRecord};
pub use rows::{ArtistRow, PendingSongplay, SongRow, SongplayRow, TimeRow, UserRow};
pub use table::{StagingTable, Table};
