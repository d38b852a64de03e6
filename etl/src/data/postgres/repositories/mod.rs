//! PostgreSQL repositories

pub mod star;

pub use star::{
    count_nulls, count_rows, load_log_file, load_song_file, not_null_columns, truncate_all,
};
