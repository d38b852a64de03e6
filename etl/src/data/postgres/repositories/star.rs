//! Star schema repository for PostgreSQL operations

use sqlx::{PgPool, Postgres, Transaction};

use crate::core::constants::DURATION_TOLERANCE_SECS;
use crate::data::postgres::PostgresError;
use crate::data::traits::FileLoad;
use crate::data::types::{ArtistRow, PendingSongplay, SongRow, Table, TimeRow, UserRow};

/// Empty every star table and restart the songplay identity
pub async fn truncate_all(pool: &PgPool) -> Result<(), PostgresError> {
    let tables: Vec<&str> = Table::STAR.iter().map(|t| t.ident()).collect();
    sqlx::query(&format!(
        "TRUNCATE {} RESTART IDENTITY",
        tables.join(", ")
    ))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn load_song_file(
    pool: &PgPool,
    songs: &[SongRow],
    artists: &[ArtistRow],
) -> Result<FileLoad, PostgresError> {
    let mut tx = pool.begin().await?;
    let mut load = FileLoad::default();

    for song in songs {
        let result = sqlx::query(
            r#"
            INSERT INTO songs (song_id, title, artist_id, year, duration, artist_name)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (song_id) DO NOTHING
            "#,
        )
        .bind(&song.song_id)
        .bind(&song.title)
        .bind(&song.artist_id)
        .bind(song.year)
        .bind(song.duration)
        .bind(&song.artist_name)
        .execute(&mut *tx)
        .await?;
        load.songs += result.rows_affected();
    }

    for artist in artists {
        let result = sqlx::query(
            r#"
            INSERT INTO artists (artist_id, name, location, latitude, longitude)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (artist_id) DO NOTHING
            "#,
        )
        .bind(&artist.artist_id)
        .bind(&artist.name)
        .bind(&artist.location)
        .bind(artist.latitude)
        .bind(artist.longitude)
        .execute(&mut *tx)
        .await?;
        load.artists += result.rows_affected();
    }

    tx.commit().await?;
    Ok(load)
}

/// Users are only overwritten by a state at least as recent as the stored
/// one; `users` counts inserted rows, not updates.
pub async fn load_log_file(
    pool: &PgPool,
    time: &[TimeRow],
    users: &[UserRow],
    plays: &[PendingSongplay],
) -> Result<FileLoad, PostgresError> {
    let mut tx = pool.begin().await?;
    let mut load = FileLoad::default();

    for t in time {
        let result = sqlx::query(
            r#"
            INSERT INTO "time" (start_time, hour, day, week, month, year, weekday)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (start_time) DO NOTHING
            "#,
        )
        .bind(t.start_time)
        .bind(t.hour)
        .bind(t.day)
        .bind(t.week)
        .bind(t.month)
        .bind(t.year)
        .bind(t.weekday)
        .execute(&mut *tx)
        .await?;
        load.time += result.rows_affected();
    }

    for user in users {
        // xmax is 0 only on a freshly inserted tuple
        let inserted: Option<bool> = sqlx::query_scalar(
            r#"
            INSERT INTO users
                (user_id, first_name, last_name, gender, level,
                 last_ts, last_session_id, last_item_in_session)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO UPDATE SET
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                gender = EXCLUDED.gender,
                level = EXCLUDED.level,
                last_ts = EXCLUDED.last_ts,
                last_session_id = EXCLUDED.last_session_id,
                last_item_in_session = EXCLUDED.last_item_in_session
            WHERE users.last_ts IS NULL
                OR (EXCLUDED.last_ts, EXCLUDED.last_session_id, EXCLUDED.last_item_in_session)
                    >= (users.last_ts, users.last_session_id, users.last_item_in_session)
            RETURNING (xmax = 0)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.gender)
        .bind(&user.level)
        .bind(user.recency.0)
        .bind(user.recency.1)
        .bind(user.recency.2)
        .fetch_optional(&mut *tx)
        .await?;
        if inserted == Some(true) {
            load.users += 1;
        }
    }

    for play in plays {
        let Some((song_id, artist_id)) = find_song(&mut tx, play).await? else {
            load.unmatched += 1;
            continue;
        };
        let row = &play.row;
        sqlx::query(
            r#"
            INSERT INTO songplays
                (start_time, user_id, level, song_id, artist_id, session_id, location, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(row.start_time)
        .bind(row.user_id)
        .bind(&row.level)
        .bind(song_id)
        .bind(artist_id)
        .bind(row.session_id)
        .bind(&row.location)
        .bind(&row.user_agent)
        .execute(&mut *tx)
        .await?;
        load.songplays += 1;
    }

    tx.commit().await?;
    Ok(load)
}

/// Closest-duration catalog song within tolerance, smallest `song_id` on ties.
/// Matches the artist name of the song's own catalog record.
async fn find_song(
    tx: &mut Transaction<'_, Postgres>,
    play: &PendingSongplay,
) -> Result<Option<(String, String)>, PostgresError> {
    let found = sqlx::query_as(
        r#"
        SELECT song_id, artist_id
        FROM songs
        WHERE title = $1 AND artist_name = $2 AND ABS(duration - $3) <= $4
        ORDER BY ABS(duration - $3), song_id
        LIMIT 1
        "#,
    )
    .bind(&play.title)
    .bind(&play.artist_name)
    .bind(play.length)
    .bind(DURATION_TOLERANCE_SECS)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(found)
}

// ============================================================================
// Catalog queries
// ============================================================================

pub async fn not_null_columns(pool: &PgPool, table: Table) -> Result<Vec<String>, PostgresError> {
    let columns = sqlx::query_scalar(
        r#"
        SELECT column_name::text
        FROM information_schema.columns
        WHERE table_schema = current_schema() AND table_name = $1 AND is_nullable = 'NO'
        ORDER BY ordinal_position
        "#,
    )
    .bind(table.name())
    .fetch_all(pool)
    .await?;
    Ok(columns)
}

pub async fn count_rows(pool: &PgPool, table: Table) -> Result<i64, PostgresError> {
    let count = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table.ident()))
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// `column` must already be a checked, quoted identifier
pub async fn count_nulls(pool: &PgPool, table: Table, column: &str) -> Result<i64, PostgresError> {
    let count = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} WHERE {} IS NULL",
        table.ident(),
        column
    ))
    .fetch_one(pool)
    .await?;
    Ok(count)
}
