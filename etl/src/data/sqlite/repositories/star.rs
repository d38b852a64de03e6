//! Star schema repository for SQLite operations

use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::core::constants::DURATION_TOLERANCE_SECS;
use crate::data::sqlite::SqliteError;
use crate::data::traits::FileLoad;
use crate::data::types::{ArtistRow, PendingSongplay, SongRow, Table, TimeRow, UserRow};

/// Delete every star row, fact first so foreign keys hold
pub async fn truncate_all(pool: &SqlitePool) -> Result<(), SqliteError> {
    let mut tx = pool.begin().await?;
    for table in [
        Table::Songplays,
        Table::Users,
        Table::Songs,
        Table::Artists,
        Table::Time,
    ] {
        sqlx::query(&format!("DELETE FROM {}", table.ident()))
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Insert the songs and artists of one song file in a single transaction
pub async fn load_song_file(
    pool: &SqlitePool,
    songs: &[SongRow],
    artists: &[ArtistRow],
) -> Result<FileLoad, SqliteError> {
    let mut tx = pool.begin().await?;
    let mut load = FileLoad::default();

    for song in songs {
        let result = sqlx::query(
            r#"
            INSERT INTO songs (song_id, title, artist_id, year, duration, artist_name)
            VALUES (?, ?, ?, ?, ?, ?)
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
            VALUES (?, ?, ?, ?, ?)
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

/// Insert time rows, upsert users and insert matched songplays of one log
/// file in a single transaction.
///
/// A user row is only overwritten by a state at least as recent as the
/// stored one, so files may arrive in any order. `users` counts new users.
pub async fn load_log_file(
    pool: &SqlitePool,
    time: &[TimeRow],
    users: &[UserRow],
    plays: &[PendingSongplay],
) -> Result<FileLoad, SqliteError> {
    let mut tx = pool.begin().await?;
    let mut load = FileLoad::default();

    for t in time {
        let result = sqlx::query(
            r#"
            INSERT INTO "time" (start_time, hour, day, week, month, year, weekday)
            VALUES (?, ?, ?, ?, ?, ?, ?)
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

    let users_before = count_users(&mut tx).await?;
    for user in users {
        sqlx::query(
            r#"
            INSERT INTO users
                (user_id, first_name, last_name, gender, level,
                 last_ts, last_session_id, last_item_in_session)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                gender = excluded.gender,
                level = excluded.level,
                last_ts = excluded.last_ts,
                last_session_id = excluded.last_session_id,
                last_item_in_session = excluded.last_item_in_session
            WHERE users.last_ts IS NULL
                OR (excluded.last_ts, excluded.last_session_id, excluded.last_item_in_session)
                    >= (users.last_ts, users.last_session_id, users.last_item_in_session)
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
        .execute(&mut *tx)
        .await?;
    }
    load.users = (count_users(&mut tx).await? - users_before).max(0) as u64;

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
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
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

async fn count_users(tx: &mut Transaction<'_, Sqlite>) -> Result<i64, SqliteError> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&mut **tx)
        .await?;
    Ok(count)
}

/// Closest-duration catalog song within tolerance, smallest `song_id` on ties.
/// Matches the artist name of the song's own catalog record.
async fn find_song(
    tx: &mut Transaction<'_, Sqlite>,
    play: &PendingSongplay,
) -> Result<Option<(String, String)>, SqliteError> {
    let found = sqlx::query_as(
        r#"
        SELECT song_id, artist_id
        FROM songs
        WHERE title = ? AND artist_name = ? AND ABS(duration - ?) <= ?
        ORDER BY ABS(duration - ?), song_id
        LIMIT 1
        "#,
    )
    .bind(&play.title)
    .bind(&play.artist_name)
    .bind(play.length)
    .bind(DURATION_TOLERANCE_SECS)
    .bind(play.length)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(found)
}

// ============================================================================
// Catalog queries
// ============================================================================

/// Columns declared NOT NULL, in schema order
pub async fn not_null_columns(pool: &SqlitePool, table: Table) -> Result<Vec<String>, SqliteError> {
    let columns = sqlx::query_scalar(
        r#"SELECT name FROM pragma_table_info(?) WHERE "notnull" = 1 ORDER BY cid"#,
    )
    .bind(table.name())
    .fetch_all(pool)
    .await?;
    Ok(columns)
}

pub async fn count_rows(pool: &SqlitePool, table: Table) -> Result<i64, SqliteError> {
    let count = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table.ident()))
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// `column` must already be a checked, quoted identifier
pub async fn count_nulls(
    pool: &SqlitePool,
    table: Table,
    column: &str,
) -> Result<i64, SqliteError> {
    let count = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} WHERE {} IS NULL",
        table.ident(),
        column
    ))
    .fetch_one(pool)
    .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::extract::{artist_rows, song_rows, time_rows, user_rows};
    use crate::domain::facts::pending_songplays;
    use crate::domain::fixtures::{kids_play, kids_song, play, song};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(crate::data::sqlite::schema::SCHEMA)
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    async fn load_kids_catalog(pool: &SqlitePool) {
        let songs = [kids_song()];
        load_song_file(pool, &song_rows(&songs), &artist_rows(&songs))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_song_file_ignores_duplicates() {
        let pool = setup_test_pool().await;
        let songs = [kids_song()];

        let first = load_song_file(&pool, &song_rows(&songs), &artist_rows(&songs))
            .await
            .unwrap();
        assert_eq!((first.songs, first.artists), (1, 1));

        let second = load_song_file(&pool, &song_rows(&songs), &artist_rows(&songs))
            .await
            .unwrap();
        assert_eq!((second.songs, second.artists), (0, 0));
        assert_eq!(count_rows(&pool, Table::Songs).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_log_file_matches_catalog() {
        let pool = setup_test_pool().await;
        load_kids_catalog(&pool).await;

        let mut unknown = kids_play(1541121999000);
        unknown.song = Some("Time To Pretend".to_string());
        let events = vec![kids_play(1541121934796), unknown];

        let load = load_log_file(
            &pool,
            &time_rows(&events),
            &user_rows(&events).rows,
            &pending_songplays(&events).plays,
        )
        .await
        .unwrap();

        assert_eq!(load.time, 2);
        assert_eq!(load.users, 1);
        assert_eq!(load.songplays, 1);
        assert_eq!(load.unmatched, 1);

        let (id, song_id): (i64, String) =
            sqlx::query_as("SELECT songplay_id, song_id FROM songplays")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(id, 1);
        assert_eq!(song_id, "SOSXLTC12AF72A7F54");
    }

    #[tokio::test]
    async fn test_user_upsert_keeps_latest_level() {
        let pool = setup_test_pool().await;

        let free = [play(1000, Some(10), "free")];
        load_log_file(&pool, &time_rows(&free), &user_rows(&free).rows, &[])
            .await
            .unwrap();
        let paid = [play(2000, Some(10), "paid")];
        let load = load_log_file(&pool, &time_rows(&paid), &user_rows(&paid).rows, &[])
            .await
            .unwrap();
        assert_eq!(load.users, 0);

        let level: String = sqlx::query_scalar("SELECT level FROM users WHERE user_id = 10")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(level, "paid");
        assert_eq!(count_rows(&pool, Table::Users).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_older_file_does_not_overwrite_user() {
        let pool = setup_test_pool().await;

        let paid = [play(2_000_000, Some(10), "paid")];
        let first = load_log_file(&pool, &time_rows(&paid), &user_rows(&paid).rows, &[])
            .await
            .unwrap();
        assert_eq!(first.users, 1);
        let free = [play(1_000_000, Some(10), "free")];
        let second = load_log_file(&pool, &time_rows(&free), &user_rows(&free).rows, &[])
            .await
            .unwrap();
        assert_eq!(second.users, 0);

        let (level, last_ts): (String, i64) =
            sqlx::query_as("SELECT level, last_ts FROM users WHERE user_id = 10")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(level, "paid");
        assert_eq!(last_ts, 2_000_000);
    }

    #[tokio::test]
    async fn test_match_uses_song_record_artist_name() {
        let pool = setup_test_pool().await;
        let songs = [
            song("SO1", "AR1", "First", "MGMT feat. X", 100.0),
            song("SO2", "AR1", "Kids", "MGMT", 215.3),
        ];
        load_song_file(&pool, &song_rows(&songs), &artist_rows(&songs))
            .await
            .unwrap();

        let events = vec![kids_play(1541121934796)];
        let load = load_log_file(
            &pool,
            &time_rows(&events),
            &user_rows(&events).rows,
            &pending_songplays(&events).plays,
        )
        .await
        .unwrap();
        assert_eq!((load.songplays, load.unmatched), (1, 0));

        let song_id: String = sqlx::query_scalar("SELECT song_id FROM songplays")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(song_id, "SO2");
    }

    #[tokio::test]
    async fn test_truncate_restarts_songplay_ids() {
        let pool = setup_test_pool().await;
        load_kids_catalog(&pool).await;
        let events = vec![kids_play(1541121934796)];
        let pending = pending_songplays(&events).plays;

        for _ in 0..2 {
            truncate_all(&pool).await.unwrap();
            load_kids_catalog(&pool).await;
            load_log_file(&pool, &time_rows(&events), &user_rows(&events).rows, &pending)
                .await
                .unwrap();
        }

        let ids: Vec<i64> = sqlx::query_scalar("SELECT songplay_id FROM songplays")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn test_catalog_queries() {
        let pool = setup_test_pool().await;

        let columns = not_null_columns(&pool, Table::Songplays).await.unwrap();
        assert_eq!(
            columns,
            vec!["songplay_id", "start_time", "user_id", "level", "session_id"]
        );
        let columns = not_null_columns(&pool, Table::Users).await.unwrap();
        assert_eq!(columns, vec!["user_id", "first_name", "last_name", "level"]);

        load_kids_catalog(&pool).await;
        let nulls = count_nulls(&pool, Table::Artists, "\"location\"")
            .await
            .unwrap();
        assert_eq!(nulls, 0);
        sqlx::query("UPDATE artists SET location = NULL")
            .execute(&pool)
            .await
            .unwrap();
        let nulls = count_nulls(&pool, Table::Artists, "\"location\"")
            .await
            .unwrap();
        assert_eq!(nulls, 1);
    }
}
