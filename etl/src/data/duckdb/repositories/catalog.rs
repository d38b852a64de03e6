//! Catalog lookups and counts over the star tables

use duckdb::Connection;

use crate::data::duckdb::DuckdbError;
use crate::data::types::Table;

/// Columns declared NOT NULL, in schema order
pub fn not_null_columns(conn: &Connection, table: Table) -> Result<Vec<String>, DuckdbError> {
    let mut stmt = conn.prepare(
        "SELECT column_name FROM information_schema.columns
         WHERE table_schema = current_schema() AND table_name = ? AND is_nullable = 'NO'
         ORDER BY ordinal_position",
    )?;
    let columns = stmt
        .query_map([table.name()], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(columns)
}

pub fn count_rows(conn: &Connection, table: Table) -> Result<i64, DuckdbError> {
    let sql = format!("SELECT COUNT(*) FROM {}", table.ident());
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}

/// `column` must already be a checked, quoted identifier
pub fn count_nulls(conn: &Connection, table: Table, column: &str) -> Result<i64, DuckdbError> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {} IS NULL",
        table.ident(),
        column
    );
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::duckdb::repositories::star::apply_ddl;
    use crate::data::sql::{DuckdbDialect, transforms};

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        apply_ddl(&conn, &transforms::create_all(&DuckdbDialect)).unwrap();
        conn
    }

    #[test]
    fn test_not_null_columns_follow_ddl() {
        let conn = setup();
        assert_eq!(
            not_null_columns(&conn, Table::Artists).unwrap(),
            vec!["artist_id", "name"]
        );
        assert_eq!(not_null_columns(&conn, Table::Time).unwrap().len(), 7);
    }

    #[test]
    fn test_count_nulls() {
        let conn = setup();
        conn.execute_batch(
            "INSERT INTO artists VALUES ('AR1', 'MGMT', NULL, NULL, NULL), ('AR2', 'Air', 'Paris', 48.8, 2.3)",
        )
        .unwrap();
        assert_eq!(count_rows(&conn, Table::Artists).unwrap(), 2);
        assert_eq!(count_nulls(&conn, Table::Artists, "\"location\"").unwrap(), 1);
        assert_eq!(count_nulls(&conn, Table::Artists, "\"name\"").unwrap(), 0);
    }
}
