//! SQLite schema definitions and SQL query constants.

/// SQL statement to create all tables.
pub const CREATE_TABLES: &str = r#"
-- Documents, keyed by collection and id
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    data TEXT NOT NULL,
    version INTEGER NOT NULL,
    PRIMARY KEY (collection, id)
);

-- Single-row counter handing out document versions
CREATE TABLE IF NOT EXISTS clock (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    value INTEGER NOT NULL
);

INSERT OR IGNORE INTO clock (id, value) VALUES (1, 0);
"#;

/// Advances the clock and returns the new value.
///
/// Versions are never reused, so a document deleted and recreated between a
/// read and a commit still counts as changed.
pub const TICK_CLOCK: &str = r#"
UPDATE clock
SET value = value + 1
WHERE id = 1
RETURNING value
"#;

pub const SELECT_DOCUMENT: &str = r#"
SELECT data, version
FROM documents
WHERE collection = ?1 AND id = ?2
"#;

pub const SELECT_VERSION: &str = r#"
SELECT version
FROM documents
WHERE collection = ?1 AND id = ?2
"#;

pub const SELECT_COLLECTION: &str = r#"
SELECT id, data
FROM documents
WHERE collection = ?1
"#;

pub const UPSERT_DOCUMENT: &str = r#"
INSERT INTO documents (collection, id, data, version)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT (collection, id) DO UPDATE
SET data = excluded.data, version = excluded.version
"#;

pub const DELETE_DOCUMENT: &str = r#"
DELETE FROM documents
WHERE collection = ?1 AND id = ?2
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tables_is_valid_sql() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_TABLES).unwrap();
        // Running it twice must not reset the clock.
        conn.query_row(TICK_CLOCK, [], |row| row.get::<_, i64>(0))
            .unwrap();
        conn.execute_batch(CREATE_TABLES).unwrap();

        let next: i64 = conn.query_row(TICK_CLOCK, [], |row| row.get(0)).unwrap();
        assert_eq!(next, 2);
    }

    #[test]
    fn test_upsert_replaces_data_and_version() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_TABLES).unwrap();

        conn.execute(UPSERT_DOCUMENT, rusqlite::params!["users", "a", "{}", 1])
            .unwrap();
        conn.execute(
            UPSERT_DOCUMENT,
            rusqlite::params!["users", "a", r#"{"x":1}"#, 7],
        )
        .unwrap();

        let (data, version): (String, i64) = conn
            .query_row(SELECT_DOCUMENT, ["users", "a"], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(data, r#"{"x":1}"#);
        assert_eq!(version, 7);
    }
}
