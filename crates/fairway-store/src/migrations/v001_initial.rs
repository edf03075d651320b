//! v001 -- Initial schema creation.
//!
//! Creates `app_state` (JSON blobs keyed by storage key) and
//! `local_identity` (the one golfer id of this installation).

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS app_state (
    storage_key TEXT PRIMARY KEY NOT NULL,   -- e.g. golf_master_pro_v3
    json        TEXT NOT NULL,
    updated_at  TEXT NOT NULL                -- RFC-3339
);

CREATE TABLE IF NOT EXISTS local_identity (
    id         INTEGER PRIMARY KEY CHECK (id = 1),
    golfer_id  TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        up(&conn).unwrap();
        up(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(tables, vec!["app_state", "local_identity"]);
    }
}
