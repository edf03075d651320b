//! Persistence half of the local golfer identity.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use fairway_shared::GolferId;

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Return this installation's golfer id, creating it on first use.
    ///
    /// Lookup order: the pinned identity row, then a `golferId` carried in
    /// the state blob (so an upgrade keeps the id friends already know),
    /// then a freshly generated id. Whatever is found is pinned.
    pub fn get_or_create_golfer_id(&self) -> Result<GolferId> {
        let pinned: Option<String> = self
            .conn()
            .query_row(
                "SELECT golfer_id FROM local_identity WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = pinned.as_deref().and_then(|raw| parse_logged(raw, "identity row")) {
            return Ok(id);
        }

        let id = match self
            .load_state()?
            .golfer_id
            .as_deref()
            .and_then(|raw| parse_logged(raw, "state blob"))
        {
            Some(id) => {
                tracing::info!(golfer_id = %id, "adopting golfer id from stored state");
                id
            }
            None => {
                let id = GolferId::generate();
                tracing::info!(golfer_id = %id, "generated new golfer id");
                id
            }
        };

        self.conn().execute(
            "INSERT INTO local_identity (id, golfer_id, created_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET golfer_id = excluded.golfer_id",
            params![id.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(id)
    }
}

fn parse_logged(raw: &str, source: &str) -> Option<GolferId> {
    match GolferId::parse(raw) {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::warn!(source, error = %e, "ignoring invalid stored golfer id");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StoredState;

    #[test]
    fn test_id_is_stable_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let first = Database::open_in(dir.path())
            .unwrap()
            .get_or_create_golfer_id()
            .unwrap();
        assert!(first.as_str().starts_with("GF-"));

        let db = Database::open_in(dir.path()).unwrap();
        assert_eq!(db.get_or_create_golfer_id().unwrap(), first);
        assert_eq!(db.get_or_create_golfer_id().unwrap(), first);
    }

    #[test]
    fn test_adopts_id_from_state_blob() {
        let db = Database::open_in_memory().unwrap();
        db.save_state(&StoredState {
            golfer_id: Some("GF-KEEPME01".into()),
            ..StoredState::default()
        })
        .unwrap();

        let id = db.get_or_create_golfer_id().unwrap();
        assert_eq!(id.as_str(), "GF-KEEPME01");

        // pinned now, clearing the blob does not change it
        db.save_state(&StoredState::default()).unwrap();
        assert_eq!(db.get_or_create_golfer_id().unwrap(), id);
    }

    #[test]
    fn test_invalid_blob_id_is_replaced() {
        let db = Database::open_in_memory().unwrap();
        db.save_state(&StoredState {
            golfer_id: Some("not valid!".into()),
            ..StoredState::default()
        })
        .unwrap();

        let id = db.get_or_create_golfer_id().unwrap();
        assert!(id.as_str().starts_with("GF-"));
    }
}
