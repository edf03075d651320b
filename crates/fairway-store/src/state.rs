//! The persisted app state blob.
//!
//! Stored as one JSON document under [`STORAGE_KEY`]. Only `golferId`,
//! `userName`, `pastRounds` and `friends` are interpreted here; every other
//! field (bag, language, in-progress hole data, ...) is carried through
//! untouched.

use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use fairway_shared::constants::{LEGACY_STORAGE_KEYS, STORAGE_KEY};
use fairway_shared::{Friend, Round};

use crate::database::Database;
use crate::error::Result;

/// Where an unparseable current blob is moved so later saves cannot
/// overwrite it.
pub const UNREADABLE_STORAGE_KEY: &str = "golf_master_pro_v3_unreadable";

/// Interpreted fields are read leniently: a value of the wrong type falls
/// back to its default and a bad list entry is dropped on its own, so one
/// odd field never discards the rest of the blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredState {
    /// Kept as a plain string so an invalid id is reported where it is used.
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub golfer_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub user_name: String,
    /// Most recent first.
    #[serde(default, deserialize_with = "lenient_list")]
    pub past_rounds: Vec<Round>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub friends: Vec<Friend>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "ignoring unreadable field in state blob");
        T::default()
    }))
}

fn lenient_list<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        _ => {
            tracing::warn!("ignoring non-list field in state blob");
            return Ok(Vec::new());
        }
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "dropping unreadable entry from state blob");
                None
            }
        })
        .collect())
}

impl StoredState {
    /// Fold an older blob into this one. Entries present here win; rounds
    /// and friends only the older blob knows are appended.
    fn absorb(&mut self, older: StoredState) {
        if self.golfer_id.is_none() {
            self.golfer_id = older.golfer_id;
        }
        if self.user_name.is_empty() {
            self.user_name = older.user_name;
        }

        let rounds: HashSet<String> = self.past_rounds.iter().map(|r| r.id.clone()).collect();
        self.past_rounds
            .extend(older.past_rounds.into_iter().filter(|r| !rounds.contains(&r.id)));

        let friends: HashSet<String> = self.friends.iter().map(|f| f.id.to_string()).collect();
        self.friends.extend(
            older
                .friends
                .into_iter()
                .filter(|f| !friends.contains(f.id.as_str())),
        );

        for (key, value) in older.extra {
            self.extra.entry(key).or_insert(value);
        }
    }
}

/// A stored blob as found in the table.
enum Blob {
    Missing,
    Unreadable(String),
    Parsed(StoredState),
}

impl Database {
    /// Load the current state blob. A missing or unreadable blob yields the
    /// default state.
    pub fn load_state(&self) -> Result<StoredState> {
        match self.read_blob(STORAGE_KEY)? {
            Blob::Parsed(state) => Ok(state),
            Blob::Missing | Blob::Unreadable(_) => Ok(StoredState::default()),
        }
    }

    pub fn save_state(&self, state: &StoredState) -> Result<()> {
        self.write_blob(STORAGE_KEY, state)
    }

    /// Move an unparseable current blob out of the way, keeping its text
    /// under [`UNREADABLE_STORAGE_KEY`].
    pub(crate) fn set_aside_unreadable_state(&self) -> Result<()> {
        if let Blob::Unreadable(json) = self.read_blob(STORAGE_KEY)? {
            tracing::warn!(
                key = UNREADABLE_STORAGE_KEY,
                "current state blob is unreadable, keeping a copy"
            );
            let tx = self.conn().unchecked_transaction()?;
            tx.execute(
                "INSERT INTO app_state (storage_key, json, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(storage_key) DO UPDATE SET json = excluded.json,
                                                        updated_at = excluded.updated_at",
                params![UNREADABLE_STORAGE_KEY, json, Utc::now().to_rfc3339()],
            )?;
            tx.execute(
                "DELETE FROM app_state WHERE storage_key = ?1",
                params![STORAGE_KEY],
            )?;
            tx.commit()?;
        }
        Ok(())
    }

    /// Merge blobs stored under legacy keys into the current one, then
    /// delete them so rounds removed later cannot come back on reopen.
    /// A legacy blob that cannot be read is left where it is.
    pub(crate) fn migrate_legacy_state(&self) -> Result<()> {
        let mut merged = Vec::new();
        let mut state = self.load_state()?;
        for key in LEGACY_STORAGE_KEYS {
            match self.read_blob(key)? {
                Blob::Missing => {}
                Blob::Unreadable(_) => {
                    tracing::warn!(key, "legacy state blob is unreadable, leaving it in place");
                }
                Blob::Parsed(older) => {
                    tracing::info!(key, "migrating legacy state");
                    state.absorb(older);
                    merged.push(*key);
                }
            }
        }
        if merged.is_empty() {
            return Ok(());
        }

        let tx = self.conn().unchecked_transaction()?;
        self.save_state(&state)?;
        for key in merged {
            tx.execute("DELETE FROM app_state WHERE storage_key = ?1", params![key])?;
        }
        tx.commit()?;
        Ok(())
    }

    #[cfg(test)]
    fn has_blob(&self, key: &str) -> Result<bool> {
        Ok(!matches!(self.read_blob(key)?, Blob::Missing))
    }

    fn read_blob(&self, key: &str) -> Result<Blob> {
        let json: Option<String> = self
            .conn()
            .query_row(
                "SELECT json FROM app_state WHERE storage_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        let Some(json) = json else {
            return Ok(Blob::Missing);
        };
        match serde_json::from_str(&json) {
            Ok(state) => Ok(Blob::Parsed(state)),
            Err(e) => {
                tracing::warn!(key, error = %e, "unreadable state blob");
                Ok(Blob::Unreadable(json))
            }
        }
    }

    fn write_blob(&self, key: &str, state: &StoredState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        self.conn().execute(
            "INSERT INTO app_state (storage_key, json, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(storage_key) DO UPDATE SET json = excluded.json,
                                                    updated_at = excluded.updated_at",
            params![key, json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairway_shared::GolferId;
    use serde_json::json;

    fn put_raw(db: &Database, key: &str, value: Value) {
        db.conn()
            .execute(
                "INSERT INTO app_state (storage_key, json, updated_at) VALUES (?1, ?2, 'x')",
                params![key, value.to_string()],
            )
            .unwrap();
    }

    #[test]
    fn test_state_round_trip_keeps_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in(dir.path()).unwrap();
        put_raw(
            &db,
            STORAGE_KEY,
            json!({
                "userName": "Alex",
                "pastRounds": [{ "id": "round_1", "date": "2024-05-01" }],
                "friends": [],
                "bag": ["Driver", "7 Iron"],
                "language": "zh-TW"
            }),
        );

        let mut state = db.load_state().unwrap();
        assert_eq!(state.user_name, "Alex");
        assert_eq!(state.past_rounds.len(), 1);
        assert_eq!(state.extra["language"], "zh-TW");

        state.user_name = "Alex K".into();
        db.save_state(&state).unwrap();
        drop(db);

        let db = Database::open_in(dir.path()).unwrap();
        let reloaded = db.load_state().unwrap();
        assert_eq!(reloaded.user_name, "Alex K");
        assert_eq!(reloaded.extra["bag"], json!(["Driver", "7 Iron"]));
    }

    #[test]
    fn test_missing_or_corrupt_blob_is_default() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.load_state().unwrap(), StoredState::default());

        db.conn()
            .execute(
                "INSERT INTO app_state (storage_key, json, updated_at) VALUES (?1, '{not json', 'x')",
                params![STORAGE_KEY],
            )
            .unwrap();
        assert_eq!(db.load_state().unwrap(), StoredState::default());
    }

    #[test]
    fn test_legacy_keys_merged_then_removed() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = Database::open_in(dir.path()).unwrap();
            put_raw(
                &db,
                STORAGE_KEY,
                json!({ "userName": "Alex", "pastRounds": [{ "id": "round_2" }] }),
            );
            put_raw(
                &db,
                "golf_master_pro_v2",
                json!({
                    "userName": "Old name",
                    "golferId": "GF-LEGACY01",
                    "pastRounds": [{ "id": "round_1" }, { "id": "round_2", "courseName": "stale" }],
                    "friends": [{ "id": "GF-FRIEND01", "name": "Sam", "lastUpdated": 1, "rounds": [] }],
                    "bag": ["Putter"]
                }),
            );
        }

        let db = Database::open_in(dir.path()).unwrap();
        let state = db.load_state().unwrap();
        assert_eq!(state.user_name, "Alex");
        assert_eq!(state.golfer_id.as_deref(), Some("GF-LEGACY01"));
        let ids: Vec<_> = state.past_rounds.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["round_2", "round_1"]);
        assert_eq!(state.past_rounds[0].course_name, "");
        assert_eq!(state.friends[0].id, GolferId::parse("GF-FRIEND01").unwrap());
        assert_eq!(state.extra["bag"], json!(["Putter"]));
        assert!(!db.has_blob("golf_master_pro_v2").unwrap());
    }

    #[test]
    fn test_blob_from_older_build_survives_upgrade() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = Database::open_in(dir.path()).unwrap();
            put_raw(
                &db,
                "golf_master_pro_v2",
                json!({
                    "golferId": "GF-ORIGINAL",
                    "userName": "Alex",
                    "pastRounds": [
                        { "id": "round_2", "courseName": "Augusta", "totalScore": 80 },
                        { "id": "round_1", "courseName": "Pebble Beach", "totalScore": 84 }
                    ],
                    // added over the network: no lastUpdated
                    "friends": [{ "id": "GF-FRIEND01", "name": "Sam", "rounds": [] }]
                }),
            );
        }

        let db = Database::open_in(dir.path()).unwrap();
        let state = db.load_state().unwrap();
        assert_eq!(state.golfer_id.as_deref(), Some("GF-ORIGINAL"));
        assert_eq!(state.past_rounds.len(), 2);
        assert_eq!(state.friends.len(), 1);
        assert_eq!(state.friends[0].name, "Sam");
        assert_eq!(db.get_or_create_golfer_id().unwrap().as_str(), "GF-ORIGINAL");
        assert!(!db.has_blob("golf_master_pro_v2").unwrap());
    }

    #[test]
    fn test_bad_entries_are_dropped_one_by_one() {
        let db = Database::open_in_memory().unwrap();
        put_raw(
            &db,
            STORAGE_KEY,
            json!({
                "userName": 42,
                "pastRounds": [{ "id": "round_1" }, { "courseName": "no id" }, "junk"],
                "friends": [
                    { "id": "GF-FRIEND01", "name": "Sam" },
                    { "id": "bad id", "name": "Mallory" },
                    { "name": "nameless" }
                ],
                "language": "en"
            }),
        );

        let state = db.load_state().unwrap();
        assert_eq!(state.user_name, "");
        let rounds: Vec<_> = state.past_rounds.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(rounds, vec!["round_1"]);
        assert_eq!(state.friends.len(), 1);
        assert_eq!(state.friends[0].id.as_str(), "GF-FRIEND01");
        assert_eq!(state.extra["language"], "en");
    }

    #[test]
    fn test_unreadable_blobs_are_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = Database::open_in(dir.path()).unwrap();
            put_raw(&db, STORAGE_KEY, json!(42));
            put_raw(&db, "golf_master_pro_v1", json!("also not an object"));
        }

        let db = Database::open_in(dir.path()).unwrap();
        assert_eq!(db.load_state().unwrap(), StoredState::default());
        db.save_state(&StoredState {
            user_name: "Alex".into(),
            ..StoredState::default()
        })
        .unwrap();

        let kept: String = db
            .conn()
            .query_row(
                "SELECT json FROM app_state WHERE storage_key = ?1",
                params![UNREADABLE_STORAGE_KEY],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(kept, "42");
        assert!(db.has_blob("golf_master_pro_v1").unwrap());
        assert_eq!(db.load_state().unwrap().user_name, "Alex");
    }

    #[test]
    fn test_deleted_round_stays_deleted_after_migration() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = Database::open_in(dir.path()).unwrap();
            put_raw(&db, "golf_master_pro_v1", json!({ "pastRounds": [{ "id": "round_1" }] }));
        }
        {
            let db = Database::open_in(dir.path()).unwrap();
            let mut state = db.load_state().unwrap();
            assert_eq!(state.past_rounds.len(), 1);
            assert_eq!(state.past_rounds[0].id, "round_1");
            state.past_rounds.clear();
            db.save_state(&state).unwrap();
        }

        let db = Database::open_in(dir.path()).unwrap();
        assert!(db.load_state().unwrap().past_rounds.is_empty());
    }
}
