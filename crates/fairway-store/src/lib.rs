//! # fairway-store
//!
//! Local persistence for a Fairway node, backed by SQLite.
//!
//! The app state lives in a single versioned JSON blob keyed by
//! `golf_master_pro_v3`; the local golfer id is additionally pinned in its
//! own table so it survives a reset of the blob. The crate exposes a
//! synchronous `Database` handle wrapping a `rusqlite::Connection`.

pub mod database;
pub mod identity;
pub mod migrations;
pub mod state;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use state::StoredState;
