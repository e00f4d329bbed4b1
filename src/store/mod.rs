//! Snapshot persistence.
//!
//! A store holds exactly one snapshot: the state recorded at the end of the
//! previous run. It is read once when a run starts and written once when it
//! ends, so no locking is done here; overlapping runs against the same store
//! must be prevented by the scheduler.
//!
//! | Location | Module | Semantics |
//! |----------|--------|-----------|
//! | `json:<path>` | [`json`] | Whole file replaced atomically on save |
//! | `sqlite:<path>` | [`sqlite`] | Rows never deleted; absent URLs are marked removed |

pub mod json;
pub mod sqlite;

use crate::config::StoreLocation;
use crate::models::Snapshot;
use thiserror::Error;

pub use json::JsonStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("malformed timestamp {0:?}")]
    Timestamp(String),
}

/// Load-all and replace-all access to the last recorded snapshot.
pub trait SnapshotStore {
    /// The last saved snapshot, or an empty one if nothing was saved yet.
    fn load(&self) -> Result<Snapshot, StoreError>;

    /// Record `snapshot` as the current state. Saving the same snapshot twice
    /// leaves the stored content unchanged.
    fn save(&mut self, snapshot: &Snapshot) -> Result<(), StoreError>;
}

/// Open the store described by `location`, creating it if needed.
pub fn open(location: &StoreLocation) -> Result<Box<dyn SnapshotStore>, StoreError> {
    Ok(match location {
        StoreLocation::Json(path) => Box::new(JsonStore::new(path.clone())),
        StoreLocation::Sqlite(path) => Box::new(SqliteStore::open(path)?),
    })
}
