//! Snapshot stored as one pretty-printed JSON object, URL → article.
//!
//! Saves go to a temporary file in the same directory which is then renamed
//! over the target, so an interrupted save leaves the previous file intact.

use super::{SnapshotStore, StoreError};
use crate::models::Snapshot;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl SnapshotStore for JsonStore {
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    fn load(&self) -> Result<Snapshot, StoreError> {
        if !self.path.exists() {
            info!("No snapshot file yet");
            return Ok(Snapshot::new());
        }
        let text = fs::read_to_string(&self.path)?;
        let snapshot: Snapshot = serde_json::from_str(&text)?;
        info!(count = snapshot.len(), "Loaded snapshot");
        Ok(snapshot)
    }

    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), count = snapshot.len()))]
    fn save(&mut self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let dir = self.dir();
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, snapshot)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        debug!("Renamed temporary file over snapshot");
        info!("Saved snapshot");
        Ok(())
    }
}
