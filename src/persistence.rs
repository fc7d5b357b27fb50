//! Persistence: save and load the order store to a JSON file.
//! Enables recovery after restart: every order (filled or resting) and the next id are restored.

use crate::error::PersistenceError;
use crate::types::Order;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Full persisted state of the order store.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PersistedState {
    /// All orders in insertion order.
    pub orders: Vec<Order>,
    pub next_id: u64,
}

/// File-based persistence: one JSON file, replaced atomically on every commit.
#[derive(Clone, Debug)]
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save state to file. Writes a sibling temp file and renames it over the old snapshot,
    /// so a crash leaves either the previous or the new state on disk.
    pub fn save(&self, state: &PersistedState) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(state)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Load state from file. Returns None if the file does not exist.
    pub fn load(&self) -> Result<Option<PersistedState>, PersistenceError> {
        let data = match fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state: PersistedState = serde_json::from_str(&data)?;
        Ok(Some(state))
    }
}
