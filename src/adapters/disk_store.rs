//! Local-filesystem persistence: one file per key.

use crate::domain::error::IncrementalError;
use crate::ports::persist_port::PersistStore;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Blobs live under `<persist_folder>/persist/<strategy_id>/<key>`.
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(persist_folder: &Path, strategy_id: &str) -> Self {
        let root = persist_folder.join("persist").join(strategy_id);
        if let Err(e) = fs::create_dir_all(&root) {
            // Surfaced again as a Storage error by the first store.
            warn!(path = %root.display(), error = %e, "could not create persist directory");
        }
        DiskStore { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, IncrementalError> {
        if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
            return Err(IncrementalError::storage(format!("invalid blob key {key:?}")));
        }
        Ok(self.root.join(key))
    }
}

impl PersistStore for DiskStore {
    fn store(&self, key: &str, value: &[u8]) -> Result<(), IncrementalError> {
        let path = self.path_for(key)?;
        let tmp = self.root.join(format!(".{key}.tmp"));

        fs::write(&tmp, value)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|e| {
                IncrementalError::storage(format!("failed to write {}: {e}", path.display()))
            })?;

        debug!(key, bytes = value.len(), "stored blob");
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, IncrementalError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(IncrementalError::storage(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }
}
