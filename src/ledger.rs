//! Ownership of output paths.
//!
//! Stages running side by side must write disjoint files. Every write is
//! first claimed here; a claim on a path already owned by a different stage
//! is refused, so an overlap between two stages' destinations is reported as
//! an error instead of silently racing.
//!
//! A ledger lives for one build (`build`) or one whole session (`develop`).
//! Re-claiming a path by its current owner always succeeds, which is what
//! re-running a stage does.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct OutputLedger {
    owners: Mutex<HashMap<PathBuf, String>>,
}

impl OutputLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `owner` as the writer of `path`.
    ///
    /// Returns the existing owner when `path` already belongs to someone else.
    pub fn claim(&self, path: &Path, owner: &str) -> Result<(), String> {
        let mut owners = self.owners.lock().unwrap_or_else(|e| e.into_inner());
        match owners.get(path) {
            Some(existing) if existing != owner => Err(existing.clone()),
            Some(_) => Ok(()),
            None => {
                owners.insert(path.to_path_buf(), owner.to_string());
                Ok(())
            }
        }
    }

    pub fn owner_of(&self, path: &Path) -> Option<String> {
        self.owners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.owners.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
