//! Removal of previous build output.
//!
//! Clean deletes the final and intermediate directories and nothing else.
//! A directory that is already gone counts as cleaned, so running clean
//! twice is the same as running it once.
//!
//! As a guard against a misconfigured `build.dist = "."` and the like, a
//! target that is the project root, or that contains the source or public
//! directory, is refused.

use crate::config::Layout;
use crate::stage::{BuildContext, StageError, Step, StepReport};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CleanError {
    #[error("failed to remove {}: {source}", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("refusing to remove {}: it contains {}", .path.display(), .protected.display())]
    Protected { path: PathBuf, protected: PathBuf },
}

/// Remove `path` recursively. Returns whether anything was there.
pub fn remove_dir_if_exists(path: &Path) -> Result<bool, CleanError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(CleanError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// The clean step: removes `dist` and `temp`.
#[derive(Debug, Clone)]
pub struct Clean {
    targets: Vec<PathBuf>,
    protected: Vec<PathBuf>,
}

impl Clean {
    pub fn new(layout: &Layout) -> Self {
        Self {
            targets: vec![layout.dist.clone(), layout.temp.clone()],
            protected: vec![layout.root.clone(), layout.src.clone(), layout.public.clone()],
        }
    }

    pub fn targets(&self) -> &[PathBuf] {
        &self.targets
    }

    fn check(&self, target: &Path) -> Result<(), CleanError> {
        match self.protected.iter().find(|p| p.starts_with(target)) {
            Some(protected) => Err(CleanError::Protected {
                path: target.to_path_buf(),
                protected: protected.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Remove every target, returning the ones that existed.
    pub fn clean(&self) -> Result<Vec<PathBuf>, CleanError> {
        for target in &self.targets {
            self.check(target)?;
        }
        let mut removed = Vec::new();
        for target in &self.targets {
            if remove_dir_if_exists(target)? {
                tracing::debug!(path = %target.display(), "removed");
                removed.push(target.clone());
            }
        }
        Ok(removed)
    }
}

impl Step for Clean {
    fn name(&self) -> &str {
        "clean"
    }

    fn run(&self, ctx: &BuildContext) -> Result<StepReport, StageError> {
        ctx.reported("clean", || {
            Ok(StepReport {
                files: self.clean()?,
            })
        })
    }
}
