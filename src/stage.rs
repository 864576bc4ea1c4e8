//! Transform stages and the step abstraction shared by every pipeline node.
//!
//! A [`Stage`] selects files with one glob under one base directory, hands
//! them to its [`Transform`], writes the results under one destination
//! directory, and (for styles, scripts, and pages) signals the reload
//! broadcaster once everything is on disk.
//!
//! ```text
//! base/pattern ──select──▶ SourceFile* ──transform──▶ OutputFile* ──claim+write──▶ dest/
//!                                                                      │
//!                                                                      ▼
//!                                                             broadcast(kind.reload())
//! ```
//!
//! Every write is claimed in the [`OutputLedger`] first, so two stages that
//! would write the same file fail with [`StageError::DestinationConflict`]
//! instead of overwriting each other.
//!
//! Progress is reported as [`StageEvent`]s over an optional channel; the CLI
//! drains it on a printer thread (see [`crate::output`]).

use crate::clean::CleanError;
use crate::ledger::OutputLedger;
use crate::reload::{NoReload, ReloadBroadcaster};
use crate::rewrite::RewriteError;
use crate::select::select_files;
use crate::transform::{SourceFile, Transform, TransformError};
use crate::types::AssetKind;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{stage}: {source}")]
    Transform {
        stage: String,
        #[source]
        source: TransformError,
    },
    #[error("{intruder} tried to write {}, which belongs to {owner}", .path.display())]
    DestinationConflict {
        path: PathBuf,
        owner: String,
        intruder: String,
    },
    #[error(transparent)]
    Rewrite(#[from] RewriteError),
    #[error(transparent)]
    Clean(#[from] CleanError),
}

/// Progress reported while steps run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    Started {
        step: String,
    },
    Wrote {
        step: String,
        path: PathBuf,
    },
    Finished {
        step: String,
        files: usize,
        elapsed: Duration,
    },
    Failed {
        step: String,
        message: String,
    },
}

/// What one successful step run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Paths written (or, for clean, removed).
    pub files: Vec<PathBuf>,
}

/// Shared state for one build or one development session.
pub struct BuildContext {
    pub broadcaster: Arc<dyn ReloadBroadcaster>,
    pub ledger: Arc<OutputLedger>,
    events: Option<Sender<StageEvent>>,
}

impl BuildContext {
    pub fn new(broadcaster: Arc<dyn ReloadBroadcaster>, ledger: Arc<OutputLedger>) -> Self {
        Self {
            broadcaster,
            ledger,
            events: None,
        }
    }

    /// A context for release builds: no reload hub, a fresh ledger.
    pub fn release() -> Self {
        Self::new(Arc::new(NoReload), Arc::new(OutputLedger::new()))
    }

    pub fn with_events(mut self, events: Sender<StageEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn emit(&self, event: StageEvent) {
        if let Some(tx) = &self.events {
            // A closed channel only means nobody is printing.
            let _ = tx.send(event);
        }
    }

    /// Claim `path` for `owner`, create its parent, and write `contents`.
    pub fn write(&self, owner: &str, path: &Path, contents: &[u8]) -> Result<(), StageError> {
        self.ledger
            .claim(path, owner)
            .map_err(|existing| StageError::DestinationConflict {
                path: path.to_path_buf(),
                owner: existing,
                intruder: owner.to_string(),
            })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        tracing::debug!(step = owner, path = %path.display(), bytes = contents.len(), "wrote");
        self.emit(StageEvent::Wrote {
            step: owner.to_string(),
            path: path.to_path_buf(),
        });
        Ok(())
    }

    /// Run `body` between `Started` and `Finished`/`Failed` events.
    pub fn reported(
        &self,
        step: &str,
        body: impl FnOnce() -> Result<StepReport, StageError>,
    ) -> Result<StepReport, StageError> {
        self.emit(StageEvent::Started {
            step: step.to_string(),
        });
        let started = Instant::now();
        let result = body();
        match &result {
            Ok(report) => self.emit(StageEvent::Finished {
                step: step.to_string(),
                files: report.files.len(),
                elapsed: started.elapsed(),
            }),
            Err(e) => self.emit(StageEvent::Failed {
                step: step.to_string(),
                message: e.to_string(),
            }),
        }
        result
    }
}

/// A leaf of a [`Pipeline`](crate::pipeline::Pipeline).
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, ctx: &BuildContext) -> Result<StepReport, StageError>;
}

/// One asset category's select → transform → write unit.
pub struct Stage {
    name: String,
    kind: AssetKind,
    base: PathBuf,
    pattern: String,
    dest: PathBuf,
    transform: Arc<dyn Transform>,
}

impl Stage {
    pub fn new(
        kind: AssetKind,
        base: impl Into<PathBuf>,
        pattern: impl Into<String>,
        dest: impl Into<PathBuf>,
        transform: Arc<dyn Transform>,
    ) -> Self {
        Self {
            name: kind.name().to_string(),
            kind,
            base: base.into(),
            pattern: pattern.into(),
            dest: dest.into(),
            transform,
        }
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    fn read_sources(&self) -> Result<Vec<SourceFile>, StageError> {
        select_files(&self.base, &self.pattern)?
            .into_iter()
            .map(|path| {
                let contents = fs::read(&path)?;
                let relative = path.strip_prefix(&self.base).unwrap_or(&path).to_path_buf();
                Ok(SourceFile {
                    path,
                    relative,
                    contents,
                })
            })
            .collect()
    }

    fn execute(&self, ctx: &BuildContext) -> Result<StepReport, StageError> {
        let sources = self.read_sources()?;
        tracing::debug!(
            stage = %self.name,
            transform = self.transform.name(),
            inputs = sources.len(),
            "transforming"
        );
        let outputs = self
            .transform
            .apply(sources)
            .map_err(|source| StageError::Transform {
                stage: self.name.clone(),
                source,
            })?;

        let mut report = StepReport::default();
        for output in &outputs {
            let target = self.dest.join(&output.relative);
            ctx.write(&self.name, &target, &output.contents)?;
            report.files.push(target);
        }

        if let Some(kind) = self.kind.reload() {
            ctx.broadcaster.broadcast(kind);
        }
        Ok(report)
    }
}

impl Step for Stage {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &BuildContext) -> Result<StepReport, StageError> {
        ctx.reported(&self.name, || self.execute(ctx))
    }
}
