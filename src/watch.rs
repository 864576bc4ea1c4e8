//! Watch/reload orchestration for `develop`.
//!
//! ## Bindings
//!
//! | Binding | Watches | On change |
//! |---|---|---|
//! | `style` | `src/<paths.styles>` | re-run the style stage |
//! | `script` | `src/<paths.scripts>` | re-run the script stage |
//! | `page` | `src/<paths.pages>`, `src/<paths.partials>` | re-run the page stage |
//! | `assets` | `src/<paths.images>`, `src/<paths.fonts>`, everything in `public/` | full reload only |
//!
//! Images, fonts, and public files are served straight from where they live
//! during development, so they only need a browser reload.
//!
//! ## States
//!
//! ```text
//! Idle ──start()──▶ Dispatching ──compile ok──▶ Watching ◀──┐
//!   ▲                   │                          │        │
//!   └── compile failed ─┘                   change │        │ done
//!                                                  ▼        │
//!                                             Dispatching ──┘
//! ```
//!
//! File-system events are debounced, then routed to every binding whose
//! patterns match. Only settled events count: the debouncer also reports a
//! path that is still being written, and that path arrives again once it
//! settles. Each binding has one worker thread; triggers that pile up
//! while it is busy collapse into a single re-run, so a binding never runs
//! concurrently with itself. Different bindings run independently.
//!
//! A failed re-run is logged and the orchestrator keeps watching.

use crate::config::{Layout, ProjectConfig};
use crate::pipeline::{Pipeline, PipelineError, PipelineReport, StageSet};
use crate::select;
use crate::stage::{BuildContext, StageError, Step};
use crate::types::ReloadKind;
use glob::Pattern;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{
    DebounceEventResult, DebouncedEvent, DebouncedEventKind, Debouncer, new_debouncer,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("failed to start file watcher: {0}")]
    Init(#[source] notify::Error),
    #[error("failed to watch {}: {source}", .path.display())]
    Path {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error("bad watch pattern: {0}")]
    Pattern(#[from] std::io::Error),
    #[error("initial compile failed: {0}")]
    Compile(#[from] PipelineError),
    #[error("file watcher stopped")]
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching,
    Dispatching,
}

/// What a binding does when one of its files changes.
pub enum BindingAction {
    Run(Arc<dyn Step>),
    Reload(ReloadKind),
}

struct WatchTarget {
    base: PathBuf,
    canonical: Option<PathBuf>,
    pattern: Pattern,
}

/// Patterns under base directories, bound to one action.
pub struct WatchBinding {
    name: String,
    targets: Vec<WatchTarget>,
    action: BindingAction,
}

impl WatchBinding {
    pub fn new(
        name: impl Into<String>,
        targets: &[(&Path, &str)],
        action: BindingAction,
    ) -> std::io::Result<Self> {
        let targets = targets
            .iter()
            .map(|(base, pattern)| {
                Ok(WatchTarget {
                    base: base.to_path_buf(),
                    canonical: base.canonicalize().ok(),
                    pattern: select::compile(pattern)?,
                })
            })
            .collect::<std::io::Result<_>>()?;
        Ok(Self {
            name: name.into(),
            targets,
            action,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a changed path falls under any of this binding's patterns.
    pub fn matches(&self, path: &Path) -> bool {
        self.targets.iter().any(|t| {
            select::matches(&t.base, &t.pattern, path)
                || t.canonical
                    .as_deref()
                    .is_some_and(|c| path.is_absolute() && select::matches(c, &t.pattern, path))
        })
    }

    /// Base directories to hand to the file watcher.
    pub fn bases(&self) -> impl Iterator<Item = &Path> {
        self.targets.iter().map(|t| t.base.as_path())
    }
}

/// The four standing bindings of a project.
pub fn bindings(
    config: &ProjectConfig,
    layout: &Layout,
    stages: &StageSet,
) -> Result<Vec<WatchBinding>, WatchError> {
    let paths = &config.build.paths;
    let src = layout.src.as_path();
    Ok(vec![
        WatchBinding::new(
            "style",
            &[(src, paths.styles.as_str())],
            BindingAction::Run(stages.style.clone()),
        )?,
        WatchBinding::new(
            "script",
            &[(src, paths.scripts.as_str())],
            BindingAction::Run(stages.script.clone()),
        )?,
        WatchBinding::new(
            "page",
            &[(src, paths.pages.as_str()), (src, paths.partials.as_str())],
            BindingAction::Run(stages.page.clone()),
        )?,
        WatchBinding::new(
            "assets",
            &[
                (src, paths.images.as_str()),
                (src, paths.fonts.as_str()),
                (layout.public.as_path(), "**"),
            ],
            BindingAction::Reload(ReloadKind::Full),
        )?,
    ])
}

/// Result of running one binding.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub binding: String,
    pub result: Result<(), StageError>,
}

pub struct Orchestrator {
    bindings: Vec<WatchBinding>,
    ctx: Arc<BuildContext>,
    started: AtomicBool,
    active: AtomicUsize,
}

impl Orchestrator {
    pub fn new(bindings: Vec<WatchBinding>, ctx: Arc<BuildContext>) -> Self {
        Self {
            bindings,
            ctx,
            started: AtomicBool::new(false),
            active: AtomicUsize::new(0),
        }
    }

    pub fn state(&self) -> WatchState {
        if !self.started.load(Ordering::SeqCst) {
            WatchState::Idle
        } else if self.active.load(Ordering::SeqCst) > 0 {
            WatchState::Dispatching
        } else {
            WatchState::Watching
        }
    }

    pub fn bindings(&self) -> &[WatchBinding] {
        &self.bindings
    }

    /// Run the initial compile. On success the orchestrator is watching.
    pub fn start(&self, compile: &Pipeline) -> Result<PipelineReport, WatchError> {
        self.started.store(true, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        let result = compile.run(&self.ctx);
        self.active.fetch_sub(1, Ordering::SeqCst);
        if result.is_err() {
            self.started.store(false, Ordering::SeqCst);
        }
        Ok(result?)
    }

    /// Indices of the bindings matching any of `paths`.
    pub fn matching(&self, paths: &[PathBuf]) -> Vec<usize> {
        self.bindings
            .iter()
            .enumerate()
            .filter(|(_, b)| paths.iter().any(|p| b.matches(p)))
            .map(|(i, _)| i)
            .collect()
    }

    fn run_binding(&self, index: usize) -> DispatchOutcome {
        let binding = &self.bindings[index];
        self.active.fetch_add(1, Ordering::SeqCst);
        let result = match &binding.action {
            BindingAction::Run(step) => step.run(&self.ctx).map(|_| ()),
            BindingAction::Reload(kind) => {
                self.ctx.broadcaster.broadcast(*kind);
                Ok(())
            }
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        if let Err(error) = &result {
            tracing::error!(binding = %binding.name, %error, "rebuild failed, still watching");
        }
        DispatchOutcome {
            binding: binding.name.clone(),
            result,
        }
    }

    /// Run every binding matched by one batch of changes, each once.
    ///
    /// Goes through the same workers as [`Orchestrator::watch`] and returns
    /// once they are done.
    pub fn dispatch(self: &Arc<Self>, paths: &[PathBuf]) -> Vec<DispatchOutcome> {
        let (events_tx, events_rx) = mpsc::channel();
        let batch = paths
            .iter()
            .map(|path| DebouncedEvent {
                path: path.clone(),
                kind: DebouncedEventKind::Any,
            })
            .collect();
        // The receiver is still in scope, so this cannot fail.
        let _ = events_tx.send(Ok(batch));
        drop(events_tx);

        let (outcomes_tx, outcomes_rx) = mpsc::channel();
        self.process(events_rx, Some(outcomes_tx));
        outcomes_rx.into_iter().collect()
    }

    /// One worker thread per binding; returns the trigger and handle for each.
    fn spawn_workers(
        self: &Arc<Self>,
        outcomes: Option<Sender<DispatchOutcome>>,
    ) -> Vec<(Sender<()>, JoinHandle<()>)> {
        (0..self.bindings.len())
            .map(|index| {
                let (tx, rx) = mpsc::channel();
                let orchestrator = Arc::clone(self);
                let outcomes = outcomes.clone();
                let handle = std::thread::spawn(move || {
                    drain_and_run(&rx, || {
                        let outcome = orchestrator.run_binding(index);
                        if let Some(outcomes) = &outcomes {
                            let _ = outcomes.send(outcome);
                        }
                    })
                });
                (tx, handle)
            })
            .collect()
    }

    /// Route debounced batches to binding workers until `events` closes,
    /// then wait for the workers to finish. Each finished run is sent to
    /// `outcomes` when given.
    pub fn process(
        self: &Arc<Self>,
        events: Receiver<DebounceEventResult>,
        outcomes: Option<Sender<DispatchOutcome>>,
    ) {
        let (triggers, workers): (Vec<_>, Vec<_>) =
            self.spawn_workers(outcomes).into_iter().unzip();
        for batch in events {
            match batch {
                Ok(events) => {
                    for index in self.matching(&settled_paths(events)) {
                        tracing::debug!(binding = %self.bindings[index].name, "change detected");
                        // A worker only exits when its trigger is dropped.
                        let _ = triggers[index].send(());
                    }
                }
                Err(error) => tracing::warn!(%error, "watch error, continuing"),
            }
        }
        drop(triggers);
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("watch worker panicked");
            }
        }
    }

    /// A debounced watcher over every directory in `roots`, and the channel
    /// its batches arrive on. Watching stops when the debouncer is dropped.
    pub fn watcher(
        roots: &[PathBuf],
        debounce: Duration,
    ) -> Result<(Debouncer<RecommendedWatcher>, Receiver<DebounceEventResult>), WatchError> {
        let (tx, rx) = mpsc::channel();
        let mut debouncer = new_debouncer(debounce, tx).map_err(WatchError::Init)?;
        for root in roots.iter().filter(|r| r.is_dir()) {
            debouncer
                .watcher()
                .watch(root, RecursiveMode::Recursive)
                .map_err(|source| WatchError::Path {
                    path: root.clone(),
                    source,
                })?;
            tracing::info!(path = %root.display(), "watching");
        }
        Ok((debouncer, rx))
    }

    /// Watch `roots` until the watcher fails. Blocks the calling thread.
    pub fn watch(self: &Arc<Self>, roots: &[PathBuf], debounce: Duration) -> Result<(), WatchError> {
        let (_debouncer, events) = Self::watcher(roots, debounce)?;
        self.process(events, None);
        Err(WatchError::Disconnected)
    }
}

/// Paths from a debounced batch whose writes have settled.
///
/// `AnyContinuous` marks a file still being written; the same path is
/// reported again as `Any` once it goes quiet.
pub fn settled_paths(events: Vec<DebouncedEvent>) -> Vec<PathBuf> {
    events
        .into_iter()
        .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
        .map(|e| e.path)
        .collect()
}

/// Wait for a trigger, swallow any that queued up behind it, run once.
fn drain_and_run(rx: &Receiver<()>, mut run: impl FnMut()) {
    while rx.recv().is_ok() {
        while rx.try_recv().is_ok() {}
        run();
    }
}
