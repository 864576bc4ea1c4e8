//! CLI output formatting for builds, watch sessions, and the dev server.
//!
//! # Step-Tagged Lines
//!
//! Steps in a parallel group run at the same time, so their progress lines
//! interleave. Every line therefore starts with the step it belongs to, and
//! paths are shown relative to the project root:
//!
//! ```text
//! [clean] started
//! [clean] 2 paths in 3 ms
//! [style] started
//! [image] started
//! [style] temp/assets/styles/main.css
//! [style] 1 file in 12 ms
//! [image] dist/assets/images/logo.png
//! [page] FAILED: page: src/index.html: ...
//! ```
//!
//! # Summaries
//!
//! ```text
//! Build complete: 8 steps, 12 files → dist
//! ```
//!
//! ```text
//! Build failed: 2 steps
//!     style: ...
//!     page: ...
//! ```
//!
//! # Architecture
//!
//! Each message has a `format_*` function (returns `Vec<String>`) for
//! testability and, where the CLI needs it, a `print_*` wrapper. Format
//! functions are pure: no I/O, no side effects. Stage events arrive over a
//! channel and are printed by [`spawn_printer`] on its own thread.

use crate::pipeline::{PipelineError, PipelineReport};
use crate::stage::StageEvent;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

// ============================================================================
// Shared helpers
// ============================================================================

/// `path` relative to `root` when it lies inside it, with `/` separators.
fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Human duration: milliseconds below ten seconds, seconds above.
fn format_duration(elapsed: Duration) -> String {
    let ms = elapsed.as_millis();
    if ms < 10_000 {
        format!("{ms} ms")
    } else {
        format!("{:.1} s", elapsed.as_secs_f64())
    }
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("1 {one}")
    } else {
        format!("{n} {many}")
    }
}

// ============================================================================
// Stage events
// ============================================================================

/// Format a single stage progress event as display lines.
pub fn format_stage_event(event: &StageEvent, root: &Path) -> Vec<String> {
    match event {
        StageEvent::Started { step } => vec![format!("[{step}] started")],
        StageEvent::Wrote { step, path } => {
            vec![format!("[{step}] {}", display_path(path, root))]
        }
        StageEvent::Finished {
            step,
            files,
            elapsed,
        } => {
            let noun = if step == "clean" {
                plural(*files, "path", "paths")
            } else {
                plural(*files, "file", "files")
            };
            vec![format!("[{step}] {noun} in {}", format_duration(*elapsed))]
        }
        StageEvent::Failed { step, message } => vec![format!("[{step}] FAILED: {message}")],
    }
}

/// Print stage events from a channel until every sender is dropped.
///
/// `Wrote` lines are only shown when `verbose` is set.
pub fn spawn_printer(root: PathBuf, verbose: bool) -> (Sender<StageEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<StageEvent>();
    let handle = std::thread::spawn(move || {
        for event in rx {
            if !verbose && matches!(event, StageEvent::Wrote { .. }) {
                continue;
            }
            for line in format_stage_event(&event, &root) {
                println!("{line}");
            }
        }
    });
    (tx, handle)
}

// ============================================================================
// Pipeline summaries
// ============================================================================

/// Format the summary of a successful pipeline run.
pub fn format_pipeline_report(label: &str, report: &PipelineReport, target: &str) -> Vec<String> {
    vec![format!(
        "{label} complete: {}, {} \u{2192} {target}",
        plural(report.steps.len(), "step", "steps"),
        plural(report.files_written(), "file", "files"),
    )]
}

pub fn print_pipeline_report(label: &str, report: &PipelineReport, target: &str) {
    for line in format_pipeline_report(label, report, target) {
        println!("{line}");
    }
}

/// Format a failed pipeline run: one header line, one line per failed step.
pub fn format_pipeline_error(label: &str, error: &PipelineError) -> Vec<String> {
    let failures = error.failures();
    let mut lines = vec![format!(
        "{label} failed: {}",
        plural(failures.len(), "step", "steps")
    )];
    for failure in failures {
        lines.push(format!("    {}: {}", failure.step, failure.error));
    }
    lines
}

pub fn print_pipeline_error(label: &str, error: &PipelineError) {
    for line in format_pipeline_error(label, error) {
        eprintln!("{line}");
    }
}

// ============================================================================
// Clean and develop
// ============================================================================

/// Format the result of `clean`.
pub fn format_clean_output(removed: &[PathBuf], root: &Path) -> Vec<String> {
    if removed.is_empty() {
        return vec!["Nothing to clean".to_string()];
    }
    removed
        .iter()
        .map(|p| format!("Removed {}", display_path(p, root)))
        .collect()
}

pub fn print_clean_output(removed: &[PathBuf], root: &Path) {
    for line in format_clean_output(removed, root) {
        println!("{line}");
    }
}

/// Format the banner shown once the dev server is listening.
pub fn format_serve_banner(url: &str, roots: &[PathBuf], root: &Path) -> Vec<String> {
    let mut lines = vec![format!("Serving on {url}")];
    let served: Vec<String> = roots.iter().map(|r| display_path(r, root)).collect();
    lines.push(format!("    Roots: {}", served.join(", ")));
    lines.push("    Watching for changes (Ctrl+C to stop)".to_string());
    lines
}

pub fn print_serve_banner(url: &str, roots: &[PathBuf], root: &Path) {
    for line in format_serve_banner(url, roots, root) {
        println!("{line}");
    }
}
