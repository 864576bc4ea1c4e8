//! Shared test utilities for the pagesmith test suite.
//!
//! Provides a fixture project builder, a broadcaster that records what it
//! was told, and mock transforms that count calls or always fail.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_project();
//! let hub = Arc::new(RecordingBroadcaster::default());
//! // ... run a stage with a context built on `hub` ...
//! assert_eq!(hub.kinds(), vec![ReloadKind::Styles]);
//! ```

use crate::reload::ReloadBroadcaster;
use crate::transform::{OutputFile, SourceFile, Transform, TransformError};
use crate::types::ReloadKind;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

// =========================================================================
// Fixture setup
// =========================================================================

/// Write `contents` to `root/relative`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

/// A small project using the default layout: one stylesheet, one script,
/// one page with a partial, and one public file.
pub fn setup_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write_file(root, "src/assets/styles/main.scss", "body{color:red}\nh1,h2{margin:0}\n");
    write_file(root, "src/assets/scripts/main.js", "// entry\nvar answer = 40 + 2;\n");
    write_file(root, "src/partials/footer.html", "<footer>{{site.name}}</footer>");
    write_file(
        root,
        "src/index.html",
        "<!DOCTYPE html>\n<html>\n<head>\n  <title>{{site.name}}</title>\n  <!-- build:css assets/styles/site.css -->\n  <link rel=\"stylesheet\" href=\"assets/styles/main.css\">\n  <!-- endbuild -->\n</head>\n<body>\n  <h1>{{site.name}}</h1>\n  {{> footer}}\n  <!-- build:js assets/scripts/site.js -->\n  <script src=\"assets/scripts/main.js\"></script>\n  <!-- endbuild -->\n</body>\n</html>\n",
    );
    write_file(root, "public/robots.txt", "User-agent: *\n");
    write_file(
        root,
        "pages.config.toml",
        "[data.site]\nname = \"Fixture\"\n",
    );
    tmp
}

// =========================================================================
// Mocks
// =========================================================================

/// Broadcaster that records every reload it receives.
#[derive(Debug, Default)]
pub struct RecordingBroadcaster {
    pub received: Mutex<Vec<ReloadKind>>,
}

impl RecordingBroadcaster {
    pub fn kinds(&self) -> Vec<ReloadKind> {
        self.received.lock().unwrap().clone()
    }
}

impl ReloadBroadcaster for RecordingBroadcaster {
    fn broadcast(&self, kind: ReloadKind) {
        self.received.lock().unwrap().push(kind);
    }
}

/// Copies files through unchanged and counts how often it was applied.
#[derive(Debug, Default)]
pub struct CountingTransform {
    pub calls: AtomicUsize,
}

impl Transform for CountingTransform {
    fn name(&self) -> &str {
        "counting"
    }

    fn apply(&self, files: Vec<SourceFile>) -> Result<Vec<OutputFile>, TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(files
            .into_iter()
            .map(|f| OutputFile::new(f.relative, f.contents))
            .collect())
    }
}

/// Rejects its first input file, or fails with an IO error when given none.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingTransform;

impl Transform for FailingTransform {
    fn name(&self) -> &str {
        "failing"
    }

    fn apply(&self, files: Vec<SourceFile>) -> Result<Vec<OutputFile>, TransformError> {
        match files.first() {
            Some(file) => Err(TransformError::invalid(&file.path, "rejected by test")),
            None => Err(TransformError::Io(std::io::Error::other("no input"))),
        }
    }
}
