//! Asset transforms behind one trait.
//!
//! | Category | Transform | Effect | Crate |
//! |---|---|---|---|
//! | Styles | [`StyleTransform`] | compile SCSS, print expanded CSS | `grass`, `lightningcss` |
//! | Scripts | [`ScriptTransform`] | normalise encoding and line endings | |
//! | Pages | [`PageTransform`] | render templates with `data` | `handlebars` |
//! | Images, fonts | [`ImageTransform`] | lossless PNG recompression, SVG squeeze | `image` |
//! | Pass-through | [`Verbatim`] | copy | |
//!
//! The minifiers used when preparing final output live in [`minify`].
//!
//! A [`Transform`] is a pure function from source files to output files. It
//! never touches the destination directory; writing, ownership checks, and
//! reload signalling belong to [`Stage`](crate::stage::Stage).

pub mod image;
pub mod minify;
pub mod page;
pub mod script;
pub mod style;

pub use image::ImageTransform;
pub use page::PageTransform;
pub use script::ScriptTransform;
pub use style::StyleTransform;

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The source file is malformed for this transform.
    #[error("{}: {message}", .path.display())]
    Invalid { path: PathBuf, message: String },
}

impl TransformError {
    pub fn invalid(path: &Path, message: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// A file selected by a stage, read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Path relative to the stage's base directory. Preserved in the output.
    pub relative: PathBuf,
    pub contents: Vec<u8>,
}

impl SourceFile {
    /// Contents as UTF-8, or an `Invalid` error naming the file.
    pub fn text(&self) -> Result<&str, TransformError> {
        std::str::from_utf8(&self.contents)
            .map_err(|e| TransformError::invalid(&self.path, format!("not UTF-8: {e}")))
    }
}

/// A transform result, to be written under the stage's destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub relative: PathBuf,
    pub contents: Vec<u8>,
}

impl OutputFile {
    pub fn new(relative: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            relative: relative.into(),
            contents: contents.into(),
        }
    }
}

/// One external transformation, applied to every file a stage selects.
///
/// Implementations must be deterministic: the same input files produce the
/// same output files.
pub trait Transform: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, files: Vec<SourceFile>) -> Result<Vec<OutputFile>, TransformError>;
}

/// Copies files unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Verbatim;

impl Transform for Verbatim {
    fn name(&self) -> &str {
        "copy"
    }

    fn apply(&self, files: Vec<SourceFile>) -> Result<Vec<OutputFile>, TransformError> {
        Ok(files
            .into_iter()
            .map(|f| OutputFile::new(f.relative, f.contents))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(relative: &str, contents: &[u8]) -> SourceFile {
        SourceFile {
            path: Path::new("/src").join(relative),
            relative: relative.into(),
            contents: contents.to_vec(),
        }
    }

    #[test]
    fn verbatim_preserves_paths_and_bytes() {
        let out = Verbatim
            .apply(vec![source("a/b.txt", b"hello"), source("c.bin", &[0, 1, 2])])
            .unwrap();
        assert_eq!(out[0], OutputFile::new("a/b.txt", b"hello".to_vec()));
        assert_eq!(out[1], OutputFile::new("c.bin", vec![0, 1, 2]));
    }

    #[test]
    fn text_rejects_invalid_utf8() {
        let file = source("bad.css", &[0xff, 0xfe, 0x00]);
        let err = file.text().unwrap_err();
        assert!(err.to_string().contains("bad.css"));
    }
}
