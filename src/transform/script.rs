//! Script preparation.
//!
//! Scripts are shipped as authored. The transform strips a UTF-8 byte order
//! mark and normalises line endings so concatenated bundles are clean.
//! A transpiler slots in by implementing [`Transform`] for the scripts stage.

use super::{OutputFile, SourceFile, Transform, TransformError};

#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptTransform;

/// Remove a leading BOM and convert CRLF/CR line endings to LF.
pub fn normalize(source: &str) -> String {
    source
        .strip_prefix('\u{feff}')
        .unwrap_or(source)
        .replace("\r\n", "\n")
        .replace('\r', "\n")
}

impl Transform for ScriptTransform {
    fn name(&self) -> &str {
        "js"
    }

    fn apply(&self, files: Vec<SourceFile>) -> Result<Vec<OutputFile>, TransformError> {
        files
            .iter()
            .map(|file| Ok(OutputFile::new(file.relative.clone(), normalize(file.text()?))))
            .collect()
    }
}
