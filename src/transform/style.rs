//! Stylesheet compilation.
//!
//! Sources are compiled as SCSS with `grass`, then parsed with `lightningcss`
//! and printed back in expanded form, one declaration per line. Plain CSS is
//! valid SCSS, so `.css` sources go through unchanged apart from formatting.
//! The output keeps the source's relative path with a `.css` extension.
//!
//! Files whose name starts with `_` are partials: they are skipped here and
//! only reach the output through `@use` or `@import`, which resolve relative
//! to the importing file's directory.

use super::{OutputFile, SourceFile, Transform, TransformError};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use std::path::Path;

/// Compiles stylesheets into expanded CSS.
#[derive(Debug, Default, Clone, Copy)]
pub struct StyleTransform;

/// Compile SCSS, resolving imports against `dir`.
pub fn compile_scss(source: &str, dir: &Path) -> Result<String, String> {
    let options = grass::Options::default().load_path(dir);
    grass::from_string(source, &options).map_err(|e| e.to_string())
}

/// Parse `source` as CSS and print it expanded.
pub fn expand(source: &str, filename: &str) -> Result<String, String> {
    let options = ParserOptions {
        filename: filename.to_string(),
        ..ParserOptions::default()
    };
    let sheet = StyleSheet::parse(source, options).map_err(|e| e.to_string())?;
    let printed = sheet
        .to_css(PrinterOptions::default())
        .map_err(|e| e.to_string())?;
    Ok(printed.code)
}

fn is_partial(file: &SourceFile) -> bool {
    file.relative
        .file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('_'))
}

impl Transform for StyleTransform {
    fn name(&self) -> &str {
        "sass"
    }

    fn apply(&self, files: Vec<SourceFile>) -> Result<Vec<OutputFile>, TransformError> {
        files
            .iter()
            .filter(|file| !is_partial(file))
            .map(|file| {
                let dir = file.path.parent().unwrap_or(Path::new("."));
                let filename = file.relative.to_string_lossy();
                let css = compile_scss(file.text()?, dir)
                    .and_then(|css| expand(&css, &filename))
                    .map_err(|message| TransformError::invalid(&file.path, message))?;
                Ok(OutputFile::new(file.relative.with_extension("css"), css))
            })
            .collect()
    }
}
