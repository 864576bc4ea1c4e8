//! Page rendering with Handlebars.
//!
//! Every run builds a fresh registry in dev mode, so edits to partials show
//! up on the next render without a restart. Partials are registered under
//! their file stem: `partials/header.html` is `{{> header}}`.
//!
//! The configured `data` table is the template root, so `[data.site]` with
//! `name = "Example"` is available as `{{site.name}}`.

use super::{OutputFile, SourceFile, Transform, TransformError};
use crate::config::{Layout, ProjectConfig};
use crate::select::select_files;
use handlebars::Handlebars;
use std::fs;
use std::path::PathBuf;

pub struct PageTransform {
    data: toml::Table,
    partials_base: PathBuf,
    partials_pattern: String,
}

impl PageTransform {
    pub fn new(data: toml::Table, partials_base: PathBuf, partials_pattern: String) -> Self {
        Self {
            data,
            partials_base,
            partials_pattern,
        }
    }

    pub fn from_config(config: &ProjectConfig, layout: &Layout) -> Self {
        Self::new(
            config.data.clone(),
            layout.src.clone(),
            config.build.paths.partials.clone(),
        )
    }

    fn registry(&self) -> Result<Handlebars<'static>, TransformError> {
        let mut registry = Handlebars::new();
        registry.set_dev_mode(true);
        for path in select_files(&self.partials_base, &self.partials_pattern)? {
            let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            let template = fs::read_to_string(&path)?;
            registry
                .register_partial(&name, template)
                .map_err(|e| TransformError::invalid(&path, e.to_string()))?;
        }
        Ok(registry)
    }
}

impl Transform for PageTransform {
    fn name(&self) -> &str {
        "handlebars"
    }

    fn apply(&self, files: Vec<SourceFile>) -> Result<Vec<OutputFile>, TransformError> {
        let registry = self.registry()?;
        files
            .iter()
            .map(|file| {
                let html = registry
                    .render_template(file.text()?, &self.data)
                    .map_err(|e| TransformError::invalid(&file.path, e.to_string()))?;
                Ok(OutputFile::new(file.relative.clone(), html))
            })
            .collect()
    }
}
