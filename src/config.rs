//! Project configuration module.
//!
//! Handles loading and merging `pages.config.toml`. Stock defaults are the
//! base layer; an optional override file in the project root replaces whole
//! top-level sections.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [build]
//! src = "src"               # Source tree
//! dist = "dist"             # Final, distributable output
//! temp = "temp"             # Intermediate output (pending reference rewriting)
//! public = "public"         # Pass-through files, copied verbatim
//!
//! [build.paths]             # Globs, relative to `src`
//! styles = "assets/styles/*.scss"
//! scripts = "assets/scripts/*.js"
//! pages = "*.html"
//! images = "assets/images/**"
//! fonts = "assets/fonts/**"
//! partials = "partials/**/*.html"
//!
//! [serve]
//! host = "127.0.0.1"
//! port = 2080
//!
//! [watch]
//! debounce_ms = 100
//!
//! [data]                    # Anything; handed to page templates as-is
//! ```
//!
//! ## Shallow Merge
//!
//! Overrides are merged per top-level key: an override that names `[build]`
//! replaces the whole default `build` table. Fields it leaves out are filled
//! from the stock defaults when the merged table is deserialized, so no path
//! ever ends up empty. Unknown keys are ignored.
//!
//! ## Best-Effort Loading
//!
//! A missing, unreadable, malformed, or invalid override never fails the
//! build. [`resolve`] falls back to the defaults and records why in
//! [`ConfigSource::Defaults`], so callers (and tests) can tell which branch
//! was taken.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the override file looked up in the project root.
pub const CONFIG_FILENAME: &str = "pages.config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Effective project configuration.
///
/// Built once at startup by [`resolve`] and passed by reference into every
/// component. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Directory layout and asset globs.
    pub build: BuildConfig,
    /// Development server address.
    pub serve: ServeConfig,
    /// File watching settings.
    pub watch: WatchConfig,
    /// Arbitrary payload passed to page templates.
    pub data: toml::Table,
}

/// Directory layout and per-category glob patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub src: String,
    pub dist: String,
    pub temp: String,
    pub public: String,
    pub paths: PathsConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            src: "src".to_string(),
            dist: "dist".to_string(),
            temp: "temp".to_string(),
            public: "public".to_string(),
            paths: PathsConfig::default(),
        }
    }
}

/// Glob pattern per asset category, evaluated relative to `build.src`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub styles: String,
    pub scripts: String,
    pub pages: String,
    pub images: String,
    pub fonts: String,
    /// Handlebars partials, registered by name (file stem) for every page render.
    pub partials: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            styles: "assets/styles/*.scss".to_string(),
            scripts: "assets/scripts/*.js".to_string(),
            pages: "*.html".to_string(),
            images: "assets/images/**".to_string(),
            fonts: "assets/fonts/**".to_string(),
            partials: "partials/**/*.html".to_string(),
        }
    }
}

/// Development server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 2080,
        }
    }
}

impl ServeConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// File watching settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period before a burst of file-system events is delivered.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}

impl ProjectConfig {
    /// Check that every directory and glob is non-empty and the port is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.build;
        let p = &b.paths;
        let fields = [
            ("build.src", &b.src),
            ("build.dist", &b.dist),
            ("build.temp", &b.temp),
            ("build.public", &b.public),
            ("build.paths.styles", &p.styles),
            ("build.paths.scripts", &p.scripts),
            ("build.paths.pages", &p.pages),
            ("build.paths.images", &p.images),
            ("build.paths.fonts", &p.fonts),
            ("build.paths.partials", &p.partials),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{name} must not be empty")));
            }
        }
        if self.serve.port == 0 {
            return Err(ConfigError::Validation("serve.port must be non-zero".into()));
        }
        Ok(())
    }

    /// Resolve the configured directories against a project root.
    pub fn layout(&self, root: &Path) -> Layout {
        Layout {
            root: root.to_path_buf(),
            src: root.join(&self.build.src),
            dist: root.join(&self.build.dist),
            temp: root.join(&self.build.temp),
            public: root.join(&self.build.public),
            node_modules: root.join("node_modules"),
        }
    }
}

/// Absolute directories derived from a [`ProjectConfig`] and a project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub root: PathBuf,
    pub src: PathBuf,
    pub dist: PathBuf,
    pub temp: PathBuf,
    pub public: PathBuf,
    pub node_modules: PathBuf,
}

// =============================================================================
// Config loading, merging, and resolution
// =============================================================================

/// Why [`resolve`] fell back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// No override file at the given path.
    Missing,
    /// The file exists but could not be read.
    Unreadable(String),
    /// The file is not valid TOML, or does not fit the config shape.
    Malformed(String),
    /// The merged config failed [`ProjectConfig::validate`].
    Invalid(String),
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Override(PathBuf),
    Defaults(FallbackReason),
}

/// Outcome of [`resolve`]: the effective config and which branch produced it.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub config: ProjectConfig,
    pub source: ConfigSource,
}

/// Serialize a config into a `toml::Value::Table` for merging.
pub fn to_value(config: &ProjectConfig) -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(config)?)
}

/// Merge `overlay` on top of `base`, one level deep.
///
/// - Top-level keys in overlay replace the base key entirely (tables included).
/// - Keys in base that are not in overlay are preserved.
/// - A non-table overlay replaces base as a whole.
pub fn merge_shallow(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                base_table.insert(key, value);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load an override file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if it exists but cannot be read or parsed.
pub fn load_override(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an overlay onto a base config, then deserialize and validate.
pub fn merge_config(
    defaults: &ProjectConfig,
    overlay: toml::Value,
) -> Result<ProjectConfig, ConfigError> {
    let merged = merge_shallow(to_value(defaults)?, overlay);
    let config: ProjectConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Build the effective configuration from `defaults` and an optional override.
///
/// Never fails. Any problem with the override yields `defaults` unchanged,
/// with the reason recorded in [`Resolved::source`].
pub fn resolve(defaults: &ProjectConfig, override_path: &Path) -> Resolved {
    let fallback = |reason: FallbackReason| {
        tracing::debug!(path = %override_path.display(), ?reason, "using default configuration");
        Resolved {
            config: defaults.clone(),
            source: ConfigSource::Defaults(reason),
        }
    };

    let overlay = match load_override(override_path) {
        Ok(Some(value)) => value,
        Ok(None) => return fallback(FallbackReason::Missing),
        Err(ConfigError::Io(e)) => return fallback(FallbackReason::Unreadable(e.to_string())),
        Err(e) => return fallback(FallbackReason::Malformed(e.to_string())),
    };

    match merge_config(defaults, overlay) {
        Ok(config) => Resolved {
            config,
            source: ConfigSource::Override(override_path.to_path_buf()),
        },
        Err(ConfigError::Validation(msg)) => fallback(FallbackReason::Invalid(msg)),
        Err(e) => fallback(FallbackReason::Malformed(e.to_string())),
    }
}

/// Returns a fully-commented stock `pages.config.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Pagesmith Configuration
# =======================
# All settings are optional. Values shown below are the defaults.
#
# Each top-level section you keep replaces the default section as a whole;
# keys you leave out inside it fall back to their defaults.
# Unknown keys are ignored.

# ---------------------------------------------------------------------------
# Directory layout
# ---------------------------------------------------------------------------
[build]
# Source tree holding styles, scripts, pages, images and fonts.
src = "src"
# Final, distributable output. Removed by `pagesmith clean`.
dist = "dist"
# Intermediate output served during development. Removed by `pagesmith clean`.
temp = "temp"
# Files copied verbatim into dist on build, served as-is in development.
public = "public"

# ---------------------------------------------------------------------------
# Asset globs, relative to `src`
# ---------------------------------------------------------------------------
[build.paths]
styles = "assets/styles/*.scss"
scripts = "assets/scripts/*.js"
pages = "*.html"
images = "assets/images/**"
fonts = "assets/fonts/**"
# Handlebars partials, available to pages as {{> name}} (file stem).
partials = "partials/**/*.html"

# ---------------------------------------------------------------------------
# Development server
# ---------------------------------------------------------------------------
[serve]
host = "127.0.0.1"
port = 2080

# ---------------------------------------------------------------------------
# File watching
# ---------------------------------------------------------------------------
[watch]
# Events arriving within this window are handled as one batch.
debounce_ms = 100

# ---------------------------------------------------------------------------
# Template data
# ---------------------------------------------------------------------------
# Everything under [data] is available to page templates, e.g. {{ site.name }}.
[data]
"##
}
