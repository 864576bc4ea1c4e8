//! Shared types used across stages, the watcher, and the dev server.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Asset category handled by one transform stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Styles,
    Scripts,
    Pages,
    Images,
    Fonts,
    /// Pass-through files from the public directory.
    Extra,
}

impl AssetKind {
    pub fn name(self) -> &'static str {
        match self {
            AssetKind::Styles => "style",
            AssetKind::Scripts => "script",
            AssetKind::Pages => "page",
            AssetKind::Images => "image",
            AssetKind::Fonts => "font",
            AssetKind::Extra => "extra",
        }
    }

    /// Where the stage for this category writes.
    ///
    /// Styles, scripts, and pages still need reference rewriting, so they go
    /// to the intermediate directory. Everything else is terminal.
    pub fn destination(self) -> Destination {
        match self {
            AssetKind::Styles | AssetKind::Scripts | AssetKind::Pages => Destination::Temp,
            AssetKind::Images | AssetKind::Fonts | AssetKind::Extra => Destination::Dist,
        }
    }

    /// The reload a browser needs after this category is rebuilt.
    ///
    /// `None` for categories whose stage does not signal the broadcaster.
    pub fn reload(self) -> Option<ReloadKind> {
        match self {
            AssetKind::Styles => Some(ReloadKind::Styles),
            AssetKind::Scripts | AssetKind::Pages => Some(ReloadKind::Full),
            AssetKind::Images | AssetKind::Fonts | AssetKind::Extra => None,
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Output directory a stage writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Intermediate directory, consumed by the reference rewriter.
    Temp,
    /// Final, distributable directory.
    Dist,
}

/// What connected browsers should do after a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadKind {
    /// Swap stylesheets in place.
    Styles,
    /// Reload the page.
    Full,
}

impl ReloadKind {
    /// Combine two pending reloads: anything beyond styles needs a full reload.
    pub fn merge(self, other: ReloadKind) -> ReloadKind {
        match (self, other) {
            (ReloadKind::Styles, ReloadKind::Styles) => ReloadKind::Styles,
            _ => ReloadKind::Full,
        }
    }
}
