//! Glob-based file selection relative to a base directory.
//!
//! Patterns use the usual conventions: `*` stays within one path segment,
//! `**` spans any number of directories, and a trailing `**` selects every
//! file below its directory. Neither wildcard matches a segment starting
//! with `.`, so dotfiles are only selected when a pattern names them. A
//! missing base directory selects nothing.

use glob::{MatchOptions, Pattern};
use std::io;
use std::path::{Path, PathBuf};

pub const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Compile `pattern`, mapping syntax errors to `InvalidInput`.
pub fn compile(pattern: &str) -> io::Result<Pattern> {
    // `glob` treats a trailing `**` as "directories only"; files need `**/*`.
    let normalized = if pattern == "**" || pattern.ends_with("/**") {
        format!("{pattern}/*")
    } else {
        pattern.to_string()
    };
    Pattern::new(&normalized).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("bad glob {pattern:?}: {e}"),
        )
    })
}

/// All regular files under `base` whose relative path matches `pattern`,
/// sorted for deterministic processing order. Unreadable entries, such as a
/// dangling symlink, are an error.
pub fn select_files(base: &Path, pattern: &str) -> io::Result<Vec<PathBuf>> {
    if !base.is_dir() {
        return Ok(Vec::new());
    }
    let pattern = compile(pattern)?;
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(base).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let selected = entry
            .path()
            .strip_prefix(base)
            .is_ok_and(|rel| pattern.matches_path_with(rel, MATCH_OPTIONS));
        if selected {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Whether `path` (absolute, or relative to `base`) lies under `base` and matches.
pub fn matches(base: &Path, pattern: &Pattern, path: &Path) -> bool {
    let relative = if path.is_absolute() {
        match path.strip_prefix(base) {
            Ok(rel) => rel,
            Err(_) => return false,
        }
    } else {
        path
    };
    pattern.matches_path_with(relative, MATCH_OPTIONS)
}
