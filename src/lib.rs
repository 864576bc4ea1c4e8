//! # Pagesmith
//!
//! A build pipeline for small static sites. Stylesheets, scripts, and
//! Handlebars pages are compiled from a source tree, then bundled and
//! minified into a deployable directory alongside images, fonts, and
//! verbatim public files. A development mode serves the intermediate output
//! with live reload and rebuilds only what changed.
//!
//! # Architecture: Two Output Directories
//!
//! ```text
//! src/  ──compile──▶  temp/  ──rewrite──▶  dist/
//!                            images, fonts, public ──▶ dist/
//! ```
//!
//! `temp/` holds readable, unminified output that the dev server can serve
//! directly. `dist/` is only ever written by a release build. Keeping them
//! apart means a development session never leaves half-minified files in the
//! deploy directory, and the release rewriter has a stable place to look up
//! compiled assets by their page-relative paths.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `pages.config.toml` loading, shallow merge over defaults, fallback reasons |
//! | [`types`] | Asset kinds, their output destination and reload kind |
//! | [`select`] | Glob selection and matching relative to a base directory |
//! | [`transform`] | Per-kind content transforms: styles, scripts, pages, images, minifiers |
//! | [`stage`] | A glob + transform + destination, the build context that writes outputs |
//! | [`ledger`] | Ownership of output paths so no two steps write the same file |
//! | [`pipeline`] | Parallel/sequential composition; the `compile` and `release` pipelines |
//! | [`rewrite`] | `build:` block parsing, asset bundling, page minification into `dist/` |
//! | [`clean`] | Removal of `dist/` and `temp/` with a guard against deleting sources |
//! | [`watch`] | Watch bindings, dispatch of changed paths, the debounced watch loop |
//! | [`reload`] | Live-reload hub, long-poll notices, client script injection |
//! | [`serve`] | Development HTTP server over `temp/`, `dist/`, `public/`, `/node_modules` |
//! | [`output`] | CLI output formatting for stage progress and summaries |
//!
//! # Design Decisions
//!
//! ## Steps Compose, Stages Stay Dumb
//!
//! A [`stage::Stage`] knows one glob, one transform, and one destination. It
//! does not know what runs before or beside it. Ordering lives entirely in
//! [`pipeline::Pipeline`], a small tree of `Parallel` and `Sequential` nodes.
//! A parallel group runs every child and reports every failure; a sequential
//! group stops at the first. The release pipeline is therefore readable as
//! data:
//!
//! ```text
//! sequential[clean, parallel{sequential[compile, rewrite], image, font, extra}]
//! ```
//!
//! ## Disjoint Outputs Are Enforced
//!
//! Parallel steps would silently race if two of them produced the same file.
//! Every write goes through [`ledger::OutputLedger`], which records the first
//! owner of each path and rejects a second owner with a conflict error. A
//! step may rewrite its own files, which is what a watch rebuild does.
//!
//! ## Reloads Are Merged, Not Queued
//!
//! Stylesheet changes can be applied without a page refresh; everything else
//! needs one. Browsers long-poll [`reload::LiveReload`] with the generation
//! they last saw and receive a single merged notice, so a burst of rebuilds
//! produces one refresh instead of several.
//!
//! ## No Node Toolchain
//!
//! Styles go through `grass` and `lightningcss`, templates through
//! `handlebars`, PNGs through the `image` crate. The binary needs nothing
//! installed beside it.

pub mod clean;
pub mod config;
pub mod ledger;
pub mod output;
pub mod pipeline;
pub mod reload;
pub mod rewrite;
pub mod select;
pub mod serve;
pub mod stage;
pub mod transform;
pub mod types;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_helpers;
