//! Reference rewriting: bundle, minify, and place compiled pages.
//!
//! Compiled pages in the intermediate directory mark groups of stylesheet or
//! script references with build blocks:
//!
//! ```html
//! <!-- build:css assets/styles/site.css -->
//! <link rel="stylesheet" href="assets/styles/reset.css">
//! <link rel="stylesheet" href="assets/styles/main.css">
//! <!-- endbuild -->
//!
//! <!-- build:js(vendor,src) assets/scripts/app.js -->
//! <script src="/node_modules/lib/dist/lib.js"></script>
//! <script src="assets/scripts/main.js"></script>
//! <!-- endbuild -->
//!
//! <!-- build:remove -->
//! <script src="/dev-only.js"></script>
//! <!-- endbuild -->
//! ```
//!
//! Each `css`/`js` block is replaced by a single `<link>`/`<script>` pointing
//! at the block's target, and the referenced files are concatenated and
//! minified into that target under the final directory. `remove` blocks are
//! dropped. The page itself is then HTML-minified and written to the final
//! directory at its original relative path.
//!
//! References are looked up in the block's extra directories (the
//! parenthesised list, relative to the project root), then the intermediate
//! directory, then the project root. A leading `/` resolves from the top of
//! each search directory; anything else resolves from the page's own folder.
//! Targets follow the same rule against the final directory.
//!
//! A bundle shared by several pages is written once. Two pages naming the
//! same target with different contents is an error.

use crate::select::select_files;
use crate::stage::{BuildContext, StageError, Step, StepReport};
use crate::transform::minify;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

static BLOCK_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*build:(\w+)(?:\(([^)]*)\))?(?:\s+(\S+))?\s*-->").expect("static regex")
});
static BLOCK_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!--\s*endbuild\s*-->").expect("static regex"));
static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(?:link|script)\b[^>]*?\b(?:href|src)\s*=\s*["']([^"']+)["']"#)
        .expect("static regex")
});

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("{}:{line}: {message}", .page.display())]
    Syntax {
        page: PathBuf,
        line: usize,
        message: String,
    },
    #[error("{}: cannot find {reference:?}", .page.display())]
    MissingAsset { page: PathBuf, reference: String },
    #[error("bundle {target:?} is declared with different contents by several pages")]
    BundleMismatch { target: String },
    #[error("failed to minify {}: {message}", .path.display())]
    Minify { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Css,
    Js,
    Remove,
}

/// One `build:` block found in a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub search: Vec<String>,
    pub target: Option<String>,
    /// `href`/`src` values inside the block, in document order.
    pub references: Vec<String>,
    /// Byte range of the whole block, markers included.
    pub span: std::ops::Range<usize>,
}

fn line_of(html: &str, offset: usize) -> usize {
    html[..offset].matches('\n').count() + 1
}

/// Find every build block in `html`.
pub fn parse_blocks(page: &Path, html: &str) -> Result<Vec<Block>, RewriteError> {
    let syntax = |offset: usize, message: String| RewriteError::Syntax {
        page: page.to_path_buf(),
        line: line_of(html, offset),
        message,
    };

    let mut blocks = Vec::new();
    let mut cursor = 0;
    while let Some(start) = BLOCK_START.captures_at(html, cursor) {
        let whole = start.get(0).map(|m| m.range()).unwrap_or(cursor..cursor);
        let kind = match &start[1] {
            "css" => BlockKind::Css,
            "js" => BlockKind::Js,
            "remove" => BlockKind::Remove,
            other => return Err(syntax(whole.start, format!("unknown block type {other:?}"))),
        };
        let target = start.get(3).map(|m| m.as_str().to_string());
        if kind != BlockKind::Remove && target.is_none() {
            return Err(syntax(whole.start, "block has no target".into()));
        }
        let search = start
            .get(2)
            .map(|m| {
                m.as_str()
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let Some(end) = BLOCK_END.find_at(html, whole.end) else {
            return Err(syntax(whole.start, "block is never closed".into()));
        };
        if let Some(nested) = BLOCK_START.find_at(html, whole.end) {
            if nested.start() < end.start() {
                return Err(syntax(nested.start(), "blocks cannot nest".into()));
            }
        }

        let body = &html[whole.end..end.start()];
        let references = REFERENCE
            .captures_iter(body)
            .map(|c| c[1].to_string())
            .collect();
        blocks.push(Block {
            kind,
            search,
            target,
            references,
            span: whole.start..end.end(),
        });
        cursor = end.end();
    }

    if let Some(stray) = BLOCK_END.find_at(html, cursor) {
        return Err(syntax(stray.start(), "endbuild without build".into()));
    }
    Ok(blocks)
}

/// Strip `?query` and `#fragment` from a URL reference.
fn strip_url_suffix(reference: &str) -> &str {
    reference
        .split(|c: char| c == '?' || c == '#')
        .next()
        .unwrap_or(reference)
}

/// Join a URL-style reference onto `dir`, relative to `page_dir` unless rooted.
fn join_reference(dir: &Path, page_dir: &Path, reference: &str) -> PathBuf {
    match reference.strip_prefix('/') {
        Some(rooted) => dir.join(rooted),
        None => dir.join(page_dir).join(reference),
    }
}

/// Post-compile step that bundles references and minifies final output.
pub struct ReferenceRewriter {
    root: PathBuf,
    temp: PathBuf,
    dist: PathBuf,
    pattern: String,
}

struct Bundle {
    kind: BlockKind,
    sources: Vec<PathBuf>,
}

impl ReferenceRewriter {
    pub fn new(
        root: impl Into<PathBuf>,
        temp: impl Into<PathBuf>,
        dist: impl Into<PathBuf>,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            temp: temp.into(),
            dist: dist.into(),
            pattern: pattern.into(),
        }
    }

    fn resolve(
        &self,
        page: &Path,
        page_dir: &Path,
        search: &[String],
        reference: &str,
    ) -> Result<PathBuf, RewriteError> {
        let clean = strip_url_suffix(reference);
        search
            .iter()
            .map(|dir| self.root.join(dir))
            .chain([self.temp.clone(), self.root.clone()])
            .map(|dir| join_reference(&dir, page_dir, clean))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| RewriteError::MissingAsset {
                page: page.to_path_buf(),
                reference: reference.to_string(),
            })
    }

    /// Rewrite one page's blocks, collecting the bundles it declares.
    fn rewrite_page(
        &self,
        page: &Path,
        relative: &Path,
        html: &str,
        bundles: &mut BTreeMap<PathBuf, (String, Bundle)>,
    ) -> Result<String, RewriteError> {
        let page_dir = relative.parent().unwrap_or(Path::new(""));
        let mut out = String::with_capacity(html.len());
        let mut cursor = 0;

        for block in parse_blocks(page, html)? {
            out.push_str(&html[cursor..block.span.start]);
            cursor = block.span.end;

            let Some(target) = block.target.as_deref() else {
                continue;
            };
            let replacement = match block.kind {
                BlockKind::Css => format!("<link rel=\"stylesheet\" href=\"{target}\">"),
                BlockKind::Js => format!("<script src=\"{target}\"></script>"),
                BlockKind::Remove => continue,
            };
            out.push_str(&replacement);

            let sources = block
                .references
                .iter()
                .map(|r| self.resolve(page, page_dir, &block.search, r))
                .collect::<Result<Vec<_>, _>>()?;
            let output = join_reference(&self.dist, page_dir, target);
            match bundles.get(&output) {
                Some((_, existing)) if existing.sources != sources || existing.kind != block.kind => {
                    return Err(RewriteError::BundleMismatch {
                        target: target.to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    bundles.insert(
                        output,
                        (
                            target.to_string(),
                            Bundle {
                                kind: block.kind,
                                sources,
                            },
                        ),
                    );
                }
            }
        }
        out.push_str(&html[cursor..]);
        Ok(out)
    }

    fn build_bundle(&self, output: &Path, bundle: &Bundle) -> Result<String, StageError> {
        let mut joined = String::new();
        for source in &bundle.sources {
            let text = fs::read_to_string(source)?;
            joined.push_str(&text);
            if !text.ends_with('\n') {
                joined.push('\n');
            }
            if bundle.kind == BlockKind::Js {
                joined.push_str(";\n");
            }
        }
        let minified = match bundle.kind {
            BlockKind::Css => minify::css(&joined).map_err(|message| RewriteError::Minify {
                path: output.to_path_buf(),
                message,
            })?,
            _ => minify::js(&joined),
        };
        Ok(minified)
    }

    fn execute(&self, ctx: &BuildContext) -> Result<StepReport, StageError> {
        let mut report = StepReport::default();
        let mut bundles = BTreeMap::new();

        for page in select_files(&self.temp, &self.pattern)? {
            let relative = page.strip_prefix(&self.temp).unwrap_or(&page).to_path_buf();
            let html = fs::read_to_string(&page)?;
            let rewritten = self.rewrite_page(&page, &relative, &html, &mut bundles)?;
            let target = self.dist.join(&relative);
            ctx.write(self.name(), &target, minify::html(&rewritten).as_bytes())?;
            report.files.push(target);
        }

        for (output, (target, bundle)) in &bundles {
            tracing::debug!(target = %target, sources = bundle.sources.len(), "bundling");
            let contents = self.build_bundle(output, bundle)?;
            ctx.write(self.name(), output, contents.as_bytes())?;
            report.files.push(output.clone());
        }
        Ok(report)
    }
}

impl Step for ReferenceRewriter {
    fn name(&self) -> &str {
        "rewrite"
    }

    fn run(&self, ctx: &BuildContext) -> Result<StepReport, StageError> {
        ctx.reported(self.name(), || self.execute(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::write_file;
    use tempfile::TempDir;

    const PAGE: &str = "<html>\n<head>\n<!-- build:css assets/site.css -->\n<link rel=\"stylesheet\" href=\"assets/a.css\">\n<link rel=\"stylesheet\" href=\"assets/b.css?v=2\">\n<!-- endbuild -->\n</head>\n<body>\n<!-- build:remove -->\n<script src=\"/debug.js\"></script>\n<!-- endbuild -->\n</body>\n</html>\n";

    fn rewriter(root: &Path) -> ReferenceRewriter {
        ReferenceRewriter::new(root, root.join("temp"), root.join("dist"), "*.html")
    }

    #[test]
    fn parses_blocks_with_search_dirs_and_references() {
        let html = "<!-- build:js(vendor, lib) app.js --><script src=\"a.js\"></script>\n<script src='b.js'></script><!-- endbuild -->";
        let blocks = parse_blocks(Path::new("index.html"), html).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Js);
        assert_eq!(blocks[0].search, vec!["vendor", "lib"]);
        assert_eq!(blocks[0].target.as_deref(), Some("app.js"));
        assert_eq!(blocks[0].references, vec!["a.js", "b.js"]);
        assert_eq!(blocks[0].span, 0..html.len());
    }

    #[test]
    fn unclosed_block_reports_its_line() {
        let html = "<html>\n\n<!-- build:css site.css -->\n<link href=\"a.css\">";
        let err = parse_blocks(Path::new("index.html"), html).unwrap_err();
        assert!(matches!(err, RewriteError::Syntax { line: 3, .. }), "got {err:?}");
    }

    #[test]
    fn nested_and_unknown_blocks_are_rejected() {
        let nested = "<!-- build:css a.css --><!-- build:js b.js --><!-- endbuild --><!-- endbuild -->";
        assert!(parse_blocks(Path::new("p.html"), nested).is_err());
        let unknown = "<!-- build:img x.png --><!-- endbuild -->";
        assert!(parse_blocks(Path::new("p.html"), unknown).is_err());
    }

    #[test]
    fn bundles_and_minifies_into_dist() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "temp/index.html", PAGE);
        write_file(tmp.path(), "temp/assets/a.css", "body {\n  color: red;\n}\n");
        write_file(tmp.path(), "temp/assets/b.css", "p {\n  margin: 0;\n}\n");

        let report = rewriter(tmp.path()).run(&BuildContext::release()).unwrap();
        assert_eq!(report.files.len(), 2);

        let html = fs::read_to_string(tmp.path().join("dist/index.html")).unwrap();
        assert_eq!(
            html,
            "<html><head><link rel=\"stylesheet\" href=\"assets/site.css\"></head><body></body></html>"
        );
        let css = fs::read_to_string(tmp.path().join("dist/assets/site.css")).unwrap();
        assert_eq!(css, "body{color:red}p{margin:0}");
    }

    #[test]
    fn rooted_references_fall_back_to_project_root() {
        let tmp = TempDir::new().unwrap();
        write_file(
            tmp.path(),
            "temp/docs/index.html",
            "<!-- build:js /js/all.js --><script src=\"/node_modules/lib/lib.js\"></script><script src=\"main.js\"></script><!-- endbuild -->",
        );
        write_file(tmp.path(), "node_modules/lib/lib.js", "var lib = 1; // lib\n");
        write_file(tmp.path(), "temp/docs/main.js", "lib += 1;\n");

        let rw = ReferenceRewriter::new(
            tmp.path(),
            tmp.path().join("temp"),
            tmp.path().join("dist"),
            "**/*.html",
        );
        rw.run(&BuildContext::release()).unwrap();

        let js = fs::read_to_string(tmp.path().join("dist/js/all.js")).unwrap();
        assert!(js.contains("var lib=1;"), "got {js}");
        assert!(js.contains("lib+=1;"), "got {js}");
        let html = fs::read_to_string(tmp.path().join("dist/docs/index.html")).unwrap();
        assert_eq!(html, "<script src=\"/js/all.js\"></script>");
    }

    #[test]
    fn missing_reference_fails_the_step() {
        let tmp = TempDir::new().unwrap();
        write_file(
            tmp.path(),
            "temp/index.html",
            "<!-- build:css site.css --><link href=\"nope.css\"><!-- endbuild -->",
        );
        let err = rewriter(tmp.path()).run(&BuildContext::release()).unwrap_err();
        assert!(matches!(
            err,
            StageError::Rewrite(RewriteError::MissingAsset { ref reference, .. }) if reference == "nope.css"
        ));
    }

    #[test]
    fn shared_bundle_is_written_once() {
        let tmp = TempDir::new().unwrap();
        let page = "<!-- build:css /site.css --><link href=\"/a.css\"><!-- endbuild -->";
        write_file(tmp.path(), "temp/a.html", page);
        write_file(tmp.path(), "temp/b.html", page);
        write_file(tmp.path(), "temp/a.css", "a{color:red}");

        let report = rewriter(tmp.path()).run(&BuildContext::release()).unwrap();
        assert_eq!(report.files.len(), 3);
    }

    #[test]
    fn conflicting_bundle_declarations_fail() {
        let tmp = TempDir::new().unwrap();
        write_file(
            tmp.path(),
            "temp/a.html",
            "<!-- build:css /site.css --><link href=\"/a.css\"><!-- endbuild -->",
        );
        write_file(
            tmp.path(),
            "temp/b.html",
            "<!-- build:css /site.css --><link href=\"/b.css\"><!-- endbuild -->",
        );
        write_file(tmp.path(), "temp/a.css", "a{color:red}");
        write_file(tmp.path(), "temp/b.css", "b{color:red}");

        let err = rewriter(tmp.path()).run(&BuildContext::release()).unwrap_err();
        assert!(matches!(
            err,
            StageError::Rewrite(RewriteError::BundleMismatch { .. })
        ));
    }
}
