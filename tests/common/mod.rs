//! Fixture helpers shared by the integration tests.

#![allow(dead_code)]

use pagesmith::config::{self, CONFIG_FILENAME, Layout, ProjectConfig};
use std::path::Path;
use tempfile::TempDir;

pub fn write_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

pub fn read(root: &Path, relative: &str) -> String {
    std::fs::read_to_string(root.join(relative))
        .unwrap_or_else(|e| panic!("reading {relative}: {e}"))
}

/// Relative paths of every file under `dir`, sorted.
pub fn tree(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(dir)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

/// A site with one stylesheet, one script, a templated page with a partial,
/// an image, a font, and nested public files.
pub fn site() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write_file(root, "src/assets/styles/a.scss", "body { color: red; }\n\n\nh1 { margin: 0; }\n");
    write_file(
        root,
        "src/assets/scripts/app.js",
        "/* app */\nfunction greet(name) {\n  return 'hi ' + name;\n}\n",
    );
    write_file(root, "src/partials/nav.html", "<nav><a href=\"/\">{{title}}</a></nav>");
    write_file(
        root,
        "src/index.html",
        concat!(
            "<!doctype html>\n<html>\n<head>\n",
            "  <!-- build:css assets/styles/site.css -->\n",
            "  <link rel=\"stylesheet\" href=\"assets/styles/a.css\">\n",
            "  <!-- endbuild -->\n",
            "</head>\n<body>\n  {{> nav}}\n  <p>Hello   {{title}}</p>\n",
            "  <!-- build:js assets/scripts/site.js -->\n",
            "  <script src=\"assets/scripts/app.js\"></script>\n",
            "  <!-- endbuild -->\n",
            "</body>\n</html>\n",
        ),
    );
    write_file(root, "src/assets/images/icon.svg", "<svg>\n  <rect/>\n</svg>\n");
    write_file(root, "src/assets/fonts/body.woff2", "font-bytes");
    write_file(root, "public/robots.txt", "User-agent: *\n");
    write_file(root, "public/docs/guide/readme.txt", "guide");
    write_file(root, CONFIG_FILENAME, "[data]\ntitle = \"Demo\"\n");
    tmp
}

/// Effective configuration and layout for a project root.
pub fn load(root: &Path) -> (ProjectConfig, Layout) {
    let config = config::resolve(&ProjectConfig::default(), &root.join(CONFIG_FILENAME)).config;
    let layout = config.layout(root);
    (config, layout)
}
