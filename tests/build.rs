//! Release and compile pipelines run end to end against a fixture site.

mod common;

use common::{load, read, site, tree, write_file};
use pagesmith::clean::Clean;
use pagesmith::config::{self, ConfigSource, FallbackReason, ProjectConfig};
use pagesmith::pipeline::{self, Pipeline, StageSet};
use pagesmith::stage::{BuildContext, StageError, Step, StepReport};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[test]
fn release_produces_the_deployable_tree() {
    let tmp = site();
    let (config, layout) = load(tmp.path());

    let report = pipeline::build(&config, &layout, &BuildContext::release()).unwrap();
    let mut steps: Vec<&str> = report.steps.iter().map(|(name, _)| name.as_str()).collect();
    steps.sort_unstable();
    assert_eq!(
        steps,
        vec!["clean", "extra", "font", "image", "page", "rewrite", "script", "style"]
    );

    assert_eq!(
        tree(&layout.dist),
        vec![
            "assets/fonts/body.woff2",
            "assets/images/icon.svg",
            "assets/scripts/site.js",
            "assets/styles/site.css",
            "docs/guide/readme.txt",
            "index.html",
            "robots.txt",
        ]
    );
}

#[test]
fn stylesheets_are_expanded_in_temp_and_minified_in_dist() {
    let tmp = site();
    let (config, layout) = load(tmp.path());
    pipeline::build(&config, &layout, &BuildContext::release()).unwrap();

    let expanded = read(&layout.temp, "assets/styles/a.css");
    assert!(expanded.contains("body {\n  color: red;\n}"));

    let minified = read(&layout.dist, "assets/styles/site.css");
    assert_eq!(minified, "body{color:red}h1{margin:0}");
}

#[test]
fn pages_are_rendered_rewritten_and_minified() {
    let tmp = site();
    let (config, layout) = load(tmp.path());
    pipeline::build(&config, &layout, &BuildContext::release()).unwrap();

    let rendered = read(&layout.temp, "index.html");
    assert!(rendered.contains("<nav><a href=\"/\">Demo</a></nav>"));
    assert!(rendered.contains("build:css"));

    let html = read(&layout.dist, "index.html");
    assert!(html.contains("<link rel=\"stylesheet\" href=\"assets/styles/site.css\">"));
    assert!(html.contains("<script src=\"assets/scripts/site.js\"></script>"));
    assert!(html.contains("<p>Hello Demo</p>"));
    assert!(!html.contains("<!--"));
    assert!(!html.contains('\n'));

    let js = read(&layout.dist, "assets/scripts/site.js");
    assert!(js.contains("function greet(name){"));
    assert!(!js.contains("/* app */"));
}

#[test]
fn public_files_keep_their_relative_paths() {
    let tmp = site();
    let (config, layout) = load(tmp.path());
    pipeline::build(&config, &layout, &BuildContext::release()).unwrap();

    assert_eq!(read(&layout.dist, "robots.txt"), "User-agent: *\n");
    assert_eq!(read(&layout.dist, "docs/guide/readme.txt"), "guide");
    assert_eq!(read(&layout.dist, "assets/fonts/body.woff2"), "font-bytes");
    assert!(!read(&layout.dist, "assets/images/icon.svg").contains("\n  "));
}

#[test]
fn rebuilding_replaces_stale_output() {
    let tmp = site();
    let (config, layout) = load(tmp.path());
    write_file(&layout.dist, "stale.txt", "old");
    write_file(&layout.temp, "stale.css", "old");

    pipeline::build(&config, &layout, &BuildContext::release()).unwrap();

    assert!(!layout.dist.join("stale.txt").exists());
    assert!(!layout.temp.join("stale.css").exists());
    assert!(layout.dist.join("index.html").is_file());
}

#[test]
fn clean_is_idempotent_and_spares_sources() {
    let tmp = site();
    let (config, layout) = load(tmp.path());
    pipeline::build(&config, &layout, &BuildContext::release()).unwrap();

    let clean = Clean::new(&layout);
    assert_eq!(clean.clean().unwrap(), vec![layout.dist.clone(), layout.temp.clone()]);
    assert!(clean.clean().unwrap().is_empty());

    assert!(!layout.dist.exists());
    assert!(!layout.temp.exists());
    assert!(layout.src.join("index.html").is_file());
    assert!(layout.public.join("robots.txt").is_file());
}

#[test]
fn compile_reaches_a_fixed_point() {
    let tmp = site();
    let (config, layout) = load(tmp.path());
    let stages = StageSet::new(&config, &layout);
    let ctx = BuildContext::release();

    stages.compile().run(&ctx).unwrap();
    let first: Vec<(String, Vec<u8>)> = tree(&layout.temp)
        .into_iter()
        .map(|f| (f.clone(), std::fs::read(layout.temp.join(&f)).unwrap()))
        .collect();

    stages.compile().run(&ctx).unwrap();
    let second: Vec<(String, Vec<u8>)> = tree(&layout.temp)
        .into_iter()
        .map(|f| (f.clone(), std::fs::read(layout.temp.join(&f)).unwrap()))
        .collect();

    assert_eq!(first, second);
    assert!(!layout.dist.exists());
}

/// Stands in for a parallel sibling and records whether the marker survived.
struct MarkerCheck {
    marker: PathBuf,
    seen: Mutex<Option<bool>>,
}

impl Step for MarkerCheck {
    fn name(&self) -> &str {
        "marker-check"
    }

    fn run(&self, _ctx: &BuildContext) -> Result<StepReport, StageError> {
        *self.seen.lock().unwrap() = Some(self.marker.exists());
        Ok(StepReport::default())
    }
}

#[test]
fn clean_finishes_before_any_parallel_step_starts() {
    let tmp = site();
    let (config, layout) = load(tmp.path());
    let marker = layout.dist.join("marker.txt");
    write_file(&layout.dist, "marker.txt", "x");

    let stages = StageSet::new(&config, &layout);
    let check = Arc::new(MarkerCheck {
        marker: marker.clone(),
        seen: Mutex::new(None),
    });
    let release = pipeline::release_pipeline(
        Pipeline::step(&stages.clean),
        stages.compile(),
        Pipeline::step(&stages.rewrite),
        Pipeline::step(&stages.image),
        Pipeline::step(&check),
        Pipeline::step(&stages.extra),
    );

    release.run(&BuildContext::release()).unwrap();
    assert_eq!(*check.seen.lock().unwrap(), Some(false));
    assert!(!marker.exists());
}

#[test]
fn broken_template_fails_the_build_but_siblings_finish() {
    let tmp = site();
    write_file(tmp.path(), "src/index.html", "<p>{{#if}}</p>");
    let (config, layout) = load(tmp.path());

    let err = pipeline::build(&config, &layout, &BuildContext::release()).unwrap_err();
    assert_eq!(err.failed_steps(), vec!["page"]);
    assert!(layout.dist.join("robots.txt").is_file());
    assert!(layout.dist.join("assets/fonts/body.woff2").is_file());
    assert!(!layout.dist.join("index.html").exists());
}

#[test]
fn overriding_one_section_keeps_the_others() {
    let tmp = site();
    write_file(
        tmp.path(),
        config::CONFIG_FILENAME,
        "[build]\ndist = \"public_html\"\n\n[serve]\nport = 3000\n",
    );

    let resolved = config::resolve(
        &ProjectConfig::default(),
        &tmp.path().join(config::CONFIG_FILENAME),
    );
    assert!(matches!(resolved.source, ConfigSource::Override(_)));
    let defaults = ProjectConfig::default();
    assert_eq!(resolved.config.build.dist, "public_html");
    // The whole [build] section was replaced, so unnamed keys reset to defaults.
    assert_eq!(resolved.config.build.src, defaults.build.src);
    assert_eq!(resolved.config.serve.port, 3000);
    assert_eq!(resolved.config.watch, defaults.watch);
}

#[test]
fn unusable_override_falls_back_to_defaults() {
    let tmp = site();
    let path = tmp.path().join(config::CONFIG_FILENAME);

    std::fs::remove_file(&path).unwrap();
    let missing = config::resolve(&ProjectConfig::default(), &path);
    assert_eq!(missing.source, ConfigSource::Defaults(FallbackReason::Missing));
    assert_eq!(missing.config, ProjectConfig::default());

    write_file(tmp.path(), config::CONFIG_FILENAME, "[build\nsrc = ");
    let malformed = config::resolve(&ProjectConfig::default(), &path);
    assert!(matches!(
        malformed.source,
        ConfigSource::Defaults(FallbackReason::Malformed(_))
    ));
    assert_eq!(malformed.config, ProjectConfig::default());
}
