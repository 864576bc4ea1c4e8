use clap::{Parser, Subcommand};
use pagesmith::config::{
    self, CONFIG_FILENAME, ConfigSource, FallbackReason, Layout, ProjectConfig,
};
use pagesmith::ledger::OutputLedger;
use pagesmith::pipeline::{self, StageSet};
use pagesmith::reload::LiveReload;
use pagesmith::serve::{DevServer, ServeRoots};
use pagesmith::stage::BuildContext;
use pagesmith::watch::{self, Orchestrator, WatchError};
use pagesmith::{clean::Clean, output};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "pagesmith")]
#[command(about = "Static site build pipeline with a live-reloading dev server")]
#[command(long_about = "\
Static site build pipeline with a live-reloading dev server

Stylesheets, scripts, and Handlebars pages are compiled from the source tree
into an intermediate directory, then bundled and minified into the final
directory together with optimised images, fonts, and public files.

Project structure (defaults):

  pages.config.toml          # Optional; overrides whole top-level sections
  src/
  ├── index.html             # Pages (templated with [data])
  ├── partials/footer.html   # {{> footer}}
  └── assets/
      ├── styles/*.scss      # → temp/assets/styles/*.css
      ├── scripts/*.js       # → temp/assets/scripts/*.js
      ├── images/**          # → dist/assets/images/**
      └── fonts/**           # → dist/assets/fonts/**
  public/**                  # → dist/** verbatim
  temp/                      # Intermediate output (develop serves it)
  dist/                      # Final output

Commands:
  clean     remove dist/ and temp/
  build     clean, then compile + bundle, images, fonts, public in parallel
  develop   compile once, then serve on port 2080 and rebuild on change

Run 'pagesmith gen-config' to generate a documented pages.config.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Project root
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Configuration file [default: <root>/pages.config.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Dev server port (overrides serve.port)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Show every written file and debug diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Remove the final and intermediate output directories
    Clean,
    /// Run the full release build
    Build,
    /// Compile once, then serve with live reload and rebuild on change
    Develop,
    /// Print a stock pages.config.toml with all options documented
    GenConfig,
}

static INIT: Once = Once::new();

fn init_logging(verbose: bool) {
    INIT.call_once(|| {
        let mut filter = EnvFilter::from_default_env();
        if std::env::var("RUST_LOG").is_err() {
            let level = if verbose { "debug" } else { "info" };
            if let Ok(directive) = format!("pagesmith={level}").parse() {
                filter = filter.add_directive(directive);
            }
        }
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    });
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.root.join(CONFIG_FILENAME));
    let resolved = config::resolve(&ProjectConfig::default(), &config_path);
    match &resolved.source {
        ConfigSource::Override(path) => tracing::debug!(path = %path.display(), "loaded config"),
        ConfigSource::Defaults(FallbackReason::Missing) => {}
        ConfigSource::Defaults(reason) => {
            tracing::warn!(path = %config_path.display(), ?reason, "ignoring config, using defaults")
        }
    }
    let mut config = resolved.config;
    if let Some(port) = cli.port {
        config.serve.port = port;
    }
    let layout = config.layout(&cli.root);

    match cli.command {
        Command::Clean => {
            let removed = Clean::new(&layout).clean()?;
            output::print_clean_output(&removed, &layout.root);
        }
        Command::Build => {
            let (tx, printer) = output::spawn_printer(layout.root.clone(), cli.verbose);
            let ctx = BuildContext::release().with_events(tx);
            let result = pipeline::build(&config, &layout, &ctx);
            drop(ctx);
            let _ = printer.join();
            match result {
                Ok(report) => output::print_pipeline_report("Build", &report, &config.build.dist),
                Err(e) => {
                    output::print_pipeline_error("Build", &e);
                    return Err(e.into());
                }
            }
        }
        Command::Develop => develop(&config, &layout, cli.verbose)?,
        Command::GenConfig => unreachable!("handled above"),
    }

    Ok(())
}

/// Compile once, start the dev server, then watch until interrupted.
fn develop(
    config: &ProjectConfig,
    layout: &Layout,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, _printer) = output::spawn_printer(layout.root.clone(), verbose);
    let hub = Arc::new(LiveReload::new());
    let ctx = BuildContext::new(hub.clone(), Arc::new(OutputLedger::new())).with_events(tx);

    let stages = StageSet::new(config, layout);
    let bindings = watch::bindings(config, layout, &stages)?;
    let roots: BTreeSet<PathBuf> = bindings
        .iter()
        .flat_map(|b| b.bases().map(PathBuf::from))
        .collect();
    let orchestrator = Arc::new(Orchestrator::new(bindings, Arc::new(ctx)));

    if let Err(e) = orchestrator.start(&stages.compile()) {
        if let WatchError::Compile(pipeline_error) = &e {
            output::print_pipeline_error("Compile", pipeline_error);
        }
        return Err(e.into());
    }

    let server = DevServer::bind(&config.serve, layout, hub)?;
    let url = match server.local_addr() {
        Some(addr) => format!("http://{addr}"),
        None => format!("http://{}", config.serve.address()),
    };
    output::print_serve_banner(&url, &ServeRoots::from_layout(layout).roots, &layout.root);
    tracing::info!(%url, "dev server listening");
    std::thread::spawn(move || server.run());

    let roots: Vec<PathBuf> = roots.into_iter().collect();
    orchestrator.watch(&roots, Duration::from_millis(config.watch.debounce_ms))?;
    Ok(())
}
