use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use serde::Serialize;
use tokio::signal;
use tracing::{debug, info, warn};
use xrc_build::{DirectoryWriter, Runner};
use xrc_compile::{discover, BuildUnit, CargoToolchain, CompileConfig, Orchestrator};
use xrc_loader::BuilderRegistry;

#[derive(Parser, Debug)]
#[command(name = "xrc-gen", version, about = "Builds Crossplane compositions from Rust build units")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the build units below the root
    Discover(SourceArgs),
    /// Compile, load and run every build unit, writing one composition each
    Build(BuildArgs),
}

#[derive(Args, Debug, Clone)]
struct SourceArgs {
    /// Directory searched for build units
    #[arg(long, env = "XRC_ROOT", default_value = "compositions")]
    root: PathBuf,
    /// File that marks a directory as a build unit
    #[arg(long, env = "XRC_MARKER", default_value = "Cargo.toml")]
    marker: String,
    /// Path prefixes, relative to the root, that are never searched
    #[arg(long = "exclude", env = "XRC_EXCLUDE", value_delimiter = ',', default_value = "target")]
    exclude: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct BuildArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Where compiled build units are placed
    #[arg(long = "plugin-dir", env = "XRC_PLUGIN_DIR")]
    plugin_dir: Option<PathBuf>,
    /// Where compositions are written
    #[arg(long = "output-dir", env = "XRC_OUTPUT_DIR", default_value = "package/compositions")]
    output_dir: PathBuf,
    /// Concurrent compilations
    #[arg(long = "pool-size", env = "XRC_POOL_SIZE")]
    pool_size: Option<usize>,
    /// Hard limit per compilation
    #[arg(long = "timeout-secs", env = "XRC_COMPILE_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,
    /// Artifact checks after a compilation succeeds
    #[arg(long = "poll-attempts", env = "XRC_POLL_ATTEMPTS")]
    poll_attempts: Option<u32>,
    #[arg(long = "poll-delay-ms", env = "XRC_POLL_DELAY_MS")]
    poll_delay_ms: Option<u64>,
    /// Compile build units with optimizations
    #[arg(long = "release", action = ArgAction::SetTrue)]
    release: bool,
    /// Leave compiled build units on disk after the run
    #[arg(long = "keep-plugins", action = ArgAction::SetTrue)]
    keep_plugins: bool,
}

impl BuildArgs {
    fn compile_config(&self) -> CompileConfig {
        let defaults = CompileConfig::default();
        CompileConfig {
            pool_size: self.pool_size.unwrap_or(defaults.pool_size),
            timeout: self.timeout_secs.map(Duration::from_secs).unwrap_or(defaults.timeout),
            poll_attempts: self.poll_attempts.unwrap_or(defaults.poll_attempts),
            poll_delay: self.poll_delay_ms.map(Duration::from_millis).unwrap_or(defaults.poll_delay),
            plugin_dir: self.plugin_dir.clone().unwrap_or(defaults.plugin_dir),
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct BuildReport {
    units: usize,
    compiled: usize,
    loaded: usize,
    written: usize,
    dropped: usize,
}

fn init_tracing() {
    let env = std::env::var("XRC_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

/// Families recorded by the compile, load and run stages.
const METRIC_FAMILIES: &[&str] = &[
    "xrc_compile_total",
    "xrc_compile_ok_total",
    "xrc_compile_err_total",
    "xrc_compile_ms",
    "xrc_compile_active",
    "xrc_load_ok_total",
    "xrc_load_err_total",
    "xrc_compositions_written_total",
    "xrc_compositions_dropped_total",
];

/// `xrc_compile_ms` buckets, from a fresh incremental build up to the default timeout.
const COMPILE_MS_BUCKETS: &[f64] = &[250.0, 1_000.0, 5_000.0, 15_000.0, 30_000.0, 60_000.0, 120_000.0, 300_000.0];

fn init_metrics() {
    let Ok(addr) = std::env::var("XRC_METRICS_ADDR") else { return };
    let Ok(sock) = addr.parse::<SocketAddr>() else {
        warn!(addr = %addr, "XRC_METRICS_ADDR is not host:port; metrics stay off");
        return;
    };
    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full("xrc_compile_ms".to_string()), COMPILE_MS_BUCKETS)
        .unwrap_or_else(|e| {
            warn!(error = %e, "compile duration buckets rejected; using summaries");
            PrometheusBuilder::new()
        });
    match builder.with_http_listener(sock).install() {
        Ok(()) => {
            info!(addr = %sock, "metrics exporter listening");
            debug!(families = ?METRIC_FAMILIES, "exported metric families");
        }
        Err(e) => warn!(error = %e, "cannot install metrics exporter"),
    }
}

fn discover_units(source: &SourceArgs) -> Result<Vec<BuildUnit>> {
    let units = discover(&source.root, &source.marker, &source.exclude)
        .with_context(|| format!("discovering build units below {}", source.root.display()))?;
    info!(root = %source.root.display(), units = units.len(), "build units discovered");
    Ok(units)
}

async fn build(args: BuildArgs) -> Result<BuildReport> {
    let units = discover_units(&args.source)?;
    let mut report = BuildReport { units: units.len(), ..Default::default() };

    let config = args.compile_config();
    let plugin_dir = config.plugin_dir.clone();
    let toolchain = CargoToolchain::new(plugin_dir.join(".target")).release(args.release);
    let orchestrator = Orchestrator::new(config, toolchain);
    let started = Instant::now();
    let results = tokio::select! {
        results = orchestrator.run_all(units) => results,
        _ = signal::ctrl_c() => bail!("interrupted while compiling"),
    };
    report.compiled = results.iter().filter(|r| r.outcome.is_ok()).count();
    info!(
        compiled = report.compiled,
        failed = results.len() - report.compiled,
        peak = orchestrator.peak_concurrency(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "compilation finished"
    );

    let mut registry = BuilderRegistry::new();
    report.loaded = registry.load_all(&results);
    let summary = Runner::new(DirectoryWriter::new(&args.output_dir)).run(registry.iter());
    // unload before the libraries are removed
    drop(registry);

    if !args.keep_plugins {
        if let Err(e) = std::fs::remove_dir_all(&plugin_dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %plugin_dir.display(), error = %e, "cannot remove plugin directory");
            }
        }
    }

    let summary = summary?;
    report.written = summary.written;
    report.dropped = summary.dropped;
    Ok(report)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Discover(source) => {
            let units = discover_units(&source)?;
            match cli.output {
                Output::Human => {
                    for u in &units {
                        println!("{} • {}", u.artifact_name, u.source_path.display());
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&units)?),
            }
        }
        Commands::Build(args) => {
            let output_dir = args.output_dir.clone();
            let report = build(args).await?;
            match cli.output {
                Output::Human => {
                    println!(
                        "units={} compiled={} loaded={} written={} dropped={}",
                        report.units, report.compiled, report.loaded, report.written, report.dropped
                    );
                    println!("compositions in {}", output_dir.display());
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            }
        }
    }

    Ok(())
}
