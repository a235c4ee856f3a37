//! bodyplace CLI - inspect and migrate legacy body placements
//!
//! Reads documents in the bodyplace JSON format, reports bodies that still
//! carry a placement, and rewrites them with the placement baked into their
//! features.

use anyhow::{Context, Result};
use bodyplace::{BodyId, FeatureGraph, MigrationConfig, NormalizationEngine};
use bodyplace_ir::Document;
use bodyplace_kernel::SampledKernel;
use clap::{Parser, Subcommand};
use flexi_logger::{Logger, LoggerHandle};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "bodyplace")]
#[command(about = "Migrate legacy body placements into feature placements", long_about = None)]
struct Cli {
    /// Log level filter (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List bodies that still carry a placement
    Check {
        /// Document to inspect
        file: PathBuf,
        /// Migration settings (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Normalize every legacy body of a document
    Migrate {
        /// Document to migrate
        file: PathBuf,
        /// Output file (default: overwrite the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Migration settings (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Run the migration but do not write anything
        #[arg(long)]
        dry_run: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Display information about a document
    Info {
        /// Document to inspect
        file: PathBuf,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let _logger = init_logging(cli.log_level.as_deref())?;

    match cli.command {
        Commands::Check { file, config } => check(&file, config.as_deref()),
        Commands::Migrate {
            file,
            output,
            config,
            dry_run,
            json,
        } => migrate(&file, output.as_deref(), config.as_deref(), dry_run, json),
        Commands::Info { file } => {
            show_info(&file)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_logging(level: Option<&str>) -> Result<LoggerHandle> {
    let logger = match level {
        Some(level) => Logger::try_with_str(level),
        None => Logger::try_with_env_or_str("warn"),
    }
    .context("invalid log level")?;
    logger
        .log_to_stderr()
        .format(flexi_logger::default_format)
        .start()
        .context("failed to start logger")
}

fn load(file: &Path) -> Result<Document> {
    let json =
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    Document::from_json(&json).with_context(|| format!("failed to parse {}", file.display()))
}

fn load_config(path: Option<&Path>) -> Result<MigrationConfig> {
    let config = match path {
        Some(path) => MigrationConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => MigrationConfig::default(),
    };
    debug!("migration settings: {config:?}");
    Ok(config)
}

/// Bodies `migrate` would touch under the same settings.
fn legacy_bodies(doc: &Document, config: &MigrationConfig) -> Result<(FeatureGraph, Vec<BodyId>)> {
    let graph = FeatureGraph::from_document(doc)?;
    let legacy = graph.legacy_bodies(&config.tolerance());
    Ok((graph, legacy))
}

fn check(file: &Path, config: Option<&Path>) -> Result<ExitCode> {
    let config = load_config(config)?;
    let doc = load(file)?;
    let (graph, legacy) = legacy_bodies(&doc, &config)?;

    if legacy.is_empty() {
        println!("{}: no legacy bodies", file.display());
        return Ok(ExitCode::SUCCESS);
    }
    println!("{}: {} legacy bodies", file.display(), legacy.len());
    for body in legacy {
        let b = graph.body(body);
        let t = b.placement.translation();
        println!(
            "  {}: offset ({:.6}, {:.6}, {:.6}), rotated {:.6} deg",
            b.name,
            t.x,
            t.y,
            t.z,
            b.placement.rotation_angle().to_degrees()
        );
    }
    // non-zero so scripts can detect documents that need migrating
    Ok(ExitCode::from(1))
}

fn migrate(
    file: &Path,
    output: Option<&Path>,
    config: Option<&Path>,
    dry_run: bool,
    json: bool,
) -> Result<ExitCode> {
    let config = load_config(config)?;
    let doc = load(file)?;
    let kernel = SampledKernel::new(config.segments);

    let mut graph = FeatureGraph::from_document(&doc)?;
    let report = NormalizationEngine::new(&kernel, config).run(&mut graph)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }

    let changed = report.changed().next().is_some();
    if changed && !dry_run {
        let out = output.unwrap_or(file);
        fs::write(out, graph.to_document().to_json()?)
            .with_context(|| format!("failed to write {}", out.display()))?;
        if !json {
            println!("Wrote {}", out.display());
        }
    }

    if report.failures().next().is_some() {
        Ok(ExitCode::from(2))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn show_info(file: &Path) -> Result<()> {
    let doc = load(file)?;
    let graph = FeatureGraph::from_document(&doc)?;
    let tol = MigrationConfig::default().tolerance();

    println!("bodyplace document: {}", file.display());
    println!("  Version: {}", doc.version);
    println!("  Parts: {}", doc.parts.len());
    println!("  Bodies: {}", doc.bodies.len());
    println!("  Features: {}", doc.features.len());
    println!("  Binders: {}", doc.binders.len());

    if doc.bodies.is_empty() {
        return Ok(());
    }
    println!("\nBodies:");
    for id in graph.body_ids() {
        let body = graph.body(id);
        let t = body.placement.translation();
        let state = if body.placement.is_identity(&tol) {
            "normalized"
        } else {
            "legacy"
        };
        let tip = graph
            .tip(id)
            .map(|f| graph.feature(f).name.as_str())
            .unwrap_or("none");
        println!(
            "  {}: {} features, tip {}, placement ({:.3}, {:.3}, {:.3}) [{}]",
            body.name,
            body.features.len(),
            tip,
            t.x,
            t.y,
            t.z,
            state
        );
    }

    if !doc.binders.is_empty() {
        println!("\nBinders:");
        for b in &doc.binders {
            let kind = if b.relative { "relative" } else { "absolute" };
            println!("  {}: {} -> {} ({})", b.name, b.owner, b.target, kind);
        }
    }
    Ok(())
}
