pub mod constraints;
pub mod import;
pub mod map;
pub mod reset;
pub mod run;
pub mod status;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Subcommand;

use pkgraph_core::config::{PkgraphConfig, StoreBackend};
use pkgraph_core::pipeline::RunReport;
use pkgraph_core::progress::{IndicatifReporter, NoopReporter, ProgressReporter};
use pkgraph_core::source::FsRawStore;
use pkgraph_core::store::GraphStore;
use pkgraph_core::store::neo4j::Neo4jStore;
use pkgraph_core::store::sqlite::SqliteStore;
use pkgraph_core::types::PackageType;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reset the graph, ensure constraints and create Vendor/Package nodes
    Import(import::ImportArgs),
    /// Add package properties and/or dependency edges to existing nodes
    Map(map::MapArgs),
    /// Full import: reset, constraints, nodes, properties and edges
    Run(run::RunArgs),
    /// Ensure the uniqueness constraints exist
    Constraints(constraints::ConstraintsArgs),
    /// Delete every node, relationship and constraint
    Reset(reset::ResetArgs),
    /// Show node and edge counts of the graph
    Status(status::StatusArgs),
}

/// Options shared by every command.
#[derive(Debug)]
pub struct Context {
    pub config_path: PathBuf,
    pub quiet: bool,
}

/// How a command finished when it did not error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    /// Some packages failed and `--allow-partial` was not given.
    Partial,
}

pub async fn run(cmd: Command, ctx: &Context) -> anyhow::Result<Outcome> {
    match cmd {
        Command::Import(args) => import::run(args, ctx).await,
        Command::Map(args) => map::run(args, ctx).await,
        Command::Run(args) => run::run(args, ctx).await,
        Command::Constraints(args) => constraints::run(args, ctx).await,
        Command::Reset(args) => reset::run(args, ctx).await,
        Command::Status(args) => status::run(args, ctx).await,
    }
}

pub fn load_config(ctx: &Context) -> anyhow::Result<PkgraphConfig> {
    PkgraphConfig::load(&ctx.config_path)
        .with_context(|| format!("Cannot load config: {}", ctx.config_path.display()))
}

/// Open the configured graph store.
pub async fn open_store(config: &PkgraphConfig) -> anyhow::Result<Box<dyn GraphStore>> {
    match config.store.backend {
        StoreBackend::Neo4j => {
            let store = Neo4jStore::connect(&config.neo4j)
                .await
                .with_context(|| format!("Cannot connect to Neo4j at {}", config.neo4j.uri))?;
            Ok(Box::new(store))
        }
        StoreBackend::Sqlite => {
            let path = &config.sqlite.path;
            let store = SqliteStore::open(path)
                .with_context(|| format!("Cannot open database: {}", path.display()))?;
            Ok(Box::new(store))
        }
    }
}

pub fn raw_store(config: &PkgraphConfig) -> FsRawStore {
    FsRawStore::new(&config.dataset.root)
}

pub fn reporter(ctx: &Context) -> Box<dyn ProgressReporter> {
    if ctx.quiet {
        Box::new(NoopReporter)
    } else {
        Box::new(IndicatifReporter::new())
    }
}

/// Parse a `--category` value. Only the known package types are accepted.
pub fn parse_category(value: &str) -> Result<PackageType, String> {
    PackageType::from_category(value).ok_or_else(|| {
        format!(
            "unknown category '{value}' (expected one of: {})",
            PackageType::KNOWN
                .iter()
                .map(PackageType::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        )
    })
}

/// Refuse a destructive reset unless confirmed.
pub fn require_confirmation(yes: bool) -> anyhow::Result<()> {
    if !yes {
        anyhow::bail!(
            "Refusing to delete the whole graph without confirmation. \
             Re-run with --yes, or pass --skip-reset to keep existing data."
        );
    }
    Ok(())
}

/// Print one summary line per phase and decide the outcome.
pub fn finish(report: &RunReport, allow_partial: bool) -> Outcome {
    for phase in &report.phases {
        println!("{}", phase.summary());
    }
    let edges = report.edges();
    if edges.written > 0 || edges.skipped > 0 {
        println!(
            "Edges: {} written, {} skipped (target not in graph).",
            edges.written, edges.skipped
        );
    }

    if report.has_failures() {
        eprintln!(
            "{} of {} packages failed.",
            report.failed_packages().len(),
            report.packages()
        );
        if !allow_partial {
            return Outcome::Partial;
        }
    }
    Outcome::Complete
}
