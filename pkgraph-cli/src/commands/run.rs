use clap::Args;
use tracing::info;

use pkgraph_core::pipeline::{ImportOptions, ImportPipeline};
use pkgraph_core::store::SchemaManager;
use pkgraph_core::types::PackageType;

use super::{Context, Outcome};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Only process packages of this category
    #[arg(long, alias = "package-type", value_parser = super::parse_category)]
    pub category: Option<PackageType>,

    /// Keep the existing graph instead of resetting it first
    #[arg(long)]
    pub skip_reset: bool,

    /// Confirm the destructive reset
    #[arg(long)]
    pub yes: bool,

    /// Exit 0 even if some packages failed
    #[arg(long)]
    pub allow_partial: bool,
}

pub async fn run(args: RunArgs, ctx: &Context) -> anyhow::Result<Outcome> {
    if !args.skip_reset {
        super::require_confirmation(args.yes)?;
    }

    let config = super::load_config(ctx)?;
    let store = super::open_store(&config).await?;
    let raw = super::raw_store(&config);
    let reporter = super::reporter(ctx);

    if !args.skip_reset {
        SchemaManager::new(store.as_ref()).reset().await?;
    }

    let options = ImportOptions {
        category: args.category,
        write_info: true,
        write_dependencies: true,
    };
    let report = ImportPipeline::new(&raw, store.as_ref(), reporter.as_ref())
        .run_full(&options)
        .await?;

    let stats = store.stats().await?;
    info!(
        nodes = stats.total_nodes,
        edges = stats.total_edges,
        "Graph import finished"
    );

    Ok(super::finish(&report, args.allow_partial))
}
