use clap::Args;

use pkgraph_core::pipeline::{ImportOptions, ImportPipeline};
use pkgraph_core::store::SchemaManager;
use pkgraph_core::types::PackageType;

use super::{Context, Outcome};

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Only import packages of this category
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

pub async fn run(args: ImportArgs, ctx: &Context) -> anyhow::Result<Outcome> {
    if !args.skip_reset {
        super::require_confirmation(args.yes)?;
    }

    let config = super::load_config(ctx)?;
    let store = super::open_store(&config).await?;
    let raw = super::raw_store(&config);
    let reporter = super::reporter(ctx);

    let schema = SchemaManager::new(store.as_ref());
    if !args.skip_reset {
        schema.reset().await?;
    }
    schema.setup_constraints().await?;

    let options = ImportOptions {
        category: args.category,
        ..ImportOptions::default()
    };
    let report = ImportPipeline::new(&raw, store.as_ref(), reporter.as_ref())
        .materialize_nodes(&options)
        .await?;

    Ok(super::finish(&report, args.allow_partial))
}
