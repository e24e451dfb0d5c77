use clap::Args;

use pkgraph_core::pipeline::{ImportOptions, ImportPipeline};
use pkgraph_core::types::PackageType;

use super::{Context, Outcome};

#[derive(Args, Debug)]
pub struct MapArgs {
    /// Merge aggregated properties onto Package nodes
    #[arg(long)]
    pub add_info: bool,

    /// Merge dependency edges between Package nodes
    #[arg(long)]
    pub add_deps: bool,

    /// Only map packages of this category
    #[arg(long, alias = "package-type", value_parser = super::parse_category)]
    pub category: Option<PackageType>,

    /// Exit 0 even if some packages failed
    #[arg(long)]
    pub allow_partial: bool,
}

pub async fn run(args: MapArgs, ctx: &Context) -> anyhow::Result<Outcome> {
    if !args.add_info && !args.add_deps {
        anyhow::bail!("Nothing to map: pass --add-info, --add-deps or both");
    }

    let config = super::load_config(ctx)?;
    let store = super::open_store(&config).await?;
    let raw = super::raw_store(&config);
    let reporter = super::reporter(ctx);

    let options = ImportOptions {
        category: args.category,
        write_info: args.add_info,
        write_dependencies: args.add_deps,
    };
    let report = ImportPipeline::new(&raw, store.as_ref(), reporter.as_ref())
        .enrich(&options)
        .await?;

    Ok(super::finish(&report, args.allow_partial))
}
