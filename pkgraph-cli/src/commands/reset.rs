use clap::Args;

use pkgraph_core::store::SchemaManager;

use super::{Context, Outcome};

#[derive(Args, Debug)]
pub struct ResetArgs {
    /// Confirm deleting every node, relationship and constraint
    #[arg(long)]
    pub yes: bool,
}

pub async fn run(args: ResetArgs, ctx: &Context) -> anyhow::Result<Outcome> {
    super::require_confirmation(args.yes)?;

    let config = super::load_config(ctx)?;
    let store = super::open_store(&config).await?;
    SchemaManager::new(store.as_ref()).reset().await?;

    println!("Graph reset.");
    Ok(Outcome::Complete)
}
