use clap::Args;

use pkgraph_core::store::SchemaManager;

use super::{Context, Outcome};

#[derive(Args, Debug)]
pub struct ConstraintsArgs {}

pub async fn run(_args: ConstraintsArgs, ctx: &Context) -> anyhow::Result<Outcome> {
    let config = super::load_config(ctx)?;
    let store = super::open_store(&config).await?;

    let schema = SchemaManager::new(store.as_ref());
    schema.setup_constraints().await?;
    for name in schema.constraints().await? {
        println!("  {name}");
    }
    Ok(Outcome::Complete)
}
