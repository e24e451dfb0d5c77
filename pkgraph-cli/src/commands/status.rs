use anyhow::Context as _;
use clap::Args;

use pkgraph_core::config::StoreBackend;
use pkgraph_core::store::SchemaManager;

use super::{Context, Outcome};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: StatusArgs, ctx: &Context) -> anyhow::Result<Outcome> {
    let config = super::load_config(ctx)?;
    let store = super::open_store(&config).await?;

    let stats = store.stats().await.context("Failed to read graph stats")?;
    let constraints = SchemaManager::new(store.as_ref()).constraints().await?;

    if args.json {
        let value = serde_json::json!({
            "nodes": stats.total_nodes,
            "edges": stats.total_edges,
            "nodes_by_label": stats.nodes_by_label,
            "edges_by_kind": stats.edges_by_kind,
            "constraints": constraints,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(Outcome::Complete);
    }

    let backend = match config.store.backend {
        StoreBackend::Neo4j => format!("neo4j ({})", config.neo4j.uri),
        StoreBackend::Sqlite => format!("sqlite ({})", config.sqlite.path.display()),
    };
    println!("pkgraph status");
    println!();
    println!("  Store:   {backend}");
    println!("  Dataset: {}", config.dataset.root.display());
    println!();

    println!("  Nodes: {} total", stats.total_nodes);
    for (label, count) in &stats.nodes_by_label {
        println!("    {label:<20} {count:>8}");
    }
    println!();

    println!("  Edges: {} total", stats.total_edges);
    let mut kinds: Vec<_> = stats.edges_by_kind.iter().collect();
    kinds.sort_by(|a, b| b.1.cmp(a.1));
    for (kind, count) in &kinds {
        println!("    {kind:<20} {count:>8}");
    }
    println!();

    if constraints.is_empty() {
        println!("  Constraints: none (run `pkgraph constraints`)");
    } else {
        println!("  Constraints:");
        for name in &constraints {
            println!("    {name}");
        }
    }
    Ok(Outcome::Complete)
}
