use std::path::PathBuf;

use clap::Parser;
use pkgraph_core::error::PkgraphError;

mod commands;

use commands::Outcome;

#[derive(Parser, Debug)]
#[command(
    name = "pkgraph",
    version,
    about = "Import Packagist package metadata into a dependency graph"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Configuration file
    #[arg(short, long, global = true, default_value = "pkgraph.toml", env = "PKGRAPH_CONFIG")]
    config: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Exit code for a run where some packages failed.
const EXIT_PARTIAL: i32 = 10;

/// Classify an error into an exit code.
///
///   0: success
///   1: general/unknown error
///   2: configuration error
///   3: dataset error (unreadable package list or document)
///   4: graph store error
///   10: partial success (some packages failed)
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<PkgraphError>() {
            return match e {
                PkgraphError::Config(_) => 2,
                PkgraphError::Source(_) => 3,
                PkgraphError::Write(_) => 4,
                PkgraphError::Validation(_) => 1,
            };
        }
    }

    let lower = format!("{err:#}").to_lowercase();
    if lower.contains("config") {
        2
    } else if lower.contains("dataset") {
        3
    } else if lower.contains("neo4j") || lower.contains("database") || lower.contains("sqlite") {
        4
    } else {
        1
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    let ctx = commands::Context {
        config_path: cli.config,
        quiet: cli.quiet,
    };
    match runtime.block_on(commands::run(cli.command, &ctx)) {
        Ok(Outcome::Complete) => std::process::exit(0),
        Ok(Outcome::Partial) => std::process::exit(EXIT_PARTIAL),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}
