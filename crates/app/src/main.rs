//! `learnpath`: terminal front end for the learning path checklist.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod render;

use cli::Cli;

/// Log to stderr so stdout stays clean for `export --stdout`.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "learnpath=debug,services=debug,storage=debug"
    } else {
        "learnpath=info,services=info,storage=warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = cli.execute().await {
        eprintln!("{err:#}");
        std::process::exit(2);
    }
}
