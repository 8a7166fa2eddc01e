//! dockside CLI - drive a Docker engine through the typed client.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on debug flag
    let filter = if cli.debug {
        "dockside=debug,dockside_stream=debug"
    } else {
        "dockside=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let client = commands::connect(cli.socket.as_deref()).await?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args, client).await,
        Commands::Exec(args) => commands::exec::execute(args, client).await,
        Commands::Logs(args) => commands::logs::execute(args, client).await,
        Commands::Stats(args) => commands::stats::execute(args, client).await,
        Commands::Pull(args) => commands::pull::execute(args, client).await,
        Commands::Ps(args) => commands::ps::execute(args, client).await,
        Commands::Prune(args) => commands::prune::execute(args, client).await,
        Commands::Version => commands::version(&client),
    }
}
