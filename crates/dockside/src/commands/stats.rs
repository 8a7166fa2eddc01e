//! Stats command implementation.

use anyhow::Result;
use clap::Args;
use dockside::{Client, ContainerConfig, StatsSink};
use dockside_stream::shared_writer;

/// Arguments for the stats command.
#[derive(Args)]
pub struct StatsArgs {
    /// Container name or ID
    pub container: String,

    /// Print a single snapshot and exit
    #[arg(long)]
    pub no_stream: bool,

    /// Print the engine's JSON instead of formatted figures
    #[arg(long)]
    pub raw: bool,
}

/// Executes the stats command.
pub async fn execute(args: StatsArgs, mut client: Client) -> Result<()> {
    let container = ContainerConfig::new(args.container.as_str());

    if args.no_stream {
        let stats = client.container_stats_once(&container).await?;
        if args.raw {
            println!("{}", serde_json::to_string(&stats)?);
        } else {
            println!("{}", serde_json::to_string(&stats.formatted())?);
        }
        return Ok(());
    }

    let stdout = shared_writer(tokio::io::stdout());
    client.set_stats_sink(if args.raw {
        StatsSink::Raw(stdout)
    } else {
        StatsSink::Formatted(stdout)
    });
    client.container_stats(&container).await?;
    Ok(())
}
