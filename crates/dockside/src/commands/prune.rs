//! Prune command implementation.

use anyhow::Result;
use clap::{Args, ValueEnum};
use dockside::stats::human_bytes;
use dockside::Client;

use super::parse_filters;

/// What to prune.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PruneTarget {
    /// Stopped containers
    Containers,
    /// Dangling images
    Images,
    /// Unused volumes
    Volumes,
}

/// Arguments for the prune command.
#[derive(Args)]
pub struct PruneArgs {
    /// Resource type to prune
    #[arg(value_enum)]
    pub target: PruneTarget,

    /// Provide filter values (e.g. until=24h, label=tmp)
    #[arg(short, long)]
    pub filter: Vec<String>,
}

/// Executes the prune command.
pub async fn execute(args: PruneArgs, client: Client) -> Result<()> {
    let filters = parse_filters(&args.filter)?;

    let reclaimed = match args.target {
        PruneTarget::Containers => {
            let report = client.prune_containers(&filters).await?;
            for id in &report.containers_deleted {
                println!("Deleted: {id}");
            }
            report.space_reclaimed
        }
        PruneTarget::Images => {
            let report = client.prune_images(&filters).await?;
            for item in &report.images_deleted {
                if let Some(tag) = &item.untagged {
                    println!("Untagged: {tag}");
                }
                if let Some(id) = &item.deleted {
                    println!("Deleted: {id}");
                }
            }
            report.space_reclaimed
        }
        PruneTarget::Volumes => {
            let report = client.prune_volumes(&filters).await?;
            for name in &report.volumes_deleted {
                println!("Deleted: {name}");
            }
            report.space_reclaimed
        }
    };

    println!("Total reclaimed space: {}", human_bytes(reclaimed));
    Ok(())
}
