//! Ps (list containers) command implementation.

use anyhow::Result;
use clap::Args;
use dockside::{Client, ListOptions};

use super::parse_filters;

/// Arguments for the ps command.
#[derive(Args)]
pub struct PsArgs {
    /// Show all containers (including stopped)
    #[arg(short, long)]
    pub all: bool,

    /// Only show container IDs
    #[arg(short, long)]
    pub quiet: bool,

    /// Show sizes
    #[arg(short, long)]
    pub size: bool,

    /// Show the latest created container
    #[arg(short, long)]
    pub latest: bool,

    /// Show the n last created containers
    #[arg(short = 'n', long)]
    pub last: Option<u32>,

    /// Filter output (key=value)
    #[arg(short, long)]
    pub filter: Vec<String>,
}

/// Executes the ps command.
pub async fn execute(args: PsArgs, client: Client) -> Result<()> {
    let mut options = ListOptions::new()
        .with_all(args.all)
        .with_size(args.size)
        .with_latest(args.latest);
    if let Some(limit) = args.last {
        options = options.with_limit(limit);
    }
    options.filters = parse_filters(&args.filter)?;

    let containers = client.list_containers(&options).await?;

    if args.quiet {
        for container in &containers {
            println!("{}", short_id(&container.id));
        }
        return Ok(());
    }

    println!(
        "{:<12} {:<20} {:<20} {:<20} {:<20}",
        "CONTAINER ID", "IMAGE", "COMMAND", "STATUS", "NAMES"
    );
    for container in &containers {
        println!(
            "{:<12} {:<20} {:<20} {:<20} {:<20}",
            short_id(&container.id),
            truncate(&container.image, 20),
            truncate(&format!("\"{}\"", container.command), 20),
            truncate(&container.status, 20),
            container.name()
        );
    }
    Ok(())
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max - 3).collect();
        format!("{kept}...")
    }
}
