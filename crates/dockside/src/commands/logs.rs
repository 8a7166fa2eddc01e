//! Logs command implementation.

use anyhow::Result;
use clap::Args;
use dockside::{Client, ContainerConfig, LogCopier, LogOptions};

/// Arguments for the logs command.
#[derive(Args)]
pub struct LogsArgs {
    /// Container name or ID
    pub container: String,

    /// Follow log output
    #[arg(short, long)]
    pub follow: bool,

    /// Show timestamps
    #[arg(short, long)]
    pub timestamps: bool,

    /// Number of lines to show from the end of the logs
    #[arg(short = 'n', long)]
    pub tail: Option<u64>,

    /// Show logs since timestamp or relative duration (e.g. 10m)
    #[arg(long)]
    pub since: Option<String>,

    /// Prefix each line with its stream name
    #[arg(long)]
    pub prefix: bool,
}

/// Executes the logs command.
pub async fn execute(args: LogsArgs, client: Client) -> Result<()> {
    let container = ContainerConfig::new(args.container.as_str());

    let mut options = LogOptions::new()
        .with_follow(args.follow)
        .with_timestamps(args.timestamps);
    if let Some(tail) = args.tail {
        options = options.with_tail(tail);
    }
    if let Some(since) = args.since {
        options = options.with_since(since);
    }

    let mut copier = LogCopier::new(tokio::io::stdout()).with_stderr(tokio::io::stderr());
    let written = if args.prefix {
        let stream = client.container_logs(&container, &options).await?;
        copier.copy_with_prefix(stream, "stdout: ", "stderr: ").await?
    } else {
        client
            .copy_container_logs(&container, &options, &mut copier)
            .await?
    };

    tracing::debug!(bytes = written, "log stream ended");
    Ok(())
}
