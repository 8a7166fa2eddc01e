//! CLI command implementations.
//!
//! Each command connects through [`connect`] and maps its arguments onto the
//! library's configuration objects.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dockside::{Client, ClientConfig, Filters};

pub mod exec;
pub mod logs;
pub mod prune;
pub mod ps;
pub mod pull;
pub mod run;
pub mod stats;

/// dockside - typed Docker engine client
#[derive(Parser)]
#[command(name = "dockside")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Engine socket path
    ///
    /// Defaults to DOCKER_HOST, then /var/run/docker.sock.
    #[arg(long, global = true)]
    pub socket: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a command in a new container
    Run(run::RunArgs),

    /// Execute a command in a running container
    Exec(exec::ExecArgs),

    /// Fetch the logs of a container
    Logs(logs::LogsArgs),

    /// Display resource usage of a container
    Stats(stats::StatsArgs),

    /// Pull an image from a registry
    Pull(pull::PullArgs),

    /// List containers
    Ps(ps::PsArgs),

    /// Remove unused containers, images or volumes
    Prune(prune::PruneArgs),

    /// Show client and negotiated API version
    Version,
}

/// Connects to the engine, honouring `--socket` over `DOCKER_HOST`.
pub async fn connect(socket: Option<&Path>) -> Result<Client> {
    let mut config = ClientConfig::from_env().context("invalid engine configuration")?;
    if let Some(socket) = socket {
        config = config.with_socket(socket);
    }
    Client::connect_with(config)
        .await
        .context("cannot reach the engine")
}

/// Parses repeated `key=value` filter arguments.
pub fn parse_filters(raw: &[String]) -> Result<Filters> {
    raw.iter()
        .map(|filter| {
            filter
                .split_once('=')
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .with_context(|| format!("filter {filter:?} is not key=value"))
        })
        .collect()
}

pub fn version(client: &Client) -> Result<()> {
    println!("dockside {}", env!("CARGO_PKG_VERSION"));
    println!("Engine:   {client}");
    println!("API:      v{}", client.transport().api_version());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filters() {
        let filters = parse_filters(&["label=tier=web".into(), "status=exited".into()]).unwrap();
        assert_eq!(filters.get("label"), ["tier=web"]);
        assert_eq!(filters.get("status"), ["exited"]);

        assert!(parse_filters(&["dangling".into()]).is_err());
    }
}
