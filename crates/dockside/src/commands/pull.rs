//! Pull command implementation.

use anyhow::Result;
use clap::Args;
use dockside::{Client, ImageConfig, RegistryAuth};

/// Arguments for the pull command.
#[derive(Args)]
pub struct PullArgs {
    /// Image reference (e.g. alpine:latest)
    pub image: String,

    /// Pull every tag of the repository
    #[arg(short, long)]
    pub all_tags: bool,

    /// Platform to pull (e.g. linux/arm64)
    #[arg(long)]
    pub platform: Option<String>,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,

    /// Registry username
    #[arg(long, env = "DOCKSIDE_REGISTRY_USER", requires = "password")]
    pub username: Option<String>,

    /// Registry password
    #[arg(long, env = "DOCKSIDE_REGISTRY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

/// Executes the pull command.
pub async fn execute(args: PullArgs, mut client: Client) -> Result<()> {
    let mut image = ImageConfig::new(args.image.as_str())?.with_pull_all_tags(args.all_tags);
    if let Some(platform) = args.platform {
        image = image.with_pull_platform(platform);
    }
    if let (Some(username), Some(password)) = (args.username, args.password) {
        image = image.with_registry_auth(RegistryAuth::new(username, password));
    }

    if args.quiet {
        client.set_image_sink(tokio::io::sink());
    }
    client.pull_image(&image).await?;

    if args.quiet {
        println!("{}", image.reference);
    }
    Ok(())
}
