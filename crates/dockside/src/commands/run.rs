//! Run command implementation.

use anyhow::{Context, Result};
use clap::Args;
use dockside::{
    Client, ContainerConfig, ContainerSpec, HostConfig, ImageConfig, LogCopier, LogOptions,
};

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Image to run
    pub image: String,

    /// Command to run
    #[arg(trailing_var_arg = true)]
    pub command: Vec<String>,

    /// Container name
    #[arg(long)]
    pub name: Option<String>,

    /// Environment variables (KEY=VALUE)
    #[arg(short, long)]
    pub env: Vec<String>,

    /// Publish a container port (HOST:CONTAINER)
    #[arg(short, long)]
    pub publish: Vec<String>,

    /// Working directory inside the container
    #[arg(short, long)]
    pub workdir: Option<String>,

    /// Run in detached mode and print the container ID
    #[arg(short, long)]
    pub detach: bool,

    /// Remove the container when it exits
    #[arg(long)]
    pub rm: bool,
}

/// Executes the run command.
pub async fn execute(args: RunArgs, client: Client) -> Result<()> {
    let image = ImageConfig::new(args.image.as_str())?;
    client.pull_image_if_missing(&image).await?;

    let mut spec = ContainerSpec::new(args.image.as_str())
        .with_attach_stdout()
        .with_attach_stderr();
    if !args.command.is_empty() {
        spec = spec.with_cmd(args.command.iter().map(String::as_str));
    }
    for pair in &args.env {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("environment entry {pair:?} is not KEY=VALUE"))?;
        spec = spec.with_env(key, value);
    }
    if let Some(dir) = args.workdir.as_deref() {
        spec = spec.with_working_dir(dir);
    }

    let mut host = HostConfig::new().with_auto_remove(args.rm && args.detach);
    for mapping in &args.publish {
        let (host_port, container_port) = mapping
            .split_once(':')
            .with_context(|| format!("port mapping {mapping:?} is not HOST:CONTAINER"))?;
        spec = spec.with_exposed_port(container_port);
        host = host.with_port_binding("", host_port, container_port);
    }

    let mut container = ContainerConfig::new(args.name.clone().unwrap_or_default())
        .with_spec(spec)
        .with_host(host);

    if args.detach {
        let id = client.create_container(&mut container).await?;
        client.start_container(&container).await?;
        println!("{id}");
        return Ok(());
    }

    let waiter = client.run_async(&mut container).await?;

    let mut copier = LogCopier::new(tokio::io::stdout()).with_stderr(tokio::io::stderr());
    client
        .copy_container_logs(&container, &LogOptions::new(), &mut copier)
        .await?;

    let exit_code = waiter.await.context("wait task failed")??;
    if args.rm {
        client.remove_container(&container, true).await?;
    }
    if exit_code != 0 {
        std::process::exit(i32::try_from(exit_code).unwrap_or(1));
    }
    Ok(())
}
