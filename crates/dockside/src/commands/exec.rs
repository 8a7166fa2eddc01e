//! Exec command implementation.

use anyhow::Result;
use clap::Args;
use crossterm::tty::IsTty;
use dockside::{Client, ContainerConfig, ExecConfig, LogCopier};

/// Arguments for the exec command.
#[derive(Args)]
pub struct ExecArgs {
    /// Container name or ID
    pub container: String,

    /// Command to execute
    #[arg(trailing_var_arg = true, required = true)]
    pub command: Vec<String>,

    /// Allocate a pseudo-TTY
    #[arg(short, long)]
    pub tty: bool,

    /// Keep STDIN open
    #[arg(short, long)]
    pub interactive: bool,

    /// Run in detached mode
    #[arg(short, long)]
    pub detach: bool,

    /// Environment variables (KEY=VALUE)
    #[arg(short, long)]
    pub env: Vec<String>,

    /// Working directory inside the container
    #[arg(short, long)]
    pub workdir: Option<String>,

    /// Username or UID
    #[arg(short, long)]
    pub user: Option<String>,

    /// Run in privileged mode
    #[arg(long)]
    pub privileged: bool,
}

/// Executes the exec command.
pub async fn execute(args: ExecArgs, client: Client) -> Result<()> {
    let container = ContainerConfig::new(args.container.as_str());

    let mut exec = ExecConfig::new(args.command.iter().map(String::as_str))
        .with_tty(args.tty)
        .with_attach_stdin(args.interactive && !args.detach)
        .with_attach_stdout(!args.detach)
        .with_attach_stderr(!args.detach)
        .with_detach(args.detach)
        .with_privileged(args.privileged);
    for pair in &args.env {
        match pair.split_once('=') {
            Some((key, value)) => exec = exec.with_env(key, value),
            None => anyhow::bail!("environment entry {pair:?} is not KEY=VALUE"),
        }
    }
    if let Some(dir) = args.workdir.as_deref() {
        exec = exec.with_working_dir(dir);
    }
    if let Some(user) = args.user.as_deref() {
        exec = exec.with_user(user);
    }

    if args.detach {
        let id = client.exec_create(&container, &mut exec).await?;
        client.exec_start(&exec).await?;
        println!("{id}");
        return Ok(());
    }

    if args.tty && args.interactive && std::io::stdin().is_tty() {
        run_terminal(&client, &container, exec).await
    } else {
        run_piped(&client, &container, exec, args.interactive).await
    }
}

async fn run_terminal(
    client: &Client,
    container: &ContainerConfig,
    mut exec: ExecConfig,
) -> Result<()> {
    let session = client.exec_attach_terminal(container, &mut exec).await?;

    let mut sizes = session.monitor_size();
    let resizer = {
        let client = client.clone();
        let exec = exec.clone();
        tokio::spawn(async move {
            let mut last = None;
            while let Some(size) = sizes.recv().await {
                if last == Some(size) {
                    continue;
                }
                last = Some(size);
                if let Err(e) = client.exec_resize(&exec, size).await {
                    tracing::debug!("exec resize failed: {}", e);
                }
            }
        })
    };

    let result = session.run().await;
    resizer.abort();
    result?;

    exit_with_code(client, &exec).await
}

async fn run_piped(
    client: &Client,
    container: &ContainerConfig,
    mut exec: ExecConfig,
    interactive: bool,
) -> Result<()> {
    let tty = exec.spec.tty;
    let hijacked = client.exec_attach(container, &mut exec).await?;
    let (mut reader, mut writer) = tokio::io::split(hijacked);

    let forwarder = interactive.then(|| {
        tokio::spawn(async move {
            let mut stdin = tokio::io::stdin();
            if let Err(e) = tokio::io::copy(&mut stdin, &mut writer).await {
                tracing::debug!("stdin forwarding stopped: {}", e);
            }
        })
    });

    if tty {
        tokio::io::copy(&mut reader, &mut tokio::io::stdout()).await?;
    } else {
        let mut copier = LogCopier::new(tokio::io::stdout()).with_stderr(tokio::io::stderr());
        copier.copy(reader).await?;
    }

    if let Some(forwarder) = forwarder {
        forwarder.abort();
    }
    exit_with_code(client, &exec).await
}

async fn exit_with_code(client: &Client, exec: &ExecConfig) -> Result<()> {
    let inspect = client.exec_inspect(exec).await?;
    match inspect.exit_code {
        Some(code) if code != 0 => std::process::exit(i32::try_from(code).unwrap_or(1)),
        _ => Ok(()),
    }
}
