//! Engine client facade.
//!
//! Each method takes one of the configuration objects from
//! [`config`](crate::config) and issues the matching engine request. Methods
//! that create something write the new ID back into the configuration so it
//! can be passed straight to the next call.

use std::fmt;
use std::path::Path;

use dockside_error::{CommonError, ResourceKind};
use dockside_stream::{shared_writer, tee, JsonStream, ProgressStream, SharedWriter};
use hyper::Method;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::task::JoinHandle;

use crate::config::image::{anonymous_auth, split_reference, RegistryAuth};
use crate::config::{
    ClientConfig, CommitOptions, ContainerConfig, EmptyObject, EndpointConfig, ExecConfig,
    Filters, ImageConfig, ListOptions, NetworkConfig, UpdateConfig, VolumeConfig,
};
use crate::error::Result;
use crate::logs::{LogCopier, LogOptions, LogStream};
use crate::stats::{self, ContainerStats};
use crate::terminal::{InteractiveSession, TermiosTerminal, TerminalSize};
use crate::transport::{BodyReader, Hijacked, Payload, Query, Transport};
use crate::types::{
    ContainerInspect, ContainerPruneReport, ContainerSummary, CreateResponse, ExecInspect,
    FilesystemChange, IdResponse, ImageInspect, ImagePruneReport, NetworkInspect, TopResponse,
    UpdateResponse, Volume, VolumePruneReport, WaitResponse,
};

/// Terminal session returned by [`Client::exec_attach_terminal`].
pub type ExecSession = InteractiveSession<
    TermiosTerminal<std::io::Stdin>,
    tokio::io::ReadHalf<Hijacked>,
    tokio::io::WriteHalf<Hijacked>,
>;

/// Where [`Client::container_stats`] writes snapshots.
#[derive(Clone)]
pub enum StatsSink {
    /// One `{"cpuUsage":..,"memoryUsage":..,"networkIO":..,"diskIO":..}`
    /// line per snapshot.
    Formatted(SharedWriter),
    /// The engine's JSON, unchanged.
    Raw(SharedWriter),
}

impl fmt::Debug for StatsSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Formatted(_) => f.write_str("StatsSink::Formatted"),
            Self::Raw(_) => f.write_str("StatsSink::Raw"),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ConnectBody<'a> {
    container: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint_config: Option<&'a EndpointConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DisconnectBody<'a> {
    container: &'a str,
    force: bool,
}

/// Client for the engine API.
///
/// Cloning is cheap; clones share the configured sinks.
#[derive(Clone)]
pub struct Client {
    transport: Transport,
    image_sink: SharedWriter,
    stats_sink: StatsSink,
    log_sink: Option<SharedWriter>,
}

impl Client {
    /// Connects using `DOCKER_HOST` and `DOCKER_API_VERSION`.
    pub async fn connect() -> Result<Self> {
        Self::connect_with(ClientConfig::from_env()?).await
    }

    /// Connects with an explicit configuration.
    ///
    /// Fails with a daemon-not-running error if the engine does not answer
    /// a ping.
    pub async fn connect_with(config: ClientConfig) -> Result<Self> {
        let mut transport = Transport::new(&config);

        if let Err(e) = transport.ping().await {
            if e.is_daemon_not_running() {
                return Err(e);
            }
            return Err(CommonError::daemon_not_running(e.to_string()).into());
        }

        if config.negotiate_version {
            if let Err(e) = transport.negotiate().await {
                tracing::debug!("API version negotiation failed: {}", e);
            }
        }

        tracing::debug!(
            socket = %transport.socket_path().display(),
            version = transport.api_version(),
            "connected to engine"
        );

        Ok(Self {
            transport,
            image_sink: shared_writer(tokio::io::stdout()),
            stats_sink: StatsSink::Formatted(shared_writer(tokio::io::stdout())),
            log_sink: None,
        })
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Receives pull, push, build and load progress. Defaults to stdout.
    pub fn set_image_sink<W>(&mut self, writer: W)
    where
        W: tokio::io::AsyncWrite + Send + Unpin + 'static,
    {
        self.image_sink = shared_writer(writer);
    }

    /// Receives [`container_stats`](Self::container_stats) output. Defaults
    /// to formatted lines on stdout.
    pub fn set_stats_sink(&mut self, sink: StatsSink) {
        self.stats_sink = sink;
    }

    /// Mirrors every [`container_logs`](Self::container_logs) stream to
    /// `writer`. Unset by default.
    pub fn set_log_sink<W>(&mut self, writer: W)
    where
        W: tokio::io::AsyncWrite + Send + Unpin + 'static,
    {
        self.log_sink = Some(shared_writer(writer));
    }

    // ------------------------------------------------------------------
    // Containers
    // ------------------------------------------------------------------

    /// Creates the container and stores its ID in `config`.
    pub async fn create_container(&self, config: &mut ContainerConfig) -> Result<String> {
        config.validate()?;

        let mut query = Query::new();
        if !config.name.is_empty() {
            query.push("name", &config.name);
        }
        query.push_opt("platform", config.platform.as_deref());

        let created: CreateResponse = self
            .transport
            .post(&query.to_path("/containers/create"), Some(&config.create_body()))
            .await
            .map_err(|e| {
                e.not_found_as(ResourceKind::Image, &config.spec.image)
                    .already_exists_as(ResourceKind::Container, &config.name)
            })?;

        for warning in &created.warnings {
            tracing::warn!(container = %created.id, "{}", warning);
        }
        config.id = Some(created.id.clone());
        Ok(created.id)
    }

    pub async fn start_container(&self, config: &ContainerConfig) -> Result<()> {
        let id = config.target()?;
        self.transport
            .post_empty::<()>(&format!("/containers/{id}/start"), None)
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Container, id))
    }

    pub async fn stop_container(&self, config: &ContainerConfig) -> Result<()> {
        let id = config.target()?;
        self.transport
            .post_empty::<()>(&format!("/containers/{id}/stop"), None)
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Container, id))
    }

    pub async fn restart_container(&self, config: &ContainerConfig) -> Result<()> {
        let id = config.target()?;
        self.transport
            .post_empty::<()>(&format!("/containers/{id}/restart"), None)
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Container, id))
    }

    pub async fn pause_container(&self, config: &ContainerConfig) -> Result<()> {
        let id = config.target()?;
        self.transport
            .post_empty::<()>(&format!("/containers/{id}/pause"), None)
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Container, id))
    }

    pub async fn unpause_container(&self, config: &ContainerConfig) -> Result<()> {
        let id = config.target()?;
        self.transport
            .post_empty::<()>(&format!("/containers/{id}/unpause"), None)
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Container, id))
    }

    /// Sends `signal` (e.g. `SIGTERM`, `9`) to the container.
    pub async fn kill_container(&self, config: &ContainerConfig, signal: &str) -> Result<()> {
        let id = config.target()?;
        let mut query = Query::new();
        query.push("signal", signal);
        self.transport
            .post_empty::<()>(&query.to_path(&format!("/containers/{id}/kill")), None)
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Container, id))
    }

    /// Renames the container and updates `config.name`.
    pub async fn rename_container(
        &self,
        config: &mut ContainerConfig,
        new_name: &str,
    ) -> Result<()> {
        let id = config.target()?.to_string();
        let mut query = Query::new();
        query.push("name", new_name);
        self.transport
            .post_empty::<()>(&query.to_path(&format!("/containers/{id}/rename")), None)
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Container, &id))?;
        config.name = new_name.to_string();
        Ok(())
    }

    /// Removes the container. `force` also kills it if running and removes
    /// its anonymous volumes.
    pub async fn remove_container(&self, config: &ContainerConfig, force: bool) -> Result<()> {
        let id = config.target()?;
        let mut query = Query::new();
        query.push_flag("v", force);
        query.push_flag("force", force);
        self.transport
            .delete(&query.to_path(&format!("/containers/{id}")))
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Container, id))
    }

    /// Blocks until the container stops running.
    pub async fn wait_container(&self, config: &ContainerConfig) -> Result<WaitResponse> {
        let id = config.target()?;
        self.transport
            .post::<WaitResponse, ()>(&format!("/containers/{id}/wait?condition=not-running"), None)
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Container, id))
    }

    /// Creates, starts and waits for the container. A non-zero exit code is
    /// an error.
    pub async fn run_and_wait(&self, config: &mut ContainerConfig) -> Result<()> {
        self.create_container(config).await?;
        self.start_container(config).await?;

        let id = config.target()?;
        let status = self.wait_container(config).await?;
        if let Some(err) = status.error.filter(|e| !e.message.is_empty()) {
            return Err(
                CommonError::operation(ResourceKind::Container, id, "wait", err.message).into(),
            );
        }
        if status.status_code != 0 {
            return Err(CommonError::operation(
                ResourceKind::Container,
                id,
                "run",
                format!("exited with non-zero code: {}", status.status_code),
            )
            .into());
        }
        Ok(())
    }

    /// Creates and starts the container, then waits for it on a spawned
    /// task. The handle resolves to the exit code.
    pub async fn run_async(&self, config: &mut ContainerConfig) -> Result<JoinHandle<Result<i64>>> {
        self.create_container(config).await?;
        self.start_container(config).await?;

        let client = self.clone();
        let config = config.clone();
        Ok(tokio::spawn(async move {
            let status = client.wait_container(&config).await?;
            Ok(status.status_code)
        }))
    }

    pub async fn inspect_container(&self, config: &ContainerConfig) -> Result<ContainerInspect> {
        let id = config.target()?;
        self.transport
            .get(&format!("/containers/{id}/json"))
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Container, id))
    }

    pub async fn is_container_running(&self, config: &ContainerConfig) -> Result<bool> {
        Ok(self.inspect_container(config).await?.state.running)
    }

    pub async fn container_exit_code(&self, config: &ContainerConfig) -> Result<i64> {
        Ok(self.inspect_container(config).await?.state.exit_code)
    }

    pub async fn list_containers(&self, options: &ListOptions) -> Result<Vec<ContainerSummary>> {
        let query = options.query()?;
        self.transport.get(&query.to_path("/containers/json")).await
    }

    /// Processes running in the container. `ps_args` defaults to `-ef` on
    /// the engine side when empty.
    pub async fn container_top(
        &self,
        config: &ContainerConfig,
        ps_args: &[&str],
    ) -> Result<TopResponse> {
        let id = config.target()?;
        let mut query = Query::new();
        if !ps_args.is_empty() {
            query.push("ps_args", &ps_args.join(" "));
        }
        self.transport
            .get(&query.to_path(&format!("/containers/{id}/top")))
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Container, id))
    }

    /// Filesystem changes since the container was created.
    pub async fn container_diff(&self, config: &ContainerConfig) -> Result<Vec<FilesystemChange>> {
        let id = config.target()?;
        let changes: Option<Vec<FilesystemChange>> = self
            .transport
            .get(&format!("/containers/{id}/changes"))
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Container, id))?;
        Ok(changes.unwrap_or_default())
    }

    /// The container's filesystem as a tar stream.
    pub async fn export_container(&self, config: &ContainerConfig) -> Result<BodyReader> {
        let id = config.target()?;
        self.transport
            .stream(Method::GET, &format!("/containers/{id}/export"), Payload::Empty, &[])
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Container, id))
    }

    /// Commits the container to a new image and returns its ID.
    pub async fn commit_container(
        &self,
        config: &ContainerConfig,
        options: &CommitOptions,
    ) -> Result<String> {
        let id = config.target()?;
        let path = options.query(id).to_path("/commit");
        let committed: IdResponse = match &options.config {
            Some(spec) => self.transport.post(&path, Some(spec)).await,
            None => self.transport.post(&path, Some(&EmptyObject {})).await,
        }
        .map_err(|e| e.not_found_as(ResourceKind::Container, id))?;
        Ok(committed.id)
    }

    /// Changes resource limits of a running container. Returns engine
    /// warnings.
    pub async fn update_container(
        &self,
        config: &ContainerConfig,
        update: &UpdateConfig,
    ) -> Result<Vec<String>> {
        let id = config.target()?;
        let response: UpdateResponse = self
            .transport
            .post(&format!("/containers/{id}/update"), Some(update))
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Container, id))?;
        Ok(response.warnings)
    }

    pub async fn prune_containers(&self, filters: &Filters) -> Result<ContainerPruneReport> {
        let mut query = Query::new();
        filters.apply(&mut query)?;
        self.transport
            .post::<_, ()>(&query.to_path("/containers/prune"), None)
            .await
    }

    // ------------------------------------------------------------------
    // Logs and stats
    // ------------------------------------------------------------------

    /// Opens the container's multiplexed log stream.
    ///
    /// With a log sink configured the stream is also copied to the sink by a
    /// background task; the returned reader then ends when that task does.
    pub async fn container_logs(
        &self,
        config: &ContainerConfig,
        options: &LogOptions,
    ) -> Result<LogStream> {
        let id = config.target()?;
        let body = self
            .transport
            .stream(
                Method::GET,
                &options.query().to_path(&format!("/containers/{id}/logs")),
                Payload::Empty,
                &[],
            )
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Container, id))?;

        Ok(match &self.log_sink {
            Some(sink) => LogStream::Teed(tee(body, sink.clone())),
            None => LogStream::Direct(body),
        })
    }

    /// Demultiplexes the container's logs into `copier`. Returns payload
    /// bytes written.
    pub async fn copy_container_logs<O, E>(
        &self,
        config: &ContainerConfig,
        options: &LogOptions,
        copier: &mut LogCopier<O, E>,
    ) -> Result<u64>
    where
        O: tokio::io::AsyncWrite + Unpin,
        E: tokio::io::AsyncWrite + Unpin,
    {
        let logs = self.container_logs(config, options).await?;
        copier.copy(logs).await
    }

    async fn stats_body(&self, id: &str, stream: bool) -> Result<BodyReader> {
        let path = if stream {
            format!("/containers/{id}/stats?stream=1")
        } else {
            format!("/containers/{id}/stats?stream=0&one-shot=1")
        };
        self.transport
            .stream(Method::GET, &path, Payload::Empty, &[])
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Container, id))
    }

    /// Streams stats to the stats sink until the container stops.
    pub async fn container_stats(&self, config: &ContainerConfig) -> Result<()> {
        let id = config.target()?;
        let body = self.stats_body(id, true).await?;

        match &self.stats_sink {
            StatsSink::Formatted(sink) => {
                let count = stats::write_formatted(body, sink).await?;
                tracing::debug!(container = id, snapshots = count, "stats stream ended");
            }
            StatsSink::Raw(sink) => copy_to_sink(body, sink).await?,
        }
        Ok(())
    }

    /// Decoded stats snapshots, one per second while the container runs.
    pub async fn container_stats_stream(
        &self,
        config: &ContainerConfig,
    ) -> Result<JsonStream<BodyReader, ContainerStats>> {
        let id = config.target()?;
        Ok(JsonStream::new(self.stats_body(id, true).await?))
    }

    /// A single snapshot without waiting for a CPU baseline.
    pub async fn container_stats_once(&self, config: &ContainerConfig) -> Result<ContainerStats> {
        let id = config.target()?;
        let mut snapshots = JsonStream::<_, ContainerStats>::new(self.stats_body(id, false).await?);
        snapshots.next().await?.ok_or_else(|| {
            CommonError::operation(ResourceKind::Container, id, "stats", "engine sent no snapshot")
                .into()
        })
    }

    // ------------------------------------------------------------------
    // Exec
    // ------------------------------------------------------------------

    /// Creates the exec instance and stores its ID in `exec`.
    pub async fn exec_create(
        &self,
        container: &ContainerConfig,
        exec: &mut ExecConfig,
    ) -> Result<String> {
        let id = container.target()?;
        let created: IdResponse = self
            .transport
            .post(&format!("/containers/{id}/exec"), Some(&exec.spec))
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Container, id))?;
        exec.id = Some(created.id.clone());
        Ok(created.id)
    }

    /// Creates and starts the exec, returning the hijacked connection.
    ///
    /// Without a TTY the connection carries a multiplexed stream.
    pub async fn exec_attach(
        &self,
        container: &ContainerConfig,
        exec: &mut ExecConfig,
    ) -> Result<Hijacked> {
        self.exec_create(container, exec).await?;
        let exec_id = exec.id()?;
        self.transport
            .upgrade(&format!("/exec/{exec_id}/start"), Some(&exec.start_body()))
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Exec, exec_id))
    }

    /// Creates and starts the exec and opens a raw-mode session on stdin.
    pub async fn exec_attach_terminal(
        &self,
        container: &ContainerConfig,
        exec: &mut ExecConfig,
    ) -> Result<ExecSession> {
        let hijacked = self.exec_attach(container, exec).await?;
        let (reader, writer) = tokio::io::split(hijacked);
        InteractiveSession::open(TermiosTerminal::stdin(), reader, writer)
    }

    /// Starts an exec created with [`exec_create`](Self::exec_create) and
    /// waits for it unless it is detached.
    pub async fn exec_start(&self, exec: &ExecConfig) -> Result<()> {
        let exec_id = exec.id()?;
        self.transport
            .post_empty(&format!("/exec/{exec_id}/start"), Some(&exec.start_body()))
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Exec, exec_id))
    }

    pub async fn exec_inspect(&self, exec: &ExecConfig) -> Result<ExecInspect> {
        let exec_id = exec.id()?;
        self.transport
            .get(&format!("/exec/{exec_id}/json"))
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Exec, exec_id))
    }

    pub async fn exec_resize(&self, exec: &ExecConfig, size: TerminalSize) -> Result<()> {
        let exec_id = exec.id()?;
        let mut query = Query::new();
        query.push("h", &size.rows.to_string());
        query.push("w", &size.cols.to_string());
        self.transport
            .post_empty::<()>(&query.to_path(&format!("/exec/{exec_id}/resize")), None)
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Exec, exec_id))
    }

    // ------------------------------------------------------------------
    // Images
    // ------------------------------------------------------------------

    /// Writes each progress record's status or build output to the image
    /// sink. Returns the image ID reported in an `aux` record, if any.
    async fn report_progress<R>(&self, body: R) -> Result<Option<String>>
    where
        R: AsyncRead + Unpin,
    {
        let mut events = ProgressStream::new(body);
        let mut image_id = None;

        while let Some(event) = events.next().await? {
            if let Some(id) = event.aux.and_then(|aux| aux.id) {
                image_id = Some(id);
            }
            let line = match (event.status, event.stream) {
                (Some(status), _) => format!("{status}\n"),
                (None, Some(stream)) => stream,
                (None, None) => continue,
            };
            let mut sink = self.image_sink.lock().await;
            sink.write_all(line.as_bytes()).await?;
            sink.flush().await?;
        }
        Ok(image_id)
    }

    fn auth_header(auth: Option<&RegistryAuth>) -> Result<Vec<(&'static str, String)>> {
        let value = match auth {
            Some(auth) => auth.encode()?,
            None => anonymous_auth(),
        };
        Ok(vec![("X-Registry-Auth", value)])
    }

    /// Pulls the image, reporting progress to the image sink.
    ///
    /// A failure reported inside the progress stream (unknown manifest,
    /// denied access, ...) fails the pull.
    pub async fn pull_image(&self, image: &ImageConfig) -> Result<()> {
        let reference = image.reference.as_str();
        let headers = Self::auth_header(image.pull.auth.as_ref())?;
        let body = self
            .transport
            .stream(
                Method::POST,
                &image.pull_query().to_path("/images/create"),
                Payload::Empty,
                &headers,
            )
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Image, reference))?;

        self.report_progress(body)
            .await
            .map_err(|e| e.operation_as(ResourceKind::Image, reference, "pull"))?;
        tracing::debug!(image = reference, "pull complete");
        Ok(())
    }

    /// Pulls the image only if it is not present locally.
    pub async fn pull_image_if_missing(&self, image: &ImageConfig) -> Result<()> {
        match self.inspect_image(image).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => self.pull_image(image).await,
            Err(e) => Err(e),
        }
    }

    /// Builds an image from the configured context. Returns the new image
    /// ID when the engine reports one.
    pub async fn build_image(&self, image: &ImageConfig) -> Result<Option<String>> {
        let Some(context) = image.build.context.as_ref() else {
            return Err(CommonError::invalid_config(
                "context",
                "no build context supplied; use ImageConfig::from_source_dir or with_build_context",
            )
            .into());
        };

        let body = self
            .transport
            .stream(
                Method::POST,
                &image.build_query()?.to_path("/build"),
                Payload::tar(context.clone()),
                &[],
            )
            .await?;

        let target = if image.reference.is_empty() {
            "<untagged>"
        } else {
            image.reference.as_str()
        };
        self.report_progress(body)
            .await
            .map_err(|e| e.operation_as(ResourceKind::Image, target, "build"))
    }

    /// Pushes the image, reporting progress to the image sink.
    pub async fn push_image(&self, image: &ImageConfig) -> Result<()> {
        let (repository, _) = split_reference(&image.reference);
        let headers = Self::auth_header(image.push.auth.as_ref())?;
        let body = self
            .transport
            .stream(
                Method::POST,
                &image.push_query().to_path(&format!("/images/{repository}/push")),
                Payload::Empty,
                &headers,
            )
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Image, &image.reference))?;

        self.report_progress(body)
            .await
            .map_err(|e| e.operation_as(ResourceKind::Image, &image.reference, "push"))?;
        Ok(())
    }

    /// Removes the image; untagged parents are pruned as well.
    pub async fn remove_image(&self, image: &ImageConfig, force: bool) -> Result<()> {
        let reference = image.reference.as_str();
        let mut query = Query::new();
        query.push_flag("force", force);
        self.transport
            .delete(&query.to_path(&format!("/images/{reference}")))
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Image, reference))
    }

    /// Adds `new_tag` (`repo[:tag]`) to the image.
    pub async fn tag_image(&self, image: &ImageConfig, new_tag: &str) -> Result<()> {
        let reference = image.reference.as_str();
        let (repo, tag) = split_reference(new_tag);
        let mut query = Query::new();
        query.push("repo", repo);
        query.push_opt("tag", tag);
        self.transport
            .post_empty::<()>(&query.to_path(&format!("/images/{reference}/tag")), None)
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Image, reference))
    }

    /// Writes the image as a tar archive to `path`.
    pub async fn save_image(&self, image: &ImageConfig, path: impl AsRef<Path>) -> Result<u64> {
        let reference = image.reference.as_str();
        let mut body = self
            .transport
            .stream(Method::GET, &format!("/images/{reference}/get"), Payload::Empty, &[])
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Image, reference))?;

        let mut file = tokio::fs::File::create(path.as_ref()).await?;
        let written = tokio::io::copy(&mut body, &mut file).await?;
        file.flush().await?;
        Ok(written)
    }

    /// Loads images from a tar archive at `path`, reporting progress to the
    /// image sink.
    pub async fn load_image(&self, path: impl AsRef<Path>) -> Result<()> {
        let archive = tokio::fs::read(path.as_ref()).await?;
        let body = self
            .transport
            .stream(Method::POST, "/images/load?quiet=1", Payload::tar(archive), &[])
            .await?;

        let source = path.as_ref().display().to_string();
        self.report_progress(body)
            .await
            .map_err(|e| e.operation_as(ResourceKind::Image, &source, "load"))?;
        Ok(())
    }

    pub async fn inspect_image(&self, image: &ImageConfig) -> Result<ImageInspect> {
        let reference = image.reference.as_str();
        self.transport
            .get(&format!("/images/{reference}/json"))
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Image, reference))
    }

    /// Image size in bytes.
    pub async fn image_size(&self, image: &ImageConfig) -> Result<i64> {
        Ok(self.inspect_image(image).await?.size)
    }

    /// Creation time as reported by the engine (RFC 3339).
    pub async fn image_created(&self, image: &ImageConfig) -> Result<String> {
        Ok(self.inspect_image(image).await?.created)
    }

    pub async fn prune_images(&self, filters: &Filters) -> Result<ImagePruneReport> {
        let mut query = Query::new();
        filters.apply(&mut query)?;
        self.transport
            .post::<_, ()>(&query.to_path("/images/prune"), None)
            .await
    }

    // ------------------------------------------------------------------
    // Networks
    // ------------------------------------------------------------------

    /// Creates the network and stores its ID in `network`.
    pub async fn create_network(&self, network: &mut NetworkConfig) -> Result<String> {
        let created: CreateResponse = self
            .transport
            .post("/networks/create", Some(&network.create_body()))
            .await
            .map_err(|e| e.already_exists_as(ResourceKind::Network, &network.name))?;

        for warning in &created.warnings {
            tracing::warn!(network = %network.name, "{}", warning);
        }
        network.id = Some(created.id.clone());
        Ok(created.id)
    }

    pub async fn remove_network(&self, network: &NetworkConfig) -> Result<()> {
        let id = network.target()?;
        self.transport
            .delete(&format!("/networks/{id}"))
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Network, id))
    }

    pub async fn inspect_network(&self, network: &NetworkConfig) -> Result<NetworkInspect> {
        let id = network.target()?;
        self.transport
            .get(&format!("/networks/{id}"))
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Network, id))
    }

    /// Connects the container and checks that the network lists it
    /// afterwards.
    pub async fn connect_network(
        &self,
        network: &NetworkConfig,
        container: &ContainerConfig,
        endpoint: Option<&EndpointConfig>,
    ) -> Result<()> {
        let network_id = network.target()?;
        let container_id = container.target()?;

        let body = ConnectBody {
            container: container_id,
            endpoint_config: endpoint,
        };
        self.transport
            .post_empty(&format!("/networks/{network_id}/connect"), Some(&body))
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Network, network_id))?;

        let inspect = self.inspect_network(network).await?;
        let attached = inspect.containers.iter().any(|(id, endpoint)| {
            id.starts_with(container_id)
                || (!container.name.is_empty() && endpoint.name == container.name)
        });
        if !attached {
            return Err(CommonError::operation(
                ResourceKind::Network,
                network_id,
                "connect",
                format!("container {container_id} not attached after connect"),
            )
            .into());
        }
        Ok(())
    }

    pub async fn disconnect_network(
        &self,
        network: &NetworkConfig,
        container: &ContainerConfig,
        force: bool,
    ) -> Result<()> {
        let network_id = network.target()?;
        let body = DisconnectBody {
            container: container.target()?,
            force,
        };
        self.transport
            .post_empty(&format!("/networks/{network_id}/disconnect"), Some(&body))
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Network, network_id))
    }

    pub async fn network_exists(&self, network: &NetworkConfig) -> Result<bool> {
        match self.inspect_network(network).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// IDs of containers attached to the network.
    pub async fn network_containers(&self, network: &NetworkConfig) -> Result<Vec<String>> {
        let inspect = self.inspect_network(network).await?;
        Ok(inspect.containers.into_keys().collect())
    }

    // ------------------------------------------------------------------
    // Volumes
    // ------------------------------------------------------------------

    pub async fn create_volume(&self, volume: &VolumeConfig) -> Result<Volume> {
        self.transport.post("/volumes/create", Some(volume)).await
    }

    pub async fn remove_volume(&self, volume: &VolumeConfig, force: bool) -> Result<()> {
        let name = volume.target()?;
        let mut query = Query::new();
        query.push_flag("force", force);
        self.transport
            .delete(&query.to_path(&format!("/volumes/{name}")))
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Volume, name))
    }

    pub async fn inspect_volume(&self, volume: &VolumeConfig) -> Result<Volume> {
        let name = volume.target()?;
        self.transport
            .get(&format!("/volumes/{name}"))
            .await
            .map_err(|e| e.not_found_as(ResourceKind::Volume, name))
    }

    pub async fn volume_exists(&self, volume: &VolumeConfig) -> Result<bool> {
        match self.inspect_volume(volume).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Size in bytes, or 0 when the driver does not report usage.
    pub async fn volume_usage(&self, volume: &VolumeConfig) -> Result<i64> {
        let inspect = self.inspect_volume(volume).await?;
        Ok(inspect.usage_data.map_or(0, |usage| usage.size))
    }

    pub async fn prune_volumes(&self, filters: &Filters) -> Result<VolumePruneReport> {
        let mut query = Query::new();
        filters.apply(&mut query)?;
        self.transport
            .post::<_, ()>(&query.to_path("/volumes/prune"), None)
            .await
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unix://{}", self.transport.socket_path().display())
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("transport", &self.transport)
            .field("stats_sink", &self.stats_sink)
            .field("log_sink", &self.log_sink.is_some())
            .finish_non_exhaustive()
    }
}

async fn copy_to_sink<R>(mut source: R, sink: &SharedWriter) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut sink = sink.lock().await;
    tokio::io::copy(&mut source, &mut *sink).await?;
    sink.flush().await?;
    Ok(())
}
