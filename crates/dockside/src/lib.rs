//! # dockside
//!
//! Typed configuration layer and client for the Docker Engine API.
//!
//! Resources are described with builder-style configuration objects and
//! handed to a [`Client`], which talks to the engine over its Unix socket.
//!
//! ## Architecture
//!
//! ```text
//! ContainerConfig / ImageConfig / ...
//!          │
//!          ▼
//!       Client ──► Transport ──► Unix socket ──► engine
//!          │
//!          ├─► dockside-stream (demux, JSON records, tee)
//!          └─► InteractiveSession (raw terminal over hijacked exec)
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use dockside::{Client, ContainerConfig, ContainerSpec};
//!
//! # async fn demo() -> dockside::Result<()> {
//! let client = Client::connect().await?;
//!
//! let mut web = ContainerConfig::new("web")
//!     .with_spec(ContainerSpec::new("nginx:alpine").with_exposed_port("80/tcp"));
//! client.create_container(&mut web).await?;
//! client.start_container(&web).await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod logs;
pub mod stats;
pub mod terminal;
pub mod transport;
pub mod types;

pub use client::{Client, ExecSession, StatsSink};
pub use config::{
    ClientConfig, CommitOptions, ContainerConfig, ContainerSpec, EndpointConfig, ExecConfig,
    Filters, HostConfig, ImageConfig, ListOptions, NetworkConfig, PruneFilters, RegistryAuth,
    Resources, RestartPolicyName, UpdateConfig, VolumeConfig,
};
pub use error::{Error, Result};
pub use logs::{LogCopier, LogOptions, LogStream};
pub use stats::{ContainerStats, FormattedStats};
pub use terminal::{InteractiveSession, RawTerminal, TermiosTerminal, TerminalSize};
