//! Configuration builders.
//!
//! Each resource has a config object assembled with chained `with_*`
//! setters and handed to a [`Client`](crate::Client) method. Serialized
//! bodies use the engine's field names and omit anything left unset.

pub mod client;
pub mod commit;
pub mod container;
pub mod exec;
pub mod filters;
pub mod host;
pub mod image;
pub mod network;
pub mod resources;
pub mod update;
pub mod volume;

use serde::{Deserialize, Serialize};

pub use client::{ClientConfig, DEFAULT_API_VERSION, DEFAULT_SOCKET_PATH};
pub use commit::CommitOptions;
pub use container::{ContainerConfig, ContainerSpec, HealthCheck};
pub use exec::{ExecConfig, ExecSpec};
pub use filters::{Filters, ListOptions, PruneFilters};
pub use host::{
    HostConfig, LogConfig, Mount, MountType, PortBinding, RestartPolicy, RestartPolicyName,
};
pub use image::{
    validate_reference, BuildOptions, ImageConfig, PullOptions, PushOptions, RegistryAuth,
};
pub use network::{EndpointConfig, NetworkConfig, NetworkSpec, NetworkingConfig};
pub use resources::Resources;
pub use update::UpdateConfig;
pub use volume::VolumeConfig;

/// Serializes as `{}`; the engine uses it as a set marker in maps such as
/// `ExposedPorts` and `Volumes`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyObject {}
