//! Engine response models.
//!
//! Only the fields the client reads are modelled; everything else in the
//! engine's responses is ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Response to a create call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateResponse {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub warnings: Vec<String>,
}

/// Response carrying only an ID (exec create, commit).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdResponse {
    #[serde(rename = "Id", alias = "ID")]
    pub id: String,
}

/// Container summary from list containers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    pub id: String,
    #[serde(default)]
    pub names: Vec<String>,
    pub image: String,
    #[serde(default, rename = "ImageID")]
    pub image_id: String,
    #[serde(default)]
    pub command: String,
    pub created: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ports: Vec<Port>,
    #[serde(default)]
    pub size_rw: Option<i64>,
    #[serde(default)]
    pub size_root_fs: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: BTreeMap<String, String>,
    pub state: String,
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mounts: Vec<MountPoint>,
}

impl ContainerSummary {
    /// First name without the leading slash.
    pub fn name(&self) -> &str {
        self.names
            .first()
            .map(|n| n.trim_start_matches('/'))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Port {
    #[serde(default, rename = "IP")]
    pub ip: Option<String>,
    pub private_port: u16,
    #[serde(default)]
    pub public_port: Option<u16>,
    #[serde(rename = "Type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MountPoint {
    #[serde(default, rename = "Type")]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    pub source: String,
    pub destination: String,
    #[serde(default, rename = "RW")]
    pub rw: bool,
}

/// Container inspect response (simplified).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInspect {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub created: String,
    pub state: ContainerState,
    #[serde(default)]
    pub config: Option<InspectConfig>,
    #[serde(default)]
    pub restart_count: i64,
}

/// Container state.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerState {
    pub status: String,
    pub running: bool,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub restarting: bool,
    #[serde(default, rename = "OOMKilled")]
    pub oom_killed: bool,
    #[serde(default)]
    pub pid: i64,
    pub exit_code: i64,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub started_at: String,
    #[serde(default)]
    pub finished_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InspectConfig {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub cmd: Option<Vec<String>>,
    #[serde(default)]
    pub tty: bool,
    #[serde(default)]
    pub open_stdin: bool,
}

/// Container wait response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WaitResponse {
    pub status_code: i64,
    #[serde(default)]
    pub error: Option<WaitError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WaitError {
    #[serde(default)]
    pub message: String,
}

/// Exec inspect response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecInspect {
    #[serde(rename = "ID")]
    pub id: String,
    pub running: bool,
    #[serde(default)]
    pub exit_code: Option<i64>,
    #[serde(default, rename = "ContainerID")]
    pub container_id: String,
    #[serde(default)]
    pub pid: i64,
}

/// Processes reported by `top`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TopResponse {
    pub titles: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub processes: Vec<Vec<String>>,
}

/// Kind of change reported by `diff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum ChangeKind {
    Modified,
    Added,
    Deleted,
}

impl From<u8> for ChangeKind {
    fn from(kind: u8) -> Self {
        match kind {
            1 => Self::Added,
            2 => Self::Deleted,
            _ => Self::Modified,
        }
    }
}

impl From<ChangeKind> for u8 {
    fn from(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Modified => 0,
            ChangeKind::Added => 1,
            ChangeKind::Deleted => 2,
        }
    }
}

/// One filesystem change reported by `diff`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilesystemChange {
    pub path: String,
    pub kind: ChangeKind,
}

/// Response to a resource update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub warnings: Vec<String>,
}

/// Outcome of a container prune.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerPruneReport {
    #[serde(default, deserialize_with = "null_as_default")]
    pub containers_deleted: Vec<String>,
    #[serde(default)]
    pub space_reclaimed: u64,
}

/// One entry of an image prune.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageDeleteItem {
    #[serde(default)]
    pub untagged: Option<String>,
    #[serde(default)]
    pub deleted: Option<String>,
}

/// Outcome of an image prune.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImagePruneReport {
    #[serde(default, deserialize_with = "null_as_default")]
    pub images_deleted: Vec<ImageDeleteItem>,
    #[serde(default)]
    pub space_reclaimed: u64,
}

/// Outcome of a volume prune.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumePruneReport {
    #[serde(default, deserialize_with = "null_as_default")]
    pub volumes_deleted: Vec<String>,
    #[serde(default)]
    pub space_reclaimed: u64,
}

/// Image inspect response (simplified).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageInspect {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub repo_tags: Vec<String>,
    #[serde(default)]
    pub created: String,
    pub size: i64,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub os: String,
}

/// Network inspect response (simplified).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkInspect {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub containers: BTreeMap<String, NetworkEndpoint>,
}

/// A container's endpoint on a network, keyed by container ID.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkEndpoint {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "EndpointID")]
    pub endpoint_id: String,
    #[serde(default, rename = "IPv4Address")]
    pub ipv4_address: String,
    #[serde(default)]
    pub mac_address: String,
}

/// Volume inspect response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Volume {
    pub name: String,
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub mountpoint: String,
    #[serde(default)]
    pub usage_data: Option<VolumeUsage>,
}

/// Disk usage of a volume, when the driver reports it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeUsage {
    pub size: i64,
    #[serde(default)]
    pub ref_count: i64,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_lists_decode_empty() {
        let summary: ContainerSummary = serde_json::from_str(
            r#"{"Id":"abc","Names":["/web"],"Image":"nginx","Created":1,
                "Ports":null,"Labels":null,"State":"running","Status":"Up 2 minutes"}"#,
        )
        .unwrap();
        assert_eq!(summary.name(), "web");
        assert!(summary.ports.is_empty());
        assert!(summary.labels.is_empty());
    }

    #[test]
    fn test_diff_kinds() {
        let body = r#"[{"Path":"/etc","Kind":0},{"Path":"/tmp/x","Kind":1},{"Path":"/old","Kind":2}]"#;
        let changes: Vec<FilesystemChange> = serde_json::from_str(body).unwrap();
        let kinds: Vec<_> = changes.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            [ChangeKind::Modified, ChangeKind::Added, ChangeKind::Deleted]
        );
    }

    #[test]
    fn test_network_containers_map() {
        let network: NetworkInspect = serde_json::from_str(
            r#"{"Id":"n1","Name":"backend","Containers":{"c1":{"Name":"api","IPv4Address":"172.18.0.2/16"}}}"#,
        )
        .unwrap();
        assert_eq!(network.containers["c1"].name, "api");
    }
}
