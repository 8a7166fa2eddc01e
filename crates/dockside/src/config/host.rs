//! Host-side container configuration: ports, mounts, restart policy,
//! namespaces and resource limits.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::resources::Resources;

/// Host address a container port is published on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortBinding {
    #[serde(rename = "HostIp")]
    pub host_ip: String,
    pub host_port: String,
}

/// When the engine restarts a stopped container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicyName {
    #[default]
    No,
    Always,
    UnlessStopped,
    OnFailure,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestartPolicy {
    pub name: RestartPolicyName,
    /// Only meaningful with [`RestartPolicyName::OnFailure`].
    pub maximum_retry_count: i64,
}

/// Kind of mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountType {
    Bind,
    Volume,
    Tmpfs,
    Npipe,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Mount {
    #[serde(rename = "Type")]
    pub kind: MountType,
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

/// Logging driver for the container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(rename = "Type")]
    pub driver: String,
    #[serde(rename = "Config", skip_serializing_if = "BTreeMap::is_empty", default)]
    pub options: BTreeMap<String, String>,
}

/// The engine's `HostConfig`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub binds: Vec<String>,
    #[serde(rename = "ContainerIDFile", skip_serializing_if = "Option::is_none")]
    pub container_id_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_config: Option<LogConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub port_bindings: BTreeMap<String, Vec<PortBinding>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<RestartPolicy>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub auto_remove: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_driver: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub volumes_from: Vec<String>,
    /// `[height, width]` of the initial TTY.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console_size: Option<[u16; 2]>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub cap_add: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub cap_drop: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub dns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub dns_options: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub dns_search: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub extra_hosts: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub group_add: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipc_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cgroup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oom_score_adj: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid_mode: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub privileged: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub publish_all_ports: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub readonly_rootfs: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub security_opt: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub storage_opt: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub tmpfs: BTreeMap<String, String>,
    #[serde(rename = "UTSMode", skip_serializing_if = "Option::is_none")]
    pub uts_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userns_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shm_size: Option<i64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub sysctls: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isolation: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub masked_paths: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub readonly_paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub mounts: Vec<Mount>,
    #[serde(flatten)]
    pub resources: Resources,
}

impl HostConfig {
    /// Creates an empty host configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a bind mount in `host:container[:mode]` form.
    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.binds.push(bind.into());
        self
    }

    pub fn with_container_id_file(mut self, path: impl Into<String>) -> Self {
        self.container_id_file = Some(path.into());
        self
    }

    /// Selects the logging driver and its options.
    pub fn with_log_config(
        mut self,
        driver: impl Into<String>,
        options: BTreeMap<String, String>,
    ) -> Self {
        self.log_config = Some(LogConfig {
            driver: driver.into(),
            options,
        });
        self
    }

    /// `bridge`, `host`, `none`, `container:<id>` or a network name.
    pub fn with_network_mode(mut self, mode: impl Into<String>) -> Self {
        self.network_mode = Some(mode.into());
        self
    }

    /// Publishes `container_port` on `host_ip:host_port`.
    ///
    /// A port without a protocol is treated as TCP. Binding the same
    /// container port again replaces the earlier binding.
    pub fn with_port_binding(
        mut self,
        host_ip: impl Into<String>,
        host_port: impl Into<String>,
        container_port: impl Into<String>,
    ) -> Self {
        let port = normalize_port(container_port.into());
        self.port_bindings.insert(
            port,
            vec![PortBinding {
                host_ip: host_ip.into(),
                host_port: host_port.into(),
            }],
        );
        self
    }

    pub fn with_restart_policy(
        mut self,
        name: RestartPolicyName,
        maximum_retry_count: i64,
    ) -> Self {
        self.restart_policy = Some(RestartPolicy {
            name,
            maximum_retry_count,
        });
        self
    }

    /// Shorthand for an `always` restart policy.
    pub fn with_restart_always(self) -> Self {
        self.with_restart_policy(RestartPolicyName::Always, 0)
    }

    /// Removes the container once it exits.
    pub fn with_auto_remove(mut self, auto_remove: bool) -> Self {
        self.auto_remove = auto_remove;
        self
    }

    pub fn with_volume_driver(mut self, driver: impl Into<String>) -> Self {
        self.volume_driver = Some(driver.into());
        self
    }

    pub fn with_volumes_from(mut self, container: impl Into<String>) -> Self {
        self.volumes_from.push(container.into());
        self
    }

    pub fn with_console_size(mut self, height: u16, width: u16) -> Self {
        self.console_size = Some([height, width]);
        self
    }

    pub fn with_cap_add<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cap_add.extend(caps.into_iter().map(Into::into));
        self
    }

    pub fn with_cap_drop<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cap_drop.extend(caps.into_iter().map(Into::into));
        self
    }

    /// Adds DNS servers.
    pub fn with_dns<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dns.extend(servers.into_iter().map(Into::into));
        self
    }

    pub fn with_dns_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dns_options.extend(options.into_iter().map(Into::into));
        self
    }

    pub fn with_dns_search<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dns_search.extend(domains.into_iter().map(Into::into));
        self
    }

    /// Adds `/etc/hosts` entries in `host:ip` form.
    pub fn with_extra_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_hosts.extend(hosts.into_iter().map(Into::into));
        self
    }

    pub fn with_group_add<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_add.extend(groups.into_iter().map(Into::into));
        self
    }

    pub fn with_ipc_mode(mut self, mode: impl Into<String>) -> Self {
        self.ipc_mode = Some(mode.into());
        self
    }

    pub fn with_cgroup(mut self, cgroup: impl Into<String>) -> Self {
        self.cgroup = Some(cgroup.into());
        self
    }

    pub fn with_oom_score_adj(mut self, score: i32) -> Self {
        self.oom_score_adj = Some(score);
        self
    }

    pub fn with_pid_mode(mut self, mode: impl Into<String>) -> Self {
        self.pid_mode = Some(mode.into());
        self
    }

    pub fn with_privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn with_publish_all_ports(mut self, publish: bool) -> Self {
        self.publish_all_ports = publish;
        self
    }

    pub fn with_readonly_rootfs(mut self, readonly: bool) -> Self {
        self.readonly_rootfs = readonly;
        self
    }

    pub fn with_security_opt(mut self, opt: impl Into<String>) -> Self {
        self.security_opt.push(opt.into());
        self
    }

    /// Shorthand for the `no-new-privileges` security option.
    pub fn with_no_new_privileges(self) -> Self {
        self.with_security_opt("no-new-privileges")
    }

    pub fn with_storage_opt(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.storage_opt.insert(key.into(), value.into());
        self
    }

    /// Mounts a tmpfs at `path` with comma-separated mount `options`.
    pub fn with_tmpfs(mut self, path: impl Into<String>, options: impl Into<String>) -> Self {
        self.tmpfs.insert(path.into(), options.into());
        self
    }

    pub fn with_uts_mode(mut self, mode: impl Into<String>) -> Self {
        self.uts_mode = Some(mode.into());
        self
    }

    pub fn with_userns_mode(mut self, mode: impl Into<String>) -> Self {
        self.userns_mode = Some(mode.into());
        self
    }

    /// Size of `/dev/shm` in bytes.
    pub fn with_shm_size(mut self, bytes: i64) -> Self {
        self.shm_size = Some(bytes);
        self
    }

    pub fn with_sysctl(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.sysctls.insert(key.into(), value.into());
        self
    }

    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = Some(runtime.into());
        self
    }

    pub fn with_isolation(mut self, isolation: impl Into<String>) -> Self {
        self.isolation = Some(isolation.into());
        self
    }

    pub fn with_masked_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.masked_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn with_readonly_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.readonly_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Runs an init process as PID 1.
    pub fn with_init(mut self, init: bool) -> Self {
        self.init = Some(init);
        self
    }

    pub fn with_mount(
        mut self,
        kind: MountType,
        source: impl Into<String>,
        target: impl Into<String>,
        read_only: bool,
    ) -> Self {
        self.mounts.push(Mount {
            kind,
            source: source.into(),
            target: target.into(),
            read_only,
        });
        self
    }

    /// Replaces the resource limits.
    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.resources = resources;
        self
    }

    /// Shorthand for a memory limit in bytes.
    pub fn with_memory(mut self, bytes: i64) -> Self {
        self.resources.memory = Some(bytes);
        self
    }
}

/// Appends `/tcp` to a bare port number.
pub(crate) fn normalize_port(port: String) -> String {
    if port.contains('/') {
        port
    } else {
        format!("{port}/tcp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_host_config_is_empty_object() {
        assert_eq!(serde_json::to_value(HostConfig::new()).unwrap(), serde_json::json!({}));
    }

    #[test]
    fn test_port_binding_defaults_to_tcp_and_replaces() {
        let host = HostConfig::new()
            .with_port_binding("0.0.0.0", "8080", "80")
            .with_port_binding("127.0.0.1", "9090", "80/tcp")
            .with_port_binding("", "5353", "53/udp");

        let json = serde_json::to_value(&host).unwrap();
        let bindings = json["PortBindings"].as_object().unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(json["PortBindings"]["80/tcp"][0]["HostIp"], "127.0.0.1");
        assert_eq!(json["PortBindings"]["80/tcp"][0]["HostPort"], "9090");
        assert_eq!(json["PortBindings"]["53/udp"][0]["HostPort"], "5353");
    }

    #[test]
    fn test_restart_policy_names() {
        let host = HostConfig::new().with_restart_policy(RestartPolicyName::OnFailure, 3);
        let json = serde_json::to_value(&host).unwrap();
        assert_eq!(json["RestartPolicy"]["Name"], "on-failure");
        assert_eq!(json["RestartPolicy"]["MaximumRetryCount"], 3);

        let json = serde_json::to_value(HostConfig::new().with_restart_always()).unwrap();
        assert_eq!(json["RestartPolicy"]["Name"], "always");
    }

    #[test]
    fn test_resources_flatten_into_host_config() {
        let host = HostConfig::new()
            .with_memory(64 * 1024 * 1024)
            .with_auto_remove(true)
            .with_mount(MountType::Volume, "data", "/var/lib/data", false)
            .with_tmpfs("/run", "rw,size=64m")
            .with_uts_mode("host");

        let json = serde_json::to_value(&host).unwrap();
        assert_eq!(json["Memory"], 67_108_864);
        assert_eq!(json["AutoRemove"], true);
        assert_eq!(json["Mounts"][0]["Type"], "volume");
        assert_eq!(json["Mounts"][0]["ReadOnly"], false);
        assert_eq!(json["Tmpfs"]["/run"], "rw,size=64m");
        assert_eq!(json["UTSMode"], "host");
        assert!(json.get("Resources").is_none());
    }
}
