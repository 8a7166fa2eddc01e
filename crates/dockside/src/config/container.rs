//! Container creation configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use dockside_error::CommonError;
use serde::{Deserialize, Serialize};

use super::host::{normalize_port, HostConfig};
use super::network::{EndpointConfig, NetworkingConfig};
use super::EmptyObject;
use crate::error::Result;

/// Container health probe. Durations are sent to the engine in nanoseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthCheck {
    /// `["NONE"]`, `["CMD", args...]` or `["CMD-SHELL", command]`.
    pub test: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_period: Option<u64>,
}

impl HealthCheck {
    /// A probe that runs `args` directly in the container.
    pub fn exec<I, S>(
        start: Duration,
        timeout: Duration,
        interval: Duration,
        retries: i64,
        args: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut test = vec!["CMD".to_string()];
        test.extend(args.into_iter().map(Into::into));
        Self {
            test,
            interval: Some(nanos(interval)),
            timeout: Some(nanos(timeout)),
            retries: Some(retries),
            start_period: Some(nanos(start)),
        }
    }

    /// Disables any probe inherited from the image.
    pub fn disabled() -> Self {
        Self {
            test: vec!["NONE".to_string()],
            ..Default::default()
        }
    }
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// The engine's container `Config`: what runs and how it is attached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domainname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub attach_stdin: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub attach_stdout: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub attach_stderr: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub exposed_ports: BTreeMap<String, EmptyObject>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub tty: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub open_stdin: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub stdin_once: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub env: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub cmd: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<HealthCheck>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub args_escaped: bool,
    #[serde(default)]
    pub image: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub volumes: BTreeMap<String, EmptyObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub entrypoint: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub network_disabled: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub on_build: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_signal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_timeout: Option<i64>,
}

impl ContainerSpec {
    /// Creates a spec running `image`.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Replaces the image's default command.
    pub fn with_cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = cmd.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_entrypoint<I, S>(mut self, entrypoint: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entrypoint = entrypoint.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a `KEY=value` environment variable.
    pub fn with_env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env.push(format!("{}={}", key.as_ref(), value.as_ref()));
        self
    }

    /// Exposes a container port; a bare number is treated as TCP.
    pub fn with_exposed_port(mut self, port: impl Into<String>) -> Self {
        self.exposed_ports
            .insert(normalize_port(port.into()), EmptyObject {});
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_domainname(mut self, domainname: impl Into<String>) -> Self {
        self.domainname = Some(domainname.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_attach_stdin(mut self) -> Self {
        self.attach_stdin = true;
        self
    }

    pub fn with_attach_stdout(mut self) -> Self {
        self.attach_stdout = true;
        self
    }

    pub fn with_attach_stderr(mut self) -> Self {
        self.attach_stderr = true;
        self
    }

    /// Allocates a pseudo-terminal.
    pub fn with_tty(mut self) -> Self {
        self.tty = true;
        self
    }

    pub fn with_open_stdin(mut self) -> Self {
        self.open_stdin = true;
        self
    }

    /// Closes stdin after the first attached client disconnects.
    pub fn with_stdin_once(mut self) -> Self {
        self.stdin_once = true;
        self
    }

    pub fn with_args_escaped(mut self) -> Self {
        self.args_escaped = true;
        self
    }

    pub fn with_healthcheck(mut self, healthcheck: HealthCheck) -> Self {
        self.healthcheck = Some(healthcheck);
        self
    }

    /// Declares an anonymous volume at `path`.
    pub fn with_volume(mut self, path: impl Into<String>) -> Self {
        self.volumes.insert(path.into(), EmptyObject {});
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_network_disabled(mut self) -> Self {
        self.network_disabled = true;
        self
    }

    pub fn with_on_build<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.on_build.extend(triggers.into_iter().map(Into::into));
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_stop_signal(mut self, signal: impl Into<String>) -> Self {
        self.stop_signal = Some(signal.into());
        self
    }

    pub fn with_stop_timeout(mut self, seconds: i64) -> Self {
        self.stop_timeout = Some(seconds);
        self
    }
}

/// Everything needed to create a container, plus its ID once created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerConfig {
    /// Container name; empty lets the engine pick one.
    pub name: String,
    /// Set by [`Client::create_container`](crate::Client::create_container).
    pub id: Option<String>,
    pub spec: ContainerSpec,
    pub host: HostConfig,
    pub networking: NetworkingConfig,
    /// Target platform such as `linux/arm64`.
    pub platform: Option<String>,
}

impl ContainerConfig {
    /// Creates a configuration for a container called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Refers to an existing container by ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_spec(mut self, spec: ContainerSpec) -> Self {
        self.spec = spec;
        self
    }

    pub fn with_host(mut self, host: HostConfig) -> Self {
        self.host = host;
        self
    }

    /// Attaches the container to `network` at creation time.
    pub fn with_endpoint(mut self, network: impl Into<String>, endpoint: EndpointConfig) -> Self {
        self.networking
            .endpoints_config
            .insert(network.into(), endpoint);
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// ID if known, otherwise the name.
    pub fn target(&self) -> Result<&str> {
        match (self.id.as_deref(), self.name.as_str()) {
            (Some(id), _) if !id.is_empty() => Ok(id),
            (_, name) if !name.is_empty() => Ok(name),
            _ => Err(CommonError::invalid_state("container has neither an id nor a name").into()),
        }
    }

    /// Checks what the engine would otherwise reject with a less specific
    /// message.
    pub fn validate(&self) -> Result<()> {
        if self.spec.image.trim().is_empty() {
            return Err(CommonError::invalid_config("Image", "an image is required").into());
        }
        if self.spec.stdin_once && !self.spec.open_stdin {
            return Err(CommonError::invalid_config(
                "StdinOnce",
                "stdin_once requires open_stdin",
            )
            .into());
        }
        Ok(())
    }

    pub(crate) fn create_body(&self) -> CreateContainerBody<'_> {
        CreateContainerBody {
            spec: &self.spec,
            host_config: &self.host,
            networking_config: (!self.networking.is_empty()).then_some(&self.networking),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct CreateContainerBody<'a> {
    #[serde(flatten)]
    spec: &'a ContainerSpec,
    host_config: &'a HostConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    networking_config: Option<&'a NetworkingConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::host::RestartPolicyName;

    #[test]
    fn test_create_body_layout() {
        let config = ContainerConfig::new("web")
            .with_spec(
                ContainerSpec::new("nginx:alpine")
                    .with_env("MODE", "prod")
                    .with_exposed_port("80")
                    .with_cmd(["nginx", "-g", "daemon off;"])
                    .with_tty(),
            )
            .with_host(
                HostConfig::new()
                    .with_port_binding("0.0.0.0", "8080", "80")
                    .with_restart_policy(RestartPolicyName::UnlessStopped, 0),
            )
            .with_endpoint("frontend", EndpointConfig::new().with_aliases(["web"]));

        let json = serde_json::to_value(config.create_body()).unwrap();
        assert_eq!(json["Image"], "nginx:alpine");
        assert_eq!(json["Env"], serde_json::json!(["MODE=prod"]));
        assert_eq!(json["ExposedPorts"], serde_json::json!({"80/tcp": {}}));
        assert_eq!(json["Tty"], true);
        assert!(json.get("OpenStdin").is_none());
        assert_eq!(json["HostConfig"]["PortBindings"]["80/tcp"][0]["HostPort"], "8080");
        assert_eq!(json["HostConfig"]["RestartPolicy"]["Name"], "unless-stopped");
        assert_eq!(
            json["NetworkingConfig"]["EndpointsConfig"]["frontend"]["Aliases"][0],
            "web"
        );
    }

    #[test]
    fn test_networking_omitted_when_empty() {
        let config = ContainerConfig::new("job").with_spec(ContainerSpec::new("alpine"));
        let json = serde_json::to_value(config.create_body()).unwrap();
        assert!(json.get("NetworkingConfig").is_none());
        assert_eq!(json["HostConfig"], serde_json::json!({}));
    }

    #[test]
    fn test_healthcheck_durations_in_nanoseconds() {
        let check = HealthCheck::exec(
            Duration::from_secs(5),
            Duration::from_secs(3),
            Duration::from_secs(30),
            3,
            ["curl", "-f", "http://localhost/"],
        );

        let json = serde_json::to_value(&check).unwrap();
        assert_eq!(json["Test"][0], "CMD");
        assert_eq!(json["Interval"], 30_000_000_000u64);
        assert_eq!(json["StartPeriod"], 5_000_000_000u64);
        assert_eq!(HealthCheck::disabled().test, ["NONE"]);
    }

    #[test]
    fn test_validate() {
        assert!(ContainerConfig::new("x").validate().unwrap_err().is_invalid_config());

        let mut config =
            ContainerConfig::new("x").with_spec(ContainerSpec::new("alpine").with_stdin_once());
        assert!(config.validate().is_err());
        config.spec.open_stdin = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_target() {
        assert!(ContainerConfig::default().target().is_err());
        assert_eq!(ContainerConfig::new("web").target().unwrap(), "web");
        assert_eq!(ContainerConfig::new("web").with_id("abc").target().unwrap(), "abc");
    }
}
