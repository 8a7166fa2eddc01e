//! Connection settings for the engine socket.

use std::path::{Path, PathBuf};

use dockside_error::CommonError;

use crate::error::Result;

/// Default engine socket.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/docker.sock";

/// API version used when negotiation is disabled or fails.
pub const DEFAULT_API_VERSION: &str = "1.43";

/// How to reach the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Unix socket the engine listens on.
    pub socket_path: PathBuf,
    /// API version prefixed to every request path.
    pub api_version: String,
    /// Whether to lower `api_version` to the engine's version on connect.
    pub negotiate_version: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            api_version: DEFAULT_API_VERSION.to_string(),
            negotiate_version: true,
        }
    }
}

impl ClientConfig {
    /// Creates a configuration with the default socket and API version.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `DOCKER_HOST` and `DOCKER_API_VERSION` from the process
    /// environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    ///
    /// `DOCKER_HOST` accepts `unix:///path` or a bare absolute path; other
    /// schemes are rejected. Setting `DOCKER_API_VERSION` pins the version
    /// and turns negotiation off.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("DOCKER_HOST").filter(|v| !v.is_empty()) {
            config.socket_path = parse_host(&host)?;
        }

        if let Some(version) = lookup("DOCKER_API_VERSION").filter(|v| !v.is_empty()) {
            config.api_version = version.trim_start_matches('v').to_string();
            config.negotiate_version = false;
        }

        Ok(config)
    }

    /// Sets the socket path.
    pub fn with_socket(mut self, path: impl AsRef<Path>) -> Self {
        self.socket_path = path.as_ref().to_path_buf();
        self
    }

    /// Pins the API version and disables negotiation.
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self.negotiate_version = false;
        self
    }

    /// Enables or disables version negotiation.
    pub fn with_negotiation(mut self, negotiate: bool) -> Self {
        self.negotiate_version = negotiate;
        self
    }
}

fn parse_host(host: &str) -> Result<PathBuf> {
    if let Some(path) = host.strip_prefix("unix://") {
        if path.is_empty() {
            return Err(CommonError::invalid_config("DOCKER_HOST", "empty socket path").into());
        }
        return Ok(PathBuf::from(path));
    }

    if host.starts_with('/') {
        return Ok(PathBuf::from(host));
    }

    Err(CommonError::invalid_config(
        "DOCKER_HOST",
        format!("unsupported engine address {host}: only unix sockets are supported"),
    )
    .into())
}

/// Returns the lower of two `major.minor` API versions.
///
/// Unparseable versions lose to parseable ones.
pub(crate) fn lower_version<'a>(ours: &'a str, theirs: &'a str) -> &'a str {
    fn parse(v: &str) -> Option<(u32, u32)> {
        let (major, minor) = v.split_once('.')?;
        Some((major.parse().ok()?, minor.parse().ok()?))
    }

    match (parse(ours), parse(theirs)) {
        (Some(a), Some(b)) if b < a => theirs,
        (Some(_), _) => ours,
        (None, Some(_)) => theirs,
        (None, None) => ours,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert!(config.negotiate_version);
    }

    #[test]
    fn test_docker_host_unix_scheme() {
        let vars = [("DOCKER_HOST", "unix:///run/user/1000/docker.sock")];
        let config = ClientConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/run/user/1000/docker.sock"));
    }

    #[test]
    fn test_docker_host_tcp_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[("DOCKER_HOST", "tcp://10.0.0.1:2375")]))
            .unwrap_err();
        assert!(err.is_invalid_config());
    }

    #[test]
    fn test_pinned_version_disables_negotiation() {
        let config =
            ClientConfig::from_lookup(lookup(&[("DOCKER_API_VERSION", "v1.41")])).unwrap();
        assert_eq!(config.api_version, "1.41");
        assert!(!config.negotiate_version);
    }

    #[test]
    fn test_lower_version() {
        assert_eq!(lower_version("1.43", "1.41"), "1.41");
        assert_eq!(lower_version("1.43", "1.45"), "1.43");
        assert_eq!(lower_version("1.43", "garbage"), "1.43");
    }
}
