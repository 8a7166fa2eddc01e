//! Image references and pull, push and build options.

use std::collections::BTreeMap;
use std::path::Path;

use base64::Engine as _;
use dockside_error::CommonError;
use serde::Serialize;

use crate::error::Result;
use crate::transport::Query;

/// Credentials for a registry, sent base64-encoded in `X-Registry-Auth`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryAuth {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(rename = "serveraddress", skip_serializing_if = "String::is_empty")]
    pub server_address: String,
}

impl RegistryAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            server_address: String::new(),
        }
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server_address = server.into();
        self
    }

    /// Encodes the credentials the way the engine expects them in
    /// `X-Registry-Auth`.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(base64::engine::general_purpose::URL_SAFE.encode(json))
    }
}

/// Header value for requests that carry no credentials.
pub(crate) fn anonymous_auth() -> String {
    base64::engine::general_purpose::URL_SAFE.encode(b"{}")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullOptions {
    /// Pulls every tag of the repository instead of one.
    pub all_tags: bool,
    /// Platform such as `linux/amd64`.
    pub platform: Option<String>,
    pub auth: Option<RegistryAuth>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOptions {
    pub all_tags: bool,
    pub auth: Option<RegistryAuth>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Tar archive sent as the build context.
    pub context: Option<Vec<u8>>,
    pub tags: Vec<String>,
    /// Dockerfile path relative to the context root.
    pub dockerfile: Option<String>,
    pub build_args: BTreeMap<String, Option<String>>,
    pub target: Option<String>,
    pub network_mode: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub no_cache: bool,
    /// Removes intermediate containers after a successful build.
    pub remove: bool,
    /// Always removes intermediate containers.
    pub force_remove: bool,
    /// Always attempts to pull a newer base image.
    pub pull_parent: bool,
    pub platform: Option<String>,
    pub memory: Option<i64>,
    pub shm_size: Option<i64>,
    pub cpu_shares: Option<i64>,
    pub cpuset_cpus: Option<String>,
    pub extra_hosts: Vec<String>,
    pub squash: bool,
}

impl BuildOptions {
    fn apply(&self, query: &mut Query) -> Result<()> {
        for tag in &self.tags {
            query.push("t", tag);
        }
        query.push_opt("dockerfile", self.dockerfile.as_deref());
        if !self.build_args.is_empty() {
            query.push("buildargs", &serde_json::to_string(&self.build_args)?);
        }
        query.push_opt("target", self.target.as_deref());
        query.push_opt("networkmode", self.network_mode.as_deref());
        if !self.labels.is_empty() {
            query.push("labels", &serde_json::to_string(&self.labels)?);
        }
        query.push_flag("nocache", self.no_cache);
        query.push("rm", if self.remove { "1" } else { "0" });
        query.push_flag("forcerm", self.force_remove);
        query.push_flag("pull", self.pull_parent);
        query.push_flag("squash", self.squash);
        query.push_opt("platform", self.platform.as_deref());
        if let Some(memory) = self.memory {
            query.push("memory", &memory.to_string());
        }
        if let Some(shm_size) = self.shm_size {
            query.push("shmsize", &shm_size.to_string());
        }
        if let Some(shares) = self.cpu_shares {
            query.push("cpushares", &shares.to_string());
        }
        query.push_opt("cpusetcpus", self.cpuset_cpus.as_deref());
        if !self.extra_hosts.is_empty() {
            query.push("extrahosts", &self.extra_hosts.join(","));
        }
        Ok(())
    }
}

/// An image reference with the options used to pull, push or build it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageConfig {
    /// `[registry/]repository[:tag|@digest]`; empty for an untagged build.
    pub reference: String,
    pub pull: PullOptions,
    pub push: PushOptions,
    pub build: BuildOptions,
}

impl ImageConfig {
    /// Creates a configuration for `reference` after validating it.
    pub fn new(reference: impl Into<String>) -> Result<Self> {
        let reference = reference.into();
        validate_reference(&reference)?;
        Ok(Self {
            reference,
            build: BuildOptions {
                remove: true,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    /// Creates a build configuration whose context is the tarred contents of
    /// `dir`. The directory must contain a `Dockerfile` at its root.
    pub fn from_source_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(CommonError::invalid_config(
                "context",
                format!("source directory {} does not exist", dir.display()),
            )
            .into());
        }
        if !dir.join("Dockerfile").is_file() {
            return Err(CommonError::invalid_config(
                "Dockerfile",
                format!("Dockerfile not found in directory: {}", dir.display()),
            )
            .into());
        }

        let context = build_context(dir)?;
        tracing::debug!(dir = %dir.display(), bytes = context.len(), "packed build context");

        Ok(Self {
            build: BuildOptions {
                context: Some(context),
                remove: true,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    /// Adds a tag applied by a build. The first tag also becomes the
    /// reference if none was set.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if self.reference.is_empty() {
            self.reference = tag.clone();
        }
        self.build.tags.push(tag);
        self
    }

    pub fn with_build_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build.build_args.insert(key.into(), Some(value.into()));
        self
    }

    pub fn with_dockerfile(mut self, path: impl Into<String>) -> Self {
        self.build.dockerfile = Some(path.into());
        self
    }

    /// Supplies a build context tar archive directly.
    pub fn with_build_context(mut self, context: Vec<u8>) -> Self {
        self.build.context = Some(context);
        self
    }

    pub fn with_build_target(mut self, target: impl Into<String>) -> Self {
        self.build.target = Some(target.into());
        self
    }

    pub fn with_build_network_mode(mut self, mode: impl Into<String>) -> Self {
        self.build.network_mode = Some(mode.into());
        self
    }

    pub fn with_build_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.build.no_cache = !enabled;
        self
    }

    pub fn with_remove_intermediate(mut self, remove: bool) -> Self {
        self.build.remove = remove;
        self
    }

    pub fn with_force_remove(mut self, force: bool) -> Self {
        self.build.force_remove = force;
        self
    }

    pub fn with_pull_parent(mut self, pull: bool) -> Self {
        self.build.pull_parent = pull;
        self
    }

    pub fn with_build_platform(mut self, platform: impl Into<String>) -> Self {
        self.build.platform = Some(platform.into());
        self
    }

    pub fn with_build_memory(mut self, bytes: i64) -> Self {
        self.build.memory = Some(bytes);
        self
    }

    pub fn with_build_shm_size(mut self, bytes: i64) -> Self {
        self.build.shm_size = Some(bytes);
        self
    }

    pub fn with_build_extra_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.build
            .extra_hosts
            .extend(hosts.into_iter().map(Into::into));
        self
    }

    pub fn with_squash(mut self, squash: bool) -> Self {
        self.build.squash = squash;
        self
    }

    pub fn with_pull_all_tags(mut self, all: bool) -> Self {
        self.pull.all_tags = all;
        self
    }

    pub fn with_pull_platform(mut self, platform: impl Into<String>) -> Self {
        self.pull.platform = Some(platform.into());
        self
    }

    /// Credentials used for both pull and push.
    pub fn with_registry_auth(mut self, auth: RegistryAuth) -> Self {
        self.pull.auth = Some(auth.clone());
        self.push.auth = Some(auth);
        self
    }

    /// Splits the reference into the `fromImage` and `tag` pull parameters.
    ///
    /// A digest reference is passed through whole. Without a tag the pull
    /// defaults to `latest` unless every tag was requested.
    pub fn repository_and_tag(&self) -> (&str, Option<&str>) {
        let (repository, tag) = split_reference(&self.reference);
        match tag {
            Some(tag) => (repository, Some(tag)),
            None if self.reference.contains('@') || self.pull.all_tags => (repository, None),
            None => (repository, Some("latest")),
        }
    }

    pub(crate) fn pull_query(&self) -> Query {
        let (repository, tag) = self.repository_and_tag();
        let mut query = Query::new();
        query.push("fromImage", repository);
        query.push_opt("tag", tag);
        query.push_opt("platform", self.pull.platform.as_deref());
        query
    }

    pub(crate) fn push_query(&self) -> Query {
        let (_, tag) = split_reference(&self.reference);
        let mut query = Query::new();
        if !self.push.all_tags {
            query.push_opt("tag", tag);
        }
        query
    }

    pub(crate) fn build_query(&self) -> Result<Query> {
        let mut query = Query::new();
        self.build.apply(&mut query)?;
        Ok(query)
    }
}

impl std::fmt::Display for ImageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reference)
    }
}

/// Splits `repo[:tag]` at the tag separator; a colon in the registry host
/// (before the last `/`) is not a tag separator.
pub(crate) fn split_reference(reference: &str) -> (&str, Option<&str>) {
    if reference.contains('@') {
        return (reference, None);
    }
    let name_start = reference.rfind('/').map_or(0, |i| i + 1);
    match reference[name_start..].rfind(':') {
        Some(i) => {
            let at = name_start + i;
            (&reference[..at], Some(&reference[at + 1..]))
        }
        None => (reference, None),
    }
}

/// Checks an image reference against the engine's naming rules.
pub fn validate_reference(reference: &str) -> Result<()> {
    let invalid = |message: String| -> crate::Error {
        CommonError::invalid_config("reference", message).into()
    };

    if reference.is_empty() {
        return Err(invalid("image reference cannot be empty".into()));
    }

    let parts: Vec<&str> = reference.split('/').collect();
    if parts.len() > 3 {
        return Err(invalid(format!("invalid image reference format: {reference}")));
    }
    if parts.len() == 3 {
        let registry = parts[0];
        if !registry.contains('.')
            && registry != "localhost"
            && !registry.starts_with("localhost:")
        {
            return Err(invalid(format!(
                "invalid registry format in reference: {reference}"
            )));
        }
    }

    let name = parts[parts.len() - 1];
    if name.matches(':').count() > 1 {
        return Err(invalid(format!("invalid tag format in reference: {reference}")));
    }
    if name.contains('@') && !name.contains("sha256:") {
        return Err(invalid(format!(
            "invalid digest format in reference: {reference}"
        )));
    }

    Ok(())
}

fn build_context(dir: &Path) -> Result<Vec<u8>> {
    let mut archive = tar::Builder::new(Vec::new());
    archive.follow_symlinks(false);
    archive.append_dir_all(".", dir)?;
    Ok(archive.into_inner()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_reference() {
        for ok in [
            "alpine",
            "alpine:3.19",
            "library/alpine:latest",
            "ghcr.io/owner/app:v1",
            "localhost/team/app",
            "alpine@sha256:deadbeef",
        ] {
            assert!(validate_reference(ok).is_ok(), "{ok} should be valid");
        }

        for bad in [
            "",
            "a/b/c/d",
            "notaregistry/team/app",
            "alpine:1:2",
            "alpine@md5:abc",
        ] {
            let err = validate_reference(bad).unwrap_err();
            assert!(err.is_invalid_config(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_repository_and_tag() {
        let image = ImageConfig::new("alpine").unwrap();
        assert_eq!(image.repository_and_tag(), ("alpine", Some("latest")));

        let image = ImageConfig::new("localhost:5000/team/app:v2").unwrap();
        assert_eq!(image.repository_and_tag(), ("localhost:5000/team/app", Some("v2")));

        let image = ImageConfig::new("alpine@sha256:abc").unwrap();
        assert_eq!(image.repository_and_tag(), ("alpine@sha256:abc", None));

        let image = ImageConfig::new("alpine").unwrap().with_pull_all_tags(true);
        assert_eq!(image.repository_and_tag(), ("alpine", None));
    }

    #[test]
    fn test_build_query() {
        let image = ImageConfig::default()
            .with_tag("app:dev")
            .with_tag("app:latest")
            .with_build_arg("VERSION", "1.0.0")
            .with_cache(false);

        assert_eq!(image.reference, "app:dev");
        let query = image.build_query().unwrap().to_string();
        assert!(query.starts_with("t=app%3Adev&t=app%3Alatest"));
        assert!(query.contains("buildargs=%7B%22VERSION%22%3A%221.0.0%22%7D"));
        assert!(query.contains("nocache=1"));
        assert!(query.contains("rm=0"));
    }

    #[test]
    fn test_from_source_dir_requires_dockerfile() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImageConfig::from_source_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Dockerfile not found"));

        std::fs::write(dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();
        std::fs::write(dir.path().join("app.sh"), "echo hi\n").unwrap();
        let image = ImageConfig::from_source_dir(dir.path()).unwrap();

        let context = image.build.context.unwrap();
        let mut archive = tar::Archive::new(context.as_slice());
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().display().to_string())
            .collect();
        assert!(names.iter().any(|n| n.ends_with("Dockerfile")));
        assert!(names.iter().any(|n| n.ends_with("app.sh")));
    }

    #[test]
    fn test_registry_auth_encoding() {
        let encoded = RegistryAuth::new("user", "pass").encode().unwrap();
        let decoded = base64::engine::general_purpose::URL_SAFE
            .decode(encoded)
            .unwrap();
        assert_eq!(decoded, br#"{"username":"user","password":"pass"}"#);
        assert_eq!(anonymous_auth(), "e30=");
    }
}
