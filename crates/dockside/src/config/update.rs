//! Live resource updates for a running container.

use serde::Serialize;

use super::host::{RestartPolicy, RestartPolicyName};
use super::resources::Resources;

/// Body of `POST /containers/{id}/update`. Only fields that were set are
/// sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateConfig {
    #[serde(flatten)]
    pub resources: Resources,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<RestartPolicy>,
}

impl UpdateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the resource limits wholesale.
    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.resources = resources;
        self
    }

    /// Edits the resource limits in place.
    pub fn with<F>(mut self, edit: F) -> Self
    where
        F: FnOnce(Resources) -> Resources,
    {
        self.resources = edit(std::mem::take(&mut self.resources));
        self
    }

    pub fn with_cpu_shares(self, shares: i64) -> Self {
        self.with(|r| r.with_cpu_shares(shares))
    }

    pub fn with_memory(self, bytes: i64) -> Self {
        self.with(|r| r.with_memory(bytes))
    }

    pub fn with_nano_cpus(self, nano_cpus: i64) -> Self {
        self.with(|r| r.with_nano_cpus(nano_cpus))
    }

    pub fn with_pids_limit(self, limit: i64) -> Self {
        self.with(|r| r.with_pids_limit(limit))
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_sends_only_set_fields() {
        let update = UpdateConfig::new()
            .with_memory(256 * 1024 * 1024)
            .with(|r| r.with_cpuset_cpus("0,1"))
            .with_restart_policy(RestartPolicyName::OnFailure, 5);

        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "Memory": 268_435_456,
                "CpusetCpus": "0,1",
                "RestartPolicy": {"Name": "on-failure", "MaximumRetryCount": 5}
            })
        );
    }
}
