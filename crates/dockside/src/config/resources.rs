//! Cgroup resource limits shared by container creation and update.

use serde::{Deserialize, Serialize};

/// Weight applied to a block device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WeightDevice {
    pub path: String,
    pub weight: u16,
}

/// Read/write limit applied to a block device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ThrottleDevice {
    pub path: String,
    pub rate: u64,
}

/// Host device exposed to the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceMapping {
    pub path_on_host: String,
    pub path_in_container: String,
    pub cgroup_permissions: String,
}

/// Request for devices such as GPUs from a device driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceRequest {
    pub driver: String,
    pub count: i64,
    #[serde(rename = "DeviceIDs", skip_serializing_if = "Vec::is_empty", default)]
    pub device_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub capabilities: Vec<Vec<String>>,
}

/// Resource limit for a process inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ulimit {
    pub name: String,
    pub soft: i64,
    pub hard: i64,
}

/// Resource limits.
///
/// Every field is optional; unset fields are omitted so that an update only
/// touches what was set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resources {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_shares: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nano_cpus: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cgroup_parent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blkio_weight: Option<u16>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub blkio_weight_device: Vec<WeightDevice>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub blkio_device_read_bps: Vec<ThrottleDevice>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub blkio_device_write_bps: Vec<ThrottleDevice>,
    #[serde(
        rename = "BlkioDeviceReadIOps",
        skip_serializing_if = "Vec::is_empty",
        default
    )]
    pub blkio_device_read_iops: Vec<ThrottleDevice>,
    #[serde(
        rename = "BlkioDeviceWriteIOps",
        skip_serializing_if = "Vec::is_empty",
        default
    )]
    pub blkio_device_write_iops: Vec<ThrottleDevice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_period: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_quota: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_realtime_period: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_realtime_runtime: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpuset_cpus: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpuset_mems: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub devices: Vec<DeviceMapping>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub device_cgroup_rules: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub device_requests: Vec<DeviceRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_reservation: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_swap: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_swappiness: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oom_kill_disable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pids_limit: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub ulimits: Vec<Ulimit>,
}

impl Resources {
    /// Creates an empty set of limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Relative CPU weight.
    pub fn with_cpu_shares(mut self, shares: i64) -> Self {
        self.cpu_shares = Some(shares);
        self
    }

    /// Memory limit in bytes.
    pub fn with_memory(mut self, bytes: i64) -> Self {
        self.memory = Some(bytes);
        self
    }

    /// CPU quota in units of 10<sup>-9</sup> CPUs.
    pub fn with_nano_cpus(mut self, nano_cpus: i64) -> Self {
        self.nano_cpus = Some(nano_cpus);
        self
    }

    pub fn with_cgroup_parent(mut self, parent: impl Into<String>) -> Self {
        self.cgroup_parent = Some(parent.into());
        self
    }

    pub fn with_blkio_weight(mut self, weight: u16) -> Self {
        self.blkio_weight = Some(weight);
        self
    }

    pub fn with_blkio_weight_device(mut self, path: impl Into<String>, weight: u16) -> Self {
        self.blkio_weight_device.push(WeightDevice {
            path: path.into(),
            weight,
        });
        self
    }

    pub fn with_device_read_bps(mut self, path: impl Into<String>, rate: u64) -> Self {
        self.blkio_device_read_bps.push(ThrottleDevice {
            path: path.into(),
            rate,
        });
        self
    }

    pub fn with_device_write_bps(mut self, path: impl Into<String>, rate: u64) -> Self {
        self.blkio_device_write_bps.push(ThrottleDevice {
            path: path.into(),
            rate,
        });
        self
    }

    pub fn with_device_read_iops(mut self, path: impl Into<String>, rate: u64) -> Self {
        self.blkio_device_read_iops.push(ThrottleDevice {
            path: path.into(),
            rate,
        });
        self
    }

    pub fn with_device_write_iops(mut self, path: impl Into<String>, rate: u64) -> Self {
        self.blkio_device_write_iops.push(ThrottleDevice {
            path: path.into(),
            rate,
        });
        self
    }

    /// CFS period in microseconds.
    pub fn with_cpu_period(mut self, period: i64) -> Self {
        self.cpu_period = Some(period);
        self
    }

    /// CFS quota in microseconds per period.
    pub fn with_cpu_quota(mut self, quota: i64) -> Self {
        self.cpu_quota = Some(quota);
        self
    }

    pub fn with_cpu_realtime_period(mut self, period: i64) -> Self {
        self.cpu_realtime_period = Some(period);
        self
    }

    pub fn with_cpu_realtime_runtime(mut self, runtime: i64) -> Self {
        self.cpu_realtime_runtime = Some(runtime);
        self
    }

    /// CPUs the container may run on, e.g. `0-3` or `0,1`.
    pub fn with_cpuset_cpus(mut self, cpus: impl Into<String>) -> Self {
        self.cpuset_cpus = Some(cpus.into());
        self
    }

    pub fn with_cpuset_mems(mut self, mems: impl Into<String>) -> Self {
        self.cpuset_mems = Some(mems.into());
        self
    }

    /// Exposes a host device, e.g. `("/dev/fuse", "/dev/fuse", "rwm")`.
    pub fn with_device(
        mut self,
        path_on_host: impl Into<String>,
        path_in_container: impl Into<String>,
        permissions: impl Into<String>,
    ) -> Self {
        self.devices.push(DeviceMapping {
            path_on_host: path_on_host.into(),
            path_in_container: path_in_container.into(),
            cgroup_permissions: permissions.into(),
        });
        self
    }

    pub fn with_device_cgroup_rule(mut self, rule: impl Into<String>) -> Self {
        self.device_cgroup_rules.push(rule.into());
        self
    }

    /// Requests `count` devices from `driver`; `-1` means all.
    pub fn with_device_request(
        mut self,
        driver: impl Into<String>,
        count: i64,
        device_ids: Vec<String>,
        capabilities: Vec<Vec<String>>,
    ) -> Self {
        self.device_requests.push(DeviceRequest {
            driver: driver.into(),
            count,
            device_ids,
            capabilities,
        });
        self
    }

    /// Soft memory limit in bytes.
    pub fn with_memory_reservation(mut self, bytes: i64) -> Self {
        self.memory_reservation = Some(bytes);
        self
    }

    /// Memory plus swap limit in bytes; `-1` for unlimited swap.
    pub fn with_memory_swap(mut self, bytes: i64) -> Self {
        self.memory_swap = Some(bytes);
        self
    }

    pub fn with_memory_swappiness(mut self, swappiness: i64) -> Self {
        self.memory_swappiness = Some(swappiness);
        self
    }

    pub fn with_oom_kill_disable(mut self, disable: bool) -> Self {
        self.oom_kill_disable = Some(disable);
        self
    }

    pub fn with_pids_limit(mut self, limit: i64) -> Self {
        self.pids_limit = Some(limit);
        self
    }

    pub fn with_ulimit(mut self, name: impl Into<String>, soft: i64, hard: i64) -> Self {
        self.ulimits.push(Ulimit {
            name: name.into(),
            soft,
            hard,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_resources_serialize_to_empty_object() {
        let json = serde_json::to_value(Resources::new()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }

    #[test]
    fn test_engine_field_names() {
        let resources = Resources::new()
            .with_memory(512 * 1024 * 1024)
            .with_nano_cpus(1_500_000_000)
            .with_device_read_iops("/dev/sda", 100)
            .with_device_request("nvidia", -1, vec![], vec![vec!["gpu".into()]])
            .with_ulimit("nofile", 1024, 2048);

        let json = serde_json::to_value(&resources).unwrap();
        assert_eq!(json["Memory"], 536_870_912);
        assert_eq!(json["NanoCpus"], 1_500_000_000);
        assert_eq!(json["BlkioDeviceReadIOps"][0]["Path"], "/dev/sda");
        assert_eq!(json["DeviceRequests"][0]["Capabilities"][0][0], "gpu");
        assert!(json["DeviceRequests"][0].get("DeviceIDs").is_none());
        assert_eq!(json["Ulimits"][0]["Hard"], 2048);
    }
}
