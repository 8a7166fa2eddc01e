//! Volume creation options.

use std::collections::BTreeMap;

use dockside_error::CommonError;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A named volume and the options it is created with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub driver_opts: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub labels: BTreeMap<String, String>,
}

impl VolumeConfig {
    /// Creates a configuration for a volume called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Volume driver, e.g. `local`, `nfs` or a plugin name.
    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    /// Adds a driver-specific option such as `type=nfs` for the local driver.
    pub fn with_driver_opt(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.driver_opts.insert(key.into(), value.into());
        self
    }

    /// Replaces all driver options.
    pub fn with_driver_opts(mut self, opts: BTreeMap<String, String>) -> Self {
        self.driver_opts = opts;
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub(crate) fn target(&self) -> Result<&str> {
        if self.name.is_empty() {
            return Err(CommonError::invalid_state("volume has no name").into());
        }
        Ok(&self.name)
    }
}

impl std::fmt::Display for VolumeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_body() {
        let volume = VolumeConfig::new("pgdata")
            .with_driver("local")
            .with_driver_opt("type", "tmpfs")
            .with_label("app", "db");

        let json = serde_json::to_value(&volume).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "Name": "pgdata",
                "Driver": "local",
                "DriverOpts": {"type": "tmpfs"},
                "Labels": {"app": "db"}
            })
        );
    }

    #[test]
    fn test_unnamed_volume_has_no_target() {
        assert!(VolumeConfig::default().target().is_err());
    }
}
