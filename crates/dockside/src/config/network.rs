//! Network creation and per-container endpoint settings.

use std::collections::BTreeMap;

use dockside_error::CommonError;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Static addressing for an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointIpamConfig {
    #[serde(rename = "IPv4Address", skip_serializing_if = "Option::is_none")]
    pub ipv4_address: Option<String>,
    #[serde(rename = "IPv6Address", skip_serializing_if = "Option::is_none")]
    pub ipv6_address: Option<String>,
    #[serde(rename = "LinkLocalIPs", skip_serializing_if = "Vec::is_empty", default)]
    pub link_local_ips: Vec<String>,
}

/// How a container attaches to one network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointConfig {
    #[serde(rename = "IPAMConfig", skip_serializing_if = "Option::is_none")]
    pub ipam_config: Option<EndpointIpamConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub links: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub aliases: Vec<String>,
    #[serde(rename = "NetworkID", skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    #[serde(rename = "EndpointID", skip_serializing_if = "Option::is_none")]
    pub endpoint_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(rename = "IPAddress", skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(rename = "IPPrefixLen", skip_serializing_if = "Option::is_none")]
    pub ip_prefix_len: Option<u8>,
    #[serde(rename = "IPv6Gateway", skip_serializing_if = "Option::is_none")]
    pub ipv6_gateway: Option<String>,
    #[serde(rename = "GlobalIPv6Address", skip_serializing_if = "Option::is_none")]
    pub global_ipv6_address: Option<String>,
    #[serde(rename = "GlobalIPv6PrefixLen", skip_serializing_if = "Option::is_none")]
    pub global_ipv6_prefix_len: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub driver_opts: BTreeMap<String, String>,
}

impl EndpointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_driver_opt(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.driver_opts.insert(key.into(), value.into());
        self
    }

    pub fn with_ipv4_address(mut self, addr: impl Into<String>) -> Self {
        self.ip_address = Some(addr.into());
        self
    }

    pub fn with_ipv4_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = Some(gateway.into());
        self
    }

    pub fn with_ipv4_prefix_len(mut self, len: u8) -> Self {
        self.ip_prefix_len = Some(len);
        self
    }

    pub fn with_ipv6_address(mut self, addr: impl Into<String>) -> Self {
        self.global_ipv6_address = Some(addr.into());
        self
    }

    pub fn with_ipv6_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.ipv6_gateway = Some(gateway.into());
        self
    }

    pub fn with_ipv6_prefix_len(mut self, len: u8) -> Self {
        self.global_ipv6_prefix_len = Some(len);
        self
    }

    pub fn with_mac_address(mut self, mac: impl Into<String>) -> Self {
        self.mac_address = Some(mac.into());
        self
    }

    pub fn with_links<I, S>(mut self, links: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.links.extend(links.into_iter().map(Into::into));
        self
    }

    /// DNS names the container answers to on this network.
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn with_network_id(mut self, id: impl Into<String>) -> Self {
        self.network_id = Some(id.into());
        self
    }

    pub fn with_endpoint_id(mut self, id: impl Into<String>) -> Self {
        self.endpoint_id = Some(id.into());
        self
    }

    /// Requests static addresses. Empty strings are left unset.
    pub fn with_ipam(
        mut self,
        ipv4: impl Into<String>,
        ipv6: impl Into<String>,
        link_local_ips: Vec<String>,
    ) -> Self {
        let ipv4 = ipv4.into();
        let ipv6 = ipv6.into();
        self.ipam_config = Some(EndpointIpamConfig {
            ipv4_address: (!ipv4.is_empty()).then_some(ipv4),
            ipv6_address: (!ipv6.is_empty()).then_some(ipv6),
            link_local_ips,
        });
        self
    }
}

/// Endpoints to attach at container creation, keyed by network name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkingConfig {
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub endpoints_config: BTreeMap<String, EndpointConfig>,
}

impl NetworkingConfig {
    pub fn is_empty(&self) -> bool {
        self.endpoints_config.is_empty()
    }
}

/// One IPAM pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpamPool {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,
    #[serde(rename = "IPRange", skip_serializing_if = "Option::is_none")]
    pub ip_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ipam {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub config: Vec<IpamPool>,
}

/// Network creation options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(rename = "EnableIPv6", skip_serializing_if = "Option::is_none")]
    pub enable_ipv6: Option<bool>,
    #[serde(rename = "IPAM", skip_serializing_if = "Option::is_none")]
    pub ipam: Option<Ipam>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub internal: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub attachable: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub ingress: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub config_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_from: Option<ConfigReference>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub options: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigReference {
    pub network: String,
}

/// A network: its name, creation options and, once created, its ID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkConfig {
    pub name: String,
    /// Set by [`Client::create_network`](crate::Client::create_network).
    pub id: Option<String>,
    pub spec: NetworkSpec,
}

impl NetworkConfig {
    /// Creates a configuration for a network called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Refers to an existing network by ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Network driver, e.g. `bridge` or `overlay`.
    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.spec.driver = Some(driver.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.spec.scope = Some(scope.into());
        self
    }

    pub fn with_ipv6(mut self, enable: bool) -> Self {
        self.spec.enable_ipv6 = Some(enable);
        self
    }

    /// Adds an address pool.
    pub fn with_subnet(mut self, subnet: impl Into<String>, gateway: Option<String>) -> Self {
        let ipam = self.spec.ipam.get_or_insert_with(Ipam::default);
        ipam.config.push(IpamPool {
            subnet: Some(subnet.into()),
            ip_range: None,
            gateway,
        });
        self
    }

    /// Restricts external access to the network.
    pub fn with_internal(mut self) -> Self {
        self.spec.internal = true;
        self
    }

    /// Lets standalone containers join a swarm-scoped network.
    pub fn with_attachable(mut self) -> Self {
        self.spec.attachable = true;
        self
    }

    pub fn with_ingress(mut self) -> Self {
        self.spec.ingress = true;
        self
    }

    pub fn with_config_only(mut self) -> Self {
        self.spec.config_only = true;
        self
    }

    /// Takes configuration from another (config-only) network.
    pub fn with_config_from(mut self, network: impl Into<String>) -> Self {
        self.spec.config_from = Some(ConfigReference {
            network: network.into(),
        });
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.options.insert(key.into(), value.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.labels.insert(key.into(), value.into());
        self
    }

    /// ID if known, otherwise the name.
    pub fn target(&self) -> Result<&str> {
        match (self.id.as_deref(), self.name.as_str()) {
            (Some(id), _) if !id.is_empty() => Ok(id),
            (_, name) if !name.is_empty() => Ok(name),
            _ => Err(CommonError::invalid_state("network has neither an id nor a name").into()),
        }
    }

    pub(crate) fn create_body(&self) -> CreateNetworkBody<'_> {
        CreateNetworkBody {
            name: &self.name,
            spec: &self.spec,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct CreateNetworkBody<'a> {
    name: &'a str,
    #[serde(flatten)]
    spec: &'a NetworkSpec,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_body_flattens_spec() {
        let network = NetworkConfig::new("backend")
            .with_driver("bridge")
            .with_internal()
            .with_subnet("10.10.0.0/16", Some("10.10.0.1".into()))
            .with_label("team", "infra");

        let json = serde_json::to_value(network.create_body()).unwrap();
        assert_eq!(json["Name"], "backend");
        assert_eq!(json["Driver"], "bridge");
        assert_eq!(json["Internal"], true);
        assert_eq!(json["IPAM"]["Config"][0]["Subnet"], "10.10.0.0/16");
        assert_eq!(json["Labels"]["team"], "infra");
        assert!(json.get("Attachable").is_none());
    }

    #[test]
    fn test_target_prefers_id() {
        let network = NetworkConfig::new("backend");
        assert_eq!(network.target().unwrap(), "backend");
        assert_eq!(network.with_id("4f2a").target().unwrap(), "4f2a");
        assert!(NetworkConfig::default().target().is_err());
    }

    #[test]
    fn test_endpoint_ipam_skips_empty_addresses() {
        let endpoint = EndpointConfig::new()
            .with_aliases(["db", "postgres"])
            .with_ipam("172.20.0.5", "", vec![]);

        let json = serde_json::to_value(&endpoint).unwrap();
        assert_eq!(json["Aliases"], serde_json::json!(["db", "postgres"]));
        assert_eq!(json["IPAMConfig"]["IPv4Address"], "172.20.0.5");
        assert!(json["IPAMConfig"].get("IPv6Address").is_none());
    }
}
