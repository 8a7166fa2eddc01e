//! Filters and list options for list and prune requests.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::transport::Query;

/// Engine filter set, sent as `{"key":["value",...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters(BTreeMap<String, Vec<String>>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `value` under `key`; a key may carry several values.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(key, value);
        self
    }

    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let values = self.0.entry(key.into()).or_default();
        let value = value.into();
        if !values.contains(&value) {
            values.push(value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub(crate) fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    pub(crate) fn apply(&self, query: &mut Query) -> Result<()> {
        if !self.is_empty() {
            query.push("filters", &self.to_json()?);
        }
        Ok(())
    }
}

/// Filters for prune requests, e.g. `until=24h` or `label=tmp`.
pub type PruneFilters = Filters;

impl<K, V> FromIterator<(K, V)> for Filters
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut filters = Self::new();
        for (key, value) in iter {
            filters.add(key, value);
        }
        filters
    }
}

/// Options for listing containers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Includes stopped containers.
    pub all: bool,
    /// Reports `SizeRw` and `SizeRootFs`.
    pub size: bool,
    pub latest: bool,
    pub since: Option<String>,
    pub before: Option<String>,
    pub limit: Option<u32>,
    pub filters: Filters,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_all(mut self, all: bool) -> Self {
        self.all = all;
        self
    }

    pub fn with_size(mut self, size: bool) -> Self {
        self.size = size;
        self
    }

    pub fn with_latest(mut self, latest: bool) -> Self {
        self.latest = latest;
        self
    }

    pub fn with_since(mut self, container: impl Into<String>) -> Self {
        self.since = Some(container.into());
        self
    }

    pub fn with_before(mut self, container: impl Into<String>) -> Self {
        self.before = Some(container.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Adds a filter such as `status=running` or `label=app=web`.
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.add(key, value);
        self
    }

    pub(crate) fn query(&self) -> Result<Query> {
        let mut query = Query::new();
        query.push_flag("all", self.all);
        query.push_flag("size", self.size);
        if self.latest {
            query.push("limit", "1");
        } else if let Some(limit) = self.limit {
            query.push("limit", &limit.to_string());
        }
        let mut filters = self.filters.clone();
        if let Some(since) = &self.since {
            filters.add("since", since.as_str());
        }
        if let Some(before) = &self.before {
            filters.add("before", before.as_str());
        }
        filters.apply(&mut query)?;
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_json_dedupes_values() {
        let filters = Filters::new()
            .with("label", "app=web")
            .with("label", "tier=front")
            .with("label", "app=web")
            .with("status", "running");

        assert_eq!(
            filters.to_json().unwrap(),
            r#"{"label":["app=web","tier=front"],"status":["running"]}"#
        );
        assert_eq!(filters.get("status"), ["running"]);
        assert!(filters.get("missing").is_empty());
    }

    #[test]
    fn test_list_query() {
        let query = ListOptions::new()
            .with_all(true)
            .with_limit(5)
            .with_filter("status", "exited")
            .query()
            .unwrap()
            .to_string();

        assert_eq!(
            query,
            "all=1&limit=5&filters=%7B%22status%22%3A%5B%22exited%22%5D%7D"
        );
    }

    #[test]
    fn test_latest_overrides_limit() {
        let query = ListOptions::new()
            .with_latest(true)
            .with_limit(10)
            .query()
            .unwrap()
            .to_string();
        assert_eq!(query, "limit=1");
    }
}
