use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

/// What a subset selector does when no subset matches a request.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    #[default]
    NoFallback,
    DefaultSubset,
    AnyEndpoint,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SubsetSelector {
    #[serde(default)]
    pub keys: Vec<String>,
}

/// The `[subset]` table of a cluster.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct LbSubsetConfig {
    #[serde(default)]
    pub fallback_policy: FallbackPolicy,
    #[serde(default)]
    pub default_subset: BTreeMap<String, toml::Value>,
    #[serde(default)]
    pub subset_selectors: Vec<SubsetSelector>,
}

/// Subset routing settings as the subset selector consumes them. Selectors
/// are not validated, an empty key set is kept as is.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadBalancerSubsetInfo {
    enabled: bool,
    fallback_policy: FallbackPolicy,
    default_subset: BTreeMap<String, toml::Value>,
    subset_keys: Vec<BTreeSet<String>>,
}

impl LoadBalancerSubsetInfo {
    pub fn new(config: Option<&LbSubsetConfig>) -> Self {
        let Some(config) = config else {
            return Self::default();
        };

        Self {
            enabled: true,
            fallback_policy: config.fallback_policy,
            default_subset: config.default_subset.clone(),
            subset_keys: config
                .subset_selectors
                .iter()
                .map(|selector| selector.keys.iter().cloned().collect())
                .collect(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        self.fallback_policy
    }

    pub fn default_subset(&self) -> &BTreeMap<String, toml::Value> {
        &self.default_subset
    }

    pub fn subset_keys(&self) -> &[BTreeSet<String>] {
        &self.subset_keys
    }
}
