use std::collections::HashMap;

use serde::Deserialize;

use crate::{host::HostConfig, policy::factory::PolicyType, subset::LbSubsetConfig, Error, Result};

fn default_cluster() -> String {
    "upstream".to_owned()
}

fn default_requests() -> u64 {
    1000
}

fn default_concurrency() -> usize {
    8
}

/// One upstream host and the priority tier it belongs to.
#[derive(Clone, Debug, Deserialize)]
pub struct UpstreamHostConfig {
    #[serde(flatten)]
    pub host: HostConfig,
    #[serde(default)]
    pub priority: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_cluster")]
    pub cluster: String,
    #[serde(default)]
    pub policy: PolicyType,
    /// Number of selections the simulation makes.
    #[serde(default = "default_requests")]
    pub requests: u64,
    /// Requests kept in flight at once, so least request sees load.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Zone names, the first one being the proxy's own.
    #[serde(default)]
    pub zones: Vec<String>,
    #[serde(default)]
    pub runtime: HashMap<String, u64>,
    pub hosts: Vec<UpstreamHostConfig>,
    #[serde(default)]
    pub local_hosts: Vec<HostConfig>,
    pub subset: Option<LbSubsetConfig>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        let weights = self
            .hosts
            .iter()
            .map(|h| &h.host)
            .chain(&self.local_hosts)
            .map(|h| (h.address.as_str(), h.weight));
        for (address, weight) in weights {
            if weight == 0 {
                return Err(Error::Config(format!("host {address} has weight 0")));
            }
        }

        if !self.local_hosts.is_empty() && self.zones.is_empty() {
            return Err(Error::Config(
                "local_hosts need a zones list to partition by".to_owned(),
            ));
        }

        Ok(())
    }

    /// Name of the cluster built from `local_hosts`, distinct from `cluster`.
    pub fn local_cluster_name(&self) -> String {
        format!("{}_local", self.cluster)
    }

    /// Highest priority tier used by `hosts`.
    pub fn max_priority(&self) -> u32 {
        self.hosts.iter().map(|h| h.priority).max().unwrap_or(0)
    }
}
