use std::sync::Arc;

use prometheus::Registry;
use tracing::debug;

use crate::{
    host_set::PrioritySet,
    metrics::ClusterStats,
    subset::{LbSubsetConfig, LoadBalancerSubsetInfo},
    Result,
};

/// A named upstream cluster: its priority set, its stats and its subset
/// settings. The `max_host_weight` gauge follows every host update.
pub struct Cluster {
    name: String,
    priority_set: Arc<PrioritySet>,
    stats: ClusterStats,
    lb_subset_info: LoadBalancerSubsetInfo,
}

impl Cluster {
    pub fn new(name: &str, subset: Option<&LbSubsetConfig>) -> Result<Self> {
        let priority_set = Arc::new(PrioritySet::new());
        let stats = ClusterStats::new(name)?;

        let weak = Arc::downgrade(&priority_set);
        let gauge = stats.max_host_weight.clone();
        let cluster = name.to_owned();
        priority_set.add_member_update_cb(move |_priority, _added, _removed| {
            if let Some(priority_set) = weak.upgrade() {
                let max_host_weight = priority_set.max_host_weight();
                debug!(cluster, max_host_weight, "Host weights updated");
                gauge.set(i64::from(max_host_weight));
            }
        });

        Ok(Self {
            name: name.to_owned(),
            priority_set,
            stats,
            lb_subset_info: LoadBalancerSubsetInfo::new(subset),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority_set(&self) -> &Arc<PrioritySet> {
        &self.priority_set
    }

    pub fn stats(&self) -> &ClusterStats {
        &self.stats
    }

    pub fn lb_subset_info(&self) -> &LoadBalancerSubsetInfo {
        &self.lb_subset_info
    }

    pub fn register_metrics(&self, registry: &Registry) -> Result<()> {
        self.stats.register(registry)
    }
}
