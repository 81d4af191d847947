use std::sync::Arc;

use crate::{
    host::HostSharedPtr,
    host_set::PrioritySet,
    metrics::ClusterStats,
    runtime::{RandomGenerator, Runtime},
};

use super::{LoadBalancer, LoadBalancerBase, LoadBalancerContext};

/// Uniform pick over the panic resolved hosts, no zone awareness.
pub struct Random {
    base: Arc<LoadBalancerBase>,
}

impl Random {
    pub fn new(
        priority_set: Arc<PrioritySet>,
        stats: ClusterStats,
        runtime: Arc<dyn Runtime>,
        random: Arc<dyn RandomGenerator>,
    ) -> Self {
        Self {
            base: LoadBalancerBase::new(priority_set, None, stats, runtime, random),
        }
    }

    pub fn next(&self) -> Option<HostSharedPtr> {
        let hosts = self.base.hosts_to_use();
        if hosts.is_empty() {
            return None;
        }

        let index = self.base.random().random() % hosts.len() as u64;
        hosts.get(index as usize).cloned()
    }
}

impl LoadBalancer for Random {
    fn choose_host(&self, _context: Option<&dyn LoadBalancerContext>) -> Option<HostSharedPtr> {
        self.next()
    }
}
