use std::sync::{
    atomic::{self, AtomicU64},
    Arc,
};

use crate::{
    host::HostSharedPtr,
    host_set::PrioritySet,
    metrics::ClusterStats,
    runtime::{RandomGenerator, Runtime},
};

use super::{LoadBalancer, LoadBalancerBase, LoadBalancerContext};

pub struct RoundRobin {
    base: Arc<LoadBalancerBase>,
    rr_index: AtomicU64,
}

impl RoundRobin {
    pub fn new(
        priority_set: Arc<PrioritySet>,
        local_priority_set: Option<Arc<PrioritySet>>,
        stats: ClusterStats,
        runtime: Arc<dyn Runtime>,
        random: Arc<dyn RandomGenerator>,
    ) -> Self {
        Self {
            base: LoadBalancerBase::new(priority_set, local_priority_set, stats, runtime, random),
            rr_index: AtomicU64::new(0),
        }
    }

    pub fn next(&self) -> Option<HostSharedPtr> {
        let hosts = self.base.hosts_to_use();
        if hosts.is_empty() {
            return None;
        }

        // it's ok if it overflows
        let next = self.rr_index.fetch_add(1, atomic::Ordering::SeqCst) % hosts.len() as u64;
        hosts.get(next as usize).cloned()
    }
}

impl LoadBalancer for RoundRobin {
    fn choose_host(&self, _context: Option<&dyn LoadBalancerContext>) -> Option<HostSharedPtr> {
        self.next()
    }
}
