use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::{
    host::HostSharedPtr,
    host_set::PrioritySet,
    metrics::ClusterStats,
    runtime::{RandomGenerator, Runtime, WEIGHT_ENABLED},
};

use super::{LoadBalancer, LoadBalancerBase, LoadBalancerContext};

/// A weighted pick that is reused for the next `hits_left` calls.
struct Streak {
    host: HostSharedPtr,
    hits_left: u32,
}

/// Power of two choices on active requests. With unequal weights a host is
/// drawn uniformly and kept for `weight` consecutive picks instead.
pub struct LeastRequest {
    base: Arc<LoadBalancerBase>,
    streak: Arc<Mutex<Option<Streak>>>,
}

impl LeastRequest {
    pub fn new(
        priority_set: Arc<PrioritySet>,
        local_priority_set: Option<Arc<PrioritySet>>,
        stats: ClusterStats,
        runtime: Arc<dyn Runtime>,
        random: Arc<dyn RandomGenerator>,
    ) -> Self {
        let streak: Arc<Mutex<Option<Streak>>> = Arc::new(Mutex::new(None));

        let weak = Arc::downgrade(&streak);
        priority_set.add_member_update_cb(move |priority, _added, _removed| {
            if let Some(streak) = weak.upgrade() {
                if streak
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take()
                    .is_some()
                {
                    debug!(priority, "Topology change, weighted streak dropped");
                }
            }
        });

        Self {
            base: LoadBalancerBase::new(priority_set, local_priority_set, stats, runtime, random),
            streak,
        }
    }

    fn is_weighted(&self) -> bool {
        let weight_imbalanced = self.base.stats().max_host_weight.get() != 1;
        let weight_enabled = self.base.runtime().get_integer(WEIGHT_ENABLED, 1) != 0;
        weight_imbalanced && weight_enabled
    }

    pub fn next(&self) -> Option<HostSharedPtr> {
        let weighted = self.is_weighted();

        let mut streak = self.streak.lock().unwrap_or_else(PoisonError::into_inner);
        if weighted {
            if let Some(current) = streak.as_mut().filter(|s| s.hits_left > 0) {
                current.hits_left -= 1;
                return Some(current.host.clone());
            }
        }
        // also drops a streak left over from before weights evened out
        *streak = None;

        let hosts = self.base.hosts_to_use();
        if hosts.is_empty() {
            return None;
        }

        let random = self.base.random();
        let len = hosts.len() as u64;

        if weighted {
            let host = hosts[(random.random() % len) as usize].clone();
            *streak = Some(Streak {
                host: host.clone(),
                hits_left: host.weight() - 1,
            });
            return Some(host);
        }
        drop(streak);

        let first = &hosts[(random.random() % len) as usize];
        let second = &hosts[(random.random() % len) as usize];
        if first.rq_active() < second.rq_active() {
            Some(first.clone())
        } else {
            Some(second.clone())
        }
    }
}

impl LoadBalancer for LeastRequest {
    fn choose_host(&self, _context: Option<&dyn LoadBalancerContext>) -> Option<HostSharedPtr> {
        self.next()
    }
}
