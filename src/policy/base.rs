use std::{
    ops::Deref,
    sync::{
        atomic::{self, AtomicU32},
        Arc,
    },
};

use arc_swap::ArcSwap;
use tracing::{debug, trace};

use crate::{
    host::HostSharedPtr,
    host_set::{HostSet, PrioritySet},
    metrics::ClusterStats,
    runtime::{
        RandomGenerator, Runtime, HEALTHY_PANIC_THRESHOLD, ZONE_ROUTING_ENABLED,
        ZONE_ROUTING_MIN_CLUSTER_SIZE,
    },
};

use super::zone_aware::{LocalityChoice, LocalityRoutingState};

const DEFAULT_PANIC_THRESHOLD: u64 = 50;
const DEFAULT_ZONE_ROUTING_ENABLED: u64 = 100;
const DEFAULT_MIN_CLUSTER_SIZE: u64 = 6;

/// State shared by every strategy: priority and panic resolution plus the
/// zone aware routing tables.
pub struct LoadBalancerBase {
    priority_set: Arc<PrioritySet>,
    local_priority_set: Option<Arc<PrioritySet>>,
    stats: ClusterStats,
    runtime: Arc<dyn Runtime>,
    random: Arc<dyn RandomGenerator>,
    best_available_priority: AtomicU32,
    // indexed by upstream priority
    locality_routing: ArcSwap<Vec<LocalityRoutingState>>,
}

impl LoadBalancerBase {
    pub fn new(
        priority_set: Arc<PrioritySet>,
        local_priority_set: Option<Arc<PrioritySet>>,
        stats: ClusterStats,
        runtime: Arc<dyn Runtime>,
        random: Arc<dyn RandomGenerator>,
    ) -> Arc<Self> {
        let base = Arc::new(Self {
            priority_set,
            local_priority_set,
            stats,
            runtime,
            random,
            best_available_priority: AtomicU32::new(0),
            locality_routing: ArcSwap::from_pointee(Vec::new()),
        });

        let weak = Arc::downgrade(&base);
        base.priority_set
            .add_member_update_cb(move |priority, _added, _removed| {
                if let Some(base) = weak.upgrade() {
                    base.refresh_best_available_priority();
                    if base.local_priority_set.is_some() {
                        base.regenerate_locality_routing(priority);
                    }
                }
            });

        if let Some(local_priority_set) = &base.local_priority_set {
            let weak = Arc::downgrade(&base);
            local_priority_set.add_member_update_cb(move |_priority, _added, _removed| {
                if let Some(base) = weak.upgrade() {
                    base.regenerate_locality_routing(base.best_available_priority());
                }
            });
        }

        base.refresh_best_available_priority();
        if base.local_priority_set.is_some() {
            base.regenerate_locality_routing(base.best_available_priority());
        }

        base
    }

    pub fn stats(&self) -> &ClusterStats {
        &self.stats
    }

    pub fn runtime(&self) -> &dyn Runtime {
        self.runtime.as_ref()
    }

    pub fn random(&self) -> &dyn RandomGenerator {
        self.random.as_ref()
    }

    /// The first priority with a healthy host, or 0 if there is none.
    pub fn best_available_priority(&self) -> u32 {
        self.best_available_priority.load(atomic::Ordering::SeqCst)
    }

    fn refresh_best_available_priority(&self) {
        let priority = self
            .priority_set
            .host_sets()
            .iter()
            .find(|hs| !hs.healthy_hosts().is_empty())
            .map_or(0, |hs| hs.priority());

        self.best_available_priority
            .store(priority, atomic::Ordering::SeqCst);
    }

    pub fn is_global_panic(&self, host_set: &HostSet) -> bool {
        let threshold = self
            .runtime
            .get_integer(HEALTHY_PANIC_THRESHOLD, DEFAULT_PANIC_THRESHOLD)
            .min(100);

        let healthy = host_set.healthy_hosts().len() as u64;
        let total = host_set.hosts().len() as u64;
        healthy * 100 < total * threshold
    }

    /// Candidates for one pick after priority, panic and zone resolution.
    pub fn hosts_to_use(&self) -> HostsToUse {
        let host_set = self.chosen_host_set();

        if self.is_global_panic(&host_set) {
            self.stats.lb_healthy_panic.inc();
            return HostsToUse::new(host_set, HostSource::All);
        }

        if self.local_priority_set.is_none() {
            return HostsToUse::new(host_set, HostSource::Healthy);
        }

        if !self.local_cluster_ok() {
            self.stats.lb_local_cluster_not_ok.inc();
            return HostsToUse::new(host_set, HostSource::Healthy);
        }

        if !self
            .runtime
            .feature_enabled(ZONE_ROUTING_ENABLED, DEFAULT_ZONE_ROUTING_ENABLED)
        {
            return HostsToUse::new(host_set, HostSource::Healthy);
        }

        let routing = self.locality_routing.load();
        let state = routing
            .get(host_set.priority() as usize)
            .unwrap_or(&LocalityRoutingState::NoLocalityRouting);
        if *state == LocalityRoutingState::NoLocalityRouting {
            return HostsToUse::new(host_set, HostSource::Healthy);
        }

        let Some(choice) = state.choose(self.random.as_ref()) else {
            return HostsToUse::new(host_set, HostSource::Healthy);
        };
        trace!(?choice, "Zone aware pick");

        match choice {
            LocalityChoice::AllDirectly => self.stats.lb_zone_routing_all_directly.inc(),
            LocalityChoice::Sampled => self.stats.lb_zone_routing_sampled.inc(),
            LocalityChoice::CrossZone(_) => self.stats.lb_zone_routing_cross_zone.inc(),
            LocalityChoice::NoCapacityLeft => self.stats.lb_zone_no_capacity_left.inc(),
        }

        match choice.locality() {
            // the table can trail a snapshot published a moment ago
            Some(locality)
                if host_set
                    .healthy_hosts_per_locality()
                    .get(locality)
                    .is_some_and(|hosts| !hosts.is_empty()) =>
            {
                HostsToUse::new(host_set, HostSource::Locality(locality))
            }
            _ => HostsToUse::new(host_set, HostSource::Healthy),
        }
    }

    fn chosen_host_set(&self) -> Arc<HostSet> {
        let host_sets = self.priority_set.host_sets();
        let priority = self.best_available_priority() as usize;

        host_sets
            .get(priority)
            .or_else(|| host_sets.first())
            .cloned()
            .unwrap_or_default()
    }

    fn local_cluster_ok(&self) -> bool {
        let Some(local) = self
            .local_priority_set
            .as_ref()
            .and_then(|local| local.host_set(0))
        else {
            return false;
        };

        !local.healthy_hosts().is_empty()
            && local
                .healthy_hosts_per_locality()
                .first()
                .is_some_and(|hosts| !hosts.is_empty())
            && !self.is_global_panic(&local)
    }

    fn regenerate_locality_routing(&self, priority: u32) {
        self.stats.lb_recalculate_zone_structures.inc();

        let state = self.calculate_locality_routing(priority);
        debug!(priority, ?state, "Locality routing rebuilt");

        let index = priority as usize;
        self.locality_routing.rcu(|current| {
            let mut states = Vec::clone(current);
            if states.len() <= index {
                states.resize(index + 1, LocalityRoutingState::NoLocalityRouting);
            }
            states[index] = state.clone();
            states
        });
    }

    fn calculate_locality_routing(&self, priority: u32) -> LocalityRoutingState {
        let (Some(host_set), Some(local)) = (
            self.priority_set.host_set(priority),
            self.local_priority_set
                .as_ref()
                .and_then(|local| local.host_set(0)),
        ) else {
            return LocalityRoutingState::NoLocalityRouting;
        };

        let upstream = host_set.healthy_hosts_per_locality();
        if upstream.len() < 2 || upstream[0].is_empty() {
            return LocalityRoutingState::NoLocalityRouting;
        }

        if upstream.len() != local.healthy_hosts_per_locality().len() {
            self.stats.lb_zone_number_differs.inc();
            return LocalityRoutingState::NoLocalityRouting;
        }

        let min_cluster_size = self
            .runtime
            .get_integer(ZONE_ROUTING_MIN_CLUSTER_SIZE, DEFAULT_MIN_CLUSTER_SIZE);
        if (host_set.hosts().len() as u64) < min_cluster_size {
            self.stats.lb_zone_cluster_too_small.inc();
            return LocalityRoutingState::NoLocalityRouting;
        }

        LocalityRoutingState::calculate(upstream, local.healthy_hosts_per_locality())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostSource {
    All,
    Healthy,
    Locality(usize),
}

/// One list of a pinned host set snapshot.
pub struct HostsToUse {
    host_set: Arc<HostSet>,
    source: HostSource,
}

impl HostsToUse {
    fn new(host_set: Arc<HostSet>, source: HostSource) -> Self {
        Self { host_set, source }
    }

    pub fn source(&self) -> HostSource {
        self.source
    }
}

impl Deref for HostsToUse {
    type Target = [HostSharedPtr];

    fn deref(&self) -> &Self::Target {
        match self.source {
            HostSource::All => self.host_set.hosts(),
            HostSource::Healthy => self.host_set.healthy_hosts(),
            HostSource::Locality(locality) => self
                .host_set
                .healthy_hosts_per_locality()
                .get(locality)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        host_set::HostsUpdate,
        runtime::RuntimeLoader,
        test_utils::{make_host, ScriptedRandom},
    };

    fn make_base(
        priority_set: &Arc<PrioritySet>,
        stats: &ClusterStats,
        runtime: &Arc<RuntimeLoader>,
    ) -> Arc<LoadBalancerBase> {
        LoadBalancerBase::new(
            priority_set.clone(),
            None,
            stats.clone(),
            runtime.clone(),
            Arc::new(ScriptedRandom::default()),
        )
    }

    #[test]
    fn test_panic_threshold_is_integer_math() {
        let priority_set = Arc::new(PrioritySet::new());
        let stats = ClusterStats::new("test").unwrap();
        let runtime = Arc::new(RuntimeLoader::default());
        let base = make_base(&priority_set, &stats, &runtime);

        let hosts: Vec<_> = (0..4)
            .map(|i| make_host(&format!("tcp://127.0.0.1:8{i}")))
            .collect();
        let update = HostsUpdate {
            hosts: hosts.clone(),
            healthy_hosts: hosts[..2].to_vec(),
            ..Default::default()
        };
        priority_set.update_hosts(0, update, &hosts, &[]);

        // 2 * 100 < 4 * 50 does not hold
        let host_set = priority_set.host_set(0).unwrap();
        assert!(!base.is_global_panic(&host_set));
        assert_eq!(base.hosts_to_use().source(), HostSource::Healthy);

        runtime.merge(HEALTHY_PANIC_THRESHOLD, 51);
        assert!(base.is_global_panic(&host_set));
        let hosts_to_use = base.hosts_to_use();
        assert_eq!(hosts_to_use.source(), HostSource::All);
        assert_eq!(hosts_to_use.len(), 4);
        assert_eq!(stats.lb_healthy_panic.get(), 1);

        // thresholds above 100 are capped
        runtime.merge(HEALTHY_PANIC_THRESHOLD, 1000);
        let all_healthy = HostsUpdate::flat(hosts.clone());
        priority_set.update_hosts(0, all_healthy, &[], &[]);
        assert!(!base.is_global_panic(&priority_set.host_set(0).unwrap()));
    }

    #[test]
    fn test_empty_host_set_is_not_panic() {
        let priority_set = Arc::new(PrioritySet::new());
        let stats = ClusterStats::new("test").unwrap();
        let runtime = Arc::new(RuntimeLoader::default());
        let base = make_base(&priority_set, &stats, &runtime);

        assert!(base.hosts_to_use().is_empty());
        assert_eq!(stats.lb_healthy_panic.get(), 0);
    }

    #[test]
    fn test_best_available_priority() {
        let priority_set = Arc::new(PrioritySet::new());
        let stats = ClusterStats::new("test").unwrap();
        let runtime = Arc::new(RuntimeLoader::default());
        let base = make_base(&priority_set, &stats, &runtime);

        let p0 = vec![make_host("tcp://127.0.0.1:80")];
        p0[0].set_healthy(false);
        let p1 = vec![make_host("tcp://127.0.0.1:81")];
        priority_set.update_hosts(0, HostsUpdate::flat(p0.clone()), &p0, &[]);
        priority_set.update_hosts(1, HostsUpdate::flat(p1.clone()), &p1, &[]);

        assert_eq!(base.best_available_priority(), 1);
        let hosts_to_use = base.hosts_to_use();
        assert!(Arc::ptr_eq(&hosts_to_use[0], &p1[0]));

        p0[0].set_healthy(true);
        priority_set.update_hosts(0, HostsUpdate::flat(p0.clone()), &[], &[]);
        assert_eq!(base.best_available_priority(), 0);
    }

    #[test]
    fn test_no_healthy_priority_falls_back_to_zero() {
        let priority_set = Arc::new(PrioritySet::new());
        let stats = ClusterStats::new("test").unwrap();
        let runtime = Arc::new(RuntimeLoader::default());
        let base = make_base(&priority_set, &stats, &runtime);

        let p1 = vec![make_host("tcp://127.0.0.1:81")];
        p1[0].set_healthy(false);
        priority_set.update_hosts(1, HostsUpdate::flat(p1.clone()), &p1, &[]);

        assert_eq!(base.best_available_priority(), 0);
        assert!(base.hosts_to_use().is_empty());
    }
}
