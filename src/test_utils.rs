use std::{
    collections::VecDeque,
    sync::{
        atomic::{self, AtomicUsize},
        Arc, Mutex,
    },
};

use crate::{
    host::{Host, HostConfig, HostSharedPtr},
    host_set::{HostVector, HostsUpdate, PrioritySet},
    metrics::ClusterStats,
    runtime::{RandomGenerator, Runtime, RuntimeLoader},
};

/// Replays a fixed sequence of draws and panics once it runs out.
#[derive(Debug, Default)]
pub struct ScriptedRandom {
    values: Mutex<VecDeque<u64>>,
    draws: AtomicUsize,
}

impl ScriptedRandom {
    pub fn new(values: impl IntoIterator<Item = u64>) -> Self {
        Self {
            values: Mutex::new(values.into_iter().collect()),
            draws: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, values: impl IntoIterator<Item = u64>) {
        self.values.lock().unwrap().extend(values);
    }

    pub fn draws(&self) -> usize {
        self.draws.load(atomic::Ordering::SeqCst)
    }
}

impl RandomGenerator for ScriptedRandom {
    fn random(&self) -> u64 {
        self.draws.fetch_add(1, atomic::Ordering::SeqCst);
        self.values
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected random draw")
    }
}

pub fn make_host(address: &str) -> HostSharedPtr {
    make_host_in(address, "", 1)
}

pub fn make_weighted_host(address: &str, weight: u32) -> HostSharedPtr {
    make_host_in(address, "", weight)
}

pub fn make_host_in(address: &str, locality: &str, weight: u32) -> HostSharedPtr {
    Arc::new(Host::new(HostConfig {
        address: address.to_owned(),
        locality: locality.to_owned(),
        weight,
        healthy: true,
    }))
}

/// Wiring shared by the load balancer tests: upstream and local priority
/// sets, isolated stats, overridable runtime and scripted draws.
pub struct LbTestContext {
    pub priority_set: Arc<PrioritySet>,
    pub local_priority_set: Arc<PrioritySet>,
    pub stats: ClusterStats,
    pub runtime: Arc<RuntimeLoader>,
    pub random: Arc<ScriptedRandom>,
}

impl LbTestContext {
    pub fn new() -> Self {
        Self {
            priority_set: Arc::new(PrioritySet::new()),
            local_priority_set: Arc::new(PrioritySet::new()),
            stats: ClusterStats::new("test").unwrap(),
            runtime: Arc::new(RuntimeLoader::default()),
            random: Arc::new(ScriptedRandom::default()),
        }
    }

    pub fn local(&self, zone_aware: bool) -> Option<Arc<PrioritySet>> {
        zone_aware.then(|| self.local_priority_set.clone())
    }

    pub fn runtime(&self) -> Arc<dyn Runtime> {
        self.runtime.clone()
    }

    pub fn random(&self) -> Arc<dyn RandomGenerator> {
        self.random.clone()
    }
}

pub fn set_hosts(priority_set: &PrioritySet, hosts: &[HostSharedPtr], healthy: &[HostSharedPtr]) {
    set_hosts_per_locality(priority_set, hosts, healthy, Vec::new());
}

/// Uses `per_locality` for both the full and the healthy partitions.
pub fn set_hosts_per_locality(
    priority_set: &PrioritySet,
    hosts: &[HostSharedPtr],
    healthy: &[HostSharedPtr],
    per_locality: Vec<HostVector>,
) {
    let update = HostsUpdate {
        hosts: hosts.to_vec(),
        healthy_hosts: healthy.to_vec(),
        hosts_per_locality: per_locality.clone(),
        healthy_hosts_per_locality: per_locality,
    };
    priority_set.update_hosts(0, update, &[], &[]);
}
