use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;

use crate::host::HostSharedPtr;

pub type HostVector = Vec<HostSharedPtr>;

/// Immutable membership snapshot of one priority tier.
///
/// `healthy_hosts` is a subset of `hosts` in the same relative order, and the
/// same holds for every locality partition. Locality 0 is the proxy's own
/// locality. Callers uphold these invariants, they are not checked here.
#[derive(Debug, Default)]
pub struct HostSet {
    priority: u32,
    hosts: HostVector,
    healthy_hosts: HostVector,
    hosts_per_locality: Vec<HostVector>,
    healthy_hosts_per_locality: Vec<HostVector>,
    max_host_weight: u32,
}

impl HostSet {
    fn new(priority: u32, update: HostsUpdate) -> Self {
        let max_host_weight = update.hosts.iter().map(|h| h.weight()).max().unwrap_or(1);

        Self {
            priority,
            hosts: update.hosts,
            healthy_hosts: update.healthy_hosts,
            hosts_per_locality: update.hosts_per_locality,
            healthy_hosts_per_locality: update.healthy_hosts_per_locality,
            max_host_weight,
        }
    }

    fn empty(priority: u32) -> Self {
        Self {
            priority,
            max_host_weight: 1,
            ..Default::default()
        }
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn hosts(&self) -> &[HostSharedPtr] {
        &self.hosts
    }

    pub fn healthy_hosts(&self) -> &[HostSharedPtr] {
        &self.healthy_hosts
    }

    pub fn hosts_per_locality(&self) -> &[HostVector] {
        &self.hosts_per_locality
    }

    pub fn healthy_hosts_per_locality(&self) -> &[HostVector] {
        &self.healthy_hosts_per_locality
    }

    pub fn max_host_weight(&self) -> u32 {
        self.max_host_weight
    }
}

/// The four sequences that replace a host set on update.
#[derive(Clone, Debug, Default)]
pub struct HostsUpdate {
    pub hosts: HostVector,
    pub healthy_hosts: HostVector,
    pub hosts_per_locality: Vec<HostVector>,
    pub healthy_hosts_per_locality: Vec<HostVector>,
}

impl HostsUpdate {
    /// Hosts without locality partitions, health taken from each host.
    pub fn flat(hosts: HostVector) -> Self {
        let healthy_hosts = healthy(&hosts);
        Self {
            hosts,
            healthy_hosts,
            ..Default::default()
        }
    }

    /// Partitions hosts by locality in the order of `zones`, the first zone being
    /// the proxy's own. Hosts of unlisted zones only appear in the flat lists.
    pub fn partitioned(hosts: HostVector, zones: &[String]) -> Self {
        let hosts_per_locality: Vec<HostVector> = zones
            .iter()
            .map(|zone| {
                hosts
                    .iter()
                    .filter(|h| h.locality() == zone)
                    .cloned()
                    .collect()
            })
            .collect();
        let healthy_hosts_per_locality = hosts_per_locality.iter().map(|l| healthy(l)).collect();

        Self {
            healthy_hosts: healthy(&hosts),
            hosts,
            hosts_per_locality,
            healthy_hosts_per_locality,
        }
    }
}

fn healthy(hosts: &[HostSharedPtr]) -> HostVector {
    hosts.iter().filter(|h| h.healthy()).cloned().collect()
}

type MemberUpdateCb = dyn Fn(u32, &[HostSharedPtr], &[HostSharedPtr]) + Send + Sync;

/// Host sets by priority, 0 being the highest.
///
/// Each update publishes a new vector of snapshots, so a selection that already
/// loaded the previous one finishes against it undisturbed.
pub struct PrioritySet {
    host_sets: ArcSwap<Vec<Arc<HostSet>>>,
    callbacks: Mutex<Vec<Arc<MemberUpdateCb>>>,
}

impl PrioritySet {
    pub fn new() -> Self {
        Self {
            host_sets: ArcSwap::from_pointee(vec![Arc::new(HostSet::empty(0))]),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn host_sets(&self) -> Arc<Vec<Arc<HostSet>>> {
        self.host_sets.load_full()
    }

    pub fn host_set(&self, priority: u32) -> Option<Arc<HostSet>> {
        self.host_sets.load().get(priority as usize).cloned()
    }

    /// Maximum host weight across every priority.
    pub fn max_host_weight(&self) -> u32 {
        self.host_sets
            .load()
            .iter()
            .map(|hs| hs.max_host_weight())
            .max()
            .unwrap_or(1)
    }

    /// Registers a callback run after every `update_hosts` with the updated
    /// priority and the added and removed hosts.
    pub fn add_member_update_cb<F>(&self, cb: F)
    where
        F: Fn(u32, &[HostSharedPtr], &[HostSharedPtr]) + Send + Sync + 'static,
    {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(cb));
    }

    /// Replaces the snapshot of `priority`, creating lower priorities as empty
    /// sets if needed, then runs the member update callbacks.
    pub fn update_hosts(
        &self,
        priority: u32,
        update: HostsUpdate,
        hosts_added: &[HostSharedPtr],
        hosts_removed: &[HostSharedPtr],
    ) {
        let host_set = Arc::new(HostSet::new(priority, update));
        let index = priority as usize;

        self.host_sets.rcu(|current| {
            let mut host_sets = Vec::clone(current);
            while host_sets.len() <= index {
                host_sets.push(Arc::new(HostSet::empty(host_sets.len() as u32)));
            }
            host_sets[index] = host_set.clone();
            host_sets
        });

        // callbacks may register further callbacks, so run them unlocked
        let callbacks = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for cb in callbacks {
            cb(priority, hosts_added, hosts_removed);
        }
    }
}

impl Default for PrioritySet {
    fn default() -> Self {
        Self::new()
    }
}
