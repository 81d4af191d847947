use std::sync::{
    atomic::{self, AtomicBool, AtomicU64},
    Arc,
};

use serde::Deserialize;

pub type HostSharedPtr = Arc<Host>;

fn default_weight() -> u32 {
    1
}

fn default_healthy() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize)]
pub struct HostConfig {
    pub address: String,
    #[serde(default)]
    pub locality: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default = "default_healthy")]
    pub healthy: bool,
}

/// Live counters of a host, shared by every caller that holds the host.
#[derive(Debug, Default)]
pub struct HostStats {
    pub rq_active: AtomicU64,
}

/// One upstream endpoint. Identity is immutable, stats and health are not.
#[derive(Debug)]
pub struct Host {
    address: String,
    locality: String,
    weight: u32,
    healthy: AtomicBool,
    stats: HostStats,
}

impl Host {
    pub fn new(config: HostConfig) -> Self {
        Self {
            address: config.address,
            locality: config.locality,
            // weights are at least 1
            weight: config.weight.max(1),
            healthy: AtomicBool::new(config.healthy),
            stats: HostStats::default(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn locality(&self) -> &str {
        &self.locality
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn stats(&self) -> &HostStats {
        &self.stats
    }

    pub fn rq_active(&self) -> u64 {
        self.stats.rq_active.load(atomic::Ordering::Relaxed)
    }

    pub fn healthy(&self) -> bool {
        self.healthy.load(atomic::Ordering::SeqCst)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, atomic::Ordering::SeqCst);
    }

    /// Marks a request as in flight until the returned guard is dropped.
    pub fn begin_request(self: &Arc<Self>) -> ActiveRequest {
        self.stats.rq_active.fetch_add(1, atomic::Ordering::Relaxed);
        ActiveRequest { host: self.clone() }
    }
}

/// Holds one slot of `rq_active` for its host.
#[derive(Debug)]
pub struct ActiveRequest {
    host: HostSharedPtr,
}

impl ActiveRequest {
    pub fn host(&self) -> &HostSharedPtr {
        &self.host
    }
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        self.host
            .stats
            .rq_active
            .fetch_sub(1, atomic::Ordering::Relaxed);
    }
}
