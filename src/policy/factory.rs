use std::sync::Arc;

use serde::Deserialize;

use crate::{
    cluster::Cluster,
    runtime::{RandomGenerator, Runtime},
};

use super::{LeastRequest, LoadBalancer, Random, RoundRobin};

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    #[default]
    RoundRobin,
    LeastRequest,
    Random,
}

pub struct PolicyFactory;

impl PolicyFactory {
    /// Builds the balancer for `cluster`. The local cluster enables zone aware
    /// routing for the strategies that support it.
    pub fn make(
        policy: PolicyType,
        cluster: &Cluster,
        local_cluster: Option<&Cluster>,
        runtime: Arc<dyn Runtime>,
        random: Arc<dyn RandomGenerator>,
    ) -> Box<dyn LoadBalancer> {
        let priority_set = cluster.priority_set().clone();
        let local_priority_set = local_cluster.map(|local| local.priority_set().clone());
        let stats = cluster.stats().clone();

        match policy {
            PolicyType::RoundRobin => Box::new(RoundRobin::new(
                priority_set,
                local_priority_set,
                stats,
                runtime,
                random,
            )),
            PolicyType::LeastRequest => Box::new(LeastRequest::new(
                priority_set,
                local_priority_set,
                stats,
                runtime,
                random,
            )),
            PolicyType::Random => Box::new(Random::new(priority_set, stats, runtime, random)),
        }
    }
}
