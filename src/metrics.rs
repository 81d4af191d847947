use prometheus::{opts, Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Load balancer stats of one cluster. Counter names are what dashboards
/// and alerts key on, keep them stable.
#[derive(Clone, Debug)]
pub struct ClusterStats {
    pub lb_healthy_panic: IntCounter,
    pub lb_local_cluster_not_ok: IntCounter,
    pub lb_recalculate_zone_structures: IntCounter,
    pub lb_zone_cluster_too_small: IntCounter,
    pub lb_zone_no_capacity_left: IntCounter,
    pub lb_zone_number_differs: IntCounter,
    pub lb_zone_routing_all_directly: IntCounter,
    pub lb_zone_routing_sampled: IntCounter,
    pub lb_zone_routing_cross_zone: IntCounter,
    pub max_host_weight: IntGauge,
}

impl ClusterStats {
    pub fn new(cluster: &str) -> crate::Result<Self> {
        let counter = |name: &str, help: &str| {
            IntCounter::with_opts(opts!(name, help).const_label("cluster", cluster))
        };

        let max_host_weight = IntGauge::with_opts(
            opts!("max_host_weight", "maximum host weight in the cluster")
                .const_label("cluster", cluster),
        )?;
        max_host_weight.set(1);

        Ok(Self {
            lb_healthy_panic: counter(
                "lb_healthy_panic",
                "selections made over all hosts because too few were healthy",
            )?,
            lb_local_cluster_not_ok: counter(
                "lb_local_cluster_not_ok",
                "zone aware selections skipped because the local cluster is unhealthy",
            )?,
            lb_recalculate_zone_structures: counter(
                "lb_recalculate_zone_structures",
                "rebuilds of the locality routing table",
            )?,
            lb_zone_cluster_too_small: counter(
                "lb_zone_cluster_too_small",
                "zone aware routing disabled because the upstream cluster is too small",
            )?,
            lb_zone_no_capacity_left: counter(
                "lb_zone_no_capacity_left",
                "cross zone selections with no residual capacity left",
            )?,
            lb_zone_number_differs: counter(
                "lb_zone_number_differs",
                "zone aware routing disabled because locality counts differ",
            )?,
            lb_zone_routing_all_directly: counter(
                "lb_zone_routing_all_directly",
                "selections sent to the local zone without sampling",
            )?,
            lb_zone_routing_sampled: counter(
                "lb_zone_routing_sampled",
                "selections sampled into the local zone",
            )?,
            lb_zone_routing_cross_zone: counter(
                "lb_zone_routing_cross_zone",
                "selections sent to another zone",
            )?,
            max_host_weight,
        })
    }

    pub fn register(&self, registry: &Registry) -> crate::Result<()> {
        for counter in [
            &self.lb_healthy_panic,
            &self.lb_local_cluster_not_ok,
            &self.lb_recalculate_zone_structures,
            &self.lb_zone_cluster_too_small,
            &self.lb_zone_no_capacity_left,
            &self.lb_zone_number_differs,
            &self.lb_zone_routing_all_directly,
            &self.lb_zone_routing_sampled,
            &self.lb_zone_routing_cross_zone,
        ] {
            registry.register(Box::new(counter.clone()))?;
        }
        registry.register(Box::new(self.max_host_weight.clone()))?;

        Ok(())
    }
}

pub fn gather(registry: &Registry) -> crate::Result<Vec<u8>> {
    let mut buffer = Vec::new();

    let encoder = TextEncoder::new();
    encoder.encode(&registry.gather(), &mut buffer)?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_gather() {
        let registry = Registry::new();
        let stats = ClusterStats::new("backend").unwrap();
        stats.register(&registry).unwrap();

        stats.lb_healthy_panic.inc();
        stats.lb_zone_routing_sampled.inc_by(3);
        stats.max_host_weight.set(4);

        let text = String::from_utf8(gather(&registry).unwrap()).unwrap();
        assert!(text.contains("lb_healthy_panic{cluster=\"backend\"} 1"));
        assert!(text.contains("lb_zone_routing_sampled{cluster=\"backend\"} 3"));
        assert!(text.contains("max_host_weight{cluster=\"backend\"} 4"));
    }

    #[test]
    fn test_register_twice_fails() {
        let registry = Registry::new();
        let stats = ClusterStats::new("backend").unwrap();
        stats.register(&registry).unwrap();

        assert!(matches!(
            stats.register(&registry),
            Err(crate::Error::Metrics(_))
        ));
    }
}
