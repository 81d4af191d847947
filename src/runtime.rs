use std::{collections::HashMap, sync::Arc};

use arc_swap::ArcSwap;
use rand::Rng;
use tracing::debug;

pub const HEALTHY_PANIC_THRESHOLD: &str = "upstream.healthy_panic_threshold";
pub const ZONE_ROUTING_ENABLED: &str = "upstream.zone_routing.enabled";
pub const ZONE_ROUTING_MIN_CLUSTER_SIZE: &str = "upstream.zone_routing.min_cluster_size";
pub const WEIGHT_ENABLED: &str = "upstream.weight_enabled";

/// Named integer knobs that can change while the balancers run.
pub trait Runtime: Send + Sync {
    /// Value of `key`, or `default` when it is not set.
    fn get_integer(&self, key: &str, default: u64) -> u64;

    /// Whether a feature whose value is a percentage is on for this call.
    fn feature_enabled(&self, key: &str, default: u64) -> bool;
}

pub trait RandomGenerator: Send + Sync {
    fn random(&self) -> u64;
}

#[derive(Debug, Default)]
pub struct ThreadRandom;

impl RandomGenerator for ThreadRandom {
    fn random(&self) -> u64 {
        rand::thread_rng().gen()
    }
}

/// Runtime knobs kept in a swappable map, usually read from the `[runtime]`
/// table of the config file.
pub struct RuntimeLoader {
    values: ArcSwap<HashMap<String, u64>>,
    random: Arc<dyn RandomGenerator>,
}

impl RuntimeLoader {
    pub fn new(values: HashMap<String, u64>) -> Self {
        Self::with_random(values, Arc::new(ThreadRandom))
    }

    pub fn with_random(values: HashMap<String, u64>, random: Arc<dyn RandomGenerator>) -> Self {
        Self {
            values: ArcSwap::from_pointee(values),
            random,
        }
    }

    pub fn reload(&self, values: HashMap<String, u64>) {
        debug!("Runtime reload with {} keys", values.len());
        self.values.store(Arc::new(values));
    }

    pub fn merge(&self, key: &str, value: u64) {
        self.values.rcu(|current| {
            let mut values = HashMap::clone(current);
            values.insert(key.to_owned(), value);
            values
        });
    }
}

impl Default for RuntimeLoader {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl Runtime for RuntimeLoader {
    fn get_integer(&self, key: &str, default: u64) -> u64 {
        self.values.load().get(key).copied().unwrap_or(default)
    }

    fn feature_enabled(&self, key: &str, default: u64) -> bool {
        self.random.random() % 100 < self.get_integer(key, default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedRandom;

    #[test]
    fn test_missing_keys_use_defaults() {
        let runtime = RuntimeLoader::default();

        assert_eq!(runtime.get_integer(HEALTHY_PANIC_THRESHOLD, 50), 50);
        assert_eq!(runtime.get_integer(ZONE_ROUTING_MIN_CLUSTER_SIZE, 6), 6);
        assert!(runtime.feature_enabled(ZONE_ROUTING_ENABLED, 100));
        assert!(!runtime.feature_enabled(ZONE_ROUTING_ENABLED, 0));
    }

    #[test]
    fn test_values_from_toml() {
        let values: HashMap<String, u64> = toml::from_str(
            r#"
            "upstream.healthy_panic_threshold" = 30
            "upstream.weight_enabled" = 0
            "#,
        )
        .unwrap();
        let runtime = RuntimeLoader::new(values);

        assert_eq!(runtime.get_integer(HEALTHY_PANIC_THRESHOLD, 50), 30);
        assert_eq!(runtime.get_integer(WEIGHT_ENABLED, 1), 0);
        assert_eq!(runtime.get_integer(ZONE_ROUTING_MIN_CLUSTER_SIZE, 6), 6);
    }

    #[test]
    fn test_merge_and_reload() {
        let runtime = RuntimeLoader::default();
        runtime.merge(ZONE_ROUTING_MIN_CLUSTER_SIZE, 1);
        runtime.merge(WEIGHT_ENABLED, 0);
        assert_eq!(runtime.get_integer(ZONE_ROUTING_MIN_CLUSTER_SIZE, 6), 1);
        assert_eq!(runtime.get_integer(WEIGHT_ENABLED, 1), 0);

        runtime.reload(HashMap::new());
        assert_eq!(runtime.get_integer(ZONE_ROUTING_MIN_CLUSTER_SIZE, 6), 6);
    }

    #[test]
    fn test_feature_enabled_is_sampled() {
        let random = Arc::new(ScriptedRandom::new([10, 75, 149]));
        let runtime = RuntimeLoader::with_random(HashMap::new(), random.clone());
        runtime.merge(ZONE_ROUTING_ENABLED, 50);

        assert!(runtime.feature_enabled(ZONE_ROUTING_ENABLED, 100));
        assert!(!runtime.feature_enabled(ZONE_ROUTING_ENABLED, 100));
        assert!(runtime.feature_enabled(ZONE_ROUTING_ENABLED, 100));
        assert_eq!(random.draws(), 3);
    }
}
