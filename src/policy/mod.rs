pub mod base;
pub mod factory;
pub mod least_request;
pub mod random;
pub mod round_robin;
pub mod zone_aware;

use crate::host::HostSharedPtr;

pub use base::LoadBalancerBase;
pub use least_request::LeastRequest;
pub use random::Random;
pub use round_robin::RoundRobin;

/// Per request data passed through to a strategy. None of the strategies
/// here look at it.
pub trait LoadBalancerContext {}

pub trait LoadBalancer: Send + Sync {
    /// Picks a host for one request, `None` when there is nothing to pick from.
    fn choose_host(&self, context: Option<&dyn LoadBalancerContext>) -> Option<HostSharedPtr>;
}
