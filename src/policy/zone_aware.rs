use crate::{host_set::HostVector, runtime::RandomGenerator};

/// Fixed point scale of locality percentages.
pub const PERCENT_SCALE: u64 = 10_000;

/// How requests of one upstream priority are spread over localities.
/// Rebuilt on membership changes, read on every pick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum LocalityRoutingState {
    #[default]
    NoLocalityRouting,
    /// The own upstream locality has at least the local share of hosts.
    LocalityDirect,
    /// Only `local_percent_to_route` (of 10000) stays in the own locality, the
    /// rest is spread by `residual_capacity`, a running sum per locality.
    LocalityResidual {
        local_percent_to_route: u64,
        residual_capacity: Vec<u64>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalityChoice {
    AllDirectly,
    Sampled,
    CrossZone(usize),
    NoCapacityLeft,
}

/// Share of hosts in each locality, in parts per 10000.
pub fn locality_percentages(hosts_per_locality: &[HostVector]) -> Vec<u64> {
    let total: u64 = hosts_per_locality.iter().map(|l| l.len() as u64).sum();

    hosts_per_locality
        .iter()
        .map(|l| match total {
            0 => 0,
            total => PERCENT_SCALE * l.len() as u64 / total,
        })
        .collect()
}

impl LocalityRoutingState {
    /// Builds the table from healthy hosts per locality. Both sides must have
    /// the same number of localities.
    pub fn calculate(upstream: &[HostVector], local: &[HostVector]) -> Self {
        Self::from_percentages(
            &locality_percentages(upstream),
            &locality_percentages(local),
        )
    }

    pub fn from_percentages(upstream: &[u64], local: &[u64]) -> Self {
        let (Some(&upstream_own), Some(&local_own)) = (upstream.first(), local.first()) else {
            return Self::NoLocalityRouting;
        };

        if upstream_own >= local_own {
            return Self::LocalityDirect;
        }

        // e.g. local 4000 4000 2000, upstream 2500 5000 2500
        // gives residual capacity 0 1000 1500
        let mut residual_capacity = Vec::with_capacity(upstream.len());
        let mut accumulated = 0;
        for (i, (&up, &loc)) in upstream.iter().zip(local).enumerate() {
            if i > 0 && up > loc {
                accumulated += up - loc;
            }
            residual_capacity.push(accumulated);
        }

        Self::LocalityResidual {
            local_percent_to_route: upstream_own * PERCENT_SCALE / local_own,
            residual_capacity,
        }
    }

    /// Decides where one request goes. Draws once to sample the own locality
    /// and once more to pick a cross zone locality.
    pub fn choose(&self, random: &dyn RandomGenerator) -> Option<LocalityChoice> {
        match self {
            Self::NoLocalityRouting => None,
            Self::LocalityDirect => Some(LocalityChoice::AllDirectly),
            Self::LocalityResidual {
                local_percent_to_route,
                residual_capacity,
            } => {
                if random.random() % PERCENT_SCALE < *local_percent_to_route {
                    return Some(LocalityChoice::Sampled);
                }

                // rounding can leave nothing to spread
                let total = residual_capacity.last().copied().unwrap_or(0);
                if total == 0 {
                    return Some(LocalityChoice::NoCapacityLeft);
                }

                let threshold = random.random() % total;
                let locality = residual_capacity.partition_point(|&c| c <= threshold);
                Some(LocalityChoice::CrossZone(locality))
            }
        }
    }
}

impl LocalityChoice {
    /// Locality index the request lands in, `None` for a global pick.
    pub fn locality(self) -> Option<usize> {
        match self {
            Self::AllDirectly | Self::Sampled => Some(0),
            Self::CrossZone(locality) => Some(locality),
            Self::NoCapacityLeft => None,
        }
    }
}
