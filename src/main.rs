use std::{
    collections::{BTreeMap, VecDeque},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use prometheus::Registry;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use upstream_lb::{
    cluster::Cluster,
    config::AppConfig,
    host::{Host, HostConfig, HostSharedPtr},
    host_set::HostsUpdate,
    metrics,
    policy::{factory::PolicyFactory, LoadBalancer},
    runtime::{RuntimeLoader, ThreadRandom},
    Error, Result,
};

fn main() -> Result<()> {
    init_logging();

    let args = parse_args()?;
    let config = read_config(&args.config_path)?;
    config.validate()?;

    let registry = Registry::new();

    let cluster = Cluster::new(&config.cluster, config.subset.as_ref())?;
    cluster.register_metrics(&registry)?;

    let local_cluster = if config.local_hosts.is_empty() {
        None
    } else {
        let local_cluster = Cluster::new(&config.local_cluster_name(), None)?;
        local_cluster.register_metrics(&registry)?;
        let hosts = build_hosts(config.local_hosts.iter().cloned());
        local_cluster.priority_set().update_hosts(
            0,
            HostsUpdate::partitioned(hosts.clone(), &config.zones),
            &hosts,
            &[],
        );
        Some(local_cluster)
    };

    let mut upstream_hosts = Vec::new();
    for priority in 0..=config.max_priority() {
        let hosts = build_hosts(
            config
                .hosts
                .iter()
                .filter(|h| h.priority == priority)
                .map(|h| h.host.clone()),
        );
        debug!(priority, hosts = hosts.len(), "Priority populated");
        cluster.priority_set().update_hosts(
            priority,
            HostsUpdate::partitioned(hosts.clone(), &config.zones),
            &hosts,
            &[],
        );
        upstream_hosts.extend(hosts);
    }

    let runtime = Arc::new(RuntimeLoader::new(config.runtime.clone()));
    let lb = PolicyFactory::make(
        config.policy,
        &cluster,
        local_cluster.as_ref(),
        runtime,
        Arc::new(ThreadRandom),
    );

    info!(
        cluster = cluster.name(),
        policy = ?config.policy,
        requests = config.requests,
        "Simulation started"
    );
    let picks = simulate(lb.as_ref(), config.requests, config.concurrency);

    for host in &upstream_hosts {
        let count = picks.get(host.address()).copied().unwrap_or(0);
        info!(
            address = host.address(),
            locality = host.locality(),
            weight = host.weight(),
            healthy = host.healthy(),
            count,
            "Host picked"
        );
    }

    let text = metrics::gather(&registry)?;
    print!("{}", String::from_utf8_lossy(&text));

    Ok(())
}

fn init_logging() {
    // RUST_LOG=upstream_lb=debug shows routing table rebuilds
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();
}

fn build_hosts(configs: impl Iterator<Item = HostConfig>) -> Vec<HostSharedPtr> {
    configs.map(|config| Arc::new(Host::new(config))).collect()
}

/// Runs `requests` selections keeping up to `concurrency` of them in flight.
fn simulate(lb: &dyn LoadBalancer, requests: u64, concurrency: usize) -> BTreeMap<String, u64> {
    let mut picks = BTreeMap::new();
    let mut in_flight = VecDeque::with_capacity(concurrency);
    let mut misses = 0u64;

    for _ in 0..requests {
        let Some(host) = lb.choose_host(None) else {
            misses += 1;
            continue;
        };

        *picks.entry(host.address().to_owned()).or_insert(0) += 1;
        in_flight.push_back(host.begin_request());
        if in_flight.len() > concurrency {
            in_flight.pop_front();
        }
    }

    if misses > 0 {
        warn!(misses, "No host available for some requests");
    }

    picks
}

struct Args {
    config_path: PathBuf,
}

fn parse_args() -> Result<Args> {
    let mut config_path = None;

    let mut args = std::env::args();
    while let Some(arg) = args.next() {
        if arg == "-c" {
            let value = args.next().ok_or(Error::Usage("config file expected"))?;
            config_path = Some(PathBuf::from(value));
        }
    }

    let config_path = config_path.ok_or(Error::Usage("provide config file with '-c' option"))?;

    Ok(Args { config_path })
}

fn read_config(config_path: &Path) -> Result<AppConfig> {
    let config = fs::read_to_string(config_path)?;

    Ok(toml::from_str(&config)?)
}
