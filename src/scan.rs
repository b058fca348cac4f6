use crate::discovery::DeviceFinder;
use crate::error::{KefError, Result};
use crate::executor::SharedExecutor;
use crate::probe::{ProbeConfig, Prober};
use crate::protocol::DEFAULT_PORT;
use crate::types::{CandidateRange, DiscoveredDevice};
use async_trait::async_trait;
use local_ip_address::list_afinet_netifas;
use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::mpsc;

/// Interface name prefixes that never lead to a speaker
const VIRTUAL_INTERFACE_PREFIXES: &[&str] = &[
    "lo", "docker", "veth", "br-", "virbr", "vmnet", "vbox", "tun", "tap", "utun",
];

fn is_virtual_interface(name: &str) -> bool {
    let name = name.to_lowercase();
    VIRTUAL_INTERFACE_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Configuration for the subnet scan fallback.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Upper bound for each identity read on a single host.
    pub per_host_timeout: Duration,
    /// Control API port probed on every host.
    pub port: u16,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            per_host_timeout: Duration::from_secs(2),
            port: DEFAULT_PORT,
        }
    }
}

/// Candidate /24 ranges of the active IPv4 interfaces, best first.
///
/// Fails with [`KefError::NoSubnetFound`] when no usable interface exists.
pub fn derive_local_ranges() -> Result<Vec<CandidateRange>> {
    let interfaces = list_afinet_netifas().unwrap_or_else(|e| {
        tracing::warn!("Failed to list network interfaces: {}", e);
        Vec::new()
    });
    rank_ranges(interfaces)
}

/// Rank the ranges of the given `(interface, address)` pairs.
///
/// Loopback, link-local and virtual interfaces are skipped. Private ranges
/// come first; otherwise interface order is kept.
pub fn rank_ranges(
    interfaces: impl IntoIterator<Item = (String, IpAddr)>,
) -> Result<Vec<CandidateRange>> {
    let mut ranges: Vec<CandidateRange> = Vec::new();
    for (name, addr) in interfaces {
        let IpAddr::V4(v4) = addr else { continue };
        if v4.is_loopback() || v4.is_link_local() || v4.is_unspecified() {
            continue;
        }
        if is_virtual_interface(&name) {
            tracing::debug!("Skipping virtual interface: {}", name);
            continue;
        }
        let range = CandidateRange::from_addr(v4);
        if !ranges.contains(&range) {
            tracing::debug!("Interface {} ({}) gives range {}", name, v4, range);
            ranges.push(range);
        }
    }

    // stable: private first, interface order otherwise
    ranges.sort_by_key(|range| !range.is_private());

    if ranges.is_empty() {
        return Err(KefError::NoSubnetFound);
    }
    Ok(ranges)
}

/// Brute-force discovery across a local /24.
///
/// Every host .1–.254 is probed concurrently. When the deadline passes the
/// scan stops waiting: unfinished probes are left to run out their own
/// timeouts and their results are dropped, they are never aborted mid-request.
#[derive(Clone)]
pub struct SubnetScanner {
    executor: SharedExecutor,
    config: ScanConfig,
}

impl SubnetScanner {
    pub fn new(executor: SharedExecutor, config: ScanConfig) -> Self {
        Self { executor, config }
    }

    /// Scan one range and return every speaker that answered in time.
    pub async fn scan(
        &self,
        range: CandidateRange,
        per_host_timeout: Duration,
        deadline: Duration,
    ) -> HashSet<DiscoveredDevice> {
        self.scan_with(range, per_host_timeout, deadline, None).await
    }

    async fn scan_with(
        &self,
        range: CandidateRange,
        per_host_timeout: Duration,
        deadline: Duration,
        sink: Option<mpsc::UnboundedSender<DiscoveredDevice>>,
    ) -> HashSet<DiscoveredDevice> {
        tracing::info!(%range, ?deadline, "Scanning subnet");

        let prober = Prober::new(
            self.executor.clone(),
            ProbeConfig {
                port: self.config.port,
                timeout: per_host_timeout,
            },
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        for addr in range.hosts() {
            let prober = prober.clone();
            let tx = tx.clone();
            // detached: dropping the handle lets an abandoned probe finish on its own
            tokio::spawn(async move {
                if let Some(device) = prober.probe(&addr.to_string()).await {
                    let _ = tx.send(device);
                }
            });
        }
        drop(tx);

        let timer = tokio::time::sleep(deadline);
        tokio::pin!(timer);

        let mut found = HashSet::new();
        loop {
            tokio::select! {
                _ = &mut timer => {
                    tracing::debug!(%range, "Scan deadline reached, abandoning outstanding probes");
                    break;
                }
                next = rx.recv() => match next {
                    Some(device) => {
                        if let Some(sink) = &sink {
                            if !found.contains(&device) {
                                let _ = sink.send(device.clone());
                            }
                        }
                        found.insert(device);
                    }
                    None => break,
                },
            }
        }

        tracing::info!(%range, count = found.len(), "Subnet scan complete");
        found
    }
}

#[async_trait]
impl DeviceFinder for SubnetScanner {
    fn name(&self) -> &'static str {
        "subnet scan"
    }

    async fn find(
        &self,
        timeout: Duration,
        found: Option<mpsc::UnboundedSender<DiscoveredDevice>>,
    ) -> Result<HashSet<DiscoveredDevice>> {
        let ranges = derive_local_ranges()?;
        // ranges is never empty here
        let range = ranges[0];
        Ok(self
            .scan_with(range, self.config.per_host_timeout, timeout, found)
            .await)
    }
}
