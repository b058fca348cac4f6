//! mDNS/Bonjour-based speaker discovery.
//!
//! Browses for the speakers' DNS-SD service type, resolves each
//! advertisement to an IPv4 address and confirms it with the [`Prober`].
//!
//! - The browse runs for the whole timeout; the timeout fires once and
//!   finalizes the result set, later resolutions are dropped
//! - Resolution prefers the addresses carried in the mDNS answer and falls
//!   back to a bounded host-name lookup
//! - A daemon or channel failure is reported as [`KefError::Discovery`] so
//!   callers can tell "nothing found" from "mDNS unavailable"

use crate::discovery::DeviceFinder;
use crate::error::{KefError, Result};
use crate::executor::SharedExecutor;
use crate::probe::{ProbeConfig, Prober};
use crate::types::DiscoveredDevice;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use mdns_sd::{ResolvedService, ScopedIp, ServiceDaemon, ServiceEvent};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Service type advertised by the speakers (trailing dot required by mdns-sd).
pub const KEF_SERVICE_TYPE: &str = "_kef-info._tcp.local.";

/// Configuration for mDNS discovery.
#[derive(Debug, Clone)]
pub struct BrowseConfig {
    pub service_type: String,
    /// Upper bound for resolving one advertisement to an address.
    pub resolve_timeout: Duration,
    pub probe: ProbeConfig,
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            service_type: KEF_SERVICE_TYPE.to_string(),
            resolve_timeout: Duration::from_secs(2),
            probe: ProbeConfig::default(),
        }
    }
}

/// An advertisement that still needs an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ServiceCandidate {
    pub fullname: String,
    pub hostname: String,
    pub port: u16,
    pub addresses: Vec<Ipv4Addr>,
}

impl ServiceCandidate {
    fn from_resolved(info: &ResolvedService) -> Self {
        let mut addresses: Vec<Ipv4Addr> = info
            .addresses
            .iter()
            .filter_map(|addr| match addr {
                ScopedIp::V4(v4) => Some(Ipv4Addr::from(v4.addr().octets())),
                ScopedIp::V6(_) | _ => None,
            })
            .collect();
        addresses.sort();

        Self {
            fullname: info.fullname.clone(),
            hostname: info.host.clone(),
            port: info.port,
            addresses,
        }
    }
}

/// Resolve a candidate to one IPv4 address within `limit`.
pub(crate) async fn resolve_candidate(candidate: &ServiceCandidate, limit: Duration) -> Option<Ipv4Addr> {
    if let Some(addr) = candidate.addresses.first() {
        return Some(*addr);
    }

    let host = candidate.hostname.trim_end_matches('.');
    if host.is_empty() {
        return None;
    }

    match tokio::time::timeout(limit, tokio::net::lookup_host((host, candidate.port))).await {
        Ok(Ok(addrs)) => addrs
            .filter_map(|addr| match addr.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .next(),
        Ok(Err(e)) => {
            tracing::debug!(host, error = %e, "[mDNS] Host lookup failed");
            None
        }
        Err(_) => {
            tracing::debug!(host, "[mDNS] Host lookup timed out");
            None
        }
    }
}

/// Browse events the collector reacts to.
#[derive(Debug)]
pub(crate) enum Announcement {
    Resolved(ServiceCandidate),
    Stopped(String),
}

fn shutdown_daemon(daemon: &ServiceDaemon) {
    if let Err(e) = daemon.shutdown() {
        tracing::warn!("[mDNS] Failed to shut down daemon: {:?}", e);
    }
}

/// Result set shared by concurrent resolvers; closed exactly once.
#[derive(Default)]
pub(crate) struct Accumulator {
    devices: HashSet<DiscoveredDevice>,
    closed: bool,
}

impl Accumulator {
    /// Returns true when the device is new and the set is still open.
    pub(crate) fn insert(&mut self, device: DiscoveredDevice) -> bool {
        if self.closed {
            return false;
        }
        self.devices.insert(device)
    }

    pub(crate) fn finalize(&mut self) -> HashSet<DiscoveredDevice> {
        self.closed = true;
        std::mem::take(&mut self.devices)
    }
}

/// Discovers speakers from their mDNS advertisements.
#[derive(Clone)]
pub struct ServiceBrowser {
    prober: Prober,
    config: BrowseConfig,
}

impl ServiceBrowser {
    pub fn new(executor: SharedExecutor, config: BrowseConfig) -> Self {
        let prober = Prober::new(executor, config.probe.clone());
        Self { prober, config }
    }

    /// Browse for `timeout` and return every confirmed speaker.
    pub async fn browse(&self, timeout: Duration) -> Result<HashSet<DiscoveredDevice>> {
        self.browse_with(timeout, None).await
    }

    async fn browse_with(
        &self,
        timeout: Duration,
        sink: Option<mpsc::UnboundedSender<DiscoveredDevice>>,
    ) -> Result<HashSet<DiscoveredDevice>> {
        let service_type = self.config.service_type.as_str();
        tracing::debug!(
            "[mDNS] Browsing for {}, timeout: {}ms",
            service_type,
            timeout.as_millis()
        );

        let daemon = ServiceDaemon::new().map_err(|e| KefError::Discovery(e.to_string()))?;
        let receiver = match daemon.browse(service_type) {
            Ok(receiver) => receiver,
            Err(e) => {
                shutdown_daemon(&daemon);
                return Err(KefError::Discovery(e.to_string()));
            }
        };

        let announcements = async_stream::stream! {
            while let Ok(event) = receiver.recv_async().await {
                match event {
                    ServiceEvent::ServiceResolved(info) => {
                        tracing::trace!("[mDNS] Service resolved: {}", info.fullname);
                        yield Announcement::Resolved(ServiceCandidate::from_resolved(&info));
                    }
                    ServiceEvent::SearchStopped(ty) => yield Announcement::Stopped(ty),
                    _ => {}
                }
            }
        };
        let result = self.collect(announcements, timeout, sink).await;

        if let Err(e) = daemon.stop_browse(service_type) {
            tracing::warn!("[mDNS] Failed to stop browse: {:?}", e);
        }
        shutdown_daemon(&daemon);

        let devices = result?;
        tracing::debug!("[mDNS] Discovery complete: {} speaker(s) found", devices.len());
        Ok(devices)
    }

    /// Resolve announcements until the deadline, then close the result set.
    ///
    /// The announcement stream ending early means the daemon went away.
    async fn collect(
        &self,
        announcements: impl Stream<Item = Announcement>,
        timeout: Duration,
        sink: Option<mpsc::UnboundedSender<DiscoveredDevice>>,
    ) -> Result<HashSet<DiscoveredDevice>> {
        tokio::pin!(announcements);
        let results = Arc::new(Mutex::new(Accumulator::default()));
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let outcome = loop {
            tokio::select! {
                _ = &mut deadline => break Ok(()),
                next = announcements.next() => match next {
                    Some(Announcement::Resolved(candidate)) => {
                        self.spawn_resolver(candidate, results.clone(), sink.clone());
                    }
                    Some(Announcement::Stopped(ty)) => {
                        break Err(KefError::Discovery(format!("browse for {} stopped", ty)));
                    }
                    None => {
                        break Err(KefError::Discovery("browse channel closed".to_string()));
                    }
                },
            }
        };

        let devices = results
            .lock()
            .map_err(|_| KefError::Discovery("result set poisoned".to_string()))?
            .finalize();
        outcome.map(|_| devices)
    }

    fn spawn_resolver(
        &self,
        candidate: ServiceCandidate,
        results: Arc<Mutex<Accumulator>>,
        sink: Option<mpsc::UnboundedSender<DiscoveredDevice>>,
    ) {
        let prober = self.prober.clone();
        let resolve_timeout = self.config.resolve_timeout;
        tokio::spawn(async move {
            let Some(addr) = resolve_candidate(&candidate, resolve_timeout).await else {
                tracing::debug!("[mDNS] Could not resolve {}", candidate.fullname);
                return;
            };
            let Some(device) = prober.probe(&addr.to_string()).await else {
                tracing::debug!("[mDNS] {} at {} did not answer probe", candidate.fullname, addr);
                return;
            };

            let added = match results.lock() {
                Ok(mut results) => results.insert(device.clone()),
                Err(_) => false,
            };
            if added {
                tracing::debug!("[mDNS] Discovered speaker: {} at {}", device.name, device.host);
                if let Some(sink) = sink {
                    let _ = sink.send(device);
                }
            }
        });
    }
}

#[async_trait]
impl DeviceFinder for ServiceBrowser {
    fn name(&self) -> &'static str {
        "mDNS"
    }

    async fn find(
        &self,
        timeout: Duration,
        found: Option<mpsc::UnboundedSender<DiscoveredDevice>>,
    ) -> Result<HashSet<DiscoveredDevice>> {
        self.browse_with(timeout, found).await
    }
}
