use crate::error::Result;
use crate::executor::SharedExecutor;
use crate::mdns::{BrowseConfig, ServiceBrowser};
use crate::scan::{ScanConfig, SubnetScanner};
use crate::types::DiscoveredDevice;
use async_trait::async_trait;
use futures_util::Stream;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// One way of finding speakers on the local network
#[async_trait]
pub trait DeviceFinder: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Search for up to `timeout` and return everything found.
    ///
    /// When `found` is given, each device is also sent on it as soon as it
    /// is confirmed.
    async fn find(
        &self,
        timeout: Duration,
        found: Option<mpsc::UnboundedSender<DiscoveredDevice>>,
    ) -> Result<HashSet<DiscoveredDevice>>;
}

/// Configuration for the discovery orchestrator
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub browse: BrowseConfig,
    pub scan: ScanConfig,
    /// How long each method runs when discovering as a stream
    pub stream_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            browse: BrowseConfig::default(),
            scan: ScanConfig::default(),
            stream_timeout: Duration::from_secs(10),
        }
    }
}

/// Discovery manager for KEF speakers
///
/// Tries mDNS first and falls back to scanning the local /24 when the
/// announcements yield nothing or mDNS is unavailable.
///
/// # Example
///
/// ```no_run
/// use kef_wireless::{Discovery, HttpExecutor};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let discovery = Discovery::new(HttpExecutor::new().shared());
///
///     for device in discovery.discover(Duration::from_secs(5)).await? {
///         println!("Found speaker: {} at {}", device.name, device.host);
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Discovery {
    browser: Arc<dyn DeviceFinder>,
    scanner: Arc<dyn DeviceFinder>,
    stream_timeout: Duration,
}

impl Discovery {
    /// Create a discovery manager with default settings
    pub fn new(executor: SharedExecutor) -> Self {
        Self::with_config(executor, DiscoveryConfig::default())
    }

    /// Create a discovery manager with custom settings
    pub fn with_config(executor: SharedExecutor, config: DiscoveryConfig) -> Self {
        Self {
            browser: Arc::new(ServiceBrowser::new(executor.clone(), config.browse)),
            scanner: Arc::new(SubnetScanner::new(executor, config.scan)),
            stream_timeout: config.stream_timeout,
        }
    }

    /// Create a discovery manager from custom finders
    ///
    /// `preferred` is always tried first; `fallback` only runs when it
    /// finds nothing or fails.
    pub fn with_finders(
        preferred: Arc<dyn DeviceFinder>,
        fallback: Arc<dyn DeviceFinder>,
        stream_timeout: Duration,
    ) -> Self {
        Self {
            browser: preferred,
            scanner: fallback,
            stream_timeout,
        }
    }

    /// Discover speakers, waiting for the search to finish
    ///
    /// An empty set is a valid answer. Errors from the fallback scan (such as
    /// no usable subnet) are returned as-is.
    ///
    /// `timeout` applies to each method separately: when mDNS finds nothing
    /// the scan gets the full `timeout` again, so a call can take up to twice
    /// as long.
    pub async fn discover(&self, timeout: Duration) -> Result<HashSet<DiscoveredDevice>> {
        match self.browser.find(timeout, None).await {
            Ok(devices) if !devices.is_empty() => {
                tracing::info!("{} found {} speaker(s)", self.browser.name(), devices.len());
                return Ok(devices);
            }
            Ok(_) => {
                tracing::info!(
                    "{} found nothing, falling back to {}",
                    self.browser.name(),
                    self.scanner.name()
                );
            }
            Err(e) => {
                tracing::warn!(
                    "{} unavailable ({}), falling back to {}",
                    self.browser.name(),
                    e,
                    self.scanner.name()
                );
            }
        }

        let devices = self.scanner.find(timeout, None).await?;
        tracing::info!("{} found {} speaker(s)", self.scanner.name(), devices.len());
        Ok(devices)
    }

    /// Discover speakers as a stream, yielding each one as soon as it is found
    ///
    /// The stream is finite. Discovery is best-effort: errors end the stream
    /// instead of being yielded.
    pub fn discover_stream(&self) -> impl Stream<Item = DiscoveredDevice> + Send + 'static {
        let browser = self.browser.clone();
        let scanner = self.scanner.clone();
        let timeout = self.stream_timeout;

        async_stream::stream! {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let worker = tokio::spawn(async move {
                let announced = match browser.find(timeout, Some(tx.clone())).await {
                    Ok(devices) => devices.len(),
                    Err(e) => {
                        tracing::debug!("{} stream failed: {}", browser.name(), e);
                        0
                    }
                };
                if announced == 0 {
                    if let Err(e) = scanner.find(timeout, Some(tx)).await {
                        tracing::debug!("{} stream failed: {}", scanner.name(), e);
                    }
                }
            });

            let mut seen = HashSet::new();
            while let Some(device) = rx.recv().await {
                if seen.insert(device.clone()) {
                    yield device;
                }
            }
            let _ = worker.await;
        }
    }
}
