use crate::error::{KefError, Result};
use crate::executor::{read_path, SharedExecutor};
use crate::protocol::{paths, tags, typed_str, DEFAULT_PORT};
use crate::types::DiscoveredDevice;
use std::time::Duration;
use tokio::time::timeout;

/// Configuration for probing a single host.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Control API port.
    pub port: u16,
    /// Upper bound for each identity read.
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout: Duration::from_secs(2),
        }
    }
}

/// Decides whether a host is a speaker by reading its identity.
///
/// A host counts as a speaker when it answers the device-name read. MAC
/// address and model are best-effort extras.
#[derive(Clone)]
pub struct Prober {
    executor: SharedExecutor,
    config: ProbeConfig,
}

impl Prober {
    pub fn new(executor: SharedExecutor, config: ProbeConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Probe a host; any failure means "not a speaker".
    pub async fn probe(&self, host: &str) -> Option<DiscoveredDevice> {
        let name = match self.read_string(host, paths::DEVICE_NAME).await {
            Ok(Some(name)) if !name.is_empty() => name,
            Ok(_) => {
                tracing::trace!(host, "Device name missing, not a speaker");
                return None;
            }
            Err(e) => {
                tracing::trace!(host, error = %e, "Probe failed");
                return None;
            }
        };

        let mac_address = self.read_optional(host, paths::MAC_ADDRESS).await;
        let model = match self.read_optional(host, paths::MODEL_NAME).await {
            Some(model) => Some(model),
            None => self.read_optional(host, paths::FIRMWARE).await,
        };

        tracing::debug!(host, name = %name, "Found speaker");
        Some(DiscoveredDevice {
            name,
            host: host.to_string(),
            port: self.config.port,
            model,
            mac_address,
        })
    }

    async fn read_optional(&self, host: &str, path: &str) -> Option<String> {
        match self.read_string(host, path).await {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                tracing::trace!(host, path, error = %e, "Optional metadata unavailable");
                None
            }
        }
    }

    async fn read_string(&self, host: &str, path: &str) -> Result<Option<String>> {
        let read = read_path(
            self.executor.as_ref(),
            host,
            self.config.port,
            path,
            self.config.timeout,
        );
        let value = timeout(self.config.timeout, read)
            .await
            .map_err(|_| KefError::NotResponding)??;
        Ok(typed_str(&value, tags::STRING).map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{param, string_body, MockExecutor, Reply};

    fn prober(mock: std::sync::Arc<MockExecutor>) -> Prober {
        Prober::new(mock, ProbeConfig::default())
    }

    #[tokio::test]
    async fn probe_reads_name_mac_and_model() {
        let mock = MockExecutor::new(|cmd| match param(cmd, "path") {
            Some(paths::DEVICE_NAME) => Reply::Body(string_body("Office")),
            Some(paths::MAC_ADDRESS) => Reply::Body(string_body("84:17:15:00:AA:01")),
            Some(paths::MODEL_NAME) => Reply::Body(string_body("SP4041")),
            _ => Reply::Fail(KefError::Network("unexpected".into())),
        });

        let device = prober(mock).probe("192.168.1.7").await.unwrap();
        assert_eq!(device.name, "Office");
        assert_eq!(device.host, "192.168.1.7");
        assert_eq!(device.port, 80);
        assert_eq!(device.mac_address.as_deref(), Some("84:17:15:00:AA:01"));
        assert_eq!(device.model.as_deref(), Some("SP4041"));
    }

    #[tokio::test]
    async fn model_falls_back_to_firmware_text() {
        let mock = MockExecutor::new(|cmd| match param(cmd, "path") {
            Some(paths::DEVICE_NAME) => Reply::Body(string_body("Den")),
            Some(paths::FIRMWARE) => Reply::Body(string_body("LSXII_V26120")),
            _ => Reply::Fail(KefError::Network("refused".into())),
        });

        let device = prober(mock).probe("10.0.0.3").await.unwrap();
        assert_eq!(device.model.as_deref(), Some("LSXII_V26120"));
        assert!(device.mac_address.is_none());
    }

    #[tokio::test]
    async fn network_failure_is_not_a_device() {
        let mock = MockExecutor::new(|_| Reply::Fail(KefError::Network("refused".into())));
        assert!(prober(mock).probe("10.0.0.4").await.is_none());
    }

    #[tokio::test]
    async fn garbage_payload_is_not_a_device() {
        for body in ["<html>router login</html>", "[]", "{}", r#"[{"type":"i32_","i32_":3}]"#] {
            let body = body.to_string();
            let mock = MockExecutor::new(move |_| Reply::Body(body.clone()));
            assert!(prober(mock).probe("10.0.0.5").await.is_none());
        }
    }

    #[tokio::test]
    async fn empty_name_is_not_a_device() {
        let mock = MockExecutor::new(|_| Reply::Body(string_body("")));
        assert!(prober(mock).probe("10.0.0.6").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_host_times_out_to_none() {
        let mock = MockExecutor::new(|_| Reply::Hang);
        assert!(prober(mock).probe("10.0.0.7").await.is_none());
    }
}
