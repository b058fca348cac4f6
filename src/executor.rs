use crate::error::{KefError, Result};
use crate::protocol::{self, Command, Method};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Capability to run a single request against a speaker's control API
///
/// Every component that talks to a device goes through this trait, so the
/// transport can be swapped out (the crate ships [`HttpExecutor`]).
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run the command and return the response body
    async fn execute(&self, command: &Command) -> Result<String>;
}

/// Executor shared between discovery, control and live sync
pub type SharedExecutor = Arc<dyn CommandExecutor>;

/// HTTP transport for the control API
///
/// A transport timeout is reported as [`KefError::NotResponding`]; every
/// other transport failure is a [`KefError::Network`].
#[derive(Clone, Debug, Default)]
pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    /// Create an executor with a default HTTP client
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an executor around an existing HTTP client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Wrap into a shared executor handle
    pub fn shared(self) -> SharedExecutor {
        Arc::new(self)
    }
}

fn build_url(command: &Command) -> Result<reqwest::Url> {
    let host = if command.host.contains(':') && !command.host.starts_with('[') {
        format!("[{}]", command.host)
    } else {
        command.host.clone()
    };
    let raw = format!("http://{}:{}{}", host, command.port, command.endpoint);
    reqwest::Url::parse(&raw).map_err(|e| KefError::InvalidUrl(format!("{}: {}", raw, e)))
}

fn map_transport_error(error: reqwest::Error) -> KefError {
    if error.is_timeout() {
        KefError::NotResponding
    } else {
        KefError::Network(error.to_string())
    }
}

#[async_trait]
impl CommandExecutor for HttpExecutor {
    async fn execute(&self, command: &Command) -> Result<String> {
        let url = build_url(command)?;
        tracing::trace!(method = ?command.method, %url, "Sending command");

        let mut request = match command.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };
        request = request.query(&command.query).timeout(command.timeout);
        if let Some(body) = &command.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(KefError::Network(format!("HTTP status {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| KefError::InvalidResponse(e.to_string()))
    }
}

/// Read a control path and return its typed value object
pub(crate) async fn read_path(
    executor: &dyn CommandExecutor,
    host: &str,
    port: u16,
    path: &str,
    timeout: Duration,
) -> Result<serde_json::Value> {
    let command = Command::get_data(host, port, path).with_timeout(timeout);
    let body = executor.execute(&command).await?;
    protocol::parse_get_data(&body)
}
