use crate::decoder::EventDecoder;
use crate::error::{KefError, Result};
use crate::executor::SharedExecutor;
use crate::subscription::{SubscriptionManager, SubscriptionQueue, SyncConfig};
use crate::types::SpeakerEvent;
use futures_util::Stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Live state session with one speaker
///
/// Owns the speaker's event queue. Single-shot polls and continuous streams
/// share it, one poll at a time.
pub struct LiveSession {
    manager: Mutex<SubscriptionManager>,
    decoder: EventDecoder,
    retry_delay: Duration,
}

impl LiveSession {
    pub fn new(executor: SharedExecutor, host: impl Into<String>, port: u16, config: SyncConfig) -> Self {
        let decoder = EventDecoder::new(config.decoder.clone());
        let retry_delay = config.retry_delay;
        Self {
            manager: Mutex::new(SubscriptionManager::new(executor, host, port, config)),
            decoder,
            retry_delay,
        }
    }

    /// Snapshot of the queue currently in use
    pub async fn current_queue(&self) -> Option<SubscriptionQueue> {
        self.manager.lock().await.current_queue().cloned()
    }

    /// Wait up to `timeout` for changes and decode them
    ///
    /// An event with no fields set means nothing changed.
    pub async fn poll_once(&self, timeout: Duration, position_tracking: bool) -> Result<SpeakerEvent> {
        let mut manager = self.manager.lock().await;
        let raw = manager.poll_once(timeout, position_tracking).await?;
        Ok(self.decoder.decode(&raw))
    }

    /// Like [`poll_once`](Self::poll_once), abandoning the poll when `cancel` fires
    pub async fn poll_once_until(
        &self,
        timeout: Duration,
        position_tracking: bool,
        cancel: &CancellationToken,
    ) -> Result<SpeakerEvent> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(KefError::Cancelled),
            event = self.poll_once(timeout, position_tracking) => event,
        }
    }

    /// Poll continuously, yielding one event per completed poll
    ///
    /// Transient failures are retried after the configured delay without
    /// yielding anything. A speaker that stops responding ends the stream
    /// with that error. Cancelling `cancel` ends the stream quietly.
    pub fn stream(
        self: Arc<Self>,
        poll_interval: Duration,
        position_tracking: bool,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<SpeakerEvent>> + Send + 'static {
        let session = self;
        async_stream::stream! {
            loop {
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    outcome = session.poll_once(poll_interval, position_tracking) => outcome,
                };

                match outcome {
                    Ok(event) => yield Ok(event),
                    Err(e) if e.is_fatal() => {
                        tracing::warn!("Live sync stopped: {}", e);
                        yield Err(e);
                        break;
                    }
                    Err(e) => {
                        tracing::debug!("Poll failed, retrying in {:?}: {}", session.retry_delay, e);
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(session.retry_delay) => {}
                        }
                    }
                }
            }
            tracing::debug!("Live sync stream finished");
        }
    }
}
