use crate::decoder::DecoderPolicy;
use crate::error::Result;
use crate::executor::SharedExecutor;
use crate::protocol::{
    self, paths, Command, QueueRequest, RawEvents, CORE_OBSERVED_PATHS, MODIFY_QUEUE, POLL_QUEUE,
};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::Instant;

/// Long-poll bounds accepted by the device, in seconds
const MIN_POLL_SECS: u64 = 1;
const MAX_POLL_SECS: u64 = 60;

/// Configuration for live state sync
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// A queue idle for longer than this is assumed gone and recreated
    pub staleness_window: Duration,
    /// Added to the poll timeout for the transport timeout
    pub poll_buffer: Duration,
    /// Wait between a failed poll and the next attempt
    pub retry_delay: Duration,
    /// Transport timeout for the subscribe request
    pub subscribe_timeout: Duration,
    pub decoder: DecoderPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            staleness_window: Duration::from_secs(50),
            poll_buffer: Duration::from_secs(1),
            retry_delay: Duration::from_secs(2),
            subscribe_timeout: Duration::from_secs(5),
            decoder: DecoderPolicy::default(),
        }
    }
}

/// Server-side event queue owned by one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionQueue {
    pub id: String,
    pub observed_paths: BTreeSet<String>,
    pub includes_position_tracking: bool,
    pub created_at: Instant,
}

/// Queue lifecycle
///
/// `NoQueue → Active → (stale | tracking changed | poll failed) → NoQueue`.
/// Abandoned queues are never torn down explicitly; the device expires them.
#[derive(Debug)]
enum QueueState {
    NoQueue,
    Active {
        queue: SubscriptionQueue,
        last_poll: Instant,
    },
}

/// Creates, tracks and polls the event queue of one speaker
pub struct SubscriptionManager {
    executor: SharedExecutor,
    host: String,
    port: u16,
    config: SyncConfig,
    state: QueueState,
}

impl SubscriptionManager {
    pub fn new(executor: SharedExecutor, host: impl Into<String>, port: u16, config: SyncConfig) -> Self {
        Self {
            executor,
            host: host.into(),
            port,
            config,
            state: QueueState::NoQueue,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The queue polls currently go to, if any
    pub fn current_queue(&self) -> Option<&SubscriptionQueue> {
        match &self.state {
            QueueState::NoQueue => None,
            QueueState::Active { queue, .. } => Some(queue),
        }
    }

    /// Forget the current queue; the next poll subscribes again
    pub fn invalidate(&mut self) {
        self.state = QueueState::NoQueue;
    }

    /// Transition guard evaluated before every poll
    fn needs_new_queue(&self, position_tracking: bool, now: Instant) -> bool {
        match &self.state {
            QueueState::NoQueue => true,
            QueueState::Active { queue, last_poll } => {
                now.saturating_duration_since(*last_poll) > self.config.staleness_window
                    || queue.includes_position_tracking != position_tracking
            }
        }
    }

    /// Return the id of a usable queue, subscribing first when needed
    pub async fn ensure_queue(&mut self, position_tracking: bool) -> Result<String> {
        if !self.needs_new_queue(position_tracking, Instant::now()) {
            if let Some(queue) = self.current_queue() {
                return Ok(queue.id.clone());
            }
        }

        if let Some(stale) = self.current_queue() {
            tracing::debug!(host = %self.host, queue = %stale.id, "Abandoning event queue");
        }
        self.state = QueueState::NoQueue;

        let queue = self.subscribe(position_tracking).await?;
        tracing::info!(
            host = %self.host,
            queue = %queue.id,
            position_tracking,
            "Created event queue"
        );
        let id = queue.id.clone();
        let last_poll = queue.created_at;
        self.state = QueueState::Active { queue, last_poll };
        Ok(id)
    }

    async fn subscribe(&self, position_tracking: bool) -> Result<SubscriptionQueue> {
        let mut observed: BTreeSet<String> =
            CORE_OBSERVED_PATHS.iter().map(|p| p.to_string()).collect();
        if position_tracking {
            observed.insert(paths::PLAY_TIME.to_string());
        }

        let body = QueueRequest::subscribe(observed.iter().map(String::as_str));
        let command = Command::post(&self.host, self.port, MODIFY_QUEUE)
            .with_body(serde_json::to_value(&body)?)
            .with_timeout(self.config.subscribe_timeout);

        let response = self.executor.execute(&command).await?;
        let id = protocol::parse_queue_id(&response)?;

        Ok(SubscriptionQueue {
            id,
            observed_paths: observed,
            includes_position_tracking: position_tracking,
            created_at: Instant::now(),
        })
    }

    /// Drain one batch of changes from a queue
    ///
    /// Blocks on the device for up to `timeout` (clamped to 1–60 s). An empty
    /// answer means nothing changed.
    pub async fn poll(&self, queue_id: &str, timeout: Duration) -> Result<RawEvents> {
        let secs = timeout.as_secs().clamp(MIN_POLL_SECS, MAX_POLL_SECS);
        let command = Command::get(&self.host, self.port, POLL_QUEUE)
            .with_param("queueId", queue_id)
            .with_param("timeout", secs.to_string())
            .with_timeout(Duration::from_secs(secs) + self.config.poll_buffer);

        let response = self.executor.execute(&command).await?;
        protocol::parse_poll_response(&response)
    }

    /// Poll through the current queue, recreating it first when needed
    ///
    /// A failed poll drops the queue so the next call subscribes afresh.
    pub async fn poll_once(&mut self, timeout: Duration, position_tracking: bool) -> Result<RawEvents> {
        let queue_id = self.ensure_queue(position_tracking).await?;
        match self.poll(&queue_id, timeout).await {
            Ok(events) => {
                if let QueueState::Active { last_poll, .. } = &mut self.state {
                    *last_poll = Instant::now();
                }
                Ok(events)
            }
            Err(e) => {
                tracing::debug!(host = %self.host, queue = %queue_id, error = %e, "Poll failed, dropping queue");
                self.invalidate();
                Err(e)
            }
        }
    }
}
