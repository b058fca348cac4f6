use crate::decoder::{source_from_value, DecoderPolicy, PlayerData};
use crate::error::{KefError, Result};
use crate::executor::{read_path, SharedExecutor};
use crate::poller::LiveSession;
use crate::protocol::{paths, tags, typed_bool, typed_i64, typed_str, typed_value, Command, DEFAULT_PORT};
use crate::subscription::SyncConfig;
use crate::types::{PlaybackState, SongInfo, Source, SpeakerEvent, SpeakerStatus};
use futures_util::Stream;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-speaker settings
#[derive(Debug, Clone)]
pub struct SpeakerConfig {
    /// Transport timeout for one-shot reads and writes
    pub request_timeout: Duration,
    pub sync: SyncConfig,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            sync: SyncConfig::default(),
        }
    }
}

/// Handle for controlling one speaker
///
/// Cloning is cheap; clones share the same live session.
///
/// # Example
///
/// ```no_run
/// use kef_wireless::{HttpExecutor, Source, Speaker};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let speaker = Speaker::new(HttpExecutor::new().shared(), "192.168.1.100");
///     speaker.set_source(Source::Optic).await?;
///     speaker.set_volume(25).await?;
///     println!("{} is playing from {:?}", speaker.name().await?, speaker.source().await?);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Speaker {
    executor: SharedExecutor,
    host: String,
    port: u16,
    request_timeout: Duration,
    policy: DecoderPolicy,
    live: Arc<LiveSession>,
}

impl Speaker {
    /// Speaker on the default port
    pub fn new(executor: SharedExecutor, host: impl Into<String>) -> Self {
        Self::with_port(executor, host, DEFAULT_PORT)
    }

    pub fn with_port(executor: SharedExecutor, host: impl Into<String>, port: u16) -> Self {
        Self::with_config(executor, host, port, SpeakerConfig::default())
    }

    pub fn with_config(executor: SharedExecutor, host: impl Into<String>, port: u16, config: SpeakerConfig) -> Self {
        let host = host.into();
        let policy = config.sync.decoder.clone();
        let live = Arc::new(LiveSession::new(executor.clone(), host.clone(), port, config.sync));
        Self {
            executor,
            host,
            port,
            request_timeout: config.request_timeout,
            policy,
            live,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    async fn read(&self, path: &str) -> Result<Value> {
        read_path(&*self.executor, &self.host, self.port, path, self.request_timeout).await
    }

    async fn write(&self, path: &str, value: Value) -> Result<()> {
        tracing::debug!(host = %self.host, path, "Setting {}", value);
        let command = Command::set_data(&self.host, self.port, path, value).with_timeout(self.request_timeout);
        self.executor.execute(&command).await?;
        Ok(())
    }

    async fn read_string(&self, path: &str) -> Result<String> {
        let value = self.read(path).await?;
        typed_str(&value, tags::STRING)
            .map(str::to_string)
            .ok_or_else(|| missing(path, &value))
    }

    async fn read_i32(&self, path: &str) -> Result<i32> {
        let value = self.read(path).await?;
        typed_i64(&value, tags::I32)
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| missing(path, &value))
    }

    // Identity

    pub async fn name(&self) -> Result<String> {
        self.read_string(paths::DEVICE_NAME).await
    }

    pub async fn set_name(&self, name: &str) -> Result<()> {
        self.write(paths::DEVICE_NAME, typed_value(tags::STRING, name)).await
    }

    pub async fn mac_address(&self) -> Result<String> {
        self.read_string(paths::MAC_ADDRESS).await
    }

    pub async fn model_name(&self) -> Result<String> {
        self.read_string(paths::MODEL_NAME).await
    }

    pub async fn firmware_version(&self) -> Result<String> {
        self.read_string(paths::FIRMWARE).await
    }

    // Volume

    pub async fn volume(&self) -> Result<i32> {
        self.read_i32(paths::VOLUME).await
    }

    /// Set the volume, clamped to 0–100
    pub async fn set_volume(&self, volume: i32) -> Result<()> {
        self.write(paths::VOLUME, typed_value(tags::I32, volume.clamp(0, 100))).await
    }

    pub async fn max_volume(&self) -> Result<i32> {
        self.read_i32(paths::MAXIMUM_VOLUME).await
    }

    pub async fn is_muted(&self) -> Result<bool> {
        let value = self.read(paths::MUTE).await?;
        typed_bool(&value, tags::BOOL).ok_or_else(|| missing(paths::MUTE, &value))
    }

    pub async fn mute(&self) -> Result<()> {
        self.write(paths::MUTE, typed_value(tags::BOOL, true)).await
    }

    pub async fn unmute(&self) -> Result<()> {
        self.write(paths::MUTE, typed_value(tags::BOOL, false)).await
    }

    // Source and power

    /// Current input, or `None` while the speaker is in standby or powering on
    pub async fn source(&self) -> Result<Option<Source>> {
        let value = self.read(paths::PHYSICAL_SOURCE).await?;
        if typed_str(&value, tags::PHYSICAL_SOURCE).is_none() {
            return Err(missing(paths::PHYSICAL_SOURCE, &value));
        }
        Ok(source_from_value(&value, &self.policy))
    }

    pub async fn set_source(&self, source: Source) -> Result<()> {
        self.write_physical_source(source.as_str()).await
    }

    async fn write_physical_source(&self, wire: &str) -> Result<()> {
        self.write(paths::PHYSICAL_SOURCE, typed_value(tags::PHYSICAL_SOURCE, wire))
            .await
    }

    pub async fn speaker_status(&self) -> Result<SpeakerStatus> {
        let value = self.read(paths::SPEAKER_STATUS).await?;
        typed_str(&value, tags::SPEAKER_STATUS)
            .and_then(SpeakerStatus::from_wire)
            .ok_or_else(|| missing(paths::SPEAKER_STATUS, &value))
    }

    pub async fn power_on(&self) -> Result<()> {
        self.write_physical_source(SpeakerStatus::PowerOn.as_str()).await
    }

    /// Put the speaker into standby
    pub async fn shutdown(&self) -> Result<()> {
        self.write_physical_source(SpeakerStatus::Standby.as_str()).await
    }

    // Playback

    async fn control(&self, action: &str) -> Result<()> {
        self.write(paths::PLAYER_CONTROL, json!({ "control": action })).await
    }

    pub async fn toggle_play_pause(&self) -> Result<()> {
        self.control("pause").await
    }

    pub async fn next_track(&self) -> Result<()> {
        self.control("next").await
    }

    pub async fn previous_track(&self) -> Result<()> {
        self.control("previous").await
    }

    async fn player_data(&self) -> Result<PlayerData> {
        let value = self.read(paths::PLAYER_DATA).await?;
        Ok(PlayerData::from_value(&value))
    }

    /// Metadata of the current track; empty when nothing is loaded
    pub async fn song_info(&self) -> Result<SongInfo> {
        Ok(self.player_data().await?.song_info.unwrap_or_default())
    }

    /// Track duration in milliseconds, if known
    pub async fn song_duration(&self) -> Result<Option<i64>> {
        Ok(self.player_data().await?.duration)
    }

    /// Playback position in milliseconds
    pub async fn song_position(&self) -> Result<i64> {
        let value = self.read(paths::PLAY_TIME).await?;
        typed_i64(&value, tags::I64)
            .or_else(|| typed_i64(&value, tags::I32))
            .ok_or_else(|| missing(paths::PLAY_TIME, &value))
    }

    pub async fn playback_state(&self) -> Result<Option<PlaybackState>> {
        Ok(self.player_data().await?.state)
    }

    // Live state

    /// Live session shared by every clone of this handle
    pub fn live(&self) -> Arc<LiveSession> {
        self.live.clone()
    }

    /// Wait up to `timeout` for state changes
    pub async fn poll_once(&self, timeout: Duration, position_tracking: bool) -> Result<SpeakerEvent> {
        self.live.poll_once(timeout, position_tracking).await
    }

    /// Stream state changes until `cancel` fires or the speaker stops responding
    pub fn events(
        &self,
        poll_interval: Duration,
        position_tracking: bool,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<SpeakerEvent>> + Send + 'static {
        self.live.clone().stream(poll_interval, position_tracking, cancel)
    }
}

fn missing(path: &str, value: &Value) -> KefError {
    KefError::InvalidResponse(format!("Unexpected value for {}: {}", path, value))
}
