use crate::executor::SharedExecutor;
use crate::protocol::DEFAULT_PORT;
use crate::speaker::Speaker;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Speaker found on the local network
///
/// A snapshot taken at probe time; equality covers every field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub model: Option<String>,
    pub mac_address: Option<String>,
}

impl DiscoveredDevice {
    /// Create a device record on the default port with no metadata
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: DEFAULT_PORT,
            model: None,
            mac_address: None,
        }
    }

    /// Build a control handle for this device
    ///
    /// # Example
    ///
    /// ```no_run
    /// use kef_wireless::{Discovery, HttpExecutor};
    /// use std::time::Duration;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let executor = HttpExecutor::new().shared();
    ///     let discovery = Discovery::new(executor.clone());
    ///
    ///     for device in discovery.discover(Duration::from_secs(5)).await? {
    ///         let speaker = device.connect(executor.clone());
    ///         println!("{} volume {}", device.name, speaker.volume().await?);
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub fn connect(&self, executor: SharedExecutor) -> Speaker {
        Speaker::with_port(executor, self.host.clone(), self.port)
    }
}

/// /24 prefix used to enumerate scan candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CandidateRange {
    prefix: [u8; 3],
}

impl CandidateRange {
    pub fn new(a: u8, b: u8, c: u8) -> Self {
        Self { prefix: [a, b, c] }
    }

    /// Range containing the given address
    pub fn from_addr(addr: Ipv4Addr) -> Self {
        let [a, b, c, _] = addr.octets();
        Self::new(a, b, c)
    }

    pub fn prefix(&self) -> [u8; 3] {
        self.prefix
    }

    /// Whether the prefix falls in 10.x, 172.x or 192.168.x
    pub fn is_private(&self) -> bool {
        matches!(self.prefix, [10, _, _] | [172, _, _] | [192, 168, _])
    }

    /// Host addresses .1 through .254
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> {
        let [a, b, c] = self.prefix;
        (1..=254u8).map(move |d| Ipv4Addr::new(a, b, c, d))
    }
}

impl fmt::Display for CandidateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.prefix;
        write!(f, "{}.{}.{}.*", a, b, c)
    }
}

/// Physical input source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Wifi,
    Bluetooth,
    Tv,
    Optic,
    Coaxial,
    Analog,
    Usb,
}

impl Source {
    /// Wire name used by `kefPhysicalSource`
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Wifi => "wifi",
            Source::Bluetooth => "bluetooth",
            Source::Tv => "tv",
            Source::Optic => "optic",
            Source::Coaxial => "coaxial",
            Source::Analog => "analog",
            Source::Usb => "usb",
        }
    }

    /// Parse a wire name; power-state values are not sources
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "wifi" => Some(Source::Wifi),
            "bluetooth" => Some(Source::Bluetooth),
            "tv" => Some(Source::Tv),
            "optic" | "optical" => Some(Source::Optic),
            "coaxial" => Some(Source::Coaxial),
            "analog" => Some(Source::Analog),
            "usb" => Some(Source::Usb),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Power state of the speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpeakerStatus {
    Standby,
    PowerOn,
}

impl SpeakerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeakerStatus::Standby => "standby",
            SpeakerStatus::PowerOn => "powerOn",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "standby" => Some(SpeakerStatus::Standby),
            "powerOn" => Some(SpeakerStatus::PowerOn),
            _ => None,
        }
    }
}

/// Transport state of the media player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

impl PlaybackState {
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "playing" => Some(PlaybackState::Playing),
            "paused" => Some(PlaybackState::Paused),
            "stopped" => Some(PlaybackState::Stopped),
            _ => None,
        }
    }
}

/// Metadata of the current track
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SongInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
}

impl SongInfo {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.artist.is_none() && self.album.is_none() && self.cover_url.is_none()
    }
}

/// Change report from one poll
///
/// Every field is optional: `None` means "unchanged since the last event",
/// not "unknown".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeakerEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub song_info: Option<SongInfo>,
    /// Playback position in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub song_position: Option<i64>,
    /// Track duration in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub song_duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback_state: Option<PlaybackState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_status: Option<SpeakerStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_muted: Option<bool>,
}

impl SpeakerEvent {
    /// True when the poll reported no recognised change
    pub fn is_empty(&self) -> bool {
        *self == SpeakerEvent::default()
    }
}
