//! Rust library for discovering and controlling KEF wireless speakers
//!
//! This library provides an async API for the HTTP control interface of KEF
//! networked speakers (LS50 Wireless II, LSX II, LS60 and friends). It supports:
//!
//! - Discovery via mDNS, with a subnet scan fallback
//! - Volume, mute, source and power control
//! - Track metadata and transport control
//! - Live state updates over the speaker's long-poll event queue
//!
//! # Quick Start
//!
//! ```no_run
//! use futures_util::StreamExt;
//! use kef_wireless::{CancellationToken, Discovery, HttpExecutor};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let executor = HttpExecutor::new().shared();
//!     let discovery = Discovery::new(executor.clone());
//!
//!     let devices = discovery.discover(Duration::from_secs(5)).await?;
//!     if let Some(device) = devices.iter().next() {
//!         println!("Found speaker: {} at {}", device.name, device.host);
//!
//!         let speaker = device.connect(executor.clone());
//!         speaker.set_volume(20).await?;
//!
//!         // Follow state changes
//!         let cancel = CancellationToken::new();
//!         let events = speaker.events(Duration::from_secs(10), false, cancel.clone());
//!         tokio::pin!(events);
//!         if let Some(event) = events.next().await {
//!             println!("State update: {:?}", event?);
//!         }
//!         cancel.cancel();
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Direct Connection
//!
//! If you know the IP address of a speaker, you can connect directly:
//!
//! ```no_run
//! use kef_wireless::{HttpExecutor, Speaker};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let speaker = Speaker::new(HttpExecutor::new().shared(), "192.168.1.100");
//!     speaker.mute().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Discovery**: mDNS browse ([`ServiceBrowser`]) and /24 scan ([`SubnetScanner`]),
//!   both confirming candidates with the [`Prober`]
//! - **Speaker**: One-shot control API over `getData`/`setData`
//! - **Live sync**: Event queue lifecycle ([`SubscriptionManager`]), decoding
//!   ([`EventDecoder`]) and continuous polling ([`LiveSession`])
//! - **Executor**: Transport seam; [`HttpExecutor`] in production
//! - **Protocol**: Control paths and wire formats

mod decoder;
mod discovery;
mod error;
mod executor;
mod mdns;
mod poller;
mod probe;
pub mod protocol;
mod scan;
mod speaker;
mod subscription;
mod types;

#[cfg(test)]
mod test_support;

// Public exports
pub use decoder::{decode, DecoderPolicy, EventDecoder};
pub use discovery::{DeviceFinder, Discovery, DiscoveryConfig};
pub use error::{KefError, Result};
pub use executor::{CommandExecutor, HttpExecutor, SharedExecutor};
pub use mdns::{BrowseConfig, ServiceBrowser, KEF_SERVICE_TYPE};
pub use poller::LiveSession;
pub use probe::{ProbeConfig, Prober};
pub use protocol::{Command, Method, RawEvents};
pub use scan::{derive_local_ranges, rank_ranges, ScanConfig, SubnetScanner};
pub use speaker::{Speaker, SpeakerConfig};
pub use subscription::{SubscriptionManager, SubscriptionQueue, SyncConfig};
pub use tokio_util::sync::CancellationToken;
pub use types::{
    CandidateRange, DiscoveredDevice, PlaybackState, SongInfo, Source, SpeakerEvent,
    SpeakerStatus,
};
