//! Rust library for controlling Trinnov Altitude audio processors
//!
//! The Altitude exposes a line-oriented TCP control protocol (port 44100). This
//! library keeps a persistent connection to one processor and provides:
//!
//! - Typed parsing of every status line the processor emits
//! - A reduced, always-consistent view of device state (volume, presets, sources, decoder...)
//! - Firmware quirk handling via feature-flag driven profiles
//! - Automatic reconnection with exponential backoff and jitter
//! - Commands with optional `OK` / `ERROR` acknowledgement
//! - Callback and stream based change notification
//! - Snapshot diffing and home-automation friendly payloads
//!
//! # Quick Start
//!
//! ```no_run
//! use trinnov_altitude::{AltitudeClient, ClientConfig, ClientEvent};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = AltitudeClient::new(ClientConfig::new("192.168.1.90"))?;
//!     client.start().await?;
//!     client.wait_synced(Some(Duration::from_secs(10))).await?;
//!
//!     let state = client.state();
//!     println!("Preset: {:?}, source: {:?}", state.preset, state.source);
//!
//!     client.mute_set(true).await?;
//!
//!     // Watch for changes
//!     let mut events = client.subscribe();
//!     while let Ok(event) = events.recv().await {
//!         if let ClientEvent::ReceivedMessage(message) = event {
//!             println!("{:?}", message);
//!         }
//!     }
//!
//!     client.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Protocol**: line parser and command rendering
//! - **Normalizer**: maps messages onto canonical events under a quirk profile
//! - **State**: applies canonical events and tracks initial sync
//! - **Client**: connection lifecycle, receive loop, ack correlation
//! - **Adapter / Bridge**: snapshot diffs and automation payloads

mod adapter;
mod backoff;
mod bridge;
mod canonical;
mod client;
mod command_bridge;
mod config;
mod connection;
mod controls;
mod error;
mod normalizer;
mod protocol;
mod state;
mod subscription;
mod transport;
mod types;

// Public exports
pub use adapter::{AdapterEvent, AdapterUpdate, Snapshot, StateAdapter, StateDelta};
pub use backoff::{Backoff, ReconnectPolicy};
pub use bridge::{
    build_update, coordinator_payload, BridgeDispatcher, BridgeUpdate, BusEvent, EVENT_DOMAIN,
};
pub use canonical::CanonicalEvent;
pub use client::{
    AltitudeClient, CallbackId, ClientBuilder, CommandOptions, RandomFn, SleepFn,
};
pub use command_bridge::{parse_command, BridgeCommand, ParsedCommand, SwitchTarget};
pub use config::{validate_mac, ClientConfig, DEFAULT_CLIENT_ID, DEFAULT_PORT};
pub use controls::VOLUME_STEP_DB;
pub use error::{AltitudeError, Result};
pub use normalizer::{normalize, QuirkProfile, ALTITUDE_CI_FEATURE};
pub use protocol::{parse_message, Command, Message};
pub use state::AltitudeState;
pub use subscription::{ClientEvent, EventReceiver};
pub use transport::{TcpTransport, Transport, TransportFactory};
pub use types::{
    CatalogIndex, Decibels, LabelQuality, RemappingMode, SourceOrigin, Switch, UpmixerMode,
    VolumeRange,
};
