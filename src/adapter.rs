//! Snapshot diffing for integration consumers.
//!
//! A [`StateAdapter`] keeps the last [`Snapshot`] it produced and, on each
//! update, reports which fields changed plus a few high-level
//! [`AdapterEvent`]s for the fields integrations usually react to.

use crate::state::AltitudeState;
use crate::types::{CatalogIndex, Decibels};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Immutable, comparable view of [`AltitudeState`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub synced: bool,
    pub version: Option<String>,
    pub id: Option<String>,
    pub volume: Option<Decibels>,
    pub mute: Option<bool>,
    pub dim: Option<bool>,
    pub bypass: Option<bool>,
    pub preset: Option<String>,
    pub source: Option<String>,
    pub sampling_rate: Option<u32>,
    pub audiosync: Option<String>,
    pub audiosync_status: Option<bool>,
    pub decoder: Option<String>,
    pub upmixer: Option<String>,
    pub source_format: Option<String>,
    pub current_preset_index: Option<CatalogIndex>,
    pub current_source_index: Option<CatalogIndex>,
    /// Sorted by index
    pub presets: Vec<(CatalogIndex, String)>,
    /// Sorted by index
    pub sources: Vec<(CatalogIndex, String)>,
}

impl Snapshot {
    pub fn from_state(state: &AltitudeState) -> Self {
        Self {
            synced: state.synced(),
            version: state.version.clone(),
            id: state.id.clone(),
            volume: state.volume,
            mute: state.mute,
            dim: state.dim,
            bypass: state.bypass,
            preset: state.preset.clone(),
            source: state.source.clone(),
            sampling_rate: state.sampling_rate,
            audiosync: state.audiosync.clone(),
            audiosync_status: state.audiosync_status,
            decoder: state.decoder.clone(),
            upmixer: state.upmixer.clone(),
            source_format: state.source_format.clone(),
            current_preset_index: state.current_preset_index,
            current_source_index: state.current_source_index,
            presets: state.preset_list(),
            sources: state.source_list(),
        }
    }
}

impl From<&AltitudeState> for Snapshot {
    fn from(state: &AltitudeState) -> Self {
        Snapshot::from_state(state)
    }
}

/// One field that differs between two snapshots
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateDelta {
    pub field: &'static str,
    pub old: Value,
    pub new: Value,
}

/// High-level change notification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterEvent {
    /// First update after the adapter was created
    Initial,
    VolumeChanged { db: Decibels },
    MuteChanged { mute: bool },
    DimChanged { dim: bool },
    BypassChanged { bypass: bool },
    PresetChanged { preset: String },
    SourceChanged { source: String },
    SamplingRateChanged { hz: u32 },
    DecoderChanged { decoder: String },
    UpmixerChanged { upmixer: String },
}

impl AdapterEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterEvent::Initial => "initial",
            AdapterEvent::VolumeChanged { .. } => "volume_changed",
            AdapterEvent::MuteChanged { .. } => "mute_changed",
            AdapterEvent::DimChanged { .. } => "dim_changed",
            AdapterEvent::BypassChanged { .. } => "bypass_changed",
            AdapterEvent::PresetChanged { .. } => "preset_changed",
            AdapterEvent::SourceChanged { .. } => "source_changed",
            AdapterEvent::SamplingRateChanged { .. } => "sampling_rate_changed",
            AdapterEvent::DecoderChanged { .. } => "decoder_changed",
            AdapterEvent::UpmixerChanged { .. } => "upmixer_changed",
        }
    }

    /// Event data without the `kind` tag
    pub fn payload(&self) -> Map<String, Value> {
        let (key, value) = match self {
            AdapterEvent::Initial => return Map::new(),
            AdapterEvent::VolumeChanged { db } => ("db", json!(db)),
            AdapterEvent::MuteChanged { mute } => ("mute", json!(mute)),
            AdapterEvent::DimChanged { dim } => ("dim", json!(dim)),
            AdapterEvent::BypassChanged { bypass } => ("bypass", json!(bypass)),
            AdapterEvent::PresetChanged { preset } => ("preset", json!(preset)),
            AdapterEvent::SourceChanged { source } => ("source", json!(source)),
            AdapterEvent::SamplingRateChanged { hz } => ("hz", json!(hz)),
            AdapterEvent::DecoderChanged { decoder } => ("decoder", json!(decoder)),
            AdapterEvent::UpmixerChanged { upmixer } => ("upmixer", json!(upmixer)),
        };
        let mut map = Map::new();
        map.insert(key.to_string(), value);
        map
    }
}

/// Output of one [`StateAdapter::update`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdapterUpdate {
    pub snapshot: Snapshot,
    pub deltas: Vec<StateDelta>,
    pub events: Vec<AdapterEvent>,
}

/// Tracks the last snapshot and reports what changed since
#[derive(Debug, Clone, Default)]
pub struct StateAdapter {
    last: Option<Snapshot>,
}

impl StateAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        self.last.as_ref()
    }

    /// Capture a snapshot and diff it against the previous one.
    ///
    /// The first call returns empty deltas and events.
    pub fn update(&mut self, state: &AltitudeState) -> AdapterUpdate {
        let snapshot = Snapshot::from_state(state);
        let (deltas, events) = match self.last.replace(snapshot.clone()) {
            Some(previous) => (build_deltas(&previous, &snapshot), build_events(&previous, &snapshot)),
            None => (Vec::new(), Vec::new()),
        };
        AdapterUpdate {
            snapshot,
            deltas,
            events,
        }
    }
}

macro_rules! diff_fields {
    ($prev:expr, $cur:expr, $out:expr, [$($field:ident),* $(,)?]) => {
        $(
            if $prev.$field != $cur.$field {
                $out.push(StateDelta {
                    field: stringify!($field),
                    old: json!($prev.$field),
                    new: json!($cur.$field),
                });
            }
        )*
    };
}

fn build_deltas(previous: &Snapshot, current: &Snapshot) -> Vec<StateDelta> {
    let mut deltas = Vec::new();
    diff_fields!(
        previous,
        current,
        deltas,
        [
            synced,
            version,
            id,
            volume,
            mute,
            dim,
            bypass,
            preset,
            source,
            sampling_rate,
            audiosync,
            audiosync_status,
            decoder,
            upmixer,
            source_format,
            current_preset_index,
            current_source_index,
            presets,
            sources,
        ]
    );
    deltas
}

/// `Some(new)` when it is set and differs from `old`
fn changed<T: PartialEq + Clone>(old: &Option<T>, new: &Option<T>) -> Option<T> {
    match new {
        Some(value) if old.as_ref() != Some(value) => Some(value.clone()),
        _ => None,
    }
}

fn build_events(previous: &Snapshot, current: &Snapshot) -> Vec<AdapterEvent> {
    [
        changed(&previous.volume, &current.volume).map(|db| AdapterEvent::VolumeChanged { db }),
        changed(&previous.mute, &current.mute).map(|mute| AdapterEvent::MuteChanged { mute }),
        changed(&previous.dim, &current.dim).map(|dim| AdapterEvent::DimChanged { dim }),
        changed(&previous.bypass, &current.bypass)
            .map(|bypass| AdapterEvent::BypassChanged { bypass }),
        changed(&previous.preset, &current.preset)
            .map(|preset| AdapterEvent::PresetChanged { preset }),
        changed(&previous.source, &current.source)
            .map(|source| AdapterEvent::SourceChanged { source }),
        changed(&previous.sampling_rate, &current.sampling_rate)
            .map(|hz| AdapterEvent::SamplingRateChanged { hz }),
        changed(&previous.decoder, &current.decoder)
            .map(|decoder| AdapterEvent::DecoderChanged { decoder }),
        changed(&previous.upmixer, &current.upmixer)
            .map(|upmixer| AdapterEvent::UpmixerChanged { upmixer }),
    ]
    .into_iter()
    .flatten()
    .collect()
}
