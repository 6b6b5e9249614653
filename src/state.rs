use crate::canonical::CanonicalEvent;
use crate::normalizer::{normalize, QuirkProfile};
use crate::protocol::Message;
use crate::types::{CatalogIndex, Decibels};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Reduced view of everything the processor has reported on this connection
///
/// Catalogs are keyed by index; `BTreeMap` keeps them sorted so reads are
/// deterministic. `preset` and `source` always equal a catalog lookup of the
/// matching current index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AltitudeState {
    pub version: Option<String>,
    pub id: Option<String>,

    pub volume: Option<Decibels>,
    pub mute: Option<bool>,
    pub dim: Option<bool>,
    pub bypass: Option<bool>,
    pub decoder: Option<String>,
    pub upmixer: Option<String>,
    pub audiosync: Option<String>,
    pub audiosync_status: Option<bool>,
    pub sampling_rate: Option<u32>,
    pub source_format: Option<String>,

    pub presets: BTreeMap<CatalogIndex, String>,
    pub sources: BTreeMap<CatalogIndex, String>,
    pub current_preset_index: Option<CatalogIndex>,
    pub current_source_index: Option<CatalogIndex>,
    pub preset: Option<String>,
    pub source: Option<String>,

    pub features: BTreeSet<String>,

    #[serde(skip)]
    sync: SyncFlags,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct SyncFlags {
    welcome: bool,
    current_preset: bool,
    current_source: bool,
    preset_catalog: bool,
    source_catalog: bool,
}

impl AltitudeState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore every field and sync flag to its initial, unset value
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Quirk profile implied by the feature flags seen so far
    pub fn profile(&self) -> QuirkProfile {
        QuirkProfile::select(&self.features)
    }

    /// Normalize one message under the current profile and apply the resulting events
    pub fn apply(&mut self, message: &Message) {
        for event in normalize(message, self.profile()) {
            self.apply_event(&event);
        }
    }

    /// Apply one canonical event. Idempotent; never fails.
    pub fn apply_event(&mut self, event: &CanonicalEvent) {
        match event {
            CanonicalEvent::SetVolume { db } => self.volume = Some(*db),
            CanonicalEvent::SetMute { state } => self.mute = Some(*state),
            CanonicalEvent::SetDim { state } => self.dim = Some(*state),
            CanonicalEvent::SetBypass { state } => self.bypass = Some(*state),
            CanonicalEvent::SetAudiosync { mode } => self.audiosync = Some(mode.clone()),
            CanonicalEvent::SetAudiosyncStatus { synchronized } => {
                self.audiosync_status = Some(*synchronized)
            }
            CanonicalEvent::SetSamplingRate { rate } => self.sampling_rate = Some(*rate),
            CanonicalEvent::SetDecoder { decoder, upmixer } => {
                self.decoder = Some(decoder.clone());
                self.upmixer = Some(upmixer.clone());
            }
            CanonicalEvent::SetSourceFormat { format } => {
                self.source_format = Some(format.clone())
            }
            CanonicalEvent::UpsertPreset { index, name } => {
                self.presets.insert(*index, name.clone());
                self.sync.preset_catalog = true;
                if self.current_preset_index == Some(*index) {
                    self.preset = Some(name.clone());
                }
            }
            CanonicalEvent::ClearPresets => {
                self.presets.clear();
                self.sync.preset_catalog = true;
                if self.current_preset_index.is_some() {
                    self.preset = None;
                }
            }
            // Last applied label wins regardless of quality.
            CanonicalEvent::UpsertSource { index, name, .. } => {
                self.sources.insert(*index, name.clone());
                self.sync.source_catalog = true;
                if self.current_source_index == Some(*index) {
                    self.source = Some(name.clone());
                }
            }
            CanonicalEvent::ClearSources => {
                self.sources.clear();
                self.sync.source_catalog = true;
                if self.current_source_index.is_some() {
                    self.source = None;
                }
            }
            CanonicalEvent::SetCurrentPreset { index } => {
                self.current_preset_index = Some(*index);
                self.preset = self.presets.get(index).cloned();
                self.sync.current_preset = true;
            }
            CanonicalEvent::SetCurrentSource { index } => {
                self.current_source_index = Some(*index);
                self.source = self.sources.get(index).cloned();
                self.sync.current_source = true;
            }
            CanonicalEvent::SetFeatures { features } => {
                self.features = features.iter().cloned().collect();
            }
            CanonicalEvent::SetWelcome { version, id } => {
                self.version = Some(version.clone());
                self.id = Some(id.clone());
                self.sync.welcome = true;
            }
            CanonicalEvent::SourcesChanged => {}
        }
    }

    /// Whether enough initial state has arrived for the session to be usable.
    ///
    /// Requires the welcome line, both current indices, and for each catalog
    /// either an explicit upsert/clear or a current index (some firmware never
    /// sends catalog clears).
    pub fn synced(&self) -> bool {
        self.sync.welcome
            && self.sync.current_preset
            && self.sync.current_source
            && (self.sync.preset_catalog || self.current_preset_index.is_some())
            && (self.sync.source_catalog || self.current_source_index.is_some())
    }

    /// Preset catalog as `(index, name)` pairs sorted by index
    pub fn preset_list(&self) -> Vec<(CatalogIndex, String)> {
        self.presets.iter().map(|(i, n)| (*i, n.clone())).collect()
    }

    /// Source catalog as `(index, name)` pairs sorted by index
    pub fn source_list(&self) -> Vec<(CatalogIndex, String)> {
        self.sources.iter().map(|(i, n)| (*i, n.clone())).collect()
    }

    /// Index of the first source whose name matches exactly
    pub fn source_index_by_name(&self, name: &str) -> Option<CatalogIndex> {
        self.sources
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(i, _)| *i)
    }
}
