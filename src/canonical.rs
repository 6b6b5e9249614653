//! Canonical state-change events, decoupled from the wire format.

use crate::types::{CatalogIndex, Decibels, LabelQuality};
use serde::Serialize;

/// One state transition intent produced by the normalizer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CanonicalEvent {
    SetVolume { db: Decibels },
    SetMute { state: bool },
    SetDim { state: bool },
    SetBypass { state: bool },
    SetAudiosync { mode: String },
    SetAudiosyncStatus { synchronized: bool },
    SetSamplingRate { rate: u32 },
    SetDecoder { decoder: String, upmixer: String },
    SetSourceFormat { format: String },

    UpsertPreset { index: CatalogIndex, name: String },
    ClearPresets,
    UpsertSource {
        index: CatalogIndex,
        name: String,
        quality: LabelQuality,
    },
    ClearSources,

    SetCurrentPreset { index: CatalogIndex },
    SetCurrentSource { index: CatalogIndex },

    SetFeatures { features: Vec<String> },
    SetWelcome { version: String, id: String },
    /// Informational marker, no state change
    SourcesChanged,
}
