//! Maps parsed [`Message`]s onto [`CanonicalEvent`]s.
//!
//! Firmware variants reuse some wire messages with a different meaning. The
//! active [`QuirkProfile`] is derived from the feature flags the processor has
//! advertised so far and decides how those messages are read.

use crate::canonical::CanonicalEvent;
use crate::protocol::Message;
use crate::types::LabelQuality;

/// Feature flag that switches to [`QuirkProfile::AltitudeCi`]
pub const ALTITUDE_CI_FEATURE: &str = "altitude_ci";

/// Interpretation mode for ambiguous wire messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuirkProfile {
    #[default]
    Default,
    /// Firmware where `META_PRESET_LOADED` reports the current source
    AltitudeCi,
}

impl QuirkProfile {
    /// Select the profile for a set of advertised feature flags
    pub fn select<I, S>(features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if features
            .into_iter()
            .any(|f| f.as_ref() == ALTITUDE_CI_FEATURE)
        {
            QuirkProfile::AltitudeCi
        } else {
            QuirkProfile::Default
        }
    }
}

/// Map one message to zero or more canonical events.
///
/// Messages that carry no state (replies, `BYE`, unknown lines...) yield nothing.
pub fn normalize(message: &Message, profile: QuirkProfile) -> Vec<CanonicalEvent> {
    let event = match message {
        Message::Audiosync { mode } => CanonicalEvent::SetAudiosync { mode: mode.clone() },
        Message::AudiosyncStatus { synchronized } => CanonicalEvent::SetAudiosyncStatus {
            synchronized: *synchronized,
        },
        Message::Bypass { state } => CanonicalEvent::SetBypass { state: *state },
        Message::CurrentPreset { index } => CanonicalEvent::SetCurrentPreset { index: *index },
        Message::MetaPresetLoaded { index } => match profile {
            QuirkProfile::Default => CanonicalEvent::SetCurrentPreset { index: *index },
            QuirkProfile::AltitudeCi => CanonicalEvent::SetCurrentSource { index: *index },
        },
        Message::CurrentSource { index } => CanonicalEvent::SetCurrentSource { index: *index },
        Message::CurrentSourceFormat { format } => CanonicalEvent::SetSourceFormat {
            format: format.clone(),
        },
        Message::Decoder {
            decoder, upmixer, ..
        } => CanonicalEvent::SetDecoder {
            decoder: decoder.clone(),
            upmixer: upmixer.clone(),
        },
        Message::Dim { state } => CanonicalEvent::SetDim { state: *state },
        Message::Idents { features } => CanonicalEvent::SetFeatures {
            features: features.clone(),
        },
        Message::Mute { state } => CanonicalEvent::SetMute { state: *state },
        Message::Preset { index, name } => CanonicalEvent::UpsertPreset {
            index: *index,
            name: name.clone(),
        },
        Message::PresetsClear => CanonicalEvent::ClearPresets,
        Message::SamplingRate { rate } => CanonicalEvent::SetSamplingRate { rate: *rate },
        Message::Source {
            index,
            name,
            origin,
        } => CanonicalEvent::UpsertSource {
            index: *index,
            name: name.clone(),
            quality: LabelQuality::from(*origin),
        },
        Message::SourcesChanged => CanonicalEvent::SourcesChanged,
        Message::SourcesClear => CanonicalEvent::ClearSources,
        Message::Volume { db } => CanonicalEvent::SetVolume { db: *db },
        Message::Welcome { version, id } => CanonicalEvent::SetWelcome {
            version: version.clone(),
            id: id.clone(),
        },
        Message::Bye
        | Message::Error { .. }
        | Message::Ok
        | Message::SpeakerInfo { .. }
        | Message::StartRunning
        | Message::Unknown { .. } => return Vec::new(),
    };
    vec![event]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceOrigin;

    #[test]
    fn profile_follows_altitude_ci_flag() {
        assert_eq!(
            QuirkProfile::select(["with_tsf", "altitude_ci"]),
            QuirkProfile::AltitudeCi
        );
        assert_eq!(QuirkProfile::select(["with_tsf"]), QuirkProfile::Default);
        assert_eq!(QuirkProfile::select(Vec::<String>::new()), QuirkProfile::Default);
    }

    #[test]
    fn meta_preset_loaded_depends_on_profile() {
        let message = Message::MetaPresetLoaded { index: 2 };
        assert_eq!(
            normalize(&message, QuirkProfile::Default),
            vec![CanonicalEvent::SetCurrentPreset { index: 2 }]
        );
        assert_eq!(
            normalize(&message, QuirkProfile::AltitudeCi),
            vec![CanonicalEvent::SetCurrentSource { index: 2 }]
        );
    }

    #[test]
    fn current_preset_ignores_profile() {
        let message = Message::CurrentPreset { index: 5 };
        assert_eq!(
            normalize(&message, QuirkProfile::AltitudeCi),
            vec![CanonicalEvent::SetCurrentPreset { index: 5 }]
        );
    }

    #[test]
    fn idents_become_feature_event() {
        let message = Message::Idents {
            features: vec!["with_tsf".into(), "altitude_ci".into()],
        };
        assert_eq!(
            normalize(&message, QuirkProfile::Default),
            vec![CanonicalEvent::SetFeatures {
                features: vec!["with_tsf".into(), "altitude_ci".into()]
            }]
        );
    }

    #[test]
    fn source_label_quality_follows_origin() {
        let profile = Message::Source {
            index: 0,
            name: "AppleTV".into(),
            origin: SourceOrigin::Profile,
        };
        let optsource = Message::Source {
            index: 0,
            name: "Source 1".into(),
            origin: SourceOrigin::OptSource,
        };
        assert_eq!(
            normalize(&profile, QuirkProfile::Default),
            vec![CanonicalEvent::UpsertSource {
                index: 0,
                name: "AppleTV".into(),
                quality: LabelQuality::Profile
            }]
        );
        assert_eq!(
            normalize(&optsource, QuirkProfile::Default),
            vec![CanonicalEvent::UpsertSource {
                index: 0,
                name: "Source 1".into(),
                quality: LabelQuality::OptSource
            }]
        );
    }

    #[test]
    fn stateless_messages_yield_nothing() {
        for message in [
            Message::Ok,
            Message::Bye,
            Message::StartRunning,
            Message::Error {
                reason: "nope".into(),
            },
            Message::Unknown { raw: "X".into() },
        ] {
            assert!(normalize(&message, QuirkProfile::Default).is_empty());
        }
    }
}
