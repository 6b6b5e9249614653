//! Line protocol spoken by the Altitude on its control port.
//!
//! Inbound lines are parsed into [`Message`] by [`parse_message`]; outbound
//! lines are rendered from [`Command`] through its `Display` impl.

use crate::types::{CatalogIndex, Decibels, RemappingMode, SourceOrigin, Switch, UpmixerMode};
use serde::Serialize;
use std::fmt;

/// Raw decoder tokens that have a friendlier display name
const AUDIO_FORMAT_MAPPING: &[(&str, &str)] = &[
    ("ATMOS TrueHD", "Dolby Atmos/Dolby TrueHD"),
    ("DTS:X MA", "DTS:X Master Audio"),
    ("DTS-HD MA", "DTS-HD Master Audio"),
    ("ATMOS DD+", "Dolby Atmos/Dolby Digital Plus"),
    ("DD", "Dolby Digital"),
    ("TrueHD", "Dolby TrueHD"),
];

const WELCOME_PREFIX: &str = "Welcome on Trinnov Optimizer (Version ";

/// One parsed line received from the processor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Audiosync { mode: String },
    AudiosyncStatus { synchronized: bool },
    Bypass { state: bool },
    Bye,
    CurrentPreset { index: CatalogIndex },
    /// Preset or source change, depending on firmware
    MetaPresetLoaded { index: CatalogIndex },
    CurrentSource { index: CatalogIndex },
    CurrentSourceFormat { format: String },
    Decoder {
        nonaudio: bool,
        playable: bool,
        decoder: String,
        upmixer: String,
    },
    Dim { state: bool },
    Error { reason: String },
    /// Feature flags advertised by the firmware
    Idents { features: Vec<String> },
    Mute { state: bool },
    Ok,
    Preset { index: CatalogIndex, name: String },
    PresetsClear,
    SamplingRate { rate: u32 },
    Source {
        index: CatalogIndex,
        name: String,
        origin: SourceOrigin,
    },
    SourcesChanged,
    SourcesClear,
    SpeakerInfo {
        speaker: u32,
        radius: f64,
        theta: f64,
        phi: f64,
    },
    StartRunning,
    Volume { db: Decibels },
    Welcome { version: String, id: String },
    /// Any line that matched no known shape, verbatim
    Unknown { raw: String },
}

impl Message {
    /// `OK` and `ERROR:` lines answer commands
    pub fn is_reply(&self) -> bool {
        matches!(self, Message::Ok | Message::Error { .. })
    }
}

type Rule = fn(&str) -> Option<Message>;

// First match wins. Several shapes share a keyword prefix, so the order matters:
// `AUDIOSYNC STATUS` before `AUDIOSYNC`, and bare `PROFILE <n>` before `PROFILE <n>: <name>`.
const RULES: &[Rule] = &[
    parse_audiosync_status,
    parse_audiosync,
    parse_bypass,
    parse_bye,
    parse_current_preset,
    parse_meta_preset_loaded,
    parse_current_profile,
    parse_current_source_format,
    parse_decoder,
    parse_dim,
    parse_error,
    parse_idents,
    parse_label,
    parse_labels_clear,
    parse_mute,
    parse_ok,
    parse_optsource,
    parse_profile_index,
    parse_profile,
    parse_profiles_clear,
    parse_sources_changed,
    parse_speaker_info,
    parse_srate,
    parse_start_running,
    parse_volume,
    parse_welcome,
];

/// Parse one line (without its line ending) into a [`Message`].
///
/// Never fails: anything unrecognised becomes [`Message::Unknown`].
pub fn parse_message(line: &str) -> Message {
    RULES
        .iter()
        .find_map(|rule| rule(line))
        .unwrap_or_else(|| Message::Unknown {
            raw: line.to_string(),
        })
}

/// Strip `keyword` followed by exactly one whitespace character
fn argument<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    line.strip_prefix(keyword)?
        .strip_prefix(|c: char| c.is_whitespace())
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// `-?\d+`
///
/// Values outside `i32` do not match, so the whole line becomes [`Message::Unknown`].
/// Catalog indices and selections on real firmware are small.
fn parse_int(s: &str) -> Option<i32> {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if !is_digits(digits) {
        return None;
    }
    s.parse().ok()
}

/// `\d+`
///
/// Values outside `u32` do not match and the line becomes [`Message::Unknown`].
fn parse_unsigned(s: &str) -> Option<u32> {
    if !is_digits(s) {
        return None;
    }
    s.parse().ok()
}

/// `-?\d+(\.\d+)?`
fn parse_decimal(s: &str) -> Option<f64> {
    let unsigned = s.strip_prefix('-').unwrap_or(s);
    let valid = match unsigned.split_once('.') {
        Some((whole, frac)) => is_digits(whole) && is_digits(frac),
        None => is_digits(unsigned),
    };
    if !valid {
        return None;
    }
    s.parse().ok()
}

fn parse_flag(s: &str) -> Option<bool> {
    match s {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

fn parse_audiosync_status(line: &str) -> Option<Message> {
    let synchronized = parse_flag(argument(line, "AUDIOSYNC STATUS")?)?;
    Some(Message::AudiosyncStatus { synchronized })
}

fn parse_audiosync(line: &str) -> Option<Message> {
    let mode = argument(line, "AUDIOSYNC")?;
    Some(Message::Audiosync {
        mode: mode.to_string(),
    })
}

fn parse_bypass(line: &str) -> Option<Message> {
    let state = parse_flag(argument(line, "BYPASS")?)?;
    Some(Message::Bypass { state })
}

fn parse_bye(line: &str) -> Option<Message> {
    (line == "BYE").then_some(Message::Bye)
}

fn parse_current_preset(line: &str) -> Option<Message> {
    let index = parse_int(argument(line, "CURRENT_PRESET")?)?;
    Some(Message::CurrentPreset { index })
}

fn parse_meta_preset_loaded(line: &str) -> Option<Message> {
    let index = parse_int(argument(line, "META_PRESET_LOADED")?)?;
    Some(Message::MetaPresetLoaded { index })
}

fn parse_current_profile(line: &str) -> Option<Message> {
    let index = parse_int(argument(line, "CURRENT_PROFILE")?)?;
    Some(Message::CurrentSource { index })
}

fn parse_current_source_format(line: &str) -> Option<Message> {
    let format = argument(line, "CURRENT_SOURCE_FORMAT_NAME")?;
    Some(Message::CurrentSourceFormat {
        format: format.to_string(),
    })
}

// DECODER NONAUDIO <n> PLAYABLE <n> DECODER <codec...> UPMIXER <upmixer...>
fn parse_decoder(line: &str) -> Option<Message> {
    let rest = line.strip_prefix("DECODER NONAUDIO ")?;
    let (nonaudio, rest) = rest.split_once(' ')?;
    let rest = rest.strip_prefix("PLAYABLE ")?;
    let (playable, rest) = rest.split_once(' ')?;
    let rest = rest.strip_prefix("DECODER ")?;
    // The codec token may itself contain spaces, so split on the last UPMIXER.
    let (decoder, upmixer) = rest.rsplit_once(" UPMIXER ")?;

    let nonaudio = parse_unsigned(nonaudio)? != 0;
    let playable = parse_unsigned(playable)? != 0;
    let decoder = AUDIO_FORMAT_MAPPING
        .iter()
        .find(|(raw, _)| *raw == decoder)
        .map_or(decoder, |(_, display)| *display);

    Some(Message::Decoder {
        nonaudio,
        playable,
        decoder: decoder.to_string(),
        upmixer: upmixer.to_string(),
    })
}

fn parse_dim(line: &str) -> Option<Message> {
    let state = parse_int(argument(line, "DIM")?)? != 0;
    Some(Message::Dim { state })
}

fn parse_error(line: &str) -> Option<Message> {
    let reason = line.strip_prefix("ERROR: ")?;
    Some(Message::Error {
        reason: reason.to_string(),
    })
}

fn parse_idents(line: &str) -> Option<Message> {
    let flags = argument(line, "IDENTS")?;
    Some(Message::Idents {
        features: flags.split_whitespace().map(str::to_string).collect(),
    })
}

fn parse_label(line: &str) -> Option<Message> {
    let (index, name) = argument(line, "LABEL")?.split_once(": ")?;
    Some(Message::Preset {
        index: parse_int(index)?,
        name: name.to_string(),
    })
}

fn parse_labels_clear(line: &str) -> Option<Message> {
    (line == "LABELS_CLEAR").then_some(Message::PresetsClear)
}

fn parse_mute(line: &str) -> Option<Message> {
    let state = parse_flag(argument(line, "MUTE")?)?;
    Some(Message::Mute { state })
}

fn parse_ok(line: &str) -> Option<Message> {
    (line == "OK").then_some(Message::Ok)
}

fn parse_optsource(line: &str) -> Option<Message> {
    let (index, name) = argument(line, "OPTSOURCE")?.split_once(|c: char| c.is_whitespace())?;
    Some(Message::Source {
        index: parse_int(index)?,
        name: name.to_string(),
        origin: SourceOrigin::OptSource,
    })
}

fn parse_profile_index(line: &str) -> Option<Message> {
    let index = parse_int(argument(line, "PROFILE")?)?;
    Some(Message::CurrentSource { index })
}

fn parse_profile(line: &str) -> Option<Message> {
    let (index, name) = argument(line, "PROFILE")?.split_once(": ")?;
    Some(Message::Source {
        index: parse_int(index)?,
        name: name.to_string(),
        origin: SourceOrigin::Profile,
    })
}

fn parse_profiles_clear(line: &str) -> Option<Message> {
    (line == "PROFILES_CLEAR").then_some(Message::SourcesClear)
}

fn parse_sources_changed(line: &str) -> Option<Message> {
    (line == "SOURCES_CHANGED").then_some(Message::SourcesChanged)
}

fn parse_speaker_info(line: &str) -> Option<Message> {
    let mut fields = argument(line, "SPEAKER_INFO")?.split(|c: char| c.is_whitespace());
    let speaker = parse_unsigned(fields.next()?)?;
    let radius = parse_decimal(fields.next()?)?;
    let theta = parse_decimal(fields.next()?)?;
    let phi = parse_decimal(fields.next()?)?;
    if fields.next().is_some() {
        return None;
    }
    Some(Message::SpeakerInfo {
        speaker,
        radius,
        theta,
        phi,
    })
}

fn parse_srate(line: &str) -> Option<Message> {
    let rate = parse_unsigned(argument(line, "SRATE")?)?;
    Some(Message::SamplingRate { rate })
}

fn parse_start_running(line: &str) -> Option<Message> {
    (line == "START_RUNNING").then_some(Message::StartRunning)
}

fn parse_volume(line: &str) -> Option<Message> {
    let db = parse_decimal(argument(line, "VOLUME")?)?;
    Some(Message::Volume { db })
}

fn parse_welcome(line: &str) -> Option<Message> {
    let body = line.strip_prefix(WELCOME_PREFIX)?.strip_suffix(')')?;
    let (version, id) = body.split_once(", ID ")?;
    if version.is_empty() || version.contains(char::is_whitespace) || !is_digits(id) {
        return None;
    }
    Some(Message::Welcome {
        version: version.to_string(),
        id: id.to_string(),
    })
}

/// One outbound control line
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Identify(String),
    SendVolume,
    GetCurrentState,
    GetCurrentPreset,
    LoadPreset(CatalogIndex),
    GetCurrentProfile,
    SelectProfile(CatalogIndex),
    GetLabel(CatalogIndex),
    GetAllLabels,
    GetProfileName(CatalogIndex),
    RemappingMode(RemappingMode),
    Upmixer(UpmixerMode),
    Volume(Decibels),
    VolumeAdjust(Decibels),
    VolumeRamp { db: Decibels, duration_ms: u32 },
    ChangePage(i32),
    Bypass(Switch),
    Mute(Switch),
    Dim(Switch),
    FrontDisplay(Switch),
    Optimization(Switch),
    AcousticCorrection(Switch),
    LevelAlignment(Switch),
    TimeAlignment(Switch),
    PowerOff,
    Bye,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Identify(client_id) => write!(f, "id {}", client_id),
            Command::SendVolume => f.write_str("send volume"),
            Command::GetCurrentState => f.write_str("get_current_state"),
            Command::GetCurrentPreset => f.write_str("get_current_preset"),
            Command::LoadPreset(id) => write!(f, "loadp {}", id),
            Command::GetCurrentProfile => f.write_str("get_current_profile"),
            Command::SelectProfile(id) => write!(f, "profile {}", id),
            Command::GetLabel(id) => write!(f, "get_label {}", id),
            Command::GetAllLabels => f.write_str("get_all_label"),
            Command::GetProfileName(id) => write!(f, "get_profile_name {}", id),
            Command::RemappingMode(mode) => write!(f, "remapping_mode {}", mode),
            Command::Upmixer(mode) => write!(f, "upmixer {}", mode),
            Command::Volume(db) => write!(f, "volume {}", db),
            Command::VolumeAdjust(delta) => write!(f, "dvolume {}", delta),
            Command::VolumeRamp { db, duration_ms } => {
                write!(f, "volume_ramp {} {}", db, duration_ms)
            }
            Command::ChangePage(delta) => write!(f, "change_page {}", delta),
            Command::Bypass(s) => write!(f, "bypass {}", s.wire_value()),
            Command::Mute(s) => write!(f, "mute {}", s.wire_value()),
            Command::Dim(s) => write!(f, "dim {}", s.wire_value()),
            Command::FrontDisplay(s) => write!(f, "fav_light {}", s.wire_value()),
            Command::Optimization(s) => write!(f, "quick_optimized {}", s.wire_value()),
            Command::AcousticCorrection(s) => {
                write!(f, "use_acoustic_correct {}", s.wire_value())
            }
            Command::LevelAlignment(s) => write!(f, "use_level_alignment {}", s.wire_value()),
            Command::TimeAlignment(s) => write!(f, "use_time_alignment {}", s.wire_value()),
            Command::PowerOff => f.write_str("power_off_SECURED_FHZMCH48FE"),
            Command::Bye => f.write_str("bye"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_welcome() {
        assert_eq!(
            parse_message("Welcome on Trinnov Optimizer (Version 4.3.2rc1, ID 10485761)"),
            Message::Welcome {
                version: "4.3.2rc1".into(),
                id: "10485761".into()
            }
        );
        assert_eq!(
            parse_message("Welcome on Trinnov Optimizer (Version 5.3.0pre3+#+, ID 19923109)"),
            Message::Welcome {
                version: "5.3.0pre3+#+".into(),
                id: "19923109".into()
            }
        );
    }

    #[test]
    fn parses_audiosync_variants_in_order() {
        assert_eq!(
            parse_message("AUDIOSYNC STATUS 1"),
            Message::AudiosyncStatus { synchronized: true }
        );
        assert_eq!(
            parse_message("AUDIOSYNC Slave"),
            Message::Audiosync {
                mode: "Slave".into()
            }
        );
    }

    #[test]
    fn parses_flags() {
        assert_eq!(parse_message("BYPASS 1"), Message::Bypass { state: true });
        assert_eq!(parse_message("MUTE 0"), Message::Mute { state: false });
        assert_eq!(parse_message("DIM 1"), Message::Dim { state: true });
        assert_eq!(parse_message("DIM 0"), Message::Dim { state: false });
        assert!(matches!(parse_message("MUTE 2"), Message::Unknown { .. }));
    }

    #[test]
    fn parses_current_indices_including_negative() {
        assert_eq!(parse_message("CURRENT_PRESET -1"), Message::CurrentPreset { index: -1 });
        assert_eq!(parse_message("CURRENT_PROFILE 4"), Message::CurrentSource { index: 4 });
        assert_eq!(
            parse_message("META_PRESET_LOADED 2"),
            Message::MetaPresetLoaded { index: 2 }
        );
    }

    #[test]
    fn bare_profile_is_current_source_not_catalog_entry() {
        assert_eq!(parse_message("PROFILE -1"), Message::CurrentSource { index: -1 });
        assert_eq!(
            parse_message("PROFILE 3: HDMI 4"),
            Message::Source {
                index: 3,
                name: "HDMI 4".into(),
                origin: SourceOrigin::Profile
            }
        );
    }

    #[test]
    fn parses_catalog_entries() {
        assert_eq!(
            parse_message("LABEL 1: Cinema"),
            Message::Preset {
                index: 1,
                name: "Cinema".into()
            }
        );
        assert_eq!(
            parse_message("OPTSOURCE 0 Source 1"),
            Message::Source {
                index: 0,
                name: "Source 1".into(),
                origin: SourceOrigin::OptSource
            }
        );
        assert_eq!(parse_message("LABELS_CLEAR"), Message::PresetsClear);
        assert_eq!(parse_message("PROFILES_CLEAR"), Message::SourcesClear);
        assert_eq!(parse_message("SOURCES_CHANGED"), Message::SourcesChanged);
    }

    #[test]
    fn decoder_applies_display_mapping() {
        assert_eq!(
            parse_message("DECODER NONAUDIO 0 PLAYABLE 1 DECODER ATMOS TrueHD UPMIXER dolby"),
            Message::Decoder {
                nonaudio: false,
                playable: true,
                decoder: "Dolby Atmos/Dolby TrueHD".into(),
                upmixer: "dolby".into()
            }
        );
        assert_eq!(
            parse_message("DECODER NONAUDIO 1 PLAYABLE 0 DECODER none UPMIXER none"),
            Message::Decoder {
                nonaudio: true,
                playable: false,
                decoder: "none".into(),
                upmixer: "none".into()
            }
        );
    }

    #[test]
    fn parses_numeric_payloads() {
        assert_eq!(parse_message("VOLUME -18.5"), Message::Volume { db: -18.5 });
        assert_eq!(parse_message("VOLUME 0"), Message::Volume { db: 0.0 });
        assert_eq!(parse_message("SRATE 48000"), Message::SamplingRate { rate: 48000 });
        assert_eq!(
            parse_message("SPEAKER_INFO 0 1.36485 102.091 -43.3817"),
            Message::SpeakerInfo {
                speaker: 0,
                radius: 1.36485,
                theta: 102.091,
                phi: -43.3817
            }
        );
    }

    #[test]
    fn parses_simple_lines() {
        assert_eq!(parse_message("OK"), Message::Ok);
        assert_eq!(parse_message("BYE"), Message::Bye);
        assert_eq!(parse_message("START_RUNNING"), Message::StartRunning);
        assert_eq!(
            parse_message("ERROR: invalid command"),
            Message::Error {
                reason: "invalid command".into()
            }
        );
        assert_eq!(
            parse_message("CURRENT_SOURCE_FORMAT_NAME Atmos narrow"),
            Message::CurrentSourceFormat {
                format: "Atmos narrow".into()
            }
        );
        assert_eq!(
            parse_message("IDENTS with_tsf altitude_ci"),
            Message::Idents {
                features: vec!["with_tsf".into(), "altitude_ci".into()]
            }
        );
    }

    #[test]
    fn unknown_lines_are_kept_verbatim() {
        for line in [
            "",
            " ",
            "%%%",
            "\t",
            "CURRENT_PROFILE nope",
            "LABEL:",
            "OK then",
            "VOLUME -1.",
            "SRATE -48000",
            "SRATE 99999999999",
            "CURRENT_PRESET 2147483648",
            "LABEL 99999999999: Cinema",
            "UNRECOGNIZED_EVENT foo bar",
            "Welcome on Trinnov Optimizer (Version , ID 1)",
        ] {
            assert_eq!(
                parse_message(line),
                Message::Unknown { raw: line.into() },
                "line {:?}",
                line
            );
        }
    }

    #[test]
    fn replies_are_ok_and_error() {
        assert!(Message::Ok.is_reply());
        assert!(Message::Error { reason: String::new() }.is_reply());
        assert!(!Message::Bye.is_reply());
    }

    #[test]
    fn renders_command_lines() {
        assert_eq!(Command::Identify("me".into()).to_string(), "id me");
        assert_eq!(Command::SendVolume.to_string(), "send volume");
        assert_eq!(Command::LoadPreset(3).to_string(), "loadp 3");
        assert_eq!(Command::SelectProfile(1).to_string(), "profile 1");
        assert_eq!(Command::Volume(-20.5).to_string(), "volume -20.5");
        assert_eq!(Command::VolumeAdjust(0.5).to_string(), "dvolume 0.5");
        assert_eq!(
            Command::VolumeRamp {
                db: -30.5,
                duration_ms: 2000
            }
            .to_string(),
            "volume_ramp -30.5 2000"
        );
        assert_eq!(Command::Mute(Switch::Toggle).to_string(), "mute 2");
        assert_eq!(Command::FrontDisplay(Switch::On).to_string(), "fav_light 1");
        assert_eq!(
            Command::Upmixer(UpmixerMode::UpmixOnNative).to_string(),
            "upmixer upmix_on_native"
        );
        assert_eq!(
            Command::RemappingMode(RemappingMode::ThreeD).to_string(),
            "remapping_mode 3D"
        );
        assert_eq!(Command::PowerOff.to_string(), "power_off_SECURED_FHZMCH48FE");
    }
}
