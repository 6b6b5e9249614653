use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Catalog index as reported by the processor. `-1` means "no selection" / built-in.
pub type CatalogIndex = i32;

/// Volume in decibels
pub type Decibels = f64;

/// Value for boolean-settable commands
///
/// The processor encodes these as `0`, `1` or `2`, where `2` flips the current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Switch {
    Off,
    On,
    Toggle,
}

impl Switch {
    /// Wire value of this switch
    pub fn wire_value(self) -> u8 {
        match self {
            Switch::Off => 0,
            Switch::On => 1,
            Switch::Toggle => 2,
        }
    }
}

impl From<bool> for Switch {
    fn from(on: bool) -> Self {
        if on {
            Switch::On
        } else {
            Switch::Off
        }
    }
}

/// Speaker remapping mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemappingMode {
    /// Disable remapping
    None,
    /// 2D remapping
    TwoD,
    /// 3D remapping
    ThreeD,
    /// Autorotating remapping
    Autorotate,
    /// Manual remapping
    Manual,
}

impl RemappingMode {
    pub const ALL: [RemappingMode; 5] = [
        RemappingMode::None,
        RemappingMode::TwoD,
        RemappingMode::ThreeD,
        RemappingMode::Autorotate,
        RemappingMode::Manual,
    ];

    /// Token used on the wire
    pub fn as_str(self) -> &'static str {
        match self {
            RemappingMode::None => "none",
            RemappingMode::TwoD => "2D",
            RemappingMode::ThreeD => "3D",
            RemappingMode::Autorotate => "autorotate",
            RemappingMode::Manual => "manual",
        }
    }
}

/// Upmixer mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpmixerMode {
    Auto,
    Auro3d,
    Dts,
    Dolby,
    Native,
    Legacy,
    UpmixOnNative,
}

impl UpmixerMode {
    pub const ALL: [UpmixerMode; 7] = [
        UpmixerMode::Auto,
        UpmixerMode::Auro3d,
        UpmixerMode::Dts,
        UpmixerMode::Dolby,
        UpmixerMode::Native,
        UpmixerMode::Legacy,
        UpmixerMode::UpmixOnNative,
    ];

    /// Token used on the wire
    pub fn as_str(self) -> &'static str {
        match self {
            UpmixerMode::Auto => "auto",
            UpmixerMode::Auro3d => "auro3d",
            UpmixerMode::Dts => "dts",
            UpmixerMode::Dolby => "dolby",
            UpmixerMode::Native => "native",
            UpmixerMode::Legacy => "legacy",
            UpmixerMode::UpmixOnNative => "upmix_on_native",
        }
    }
}

impl fmt::Display for RemappingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for UpmixerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn valid_tokens<T: Copy>(all: &[T], token: fn(T) -> &'static str) -> String {
    all.iter().map(|m| token(*m)).collect::<Vec<_>>().join(", ")
}

// Both parsers are case-insensitive.
impl FromStr for RemappingMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        RemappingMode::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!(
                    "invalid remapping mode '{}', valid modes are: {}",
                    s,
                    valid_tokens(&RemappingMode::ALL, RemappingMode::as_str)
                )
            })
    }
}

impl FromStr for UpmixerMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        UpmixerMode::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!(
                    "invalid upmixer mode '{}', valid modes are: {}",
                    s,
                    valid_tokens(&UpmixerMode::ALL, UpmixerMode::as_str)
                )
            })
    }
}

/// Wire path a source label arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOrigin {
    /// `PROFILE <n>: <name>`
    Profile,
    /// `OPTSOURCE <n> <name>`
    OptSource,
}

/// Provenance rank of a source label. Higher is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelQuality {
    OptSource = 1,
    Profile = 2,
}

impl From<SourceOrigin> for LabelQuality {
    fn from(origin: SourceOrigin) -> Self {
        match origin {
            SourceOrigin::Profile => LabelQuality::Profile,
            SourceOrigin::OptSource => LabelQuality::OptSource,
        }
    }
}

/// Decibel range used for percentage volume conversion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeRange {
    #[serde(default = "default_min_db")]
    pub min_db: Decibels,
    #[serde(default = "default_max_db")]
    pub max_db: Decibels,
}

fn default_min_db() -> Decibels {
    -120.0
}

fn default_max_db() -> Decibels {
    20.0
}

impl Default for VolumeRange {
    fn default() -> Self {
        Self {
            min_db: default_min_db(),
            max_db: default_max_db(),
        }
    }
}

impl VolumeRange {
    /// Map a decibel value onto 0..=100
    pub fn to_percentage(&self, db: Decibels) -> f64 {
        ((db - self.min_db) / (self.max_db - self.min_db)) * 100.0
    }

    /// Map a percentage onto the decibel range, rounded to 0.1 dB
    pub fn from_percentage(&self, percentage: f64) -> Decibels {
        let db = (percentage / 100.0) * (self.max_db - self.min_db) + self.min_db;
        (db * 10.0).round() / 10.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_wire_values() {
        assert_eq!(Switch::Off.wire_value(), 0);
        assert_eq!(Switch::On.wire_value(), 1);
        assert_eq!(Switch::Toggle.wire_value(), 2);
        assert_eq!(Switch::from(true), Switch::On);
    }

    #[test]
    fn modes_parse_case_insensitively() {
        assert_eq!("DOLBY".parse::<UpmixerMode>(), Ok(UpmixerMode::Dolby));
        assert_eq!("Upmix_On_Native".parse::<UpmixerMode>(), Ok(UpmixerMode::UpmixOnNative));
        assert_eq!("3d".parse::<RemappingMode>(), Ok(RemappingMode::ThreeD));
        assert_eq!("manual".parse::<RemappingMode>(), Ok(RemappingMode::Manual));
    }

    #[test]
    fn mode_parse_error_lists_valid_modes() {
        let err = "surround".parse::<UpmixerMode>().unwrap_err();
        assert!(err.contains("auro3d"));
        assert!(err.contains("upmix_on_native"));
    }

    #[test]
    fn label_quality_prefers_profile() {
        assert!(LabelQuality::Profile > LabelQuality::OptSource);
        assert_eq!(LabelQuality::from(SourceOrigin::OptSource), LabelQuality::OptSource);
    }

    #[test]
    fn volume_range_round_trips_midpoint() {
        let range = VolumeRange::default();
        assert_eq!(range.from_percentage(50.0), -50.0);
        assert_eq!(range.to_percentage(-50.0), 50.0);
        assert_eq!(range.from_percentage(0.0), -120.0);
        assert_eq!(range.from_percentage(100.0), 20.0);
    }
}
