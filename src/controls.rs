//! High-level control methods. Each sends exactly one line.

use crate::client::AltitudeClient;
use crate::error::{AltitudeError, Result};
use crate::protocol::Command;
use crate::types::{CatalogIndex, Decibels, RemappingMode, Switch, UpmixerMode};

/// Step used by [`AltitudeClient::volume_up`] and [`AltitudeClient::volume_down`]
pub const VOLUME_STEP_DB: Decibels = 0.5;

impl AltitudeClient {
    /// Power the processor off
    pub async fn power_off(&self) -> Result<()> {
        self.send(Command::PowerOff, false).await
    }

    /// Ask the processor to say goodbye and close the session
    pub async fn bye(&self) -> Result<()> {
        self.send(Command::Bye, false).await
    }

    /// Request the full current state. The answer arrives as status lines.
    pub async fn state_get_current(&self) -> Result<()> {
        self.send(Command::GetCurrentState, false).await
    }

    pub async fn preset_get(&self) -> Result<()> {
        self.send(Command::GetCurrentPreset, false).await
    }

    pub async fn preset_label_get(&self, preset: CatalogIndex) -> Result<()> {
        self.send(Command::GetLabel(preset), false).await
    }

    pub async fn presets_get_all(&self) -> Result<()> {
        self.send(Command::GetAllLabels, false).await
    }

    /// Load a preset by index
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use trinnov_altitude::{AltitudeClient, ClientConfig};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = AltitudeClient::new(ClientConfig::new("192.168.1.90"))?;
    /// # client.start().await?;
    /// client.preset_set(2).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn preset_set(&self, preset: CatalogIndex) -> Result<()> {
        self.send(Command::LoadPreset(preset), false).await
    }

    pub async fn source_get(&self) -> Result<()> {
        self.send(Command::GetCurrentProfile, false).await
    }

    pub async fn source_name_get(&self, source: CatalogIndex) -> Result<()> {
        self.send(Command::GetProfileName(source), false).await
    }

    pub async fn source_set(&self, source: CatalogIndex) -> Result<()> {
        self.send(Command::SelectProfile(source), false).await
    }

    /// Select the first source whose catalog name matches `name` exactly
    ///
    /// Fails with [`AltitudeError::UnknownSource`] without sending anything if
    /// the name is not in the source catalog.
    pub async fn source_set_by_name(&self, name: &str) -> Result<()> {
        self.send(Command::SelectProfile(self.source_index(name)?), false)
            .await
    }

    pub(crate) fn source_index(&self, name: &str) -> Result<CatalogIndex> {
        self.state()
            .source_index_by_name(name)
            .ok_or_else(|| AltitudeError::UnknownSource(name.to_string()))
    }

    pub async fn remapping_mode_set(&self, mode: RemappingMode) -> Result<()> {
        self.send(Command::RemappingMode(mode), false).await
    }

    pub async fn upmixer_set(&self, mode: UpmixerMode) -> Result<()> {
        self.send(Command::Upmixer(mode), false).await
    }

    /// Set the master volume in dB
    pub async fn volume_set(&self, db: Decibels) -> Result<()> {
        self.send(Command::Volume(db), false).await
    }

    /// Change the master volume by `delta` dB
    pub async fn volume_adjust(&self, delta: Decibels) -> Result<()> {
        self.send(Command::VolumeAdjust(delta), false).await
    }

    pub async fn volume_up(&self) -> Result<()> {
        self.volume_adjust(VOLUME_STEP_DB).await
    }

    pub async fn volume_down(&self) -> Result<()> {
        self.volume_adjust(-VOLUME_STEP_DB).await
    }

    /// Ramp to `db` over `duration_ms` milliseconds
    pub async fn volume_ramp(&self, db: Decibels, duration_ms: u32) -> Result<()> {
        self.send(Command::VolumeRamp { db, duration_ms }, false)
            .await
    }

    /// Set the volume as a percentage of the configured dB range
    ///
    /// Rejects values outside 0..=100 with [`AltitudeError::InvalidParameter`]
    /// before touching the connection.
    pub async fn volume_percentage_set(&self, percentage: f64) -> Result<()> {
        self.send(self.volume_percentage_command(percentage)?, false)
            .await
    }

    pub(crate) fn volume_percentage_command(&self, percentage: f64) -> Result<Command> {
        if !(0.0..=100.0).contains(&percentage) {
            return Err(AltitudeError::InvalidParameter(format!(
                "percentage must be between 0 and 100, got {}",
                percentage
            )));
        }
        let db = self.config().volume_range.from_percentage(percentage);
        Ok(Command::Volume(db))
    }

    pub async fn change_page(&self, delta: i32) -> Result<()> {
        self.send(Command::ChangePage(delta), false).await
    }

    pub async fn page_up(&self) -> Result<()> {
        self.change_page(1).await
    }

    pub async fn page_down(&self) -> Result<()> {
        self.change_page(-1).await
    }

    /// Set, clear or toggle bypass
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use trinnov_altitude::{AltitudeClient, ClientConfig, Switch};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = AltitudeClient::new(ClientConfig::new("192.168.1.90"))?;
    /// # client.start().await?;
    /// client.bypass_set(true).await?;
    /// client.bypass_set(Switch::Toggle).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn bypass_set(&self, state: impl Into<Switch>) -> Result<()> {
        self.send(Command::Bypass(state.into()), false).await
    }

    pub async fn mute_set(&self, state: impl Into<Switch>) -> Result<()> {
        self.send(Command::Mute(state.into()), false).await
    }

    pub async fn dim_set(&self, state: impl Into<Switch>) -> Result<()> {
        self.send(Command::Dim(state.into()), false).await
    }

    /// Front panel display light
    pub async fn front_display_set(&self, state: impl Into<Switch>) -> Result<()> {
        self.send(Command::FrontDisplay(state.into()), false).await
    }

    pub async fn optimization_set(&self, state: impl Into<Switch>) -> Result<()> {
        self.send(Command::Optimization(state.into()), false).await
    }

    pub async fn acoustic_correction_set(&self, state: impl Into<Switch>) -> Result<()> {
        self.send(Command::AcousticCorrection(state.into()), false)
            .await
    }

    pub async fn level_alignment_set(&self, state: impl Into<Switch>) -> Result<()> {
        self.send(Command::LevelAlignment(state.into()), false)
            .await
    }

    pub async fn time_alignment_set(&self, state: impl Into<Switch>) -> Result<()> {
        self.send(Command::TimeAlignment(state.into()), false)
            .await
    }
}
