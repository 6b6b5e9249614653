//! Text commands from automation platforms, e.g. `volume_set -35.5` or
//! `source_set_by_name "Apple TV"`.

use crate::client::AltitudeClient;
use crate::error::{AltitudeError, Result};
use crate::protocol::Command;
use crate::types::{CatalogIndex, Decibels, RemappingMode, Switch, UpmixerMode};
use std::str::FromStr;

/// Method name and raw arguments of one command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub method: String,
    pub args: Vec<String>,
}

/// Split `line` into a method name and arguments with shell-like quoting
pub fn parse_command(line: &str) -> Result<ParsedCommand> {
    let mut parts = tokenize(line)?.into_iter();
    let method = parts
        .next()
        .ok_or_else(|| AltitudeError::InvalidCommand("command cannot be empty".to_string()))?;
    Ok(ParsedCommand {
        method,
        args: parts.collect(),
    })
}

/// Whitespace-separated tokens. Single quotes are literal; double quotes and
/// bare text honour backslash escapes.
fn tokenize(line: &str) -> Result<Vec<String>> {
    let unclosed = || AltitudeError::InvalidCommand("no closing quotation".to_string());
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(unclosed()),
                    }
                }
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\')) => current.push(c),
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => return Err(unclosed()),
                        },
                        Some(c) => current.push(c),
                        None => return Err(unclosed()),
                    }
                }
            }
            '\\' => {
                in_token = true;
                match chars.next() {
                    Some(c) => current.push(c),
                    None => {
                        return Err(AltitudeError::InvalidCommand(
                            "no escaped character".to_string(),
                        ))
                    }
                }
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Boolean-settable processor functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchTarget {
    AcousticCorrection,
    Bypass,
    Dim,
    FrontDisplay,
    LevelAlignment,
    Mute,
    Optimization,
    TimeAlignment,
}

impl SwitchTarget {
    pub const ALL: [SwitchTarget; 8] = [
        SwitchTarget::AcousticCorrection,
        SwitchTarget::Bypass,
        SwitchTarget::Dim,
        SwitchTarget::FrontDisplay,
        SwitchTarget::LevelAlignment,
        SwitchTarget::Mute,
        SwitchTarget::Optimization,
        SwitchTarget::TimeAlignment,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SwitchTarget::AcousticCorrection => "acoustic_correction",
            SwitchTarget::Bypass => "bypass",
            SwitchTarget::Dim => "dim",
            SwitchTarget::FrontDisplay => "front_display",
            SwitchTarget::LevelAlignment => "level_alignment",
            SwitchTarget::Mute => "mute",
            SwitchTarget::Optimization => "optimization",
            SwitchTarget::TimeAlignment => "time_alignment",
        }
    }

    fn command(self, state: Switch) -> Command {
        match self {
            SwitchTarget::AcousticCorrection => Command::AcousticCorrection(state),
            SwitchTarget::Bypass => Command::Bypass(state),
            SwitchTarget::Dim => Command::Dim(state),
            SwitchTarget::FrontDisplay => Command::FrontDisplay(state),
            SwitchTarget::LevelAlignment => Command::LevelAlignment(state),
            SwitchTarget::Mute => Command::Mute(state),
            SwitchTarget::Optimization => Command::Optimization(state),
            SwitchTarget::TimeAlignment => Command::TimeAlignment(state),
        }
    }
}

/// A validated bridge command
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeCommand {
    Switch { target: SwitchTarget, state: Switch },
    PageUp,
    PageDown,
    PowerOff,
    PresetSet(CatalogIndex),
    SourceSet(CatalogIndex),
    SourceSetByName(String),
    RemappingModeSet(RemappingMode),
    UpmixerSet(UpmixerMode),
    VolumeSet(Decibels),
    VolumeAdjust(Decibels),
    VolumeUp,
    VolumeDown,
    VolumeRamp { db: Decibels, duration_ms: u32 },
    VolumePercentageSet(f64),
}

fn invalid(message: String) -> AltitudeError {
    AltitudeError::InvalidCommand(message)
}

fn expect_args(method: &str, args: &[String], count: usize) -> Result<()> {
    if args.len() != count {
        return Err(invalid(format!(
            "{} takes {} argument(s), got {}",
            method,
            count,
            args.len()
        )));
    }
    Ok(())
}

fn number<T: FromStr>(method: &str, arg: &str) -> Result<T> {
    arg.parse()
        .map_err(|_| invalid(format!("{}: invalid numeric argument '{}'", method, arg)))
}

fn parse_switch(method: &str) -> Option<BridgeCommand> {
    let (name, state) = if let Some(name) = method.strip_suffix("_on") {
        (name, Switch::On)
    } else if let Some(name) = method.strip_suffix("_off") {
        (name, Switch::Off)
    } else {
        (method.strip_suffix("_toggle")?, Switch::Toggle)
    };
    let target = SwitchTarget::ALL.into_iter().find(|t| t.name() == name)?;
    Some(BridgeCommand::Switch { target, state })
}

impl BridgeCommand {
    /// Parse one command line
    pub fn parse(line: &str) -> Result<Self> {
        let ParsedCommand { method, args } = parse_command(line)?;
        let m = method.as_str();

        if let Some(command) = parse_switch(m) {
            expect_args(m, &args, 0)?;
            return Ok(command);
        }

        let command = match m {
            "page_up" | "page_down" | "power_off" | "volume_up" | "volume_down" => {
                expect_args(m, &args, 0)?;
                match m {
                    "page_up" => BridgeCommand::PageUp,
                    "page_down" => BridgeCommand::PageDown,
                    "power_off" => BridgeCommand::PowerOff,
                    "volume_up" => BridgeCommand::VolumeUp,
                    _ => BridgeCommand::VolumeDown,
                }
            }
            "preset_set" => {
                expect_args(m, &args, 1)?;
                BridgeCommand::PresetSet(number(m, &args[0])?)
            }
            "source_set" => {
                expect_args(m, &args, 1)?;
                BridgeCommand::SourceSet(number(m, &args[0])?)
            }
            // Unquoted names arrive split on spaces.
            "source_set_by_name" => {
                if args.is_empty() {
                    return Err(invalid(format!("{} requires a source name", m)));
                }
                BridgeCommand::SourceSetByName(args.join(" "))
            }
            "remapping_mode_set" => {
                expect_args(m, &args, 1)?;
                BridgeCommand::RemappingModeSet(args[0].parse().map_err(invalid)?)
            }
            "upmixer_set" => {
                expect_args(m, &args, 1)?;
                BridgeCommand::UpmixerSet(args[0].parse().map_err(invalid)?)
            }
            "volume_set" => {
                expect_args(m, &args, 1)?;
                BridgeCommand::VolumeSet(number(m, &args[0])?)
            }
            "volume_adjust" => {
                expect_args(m, &args, 1)?;
                BridgeCommand::VolumeAdjust(number(m, &args[0])?)
            }
            "volume_percentage_set" => {
                expect_args(m, &args, 1)?;
                BridgeCommand::VolumePercentageSet(number(m, &args[0])?)
            }
            "volume_ramp" => {
                expect_args(m, &args, 2)?;
                BridgeCommand::VolumeRamp {
                    db: number(m, &args[0])?,
                    duration_ms: number(m, &args[1])?,
                }
            }
            _ => return Err(invalid(format!("unknown command '{}'", method))),
        };
        Ok(command)
    }

    /// Commands whose effect is only confirmed by the processor's reply
    pub fn requires_ack(&self) -> bool {
        matches!(
            self,
            BridgeCommand::PowerOff
                | BridgeCommand::PresetSet(_)
                | BridgeCommand::SourceSet(_)
                | BridgeCommand::SourceSetByName(_)
                | BridgeCommand::UpmixerSet(_)
        )
    }
}

impl FromStr for BridgeCommand {
    type Err = AltitudeError;

    fn from_str(s: &str) -> Result<Self> {
        BridgeCommand::parse(s)
    }
}

impl AltitudeClient {
    /// Run a bridge command, waiting for the reply where the command needs one
    pub async fn execute(&self, command: &BridgeCommand) -> Result<()> {
        let wire = match command {
            BridgeCommand::Switch { target, state } => target.command(*state),
            BridgeCommand::PageUp => Command::ChangePage(1),
            BridgeCommand::PageDown => Command::ChangePage(-1),
            BridgeCommand::PowerOff => Command::PowerOff,
            BridgeCommand::PresetSet(index) => Command::LoadPreset(*index),
            BridgeCommand::SourceSet(index) => Command::SelectProfile(*index),
            BridgeCommand::SourceSetByName(name) => Command::SelectProfile(self.source_index(name)?),
            BridgeCommand::RemappingModeSet(mode) => Command::RemappingMode(*mode),
            BridgeCommand::UpmixerSet(mode) => Command::Upmixer(*mode),
            BridgeCommand::VolumeSet(db) => Command::Volume(*db),
            BridgeCommand::VolumeAdjust(delta) => Command::VolumeAdjust(*delta),
            BridgeCommand::VolumeUp => Command::VolumeAdjust(crate::controls::VOLUME_STEP_DB),
            BridgeCommand::VolumeDown => Command::VolumeAdjust(-crate::controls::VOLUME_STEP_DB),
            BridgeCommand::VolumeRamp { db, duration_ms } => Command::VolumeRamp {
                db: *db,
                duration_ms: *duration_ms,
            },
            BridgeCommand::VolumePercentageSet(p) => self.volume_percentage_command(*p)?,
        };
        self.send(wire, command.requires_ack()).await
    }
}
