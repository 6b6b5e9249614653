use crate::backoff::ReconnectPolicy;
use crate::error::{AltitudeError, Result};
use crate::types::VolumeRange;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default TCP control port
pub const DEFAULT_PORT: u16 = 44100;
/// Identifier announced with `id` after connecting
pub const DEFAULT_CLIENT_ID: &str = "trinnov-altitude-rs";

/// Settings for one [`AltitudeClient`](crate::AltitudeClient)
///
/// Timeouts are expressed in (fractional) seconds when serialized. `None`
/// waits without bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// MAC address, needed only for Wake-on-LAN by the caller
    pub mac: Option<String>,
    pub client_id: String,
    #[serde(with = "opt_secs")]
    pub connect_timeout: Option<Duration>,
    /// Default send and ack deadline for commands
    #[serde(with = "opt_secs")]
    pub command_timeout: Option<Duration>,
    /// Read deadline in the receive loop. Expiry is benign.
    #[serde(with = "opt_secs")]
    pub read_timeout: Option<Duration>,
    pub auto_reconnect: bool,
    pub reconnect: ReconnectPolicy,
    pub volume_range: VolumeRange,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            mac: None,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            connect_timeout: Some(Duration::from_secs(2)),
            command_timeout: Some(Duration::from_secs(2)),
            read_timeout: Some(Duration::from_secs(30)),
            auto_reconnect: true,
            reconnect: ReconnectPolicy::default(),
            volume_range: VolumeRange::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = Some(mac.into());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_volume_range(mut self, range: VolumeRange) -> Self {
        self.volume_range = range;
        self
    }

    /// Check the fields that cannot be validated by the type system
    pub fn validate(&self) -> Result<()> {
        if let Some(mac) = &self.mac {
            validate_mac(mac)?;
        }
        if self.volume_range.max_db <= self.volume_range.min_db {
            return Err(AltitudeError::InvalidParameter(format!(
                "volume range max ({}) must exceed min ({})",
                self.volume_range.max_db, self.volume_range.min_db
            )));
        }
        if !(0.0..=1.0).contains(&self.reconnect.jitter) {
            return Err(AltitudeError::InvalidParameter(format!(
                "reconnect jitter ({}) must be between 0 and 1",
                self.reconnect.jitter
            )));
        }
        Ok(())
    }
}

/// Validate a MAC address of the form `aa:bb:cc:dd:ee:ff` (or with `-`)
pub fn validate_mac(mac: &str) -> Result<()> {
    let malformed = || AltitudeError::MalformedMacAddress(mac.to_string());
    let bytes = mac.as_bytes();
    if bytes.len() != 17 {
        return Err(malformed());
    }
    for (i, b) in bytes.iter().enumerate() {
        let ok = if i % 3 == 2 {
            *b == b':' || *b == b'-'
        } else {
            b.is_ascii_hexdigit()
        };
        if !ok {
            return Err(malformed());
        }
    }
    Ok(())
}

/// `Duration` as float seconds
pub(crate) mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// `Option<Duration>` as optional float seconds
pub(crate) mod opt_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}
