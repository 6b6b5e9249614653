use thiserror::Error;

/// Result type for Altitude operations
pub type Result<T> = std::result::Result<T, AltitudeError>;

/// Errors that can occur when talking to a Trinnov Altitude
#[derive(Error, Debug)]
pub enum AltitudeError {
    /// Connecting failed immediately (refused, unreachable, bad address)
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connecting did not complete before the connect deadline
    #[error("Connection timed out. Is the processor powered on?")]
    ConnectionTimeout,

    /// No live connection, or the peer closed the stream
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// No line arrived before the read deadline
    #[error("Read timeout")]
    ReadTimeout,

    /// Writing a line did not complete before the send deadline
    #[error("Send timeout")]
    SendTimeout,

    /// The processor answered a command with an `ERROR:` line
    #[error("Command '{command}' rejected: {reason}")]
    CommandRejected {
        /// The command line that was sent
        command: String,
        /// Reason reported by the processor
        reason: String,
    },

    /// No `OK`/`ERROR` reply arrived before the ack deadline
    #[error("Timed out waiting for command acknowledgement")]
    AckTimeout,

    /// State did not become synced before the deadline
    #[error("Timed out waiting for initial state sync")]
    SyncTimeout,

    /// MAC address could not be parsed
    #[error("Malformed MAC address: {0}")]
    MalformedMacAddress(String),

    /// An argument was outside its accepted range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// No source with this name is in the source catalog
    #[error("Unknown source name: {0}")]
    UnknownSource(String),

    /// A bridge command line could not be understood
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Event subscriber fell behind or the client was dropped
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AltitudeError {
    pub(crate) fn closed() -> Self {
        AltitudeError::NotConnected("connection closed by peer".to_string())
    }

    pub(crate) fn no_transport() -> Self {
        AltitudeError::NotConnected("not connected to Trinnov Altitude".to_string())
    }

    /// Whether the reconnect loop may retry after this error.
    ///
    /// Only connect-class failures qualify; anything else ends automatic recovery.
    pub fn is_retryable_connect(&self) -> bool {
        matches!(
            self,
            AltitudeError::ConnectionFailed(_) | AltitudeError::ConnectionTimeout
        )
    }

    /// Whether this error means the stream is gone and the session must be torn down
    pub fn is_disconnect(&self) -> bool {
        matches!(self, AltitudeError::NotConnected(_) | AltitudeError::Io(_))
    }
}
