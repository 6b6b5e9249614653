use crate::error::{AltitudeError, Result};
use crate::protocol::Message;
use tokio::sync::broadcast;

/// Lifecycle and message events emitted by the client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Transport connected, before bootstrap lines are sent
    Connected,

    /// Session torn down (peer close, I/O failure or `stop`)
    Disconnected,

    /// A line was received and applied to state
    ReceivedMessage(Message),
}

impl ClientEvent {
    /// Event name as used by callback consumers
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Connected => "connected",
            ClientEvent::Disconnected => "disconnected",
            ClientEvent::ReceivedMessage(_) => "received_message",
        }
    }

    pub fn message(&self) -> Option<&Message> {
        match self {
            ClientEvent::ReceivedMessage(m) => Some(m),
            _ => None,
        }
    }
}

/// Receiver for client events
///
/// Each receiver sees every event sent after it was created. A receiver that
/// falls too far behind gets a [`AltitudeError::ChannelError`] and then resumes
/// with the oldest retained event.
pub struct EventReceiver {
    rx: broadcast::Receiver<ClientEvent>,
}

impl EventReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<ClientEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next event
    pub async fn recv(&mut self) -> Result<ClientEvent> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => {
                AltitudeError::NotConnected("client dropped".to_string())
            }
            broadcast::error::RecvError::Lagged(n) => {
                AltitudeError::ChannelError(format!("Lagged by {} events", n))
            }
        })
    }

    /// Try to receive an event without blocking
    ///
    /// Returns `None` if no event is available.
    pub fn try_recv(&mut self) -> Result<Option<ClientEvent>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => {
                Err(AltitudeError::NotConnected("client dropped".to_string()))
            }
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                Err(AltitudeError::ChannelError(format!("Lagged by {} events", n)))
            }
        }
    }
}
