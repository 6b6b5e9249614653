//! Line transport consumed by the client engine.

use crate::error::{AltitudeError, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};

/// Longest line accepted from the device before the stream is considered broken
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Newline-delimited text transport
///
/// Implementations strip the line ending on read and append it on send. A
/// `None` timeout waits without bound.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the underlying stream.
    ///
    /// Fails with [`AltitudeError::ConnectionFailed`] or [`AltitudeError::ConnectionTimeout`].
    async fn connect(&self, timeout: Option<Duration>) -> Result<()>;

    /// Close the stream. Closing twice is harmless.
    async fn close(&self) -> Result<()>;

    /// Read the next line.
    ///
    /// Deadline expiry yields [`AltitudeError::ReadTimeout`]; a closed peer
    /// yields [`AltitudeError::NotConnected`].
    async fn read_line(&self, timeout: Option<Duration>) -> Result<String>;

    /// Write one line and flush it
    async fn send_line(&self, line: &str, timeout: Option<Duration>) -> Result<()>;

    fn is_connected(&self) -> bool;
}

/// Builds a fresh transport for each connection attempt
pub type TransportFactory = Arc<dyn Fn() -> Arc<dyn Transport> + Send + Sync>;

/// Run `fut` under an optional deadline, mapping expiry to `on_timeout`
pub(crate) async fn with_deadline<T, F>(
    deadline: Option<Duration>,
    on_timeout: AltitudeError,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(d) => tokio::time::timeout(d, fut).await.map_err(|_| on_timeout)?,
        None => fut.await,
    }
}

/// TCP transport to the Altitude control port
pub struct TcpTransport {
    host: String,
    port: u16,
    reader: Mutex<Option<FramedRead<OwnedReadHalf, LinesCodec>>>,
    writer: Mutex<Option<FramedWrite<OwnedWriteHalf, LinesCodec>>>,
    connected: AtomicBool,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Factory producing TCP transports for `host:port`
    pub fn factory(host: impl Into<String>, port: u16) -> TransportFactory {
        let host = host.into();
        Arc::new(move || Arc::new(TcpTransport::new(host.clone(), port)) as Arc<dyn Transport>)
    }

    fn mark_closed(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

fn codec_error(err: LinesCodecError) -> AltitudeError {
    match err {
        LinesCodecError::Io(e) => AltitudeError::Io(e),
        LinesCodecError::MaxLineLengthExceeded => {
            AltitudeError::NotConnected("line exceeded maximum length".to_string())
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, timeout: Option<Duration>) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        tracing::info!(host = %self.host, port = self.port, "Connecting to {}", addr);

        let stream = with_deadline(timeout, AltitudeError::ConnectionTimeout, async {
            TcpStream::connect(&addr)
                .await
                .map_err(|e| AltitudeError::ConnectionFailed(format!("{}: {}", addr, e)))
        })
        .await?;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY: {}", e);
        }

        let (read_half, write_half) = stream.into_split();
        *self.reader.lock().await = Some(FramedRead::new(
            read_half,
            LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
        ));
        *self.writer.lock().await = Some(FramedWrite::new(write_half, LinesCodec::new()));
        self.connected.store(true, Ordering::SeqCst);

        tracing::info!("Connected to {}", addr);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.mark_closed();
        if let Some(mut writer) = self.writer.lock().await.take() {
            // Peer may already be gone.
            let _ = SinkExt::<&str>::close(&mut writer).await;
        }
        self.reader.lock().await.take();
        Ok(())
    }

    async fn read_line(&self, timeout: Option<Duration>) -> Result<String> {
        let mut guard = self.reader.lock().await;
        let reader = guard
            .as_mut()
            .ok_or_else(AltitudeError::no_transport)?;

        let next = match timeout {
            Some(d) => tokio::time::timeout(d, reader.next())
                .await
                .map_err(|_| AltitudeError::ReadTimeout)?,
            None => reader.next().await,
        };

        match next {
            Some(Ok(line)) => {
                tracing::trace!(line = %line, "read");
                Ok(line.trim_end().to_string())
            }
            Some(Err(e)) => {
                self.mark_closed();
                Err(codec_error(e))
            }
            None => {
                self.mark_closed();
                Err(AltitudeError::closed())
            }
        }
    }

    async fn send_line(&self, line: &str, timeout: Option<Duration>) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(AltitudeError::no_transport)?;

        tracing::trace!(line = %line, "write");
        let result = with_deadline(timeout, AltitudeError::SendTimeout, async {
            writer.send(line).await.map_err(codec_error)
        })
        .await;

        if let Err(AltitudeError::Io(_)) = &result {
            self.mark_closed();
        }
        result
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn reads_and_writes_lines_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            write.write_all(b"OK\r\nVOLUME -20\n").await.unwrap();
            let mut lines = BufReader::new(read).lines();
            lines.next_line().await.unwrap()
        });

        let transport = TcpTransport::new("127.0.0.1", port);
        transport
            .connect(Some(Duration::from_secs(2)))
            .await
            .unwrap();
        assert!(transport.is_connected());

        assert_eq!(transport.read_line(Some(Duration::from_secs(2))).await.unwrap(), "OK");
        assert_eq!(
            transport.read_line(Some(Duration::from_secs(2))).await.unwrap(),
            "VOLUME -20"
        );
        transport.send_line("id test", None).await.unwrap();

        assert_eq!(server.await.unwrap().as_deref(), Some("id test"));
        transport.close().await.unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn peer_close_is_not_connected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let transport = TcpTransport::new("127.0.0.1", port);
        transport.connect(None).await.unwrap();
        server.await.unwrap();

        let err = transport.read_line(Some(Duration::from_secs(2))).await.unwrap_err();
        assert!(err.is_disconnect());
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn read_timeout_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let transport = TcpTransport::new("127.0.0.1", port);
        transport.connect(None).await.unwrap();
        let err = transport
            .read_line(Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, AltitudeError::ReadTimeout));
        assert!(transport.is_connected());
    }

    #[tokio::test]
    async fn refused_connect_is_retryable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = TcpTransport::new("127.0.0.1", port);
        let err = transport
            .connect(Some(Duration::from_secs(2)))
            .await
            .unwrap_err();
        assert!(err.is_retryable_connect());
    }

    #[tokio::test]
    async fn io_before_connect_fails() {
        let transport = TcpTransport::new("127.0.0.1", 1);
        assert!(transport.send_line("bye", None).await.is_err());
        assert!(transport.read_line(None).await.is_err());
    }
}
