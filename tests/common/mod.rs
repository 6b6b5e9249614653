#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use trinnov_altitude::{
    AltitudeClient, AltitudeError, ClientConfig, ReconnectPolicy, Result, Transport,
};

pub const WELCOME: &str = "Welcome on Trinnov Optimizer (Version 4.3.2rc1, ID 10485761)";

/// In-memory transport driven by the test
///
/// Lines pushed with [`FakeTransport::push`] are returned by `read_line`;
/// [`FakeTransport::peer_close`] makes the next read fail as if the device hung up.
pub struct FakeTransport {
    incoming_tx: mpsc::UnboundedSender<Option<String>>,
    incoming_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Option<String>>>,
    sent: Mutex<Vec<String>>,
    replies: Mutex<HashMap<String, Vec<String>>>,
    connected: AtomicBool,
    fail_connect: bool,
    fail_send: AtomicBool,
    connects: AtomicUsize,
    closes: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(false))
    }

    /// A transport whose connect is refused
    pub fn refusing() -> Arc<Self> {
        Arc::new(Self::build(true))
    }

    fn build(fail_connect: bool) -> Self {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        Self {
            incoming_tx,
            incoming_rx: tokio::sync::Mutex::new(incoming_rx),
            sent: Mutex::new(Vec::new()),
            replies: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(false),
            fail_connect,
            fail_send: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, line: &str) {
        let _ = self.incoming_tx.send(Some(line.to_string()));
    }

    pub fn push_all(&self, lines: &[&str]) {
        for line in lines {
            self.push(line);
        }
    }

    pub fn peer_close(&self) {
        let _ = self.incoming_tx.send(None);
    }

    /// Queue `lines` as incoming whenever `command` is sent
    pub fn respond_to(&self, command: &str, lines: &[&str]) {
        self.replies.lock().unwrap().insert(
            command.to_string(),
            lines.iter().map(|l| l.to_string()).collect(),
        );
    }

    pub fn fail_sends(&self) {
        self.fail_send.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, _timeout: Option<Duration>) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(AltitudeError::ConnectionFailed("connection refused".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read_line(&self, timeout: Option<Duration>) -> Result<String> {
        let mut rx = self.incoming_rx.lock().await;
        let next = match timeout {
            Some(d) => tokio::time::timeout(d, rx.recv())
                .await
                .map_err(|_| AltitudeError::ReadTimeout)?,
            None => rx.recv().await,
        };
        match next {
            Some(Some(line)) => Ok(line),
            _ => {
                self.connected.store(false, Ordering::SeqCst);
                Err(AltitudeError::NotConnected("connection closed by peer".into()))
            }
        }
    }

    async fn send_line(&self, line: &str, _timeout: Option<Duration>) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) || self.fail_send.load(Ordering::SeqCst) {
            return Err(AltitudeError::NotConnected("transport closed".into()));
        }
        self.sent.lock().unwrap().push(line.to_string());
        let replies = self.replies.lock().unwrap().get(line).cloned();
        for reply in replies.into_iter().flatten() {
            self.push(&reply);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Test configuration: short read timeout, deterministic backoff
pub fn test_config() -> ClientConfig {
    ClientConfig::new("altitude.test")
        .with_read_timeout(Some(Duration::from_millis(50)))
        .with_reconnect(ReconnectPolicy {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(3),
            jitter: 0.2,
        })
}

pub struct Harness {
    pub client: AltitudeClient,
    pub delays: Arc<Mutex<Vec<Duration>>>,
}

/// Build a client that hands out `transports` in order and records reconnect sleeps
/// instead of sleeping
pub fn harness(config: ClientConfig, transports: &[Arc<FakeTransport>]) -> Harness {
    let queue: Mutex<VecDeque<Arc<FakeTransport>>> =
        Mutex::new(transports.iter().cloned().collect());
    let delays = Arc::new(Mutex::new(Vec::new()));
    let recorded = delays.clone();

    let client = AltitudeClient::builder(config)
        .transport_factory(move || {
            let next = queue.lock().unwrap().pop_front();
            next.unwrap_or_else(FakeTransport::refusing) as Arc<dyn Transport>
        })
        .sleep_fn(move |delay| {
            recorded.lock().unwrap().push(delay);
            async {}
        })
        .random_fn(|| 0.5)
        .build()
        .unwrap();

    Harness { client, delays }
}

/// Poll `condition` until it holds, failing the test after two seconds
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .try_init();
}
