use crate::adapter::{AdapterEvent, Snapshot, StateAdapter, StateDelta};
use crate::backoff::Backoff;
use crate::config::{self, ClientConfig};
use crate::connection::{AckQueue, AckWaiter};
use crate::error::{AltitudeError, Result};
use crate::protocol::{parse_message, Command, Message};
use crate::state::AltitudeState;
use crate::subscription::{ClientEvent, EventReceiver};
use crate::transport::{with_deadline, TcpTransport, Transport, TransportFactory};
use crate::types::Decibels;
use futures_util::future::{BoxFuture, FutureExt};
use std::collections::VecDeque;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Handle returned by callback registration
pub type CallbackId = Uuid;

/// Sleep used between reconnect attempts
pub type SleepFn = Arc<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>;

/// Source of jitter randomness in `[0, 1)`
pub type RandomFn = Arc<dyn Fn() -> f64 + Send + Sync>;

type Callback = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const UNKNOWN_SAMPLE_LIMIT: usize = 20;
const UNKNOWN_LOG_FIRST: u64 = 5;
const UNKNOWN_LOG_EVERY: u64 = 100;

/// Per-call overrides for [`AltitudeClient::command`]
///
/// Timeouts left as `None` fall back to the configured command timeout.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CommandOptions {
    pub wait_for_ack: bool,
    pub ack_timeout: Option<Duration>,
    pub send_timeout: Option<Duration>,
}

impl CommandOptions {
    /// Wait for the `OK` / `ERROR` reply
    pub fn ack() -> Self {
        Self {
            wait_for_ack: true,
            ..Self::default()
        }
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = Some(timeout);
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }
}

/// Counts unrecognised lines and keeps the most recent ones
#[derive(Default)]
struct UnknownTracker {
    count: u64,
    samples: VecDeque<String>,
}

impl UnknownTracker {
    fn record(&mut self, raw: &str) {
        self.count += 1;
        if self.samples.len() == UNKNOWN_SAMPLE_LIMIT {
            self.samples.pop_front();
        }
        self.samples.push_back(raw.to_string());

        if self.count <= UNKNOWN_LOG_FIRST {
            tracing::warn!(line = %raw, "Unknown protocol message");
        } else if self.count % UNKNOWN_LOG_EVERY == 0 {
            tracing::warn!(count = self.count, latest = %raw, "Unknown protocol messages");
        }
    }
}

struct Inner {
    config: ClientConfig,
    state: RwLock<AltitudeState>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    transport_factory: TransportFactory,
    /// Serializes line writes and ack registration
    command_lock: tokio::sync::Mutex<()>,
    acks: AckQueue,
    callbacks: Mutex<Vec<(CallbackId, Callback)>>,
    synced_tx: watch::Sender<bool>,
    event_tx: broadcast::Sender<ClientEvent>,
    stopping: AtomicBool,
    listen_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    unknown: Mutex<UnknownTracker>,
    sleep: SleepFn,
    random: RandomFn,
}

/// Client for one Trinnov Altitude processor
///
/// The client keeps a persistent connection, reduces every status line into an
/// [`AltitudeState`], and reconnects with exponential backoff when the link
/// drops. Cloning is cheap and all clones share the same connection.
///
/// # Example
///
/// ```no_run
/// use trinnov_altitude::{AltitudeClient, ClientConfig};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = AltitudeClient::new(ClientConfig::new("192.168.1.90"))?;
///     client.start().await?;
///     client.wait_synced(Some(Duration::from_secs(10))).await?;
///
///     println!("Source: {:?}", client.state().source);
///     client.volume_set(-35.0).await?;
///
///     client.stop().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct AltitudeClient {
    inner: Arc<Inner>,
}

/// Builder for clients with custom transport, sleep or randomness
pub struct ClientBuilder {
    config: ClientConfig,
    transport_factory: Option<TransportFactory>,
    sleep: Option<SleepFn>,
    random: Option<RandomFn>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport_factory: None,
            sleep: None,
            random: None,
        }
    }

    /// Use `factory` instead of TCP to create a transport per connection attempt
    pub fn transport_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Transport> + Send + Sync + 'static,
    {
        let factory: TransportFactory = Arc::new(factory);
        self.transport_factory = Some(factory);
        self
    }

    /// Replace the reconnect sleep
    pub fn sleep_fn<F, Fut>(mut self, sleep: F) -> Self
    where
        F: Fn(Duration) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let sleep: SleepFn = Arc::new(move |delay: Duration| sleep(delay).boxed());
        self.sleep = Some(sleep);
        self
    }

    /// Replace the jitter random source
    pub fn random_fn<F>(mut self, random: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        let random: RandomFn = Arc::new(random);
        self.random = Some(random);
        self
    }

    pub fn build(self) -> Result<AltitudeClient> {
        self.config.validate()?;

        let transport_factory = match self.transport_factory {
            Some(factory) => factory,
            None => TcpTransport::factory(self.config.host.clone(), self.config.port),
        };
        let sleep: SleepFn = match self.sleep {
            Some(sleep) => sleep,
            None => Arc::new(|delay: Duration| tokio::time::sleep(delay).boxed()),
        };
        let random: RandomFn = match self.random {
            Some(random) => random,
            None => Arc::new(rand::random::<f64>),
        };

        let (synced_tx, _) = watch::channel(false);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(AltitudeClient {
            inner: Arc::new(Inner {
                config: self.config,
                state: RwLock::new(AltitudeState::new()),
                transport: Mutex::new(None),
                transport_factory,
                command_lock: tokio::sync::Mutex::new(()),
                acks: AckQueue::new(),
                callbacks: Mutex::new(Vec::new()),
                synced_tx,
                event_tx,
                stopping: AtomicBool::new(false),
                listen_task: tokio::sync::Mutex::new(None),
                unknown: Mutex::new(UnknownTracker::default()),
                sleep,
                random,
            }),
        })
    }
}

impl AltitudeClient {
    /// Create a TCP client. Fails if the configuration is invalid.
    pub fn new(config: ClientConfig) -> Result<Self> {
        ClientBuilder::new(config).build()
    }

    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Check a MAC address of the form `aa:bb:cc:dd:ee:ff`
    pub fn validate_mac(mac: &str) -> Result<()> {
        config::validate_mac(mac)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Connect, send the bootstrap lines and start the receive loop.
    ///
    /// Does nothing if the loop is already running. Connect errors are returned
    /// to the caller; no reconnect is attempted for the initial connection.
    pub async fn start(&self) -> Result<()> {
        let mut task = self.inner.listen_task.lock().await;
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }

        self.inner.stopping.store(false, Ordering::SeqCst);
        self.inner.connect_and_bootstrap().await?;

        let inner = self.inner.clone();
        *task = Some(tokio::spawn(async move { inner.listen_loop().await }));
        Ok(())
    }

    /// Stop the receive loop and disconnect. Safe to call repeatedly.
    pub async fn stop(&self) {
        self.inner.stopping.store(true, Ordering::SeqCst);

        if let Some(handle) = self.inner.listen_task.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }

        self.inner.disconnect_statefully().await;
    }

    /// Wait until the initial state has been received.
    ///
    /// `None` waits without bound. Returns [`AltitudeError::SyncTimeout`] on expiry.
    pub async fn wait_synced(&self, timeout: Option<Duration>) -> Result<()> {
        let mut rx = self.inner.synced_tx.subscribe();
        with_deadline(timeout, AltitudeError::SyncTimeout, async move {
            rx.wait_for(|synced| *synced)
                .await
                .map(|_| ())
                .map_err(|_| AltitudeError::no_transport())
        })
        .await
    }

    /// Send one raw line.
    ///
    /// With [`CommandOptions::wait_for_ack`] the reply is returned, an `ERROR:`
    /// reply becomes [`AltitudeError::CommandRejected`], and no reply in time
    /// becomes [`AltitudeError::AckTimeout`]. Without it, returns `Ok(None)`
    /// once the line is written.
    pub async fn command(&self, line: &str, options: CommandOptions) -> Result<Option<Message>> {
        self.inner.command(line, options).await
    }

    /// Render and send a [`Command`], optionally waiting for its reply
    pub async fn send(&self, command: Command, wait_for_ack: bool) -> Result<()> {
        let options = CommandOptions {
            wait_for_ack,
            ..CommandOptions::default()
        };
        self.inner.command(&command.to_string(), options).await?;
        Ok(())
    }

    /// Copy of the current device state
    pub fn state(&self) -> AltitudeState {
        self.inner.read_state().clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_state(&self.inner.read_state())
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    pub fn is_synced(&self) -> bool {
        *self.inner.synced_tx.borrow()
    }

    pub fn volume(&self) -> Option<Decibels> {
        self.inner.read_state().volume
    }

    /// Current volume mapped onto the configured range, 0 to 100
    pub fn volume_percentage(&self) -> Option<f64> {
        let range = self.inner.config.volume_range;
        self.volume().map(|db| range.to_percentage(db))
    }

    pub fn unknown_message_count(&self) -> u64 {
        self.inner.lock_unknown().count
    }

    /// Most recent unrecognised lines, oldest first
    pub fn recent_unknown_messages(&self) -> Vec<String> {
        self.inner.lock_unknown().samples.iter().cloned().collect()
    }

    /// Number of commands still waiting for a reply
    pub fn pending_acks(&self) -> usize {
        self.inner.acks.len()
    }

    /// Register a callback for every [`ClientEvent`].
    ///
    /// Callbacks run on the receive loop and must not block. A panicking
    /// callback is logged and does not affect the others.
    pub fn register_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.inner.lock_callbacks().push((id, Arc::new(callback)));
        id
    }

    /// Returns false if no callback had this id
    pub fn deregister_callback(&self, id: CallbackId) -> bool {
        let mut callbacks = self.inner.lock_callbacks();
        let before = callbacks.len();
        callbacks.retain(|(cid, _)| *cid != id);
        callbacks.len() != before
    }

    /// Register a callback fed by `adapter` on every received message.
    ///
    /// The first call carries a leading [`AdapterEvent::Initial`]; after that
    /// the callback only fires when something changed.
    pub fn register_adapter_callback<F>(&self, adapter: StateAdapter, callback: F) -> CallbackId
    where
        F: Fn(&Snapshot, &[StateDelta], &[AdapterEvent]) + Send + Sync + 'static,
    {
        let inner = Arc::downgrade(&self.inner);
        let adapter = Mutex::new(adapter);

        self.register_callback(move |event| {
            if !matches!(event, ClientEvent::ReceivedMessage(_)) {
                return;
            }
            let Some(inner) = inner.upgrade() else {
                return;
            };

            let mut adapter = adapter.lock().unwrap_or_else(PoisonError::into_inner);
            let initial = adapter.last_snapshot().is_none();
            let update = adapter.update(&inner.read_state());

            if initial {
                let mut events = vec![AdapterEvent::Initial];
                events.extend(update.events);
                callback(&update.snapshot, &update.deltas, &events);
            } else if !update.deltas.is_empty() || !update.events.is_empty() {
                callback(&update.snapshot, &update.deltas, &update.events);
            }
        })
    }

    /// Subscribe to client events as a stream
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.inner.event_tx.subscribe())
    }
}

impl Inner {
    fn read_state(&self) -> RwLockReadGuard<'_, AltitudeState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, AltitudeState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_transport(&self) -> MutexGuard<'_, Option<Arc<dyn Transport>>> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_callbacks(&self) -> MutexGuard<'_, Vec<(CallbackId, Callback)>> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_unknown(&self) -> MutexGuard<'_, UnknownTracker> {
        self.unknown.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_transport(&self) -> Option<Arc<dyn Transport>> {
        self.lock_transport().clone()
    }

    fn is_connected(&self) -> bool {
        self.current_transport()
            .is_some_and(|transport| transport.is_connected())
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    fn reset_session(&self) {
        self.synced_tx.send_replace(false);
        self.write_state().reset();
    }

    async fn connect_and_bootstrap(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        self.reset_session();

        let transport = (self.transport_factory)();
        transport.connect(self.config.connect_timeout).await?;

        {
            // Only reported on change, so assume the power-on defaults.
            let mut state = self.write_state();
            state.bypass = Some(false);
            state.dim = Some(false);
            state.mute = Some(false);
        }

        *self.lock_transport() = Some(transport);
        self.emit(&ClientEvent::Connected);

        if let Err(e) = self.bootstrap().await {
            self.disconnect_statefully().await;
            return Err(e);
        }
        Ok(())
    }

    async fn bootstrap(&self) -> Result<()> {
        for command in [
            Command::Identify(self.config.client_id.clone()),
            Command::SendVolume,
            Command::GetCurrentState,
        ] {
            self.command(&command.to_string(), CommandOptions::default())
                .await?;
        }
        Ok(())
    }

    async fn disconnect_statefully(&self) {
        let transport = self.lock_transport().take();

        self.reset_session();
        let failed = self.acks.fail_all();
        if failed > 0 {
            tracing::debug!(count = failed, "Failed pending acknowledgements");
        }

        let Some(transport) = transport else {
            return;
        };
        if let Err(e) = transport.close().await {
            tracing::debug!("Error closing transport: {}", e);
        }

        tracing::info!("Disconnected from Trinnov Altitude");
        self.emit(&ClientEvent::Disconnected);
    }

    async fn listen_loop(self: Arc<Self>) {
        while !self.is_stopping() {
            let result = match self.current_transport() {
                Some(transport) => transport.read_line(self.config.read_timeout).await,
                None => Err(AltitudeError::no_transport()),
            };

            match result {
                Ok(line) => self.handle_line(&line),
                Err(AltitudeError::ReadTimeout) => continue,
                Err(e) => {
                    tracing::warn!("Connection lost: {}", e);
                    self.disconnect_statefully().await;
                    match self.reconnect_until_success().await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => {
                            tracing::error!("Reconnect aborted: {}", e);
                            break;
                        }
                    }
                }
            }
        }
        tracing::debug!("Receive loop finished");
    }

    fn handle_line(&self, line: &str) {
        tracing::debug!(line = %line, "received");
        let message = parse_message(line);

        if let Message::Unknown { raw } = &message {
            self.lock_unknown().record(raw);
        }

        let synced = {
            let mut state = self.write_state();
            state.apply(&message);
            state.synced()
        };

        if let Message::Error { reason } = &message {
            tracing::error!("Received error from Trinnov Altitude: {}", reason);
        }

        self.acks.resolve(&message);
        self.emit(&ClientEvent::ReceivedMessage(message));

        if synced {
            self.synced_tx.send_if_modified(|value| !std::mem::replace(value, true));
        }
    }

    /// Returns Ok(false) if reconnecting is disabled or a stop was requested
    async fn reconnect_until_success(&self) -> Result<bool> {
        if self.is_stopping() || !self.config.auto_reconnect {
            return Ok(false);
        }

        let mut backoff = Backoff::new(self.config.reconnect);
        while !self.is_stopping() {
            match self.connect_and_bootstrap().await {
                Ok(()) => {
                    tracing::info!("Reconnected to Trinnov Altitude");
                    return Ok(true);
                }
                Err(e) if e.is_retryable_connect() => {
                    let delay = backoff.next_delay((self.random)());
                    tracing::warn!(
                        delay_ms = delay.as_millis() as u64,
                        "Reconnect attempt failed: {}",
                        e
                    );
                    (self.sleep)(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    async fn command(&self, line: &str, options: CommandOptions) -> Result<Option<Message>> {
        let transport = self
            .current_transport()
            .ok_or_else(AltitudeError::no_transport)?;
        let send_timeout = options.send_timeout.or(self.config.command_timeout);

        let waiter = {
            let _guard = self.command_lock.lock().await;
            // Enqueue before writing so a fast reply cannot beat registration.
            let waiter = options.wait_for_ack.then(|| self.acks.enqueue());

            tracing::debug!(line = %line, "send");
            if let Err(e) = transport.send_line(line, send_timeout).await {
                if let Some(waiter) = &waiter {
                    self.acks.remove(waiter.id);
                }
                return Err(e);
            }
            waiter
        };

        let Some(AckWaiter { id, rx }) = waiter else {
            return Ok(None);
        };

        let ack_timeout = options.ack_timeout.or(self.config.command_timeout);
        let reply = with_deadline(ack_timeout, AltitudeError::AckTimeout, async move {
            rx.await.map_err(|_| AltitudeError::no_transport())?
        })
        .await;

        match reply {
            Ok(Message::Error { reason }) => Err(AltitudeError::CommandRejected {
                command: line.to_string(),
                reason,
            }),
            Ok(message) => Ok(Some(message)),
            Err(e) => {
                self.acks.remove(id);
                Err(e)
            }
        }
    }

    fn emit(&self, event: &ClientEvent) {
        let callbacks: Vec<Callback> = self
            .lock_callbacks()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        for callback in callbacks {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(event))) {
                tracing::warn!(
                    "Callback panicked during '{}': {}",
                    event.name(),
                    panic_message(panic.as_ref())
                );
            }
        }

        // No subscribers is fine.
        let _ = self.event_tx.send(event.clone());
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tracker_keeps_last_twenty() {
        let mut tracker = UnknownTracker::default();
        for i in 0..25 {
            tracker.record(&format!("LINE {}", i));
        }
        assert_eq!(tracker.count, 25);
        assert_eq!(tracker.samples.len(), UNKNOWN_SAMPLE_LIMIT);
        assert_eq!(tracker.samples.front().map(String::as_str), Some("LINE 5"));
        assert_eq!(tracker.samples.back().map(String::as_str), Some("LINE 24"));
    }

    #[test]
    fn command_options_builders() {
        let opts = CommandOptions::ack().with_ack_timeout(Duration::from_millis(10));
        assert!(opts.wait_for_ack);
        assert_eq!(opts.ack_timeout, Some(Duration::from_millis(10)));
        assert_eq!(opts.send_timeout, None);
        assert!(!CommandOptions::default().wait_for_ack);
    }

    #[test]
    fn rejects_malformed_mac_at_construction() {
        let config = ClientConfig::new("localhost").with_mac("zz:zz");
        assert!(matches!(
            AltitudeClient::new(config),
            Err(AltitudeError::MalformedMacAddress(_))
        ));
        assert!(AltitudeClient::validate_mac("01:23:45:67:89:ab").is_ok());
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
