//! Connection manager with a persistent link, heartbeat and automatic reconnection

use super::heartbeat::Heartbeat;
use super::reconnect::{ReconnectDecision, ReconnectPolicy, ReconnectState};
use super::state::{ConnectionState, ConnectionStateMachine, LinkEvent, TransitionResult};
use crate::error::LinkError;
use crate::subscription::{Listener, Subscription, SubscriptionRegistry};
use crate::transport::{CloseInfo, TransportConnector, TransportEvent, TransportStream};
use paracook_shared::{codec, kinds, timing, Envelope};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};

/// Configuration for connection manager
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Fixed delay before each reconnect attempt
    pub reconnect_delay: Duration,
    /// Reconnect attempts before `reconnect_failed` is raised
    pub max_reconnect_attempts: u32,
    /// Interval between keep-alive pings while open
    pub heartbeat_interval: Duration,
    /// Drop the connection when a ping goes unanswered this long (off by default)
    pub pong_timeout: Option<Duration>,
}

impl ConnectionConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.max_reconnect_attempts,
            delay: self.reconnect_delay,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(timing::RECONNECT_DELAY_MS),
            max_reconnect_attempts: timing::MAX_RECONNECT_ATTEMPTS,
            heartbeat_interval: Duration::from_millis(timing::HEARTBEAT_INTERVAL_MS),
            pong_timeout: None,
        }
    }
}

/// Snapshot of link and registry state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStats {
    pub connected: bool,
    pub reconnect_attempts: u32,
    pub listeners: BTreeMap<String, usize>,
    pub total_listeners: usize,
}

/// Commands from the manager to its driver task
enum Control {
    Send(String),
    Disconnect,
}

/// How an open connection ended
enum LinkExit {
    Shutdown,
    Closed(CloseInfo),
}

struct DriverHandle {
    control: mpsc::UnboundedSender<Control>,
    task: JoinHandle<()>,
}

impl DriverHandle {
    /// Ask the driver to close its transport and wait until it has exited
    async fn stop(self) {
        let _ = self.control.send(Control::Disconnect);
        if let Err(e) = self.task.await {
            if e.is_panic() {
                error!("Connection driver panicked: {}", e);
            }
        }
    }
}

struct LinkStatus {
    fsm: ConnectionStateMachine,
    address: Option<String>,
    reconnect: ReconnectState,
}

/// State shared between the manager and its driver task
struct Shared<C> {
    connector: C,
    config: ConnectionConfig,
    registry: SubscriptionRegistry,
    status: RwLock<LinkStatus>,
}

impl<C: TransportConnector> Shared<C> {
    fn status(&self) -> RwLockReadGuard<'_, LinkStatus> {
        self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn status_mut(&self) -> RwLockWriteGuard<'_, LinkStatus> {
        self.status.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, event: LinkEvent) -> ConnectionState {
        match self.status_mut().fsm.process_event(event) {
            TransitionResult::Success(state) => state,
            TransitionResult::Invalid { from, event } => {
                warn!("Ignoring {:?} while {}", event, from);
                from
            }
        }
    }

    fn emit(&self, kind: &str, payload: Value) {
        self.registry.dispatch(kind, &payload);
    }

    fn handle_frame(&self, text: &str, heartbeat: &mut Heartbeat) {
        let envelope = match codec::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Failed to parse frame: {}", e);
                return;
            }
        };

        if envelope.is_pong() {
            trace!("Heartbeat answered");
            heartbeat.record_pong();
            return;
        }

        if envelope.is_lifecycle() {
            warn!("Dropping inbound {} envelope: kind is reserved for local events", envelope.kind);
            return;
        }

        debug!("Received {}", envelope.kind);
        self.registry.dispatch(&envelope.kind, &envelope.data);
    }
}

/// Manages a single persistent connection to the server.
///
/// The transport is owned by a background driver task: only the driver
/// sends on it, closes it or replaces it. Inbound envelopes and lifecycle
/// events are fanned out through the [`SubscriptionRegistry`].
pub struct ConnectionManager<C: TransportConnector> {
    shared: Arc<Shared<C>>,
    driver: Mutex<Option<DriverHandle>>,
    /// Serializes connect/disconnect
    lifecycle: tokio::sync::Mutex<()>,
}

impl<C: TransportConnector> ConnectionManager<C> {
    /// Create a manager with its own registry
    pub fn new(connector: C, config: ConnectionConfig) -> Self {
        Self::with_registry(connector, config, SubscriptionRegistry::new())
    }

    /// Create a manager that dispatches through an existing registry
    pub fn with_registry(
        connector: C,
        config: ConnectionConfig,
        registry: SubscriptionRegistry,
    ) -> Self {
        let shared = Shared {
            connector,
            config,
            registry,
            status: RwLock::new(LinkStatus {
                fsm: ConnectionStateMachine::new(),
                address: None,
                reconnect: ReconnectState::default(),
            }),
        };

        Self {
            shared: Arc::new(shared),
            driver: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    fn driver_slot(&self) -> MutexGuard<'_, Option<DriverHandle>> {
        self.driver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connect to `address`.
    ///
    /// No-op when already open on the same address. Otherwise any existing
    /// connection is closed cleanly first and a fresh reconnect budget starts.
    /// Returns once the attempt has started, not when it opens.
    pub async fn connect(&self, address: impl Into<String>) {
        let address = address.into();
        let _lifecycle = self.lifecycle.lock().await;

        {
            let status = self.shared.status();
            let open = status.fsm.state() == ConnectionState::Open;
            if open && status.address.as_deref() == Some(address.as_str()) {
                debug!("Already connected to {}", address);
                return;
            }
        }

        let previous = self.driver_slot().take();
        if let Some(driver) = previous {
            driver.stop().await;
        }

        {
            let mut status = self.shared.status_mut();
            status.address = Some(address.clone());
            status.reconnect.reset();
        }
        self.shared.apply(LinkEvent::ConnectRequested);

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_link(self.shared.clone(), address, control_rx));
        *self.driver_slot() = Some(DriverHandle {
            control: control_tx,
            task,
        });
    }

    /// Close the connection and cancel heartbeat and pending reconnects.
    ///
    /// Waits for the driver to exit, so nothing revives the link afterwards.
    /// Idempotent.
    pub async fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock().await;

        let driver = self.driver_slot().take();
        if let Some(driver) = driver {
            info!("Disconnecting");
            driver.stop().await;
        }

        let mut status = self.shared.status_mut();
        status.reconnect.reset();
        status.fsm.reset();
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.shared.status().fsm.state()
    }

    /// Whether the transport is open
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Reconnect attempts made since the last successful open
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.status().reconnect.attempts()
    }

    /// Address of the current or most recent connection
    pub fn address(&self) -> Option<String> {
        self.shared.status().address.clone()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.shared.registry
    }

    /// Register a closure for messages or lifecycle events of `kind`
    pub fn subscribe<F>(&self, kind: impl Into<String>, listener: F) -> Subscription
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.registry.subscribe(kind, listener)
    }

    /// Register a shared listener for `kind`
    pub fn subscribe_listener(&self, kind: impl Into<String>, listener: &Listener) -> Subscription {
        self.shared.registry.subscribe_listener(kind, listener)
    }

    /// Remove a shared listener from `kind`
    pub fn unsubscribe(&self, kind: &str, listener: &Listener) -> bool {
        self.shared.registry.unsubscribe(kind, listener)
    }

    /// Snapshot of connection and listener state
    pub fn stats(&self) -> LinkStats {
        let registry = &self.shared.registry;
        LinkStats {
            connected: self.is_connected(),
            reconnect_attempts: self.reconnect_attempts(),
            listeners: registry.listener_counts(),
            total_listeners: registry.total_listeners(),
        }
    }

    /// Send an envelope to the server
    pub fn send(&self, kind: &str, data: Value) -> Result<(), LinkError> {
        let text = codec::encode(&Envelope::new(kind, data))?;
        self.send_text(text)
    }

    /// Send a raw text frame to the server
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }

        let driver = self.driver_slot();
        let handle = driver.as_ref().ok_or(LinkError::NotConnected)?;
        handle
            .control
            .send(Control::Send(text.into()))
            .map_err(|_| LinkError::NotConnected)
    }
}

/// Driver loop: connect, run the open connection, reconnect on unexpected close
async fn run_link<C: TransportConnector>(
    shared: Arc<Shared<C>>,
    address: String,
    mut control: mpsc::UnboundedReceiver<Control>,
) {
    let policy = shared.config.reconnect_policy();

    loop {
        shared.apply(LinkEvent::ConnectRequested);
        info!("Connecting to {} via {}", address, shared.connector.name());

        let connected = tokio::select! {
            result = shared.connector.connect(&address) => result,
            () = wait_for_shutdown(&mut control) => {
                shared.apply(LinkEvent::CloseRequested);
                return;
            }
        };

        match connected {
            Ok(stream) => match run_open(&shared, stream, &mut control).await {
                LinkExit::Shutdown => return,
                LinkExit::Closed(close) if close.clean => {
                    info!("Connection to {} closed cleanly (code {})", address, close.code);
                    return;
                }
                LinkExit::Closed(close) => {
                    warn!("Connection to {} lost (code {}): {}", address, close.code, close.reason);
                }
            },
            Err(e) => {
                warn!("Failed to connect to {}: {:#}", address, e);
                shared.apply(LinkEvent::ConnectFailed);
                shared.emit(kinds::ERROR, json!({ "error": format!("{:#}", e) }));
                // A refused attempt is an unclean close of a link that never opened
                shared.emit(kinds::CONNECTED, json!({ "connected": false }));
            }
        }

        let decision = shared.status_mut().reconnect.next(&policy);
        match decision {
            ReconnectDecision::Exhausted { attempts } => {
                error!("Max reconnect attempts ({}) reached for {}", attempts, address);
                shared.emit(
                    kinds::RECONNECT_FAILED,
                    json!({
                        "message": format!(
                            "Failed to reconnect to server after {} attempts. \
                             Reconnect manually or restart.",
                            attempts
                        )
                    }),
                );
                return;
            }
            ReconnectDecision::Retry { attempt, delay } => {
                info!(
                    "Reconnecting to {} in {:?} (attempt {}/{})",
                    address, delay, attempt, policy.max_attempts
                );
                tokio::select! {
                    () = sleep(delay) => {}
                    () = wait_for_shutdown(&mut control) => return,
                }
            }
        }
    }
}

/// Run one open connection until it closes or a disconnect is requested
async fn run_open<C: TransportConnector>(
    shared: &Shared<C>,
    mut stream: C::Stream,
    control: &mut mpsc::UnboundedReceiver<Control>,
) -> LinkExit {
    shared.apply(LinkEvent::Opened);
    shared.status_mut().reconnect.reset();
    info!("Connection open");
    shared.emit(kinds::CONNECTED, json!({ "connected": true }));

    let config = &shared.config;
    let mut heartbeat = Heartbeat::new(config.heartbeat_interval, config.pong_timeout);
    let mut ticker = heartbeat.ticker();

    let exit = loop {
        let deadline = heartbeat.deadline();

        tokio::select! {
            _ = ticker.tick() => {
                trace!("Sending heartbeat");
                match stream.send_text(codec::PING_FRAME.to_owned()).await {
                    Ok(()) => heartbeat.record_ping(Instant::now()),
                    Err(e) => warn!("Failed to send heartbeat: {:#}", e),
                }
            }

            () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                warn!("No heartbeat reply within {:?}, dropping connection", config.pong_timeout);
                break LinkExit::Closed(CloseInfo::abnormal("Heartbeat reply deadline missed"));
            }

            event = stream.next_event() => match event {
                TransportEvent::Message(text) => shared.handle_frame(&text, &mut heartbeat),
                TransportEvent::Error(e) => {
                    error!("Transport error: {}", e);
                    shared.emit(kinds::ERROR, json!({ "error": e }));
                }
                TransportEvent::Closed(close) => break LinkExit::Closed(close),
            },

            command = control.recv() => match command {
                Some(Control::Send(text)) => {
                    if let Err(e) = stream.send_text(text).await {
                        warn!("Failed to send frame: {:#}", e);
                    }
                }
                Some(Control::Disconnect) | None => {
                    shared.apply(LinkEvent::CloseRequested);
                    let closed = stream
                        .close(timing::NORMAL_CLOSURE, "Client closing connection")
                        .await;
                    if let Err(e) = closed {
                        debug!("Close handshake failed: {:#}", e);
                    }
                    break LinkExit::Shutdown;
                }
            },
        }
    };

    // Dropping the stream and ticker stops the heartbeat with the connection
    drop(ticker);
    drop(stream);
    shared.apply(LinkEvent::Closed);
    info!("Connection closed");
    shared.emit(kinds::CONNECTED, json!({ "connected": false }));

    exit
}

/// Resolve once a disconnect is requested or the manager is dropped,
/// discarding frames queued while not open
async fn wait_for_shutdown(control: &mut mpsc::UnboundedReceiver<Control>) {
    while let Some(command) = control.recv().await {
        match command {
            Control::Send(_) => warn!("Dropping outbound frame: link is not open"),
            Control::Disconnect => return,
        }
    }
}
