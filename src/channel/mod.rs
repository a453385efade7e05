// ABOUTME: Resilient channel client for the live detection stream
// ABOUTME: State machine over one transport handle, with queueing, reconnects and fan-out

/// Outbound queue for frames issued while disconnected
pub mod queue;
/// Fixed-delay reconnect policy and timer slot
pub mod reconnect;
/// Inbound handler registry
pub mod registry;
/// Lifecycle state enum
pub mod state;

pub use registry::{Handler, HandlerId};
pub use state::ChannelState;

use crate::config::{ChannelConfig, ReconnectConfig};
use crate::error::Error;
use crate::protocol::messages::Envelope;
use crate::transport::{
    CloseInfo, Connection, EventSink, Transport, NORMAL_CLOSURE, NORMAL_CLOSURE_REASON,
};
use parking_lot::Mutex;
use queue::OutboundQueue;
use reconnect::{Decision, ReconnectPolicy};
use registry::HandlerRegistry;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Who asked for a connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cause {
    /// `connect()` or a send that implies it
    Caller,
    /// The reconnect timer
    Retry,
}

/// Everything guarded by the state lock
struct Core {
    state: ChannelState,
    /// Bumped whenever the current handle is retired; sinks from older
    /// generations are detached
    generation: u64,
    connection: Option<Box<dyn Connection>>,
    queue: OutboundQueue,
    reconnect: ReconnectPolicy,
    close_intent: bool,
}

impl Core {
    /// Send every queued frame, oldest first
    ///
    /// Runs under the state lock, so frames sent by other callers wait until
    /// the backlog is out. Does nothing until the handle is attached.
    fn flush(&mut self, endpoint: &str) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };

        if self.queue.is_empty() {
            return;
        }

        let pending = self.queue.len();
        while let Some(frame) = self.queue.pop() {
            if let Err(e) = connection.send(frame) {
                log::error!("Failed to send queued message to {}: {}", endpoint, e);
            }
        }
        log::debug!("Flushed {} queued message(s) to {}", pending, endpoint);
    }
}

/// Shared channel internals; transports reach it through [`EventSink`]
pub(crate) struct ChannelInner {
    endpoint: String,
    transport: Arc<dyn Transport>,
    runtime: Handle,
    core: Mutex<Core>,
    handlers: Mutex<HandlerRegistry>,
}

/// Resilient real-time channel client
///
/// Owns at most one transport connection at a time. Cloning is cheap and
/// every clone drives the same channel.
///
/// No operation blocks or returns an error: outcomes are observed through
/// [`Channel::state`], [`Channel::is_connected`] and the logs.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

/// Builder for [`Channel`]
pub struct ChannelBuilder {
    endpoint: String,
    transport: Arc<dyn Transport>,
    reconnect: ReconnectConfig,
}

impl ChannelBuilder {
    /// Override the reconnect policy
    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Take endpoint and reconnect policy from a [`ChannelConfig`]
    pub fn config(mut self, config: ChannelConfig) -> Self {
        self.endpoint = config.endpoint;
        self.reconnect = config.reconnect;
        self
    }

    /// Build the channel on the current tokio runtime
    ///
    /// Fails when called outside a runtime, since reconnect timers need one.
    pub fn build(self) -> Result<Channel, Error> {
        let runtime = Handle::try_current().map_err(|e| Error::Runtime(e.to_string()))?;
        Ok(self.build_on(runtime))
    }

    /// Build the channel on an explicit runtime
    pub fn build_on(self, runtime: Handle) -> Channel {
        log::debug!(
            "Channel for {} (max {} reconnects, {}ms apart)",
            self.endpoint,
            self.reconnect.max_attempts,
            self.reconnect.delay_ms
        );

        Channel {
            inner: Arc::new(ChannelInner {
                endpoint: self.endpoint,
                transport: self.transport,
                runtime,
                core: Mutex::new(Core {
                    state: ChannelState::Idle,
                    generation: 0,
                    connection: None,
                    queue: OutboundQueue::new(),
                    reconnect: ReconnectPolicy::new(self.reconnect),
                    close_intent: false,
                }),
                handlers: Mutex::new(HandlerRegistry::new()),
            }),
        }
    }
}

impl Channel {
    /// Start building a channel to `endpoint` over `transport`
    pub fn builder(endpoint: impl Into<String>, transport: impl Transport) -> ChannelBuilder {
        ChannelBuilder {
            endpoint: endpoint.into(),
            transport: Arc::new(transport),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Channel with the default reconnect policy on the current runtime
    pub fn new(endpoint: impl Into<String>, transport: impl Transport) -> Result<Self, Error> {
        Self::builder(endpoint, transport).build()
    }

    /// Target endpoint address
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Request a connection
    ///
    /// No-op while connecting. When already open, flushes anything still
    /// queued. Otherwise starts a fresh attempt, cancelling a pending
    /// reconnect timer; after a terminal close this starts a new retry cycle.
    pub fn connect(&self) {
        self.inner.connect(Cause::Caller);
    }

    /// Serialize `message` and transmit or queue it
    ///
    /// While not open the frame is queued and, when nothing is in flight and
    /// the channel was not closed by its owner, a connection attempt starts.
    /// Serialization failures are logged and the message dropped.
    pub fn send<M>(&self, message: &M)
    where
        M: Serialize + ?Sized,
    {
        match serde_json::to_string(message) {
            Ok(frame) => self.send_raw(frame),
            Err(e) => log::error!("Failed to serialize outbound message: {}", e),
        }
    }

    /// Transmit or queue an already-encoded frame
    pub fn send_raw(&self, frame: String) {
        let should_connect = {
            let mut core = self.inner.core.lock();

            if core.state == ChannelState::Open {
                if let Some(connection) = core.connection.as_mut() {
                    if let Err(e) = connection.send(frame) {
                        log::error!("Failed to send message to {}: {}", self.inner.endpoint, e);
                    }
                    return;
                }
            }

            core.queue.push(frame);
            log::debug!(
                "Channel {}, queued message ({} pending)",
                core.state,
                core.queue.len()
            );

            core.state.send_triggers_connect()
                && !core.close_intent
                && !core.reconnect.is_pending()
        };

        if should_connect {
            self.inner.connect(Cause::Caller);
        }
    }

    /// Register an inbound message handler
    ///
    /// Handlers run in registration order on the task that delivered the
    /// message and borrow the same parsed [`Envelope`]. A handler added
    /// during a dispatch pass first sees the next message.
    pub fn add_handler<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.inner.handlers.lock().add(Arc::new(handler))
    }

    /// Unregister a handler; returns whether it was registered
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.inner.handlers.lock().remove(id)
    }

    /// Number of registered handlers
    pub fn handler_count(&self) -> usize {
        self.inner.handlers.lock().len()
    }

    /// Shut the channel down
    ///
    /// Idempotent. Cancels any reconnect timer, detaches and gracefully
    /// closes the live handle, and leaves the channel Closed. Queued frames
    /// are kept; sends after this only queue until `connect()` is called.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Whether the channel is open right now
    pub fn is_connected(&self) -> bool {
        self.inner.core.lock().state == ChannelState::Open
    }

    /// Current lifecycle state
    pub fn state(&self) -> ChannelState {
        self.inner.core.lock().state
    }

    /// Reconnect attempts since the last successful open
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.core.lock().reconnect.attempts()
    }

    /// Whether a reconnect timer is armed
    pub fn reconnect_pending(&self) -> bool {
        self.inner.core.lock().reconnect.is_pending()
    }

    /// Number of frames waiting for the next open
    pub fn queued(&self) -> usize {
        self.inner.core.lock().queue.len()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.inner.core.lock();
        f.debug_struct("Channel")
            .field("endpoint", &self.inner.endpoint)
            .field("state", &core.state)
            .field("queued", &core.queue.len())
            .field("reconnect_attempts", &core.reconnect.attempts())
            .finish()
    }
}

impl ChannelInner {
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.core.lock().generation == generation
    }

    fn connect(self: &Arc<Self>, cause: Cause) {
        let generation = {
            let mut core = self.core.lock();
            match self.begin_connect(&mut core, cause) {
                Some(generation) => generation,
                None => return,
            }
        };

        self.open(generation);
    }

    /// Move to Connecting under the lock
    ///
    /// Returns the new generation, or `None` when no attempt should start.
    fn begin_connect(&self, core: &mut Core, cause: Cause) -> Option<u64> {
        match core.state {
            ChannelState::Open => {
                log::debug!("Already connected to {}", self.endpoint);
                core.flush(&self.endpoint);
                return None;
            }
            ChannelState::Connecting => {
                log::debug!("Connection to {} already in progress", self.endpoint);
                return None;
            }
            _ => {}
        }

        if cause == Cause::Caller && !core.reconnect.is_pending() {
            core.reconnect.reset();
        }

        core.reconnect.cancel();
        core.close_intent = false;
        core.generation += 1;
        core.connection = None;
        core.state = ChannelState::Connecting;

        log::info!("Connecting to {}", self.endpoint);
        Some(core.generation)
    }

    /// Ask the transport for a handle; runs without the state lock
    fn open(self: &Arc<Self>, generation: u64) {
        let sink = EventSink::new(self, generation);

        match self.transport.open(&self.endpoint, sink) {
            Ok(connection) => self.attach(generation, connection),
            Err(e) => {
                log::error!("Failed to create connection to {}: {}", self.endpoint, e);
                self.on_close(generation, CloseInfo::abnormal(e.to_string()));
            }
        }
    }

    fn attach(&self, generation: u64, mut connection: Box<dyn Connection>) {
        {
            let mut core = self.core.lock();
            if core.generation == generation {
                core.connection = Some(connection);
                if core.state == ChannelState::Open {
                    core.flush(&self.endpoint);
                }
                return;
            }
        }

        log::debug!("Discarding abandoned connection attempt to {}", self.endpoint);
        connection.close(NORMAL_CLOSURE, NORMAL_CLOSURE_REASON);
    }

    /// Connecting → Open
    pub(crate) fn on_open(&self, generation: u64) {
        let mut core = self.core.lock();
        if core.generation != generation {
            return;
        }
        if core.state != ChannelState::Connecting {
            log::warn!("Ignoring open signal while {}", core.state);
            return;
        }

        log::info!("Connected to {}", self.endpoint);
        core.state = ChannelState::Open;
        core.reconnect.reset();
        core.reconnect.cancel();
        core.flush(&self.endpoint);
    }

    pub(crate) fn on_message(&self, generation: u64, raw: &str) {
        if !self.is_current(generation) {
            return;
        }

        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::error!("Discarding inbound message from {}: {}", self.endpoint, e);
                return;
            }
        };

        let handlers = self.handlers.lock().snapshot();
        log::trace!(
            "Dispatching {} to {} handler(s)",
            envelope.kind,
            handlers.len()
        );
        for handler in handlers {
            handler(&envelope);
        }
    }

    pub(crate) fn on_error(&self, generation: u64, error: &Error) {
        if self.is_current(generation) {
            log::error!("Connection to {} failed: {}", self.endpoint, error);
        }
    }

    /// Connecting/Open → Closed, retrying unless the closure was expected
    pub(crate) fn on_close(self: &Arc<Self>, generation: u64, info: CloseInfo) {
        let mut core = self.core.lock();
        if core.generation != generation {
            return;
        }

        core.generation += 1;
        core.connection = None;
        core.state = ChannelState::Closed;

        log::info!(
            "Connection to {} closed (code {}, reason {:?}, clean {}, requested {})",
            self.endpoint,
            info.code,
            info.reason,
            info.was_clean,
            core.close_intent
        );

        if core.close_intent || info.is_clean() {
            core.reconnect.cancel();
            return;
        }

        self.schedule_reconnect(&mut core);
    }

    fn schedule_reconnect(self: &Arc<Self>, core: &mut Core) {
        match core.reconnect.decide() {
            Decision::Exhausted => {
                log::error!(
                    "Giving up on {} after {} reconnect attempt(s)",
                    self.endpoint,
                    core.reconnect.attempts()
                );
                core.reconnect.cancel();
            }
            Decision::Retry { attempt, delay } => {
                log::info!(
                    "Reconnecting to {} in {}ms (attempt {}/{})",
                    self.endpoint,
                    delay.as_millis(),
                    attempt,
                    core.reconnect.config().max_attempts
                );

                let token = core.reconnect.next_token();
                let weak = Arc::downgrade(self);
                let handle = self.runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(inner) = weak.upgrade() {
                        inner.fire_reconnect(token);
                    }
                });
                core.reconnect.arm(token, handle);
            }
        }
    }

    fn fire_reconnect(self: &Arc<Self>, token: u64) {
        let generation = {
            let mut core = self.core.lock();
            if !core.reconnect.claim(token) {
                return;
            }
            match self.begin_connect(&mut core, Cause::Retry) {
                Some(generation) => generation,
                None => return,
            }
        };

        self.open(generation);
    }

    fn close(&self) {
        let (mut connection, generation) = {
            let mut core = self.core.lock();
            core.close_intent = true;
            core.reconnect.cancel();

            let Some(connection) = core.connection.take() else {
                if core.state != ChannelState::Closed {
                    log::info!("Closing channel to {}", self.endpoint);
                    core.generation += 1;
                    core.state = ChannelState::Closed;
                }
                return;
            };

            log::info!("Closing connection to {}", self.endpoint);
            core.generation += 1;
            core.state = ChannelState::Closing;
            (connection, core.generation)
        };

        connection.close(NORMAL_CLOSURE, NORMAL_CLOSURE_REASON);
        drop(connection);

        let mut core = self.core.lock();
        if core.generation == generation && core.state == ChannelState::Closing {
            core.state = ChannelState::Closed;
        }
    }
}
