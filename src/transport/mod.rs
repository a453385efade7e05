// ABOUTME: Transport abstraction driven by the resilient channel
// ABOUTME: Transport/Connection traits plus the generation-bound EventSink callback bundle

/// WebSocket transport built on tokio-tungstenite
pub mod websocket;

pub use websocket::WsTransport;

use crate::channel::ChannelInner;
use crate::error::Error;
use std::fmt;
use std::sync::{Arc, Weak};

/// Close code for a graceful, caller-initiated closure
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code reported when the connection dropped without a close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// Reason sent alongside [`NORMAL_CLOSURE`]
pub const NORMAL_CLOSURE_REASON: &str = "Normal closure";

/// Details of a transport closure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close code (RFC 6455 numbering)
    pub code: u16,
    /// Close reason, possibly empty
    pub reason: String,
    /// Whether the closing handshake completed
    pub was_clean: bool,
}

impl CloseInfo {
    /// A completed closing handshake with the given code
    pub fn clean(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            was_clean: true,
        }
    }

    /// An abrupt drop or failed establishment
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: ABNORMAL_CLOSURE,
            reason: reason.into(),
            was_clean: false,
        }
    }

    /// Clean handshake or a normal-closure code; never retried
    pub fn is_clean(&self) -> bool {
        self.was_clean || self.code == NORMAL_CLOSURE
    }
}

/// Factory for connection handles
///
/// `open` starts establishing a connection and returns immediately. Progress
/// is reported later through the supplied [`EventSink`]. Returning an error
/// means the attempt could not even be started, and the channel treats it as
/// an unexpected closure.
///
/// Every handle that is still attached must eventually report exactly one
/// [`EventSink::closed`]. Implementations must not hold locks of their own
/// while calling into the sink.
pub trait Transport: Send + Sync + 'static {
    /// Begin connecting to `endpoint`
    fn open(&self, endpoint: &str, events: EventSink) -> Result<Box<dyn Connection>, Error>;
}

/// A single live (or establishing) connection
///
/// `send` is called with the channel's state lock held. Neither method may
/// call back into the channel or the sink.
pub trait Connection: Send {
    /// Transmit one encoded frame
    fn send(&mut self, frame: String) -> Result<(), Error>;

    /// Start a graceful close
    fn close(&mut self, code: u16, reason: &str);
}

/// Event callbacks bound to one connection attempt
///
/// Each call to [`Transport::open`] gets a sink tagged with that attempt's
/// generation. As soon as the channel retires the attempt (explicit close,
/// a reported closure, or a newer attempt) the sink is detached and every
/// method becomes a no-op, so a stale handle can never drive the channel.
#[derive(Clone)]
pub struct EventSink {
    channel: Weak<ChannelInner>,
    generation: u64,
}

impl EventSink {
    pub(crate) fn new(channel: &Arc<ChannelInner>, generation: u64) -> Self {
        Self {
            channel: Arc::downgrade(channel),
            generation,
        }
    }

    /// Sink that is not bound to any channel
    pub fn detached() -> Self {
        Self {
            channel: Weak::new(),
            generation: 0,
        }
    }

    /// Connection attempt this sink belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether events sent through this sink still reach the channel
    pub fn is_attached(&self) -> bool {
        self.channel
            .upgrade()
            .map(|inner| inner.is_current(self.generation))
            .unwrap_or(false)
    }

    /// The connection is established
    pub fn opened(&self) {
        if let Some(inner) = self.channel.upgrade() {
            inner.on_open(self.generation);
        }
    }

    /// A raw text frame arrived
    pub fn message(&self, raw: &str) {
        if let Some(inner) = self.channel.upgrade() {
            inner.on_message(self.generation, raw);
        }
    }

    /// The connection is gone
    pub fn closed(&self, info: CloseInfo) {
        if let Some(inner) = self.channel.upgrade() {
            inner.on_close(self.generation, info);
        }
    }

    /// The transport hit an error; a `closed` event follows
    pub fn errored(&self, error: &Error) {
        if let Some(inner) = self.channel.upgrade() {
            inner.on_error(self.generation, error);
        }
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("generation", &self.generation)
            .field("attached", &self.is_attached())
            .finish()
    }
}
