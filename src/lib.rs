// ABOUTME: Main library entry point for vigil
// ABOUTME: Exports the resilient channel client, its transports, and the message envelope

//! # vigil
//!
//! Resilient real-time channel client for streaming live detection events
//! (per-frame fire/smoke alerts, camera status, stream control) from a backend
//! service over a WebSocket that may drop, stall, or fail to establish.
//!
//! The [`Channel`] reconnects on its own with a fixed-delay, bounded retry
//! policy, queues outbound messages while disconnected, and fans inbound
//! messages out to any number of registered handlers.

#![warn(missing_docs)]

/// Resilient channel state machine, queue, reconnect policy and handler registry
pub mod channel;
/// Channel and reconnect configuration
pub mod config;
/// Wire message envelope and typed events
pub mod protocol;
/// Transport abstraction and the WebSocket implementation
pub mod transport;

pub use channel::{Channel, ChannelBuilder, ChannelState, HandlerId};
pub use config::{ChannelConfig, ReconnectConfig};
pub use protocol::messages::{Envelope, Event};
pub use transport::websocket::WsTransport;
pub use transport::{CloseInfo, Connection, EventSink, Transport};

/// Result type for vigil operations
pub type Result<T> = std::result::Result<T, error::Error>;

/// Error types for vigil
pub mod error {
    use thiserror::Error;

    /// Error types for vigil operations
    #[derive(Error, Debug)]
    pub enum Error {
        /// WebSocket-related error
        #[error("WebSocket error: {0}")]
        WebSocket(String),

        /// Protocol violation or parsing error
        #[error("Protocol error: {0}")]
        Protocol(String),

        /// Invalid message format received
        #[error("Invalid message format: {0}")]
        InvalidMessage(String),

        /// Connection-related error
        #[error("Connection error: {0}")]
        Connection(String),

        /// No async runtime available to host timers and transport tasks
        #[error("Runtime error: {0}")]
        Runtime(String),
    }
}
