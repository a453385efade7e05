// ABOUTME: Connection lifecycle state for the resilient channel
// ABOUTME: Idle, Connecting, Open, Closing, Closed and the guards derived from them

use std::fmt;

/// Channel lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// Constructed, never connected
    Idle,
    /// A connection attempt is in flight
    Connecting,
    /// Connected; sends go straight to the transport
    Open,
    /// A caller-initiated close is handing the handle back to the transport
    Closing,
    /// No connection. A reconnect timer may still be armed
    Closed,
}

impl ChannelState {
    /// Whether a new connection attempt may start from this state
    pub fn can_connect(self) -> bool {
        matches!(
            self,
            ChannelState::Idle | ChannelState::Closing | ChannelState::Closed
        )
    }

    /// Whether a send should trigger a connection attempt from this state
    pub fn send_triggers_connect(self) -> bool {
        matches!(self, ChannelState::Idle | ChannelState::Closed)
    }

    /// Short lowercase name used in logs
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelState::Idle => "idle",
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "open",
            ChannelState::Closing => "closing",
            ChannelState::Closed => "closed",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
