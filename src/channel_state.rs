// file: src/channel_state.rs
// description: connection state owned by the live channel and its lifecycle transitions

use crate::{error::ChannelError, message::ChannelMessage};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    /// Short label for status indicators
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Offline",
            ConnectionStatus::Connecting => "Connecting",
            ConnectionStatus::Connected => "Live",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Observable view of a channel's connection.
///
/// Only the channel mutates this; consumers get clones through
/// [`LiveChannel::state`](crate::channel::LiveChannel::state) or the watch receiver.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub error: Option<String>,
    /// Consecutive reconnect attempts since the last successful connect
    pub connection_attempts: u32,
    pub last_message: Option<Arc<ChannelMessage>>,
    pub connection_id: Option<String>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.status == ConnectionStatus::Connecting
    }

    pub fn is_disconnected(&self) -> bool {
        self.status == ConnectionStatus::Disconnected
    }

    pub fn begin_connecting(&mut self) {
        self.status = ConnectionStatus::Connecting;
        self.error = None;
        self.connection_id = None;
    }

    pub fn reset_connection(&mut self) {
        self.status = ConnectionStatus::Connected;
        self.error = None;
        self.connection_attempts = 0;
        self.connection_id = Some(uuid::Uuid::new_v4().to_string());
    }

    /// Drop to `Disconnected`, keeping the attempt counter for the reconnect decision.
    pub fn connection_lost(&mut self, error: Option<String>) {
        self.status = ConnectionStatus::Disconnected;
        self.connection_id = None;
        if error.is_some() {
            self.error = error;
        }
    }

    pub fn increment_reconnect(&mut self) -> u32 {
        self.connection_attempts += 1;
        self.connection_attempts
    }

    pub fn disconnect(&mut self) {
        self.status = ConnectionStatus::Disconnected;
        self.connection_attempts = 0;
        self.connection_id = None;
    }

    pub fn record_message(&mut self, message: Arc<ChannelMessage>) {
        self.last_message = Some(message);
    }

    /// Record the terminal failure once the reconnect budget is spent
    pub fn mark_exhausted(&mut self) {
        self.error = Some(ChannelError::MaxReconnectsExceeded.to_string());
    }

    /// Disconnected with the reconnect budget spent; only an explicit connect recovers
    pub fn is_exhausted(&self) -> bool {
        self.is_disconnected()
            && self
                .error
                .as_ref()
                .is_some_and(|e| *e == ChannelError::MaxReconnectsExceeded.to_string())
    }
}

/// Lifetime counters kept next to the connection state.
#[derive(Debug, Clone, Default)]
pub struct ChannelStats {
    pub messages_delivered: u64,
    pub messages_dropped: u64,
    pub messages_sent: u64,
    pub reconnects: u64,
    pub last_message_time: Option<DateTime<Utc>>,
    pub connected_since: Option<DateTime<Utc>>,
}
