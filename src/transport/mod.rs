// file: src/transport/mod.rs
// description: transport capability the live channel drives, with simulated and websocket adapters

use crate::error::ChannelError;
use async_trait::async_trait;

pub mod simulated;
pub mod websocket;

pub use simulated::SimulatedTransport;
pub use websocket::WebSocketTransport;

/// Something that happened on an open connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Inbound text frame, expected to hold a JSON encoded message
    Text(String),
    /// Transport-level error that does not by itself close the connection
    Error(String),
}

/// Opens connections. Held by the channel for its whole life and asked for a fresh
/// connection on every connect or reconnect.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable endpoint for logs and events
    fn endpoint(&self) -> String;

    async fn open(&self) -> Result<Box<dyn Connection>, ChannelError>;
}

/// A single open connection.
///
/// `next_event` must be cancel safe: the channel polls it inside `select!` alongside
/// the outbound queue. `None` means the connection closed.
#[async_trait]
pub trait Connection: Send {
    async fn next_event(&mut self) -> Option<TransportEvent>;

    async fn send(&mut self, text: String) -> Result<(), ChannelError>;

    async fn close(&mut self);
}
