// file: src/events.rs
// description: Lifecycle events so presentation code can follow the channel without polling
use crate::message::ChannelMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Connecting { endpoint: String, attempt: u32 },
    Connected { connection_id: String },
    MessageReceived(Arc<ChannelMessage>),
    MessageDropped { reason: String },
    MessageSent { bytes: usize },
    ConnectionFailed(String),
    TransportError(String),
    Reconnecting { attempt: u32, delay: Duration },
    ReconnectsExhausted { attempts: u32 },
    Disconnected,
}

// Events past capacity are dropped
const EVENT_CHANNEL_CAPACITY: usize = 1_024;

pub type EventSender = mpsc::Sender<ChannelEvent>;
pub type EventReceiver = mpsc::Receiver<ChannelEvent>;

pub fn create_event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}
