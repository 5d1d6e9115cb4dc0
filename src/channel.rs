// file: src/channel.rs
// description: reconnecting publish/subscribe channel that stands in for a live market data feed

use crate::{
    channel_state::{ChannelStats, ConnectionState},
    config::ChannelConfig,
    error::ChannelError,
    events::{ChannelEvent, EventSender},
    message::ChannelMessage,
    monitoring::{
        CONNECTED_GAUGE, HealthStatus, MESSAGES_DROPPED_COUNTER, MESSAGES_RECEIVED_COUNTER,
        MESSAGES_SENT_COUNTER, RECONNECT_COUNTER,
    },
    subscribers::{MessageHandler, SubscriberRegistry, Subscription},
    transport::{SimulatedTransport, Transport, TransportEvent, WebSocketTransport},
};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

type Hook = Box<dyn Fn() + Send + Sync>;
type ErrorHook = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct ChannelHooks {
    on_connect: Option<Hook>,
    on_disconnect: Option<Hook>,
    on_error: Option<ErrorHook>,
    on_message: Option<MessageHandler>,
}

/// Aborts the wrapped task when dropped.
struct TaskGuard(Option<JoinHandle<()>>);

impl TaskGuard {
    fn new(handle: JoinHandle<()>) -> Self {
        Self(Some(handle))
    }

    /// Release without aborting; the task finishes on its own
    fn disarm(mut self) {
        self.0.take();
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

struct Inner {
    state: ConnectionState,
    stats: ChannelStats,
    session: Option<TaskGuard>,
    reconnect: Option<TaskGuard>,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

struct Shared {
    config: ChannelConfig,
    transport: Arc<dyn Transport>,
    runtime: Handle,
    /// Bumped, under the `inner` lock, by every transition that invalidates in-flight
    /// tasks. A task only mutates state or invokes callbacks while the generation it
    /// was spawned with is still current.
    generation: AtomicU64,
    inner: Mutex<Inner>,
    subscribers: Arc<SubscriberRegistry>,
    hooks: ChannelHooks,
    state_tx: watch::Sender<ConnectionState>,
    events: Option<EventSender>,
}

/// Live data channel.
///
/// Presents the contract of a streaming connection (connect, disconnect, subscribe,
/// send, bounded automatic reconnection) over any [`Transport`]. None of the public
/// operations return errors or panic on connection problems; failures are exposed
/// through [`ConnectionState::error`], the error hook and the event stream.
///
/// Dropping the channel disconnects it.
pub struct LiveChannel {
    shared: Arc<Shared>,
}

pub struct LiveChannelBuilder {
    config: ChannelConfig,
    transport: Option<Arc<dyn Transport>>,
    hooks: ChannelHooks,
    events: Option<EventSender>,
}

impl LiveChannelBuilder {
    /// Use a specific transport instead of the one selected by `config.simulation`
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn on_connect(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.on_connect = Some(Box::new(hook));
        self
    }

    pub fn on_disconnect(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.on_disconnect = Some(Box::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.hooks.on_error = Some(Box::new(hook));
        self
    }

    pub fn on_message(mut self, hook: impl Fn(&ChannelMessage) + Send + Sync + 'static) -> Self {
        self.hooks.on_message = Some(Arc::new(hook));
        self
    }

    pub fn events(mut self, sender: EventSender) -> Self {
        self.events = Some(sender);
        self
    }

    /// Must be called from within a tokio runtime; the channel spawns its tasks there.
    pub fn build(self) -> Result<LiveChannel, ChannelError> {
        self.config.validate()?;
        let runtime = Handle::try_current().map_err(|_| ChannelError::NoRuntime)?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None if self.config.simulation => Arc::new(SimulatedTransport::new(
                self.config.simulation_timing.clone(),
            )),
            None => Arc::new(WebSocketTransport::new(self.config.url.clone())),
        };
        debug!("Live channel using transport {}", transport.endpoint());

        let (state_tx, _) = watch::channel(ConnectionState::new());
        Ok(LiveChannel {
            shared: Arc::new(Shared {
                config: self.config,
                transport,
                runtime,
                generation: AtomicU64::new(0),
                inner: Mutex::new(Inner {
                    state: ConnectionState::new(),
                    stats: ChannelStats::default(),
                    session: None,
                    reconnect: None,
                    outbound: None,
                }),
                subscribers: Arc::new(SubscriberRegistry::new()),
                hooks: self.hooks,
                state_tx,
                events: self.events,
            }),
        })
    }
}

impl LiveChannel {
    pub fn builder(config: ChannelConfig) -> LiveChannelBuilder {
        LiveChannelBuilder {
            config,
            transport: None,
            hooks: ChannelHooks::default(),
            events: None,
        }
    }

    pub fn new(config: ChannelConfig) -> Result<Self, ChannelError> {
        Self::builder(config).build()
    }

    /// Start connecting. Returns immediately; a no-op while connecting or connected.
    ///
    /// An explicit connect cancels any pending automatic reconnect and resets the
    /// attempt counter, so it also recovers from an exhausted reconnect budget.
    pub fn connect(&self) {
        let mut inner = self.shared.inner.lock();
        if !inner.state.is_disconnected() {
            debug!("connect() ignored while {}", inner.state.status);
            return;
        }

        inner.reconnect = None;
        inner.state.connection_attempts = 0;
        self.shared.begin_session(&mut inner);
    }

    /// Tear down the connection and cancel every pending timer. Safe in any state.
    ///
    /// An open connection is closed in the background (close frame on a websocket),
    /// bounded by a one second timeout; a connection still being opened is abandoned.
    /// No callback fires for this channel's old connection once this returns.
    pub fn disconnect(&self) {
        self.shared.shutdown();
    }

    /// Queue `payload` as a JSON text frame. Returns `false` when not connected or
    /// when the payload cannot be serialized.
    pub fn send_message<T: Serialize + ?Sized>(&self, payload: &T) -> bool {
        self.shared.send(payload)
    }

    /// Register a handler invoked once per delivered message. Takes effect from the
    /// next message on.
    pub fn subscribe(
        &self,
        handler: impl Fn(&ChannelMessage) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.shared.subscribers.register(Arc::new(handler));
        Subscription::new(id, &self.shared.subscribers)
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.len()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state.clone()
    }

    /// Receiver that observes every state change
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.inner.lock().state.is_connected()
    }

    pub fn is_connecting(&self) -> bool {
        self.shared.inner.lock().state.is_connecting()
    }

    pub fn error(&self) -> Option<String> {
        self.shared.inner.lock().state.error.clone()
    }

    pub fn last_message(&self) -> Option<Arc<ChannelMessage>> {
        self.shared.inner.lock().state.last_message.clone()
    }

    pub fn stats(&self) -> ChannelStats {
        self.shared.inner.lock().stats.clone()
    }

    pub fn health(&self) -> HealthStatus {
        let inner = self.shared.inner.lock();
        HealthStatus::from_channel(&inner.state, &inner.stats)
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    pub fn endpoint(&self) -> String {
        self.shared.transport.endpoint()
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl Shared {
    /// Invalidate in-flight tasks. Callers hold the `inner` lock.
    fn advance_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn begin_session(self: &Arc<Self>, inner: &mut Inner) {
        let generation = self.advance_generation();
        inner.state.begin_connecting();
        inner.outbound = None;
        self.publish(inner);

        let endpoint = self.transport.endpoint();
        info!(
            "Connecting to {} (attempt {})",
            endpoint, inner.state.connection_attempts
        );
        self.emit(ChannelEvent::Connecting {
            endpoint,
            attempt: inner.state.connection_attempts,
        });

        let shared = Arc::clone(self);
        let handle = self
            .runtime
            .spawn(async move { shared.run_session(generation).await });
        inner.session = Some(TaskGuard::new(handle));
    }

    async fn run_session(self: Arc<Self>, generation: u64) {
        let mut connection = match self.transport.open().await {
            Ok(connection) => connection,
            Err(e) => {
                self.connection_lost(generation, Some(e.to_string()));
                return;
            }
        };

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        if !self.connection_opened(generation, outbound_tx) {
            connection.close().await;
            return;
        }

        loop {
            tokio::select! {
                event = connection.next_event() => match event {
                    Some(TransportEvent::Text(text)) => self.handle_text(generation, &text),
                    Some(TransportEvent::Error(e)) => self.transport_error(generation, e),
                    None => {
                        self.connection_lost(generation, None);
                        return;
                    }
                },
                outbound = outbound_rx.recv() => match outbound {
                    Some(text) => {
                        if let Err(e) = connection.send(text).await {
                            warn!("Failed to send message: {}", e);
                        }
                    }
                    // The queue is dropped on disconnect
                    None => {
                        if timeout(CLOSE_TIMEOUT, connection.close()).await.is_err() {
                            debug!("Close handshake timed out");
                        }
                        return;
                    }
                },
            }
        }
    }

    fn connection_opened(&self, generation: u64, outbound: mpsc::UnboundedSender<String>) -> bool {
        let connection_id = {
            let mut inner = self.inner.lock();
            if !self.is_current(generation) {
                return false;
            }
            inner.state.reset_connection();
            inner.stats.connected_since = Some(Utc::now());
            inner.outbound = Some(outbound);
            self.publish(&inner);
            inner.state.connection_id.clone().unwrap_or_default()
        };

        CONNECTED_GAUGE.set(1.0);
        info!(connection_id = %connection_id, "Connected to {}", self.transport.endpoint());
        self.emit(ChannelEvent::Connected { connection_id });
        if let Some(hook) = &self.hooks.on_connect {
            hook();
        }
        true
    }

    fn handle_text(&self, generation: u64, text: &str) {
        let message = match ChannelMessage::from_json(text) {
            Ok(message) => Arc::new(message),
            Err(e) => {
                warn!(
                    "Dropping unparseable message: {}. Message: {}",
                    e,
                    text.chars().take(100).collect::<String>()
                );
                MESSAGES_DROPPED_COUNTER.increment(1);
                let mut inner = self.inner.lock();
                if self.is_current(generation) {
                    inner.stats.messages_dropped += 1;
                }
                drop(inner);
                self.emit(ChannelEvent::MessageDropped {
                    reason: e.to_string(),
                });
                return;
            }
        };

        let handlers = {
            let mut inner = self.inner.lock();
            if !self.is_current(generation) || !inner.state.is_connected() {
                debug!("Discarding {} outside a live connection", message.kind());
                return;
            }
            inner.state.record_message(message.clone());
            inner.stats.messages_delivered += 1;
            inner.stats.last_message_time = Some(Utc::now());
            self.publish(&inner);
            self.subscribers.snapshot()
        };

        MESSAGES_RECEIVED_COUNTER.increment(1);
        debug!(
            kind = %message.kind(),
            subscribers = handlers.len(),
            "Delivering message"
        );
        // A callback may disconnect the channel; nothing after that sees the message
        for handler in &handlers {
            if !self.is_current(generation) {
                debug!("Channel disconnected during delivery");
                return;
            }
            handler(&message);
        }
        if let Some(hook) = &self.hooks.on_message
            && self.is_current(generation)
        {
            hook(&message);
        }
        if self.is_current(generation) {
            self.emit(ChannelEvent::MessageReceived(message));
        }
    }

    fn transport_error(&self, generation: u64, reason: String) {
        {
            let mut inner = self.inner.lock();
            if !self.is_current(generation) {
                return;
            }
            inner.state.error = Some(reason.clone());
            self.publish(&inner);
        }

        warn!("Transport error: {}", reason);
        self.emit(ChannelEvent::TransportError(reason.clone()));
        if let Some(hook) = &self.hooks.on_error {
            hook(&reason);
        }
    }

    /// Handles both a failed open (`error` set) and an unexpected close of a live
    /// connection, then applies the reconnect budget.
    fn connection_lost(self: &Arc<Self>, generation: u64, error: Option<String>) {
        let was_connected;
        let exhausted;
        {
            let mut inner = self.inner.lock();
            if !self.is_current(generation) {
                return;
            }
            was_connected = inner.state.is_connected();
            // This runs on the session task itself
            if let Some(session) = inner.session.take() {
                session.disarm();
            }
            inner.outbound = None;
            inner.stats.connected_since = None;
            inner.state.connection_lost(error.clone());

            if inner.state.connection_attempts < self.config.max_reconnect_attempts {
                let attempt = inner.state.increment_reconnect();
                inner.stats.reconnects += 1;
                self.schedule_reconnect(&mut inner, attempt);
                exhausted = false;
            } else {
                inner.state.mark_exhausted();
                exhausted = true;
            }
            self.publish(&inner);
        }

        if was_connected {
            CONNECTED_GAUGE.set(0.0);
            warn!("Connection to {} closed", self.transport.endpoint());
            self.emit(ChannelEvent::Disconnected);
            if let Some(hook) = &self.hooks.on_disconnect {
                hook();
            }
        }
        if let Some(reason) = error {
            warn!("{}", reason);
            self.emit(ChannelEvent::ConnectionFailed(reason.clone()));
            if let Some(hook) = &self.hooks.on_error {
                hook(&reason);
            }
        }
        if exhausted {
            error!(
                "Maximum reconnection attempts ({}) reached",
                self.config.max_reconnect_attempts
            );
            self.emit(ChannelEvent::ReconnectsExhausted {
                attempts: self.config.max_reconnect_attempts,
            });
            if let Some(hook) = &self.hooks.on_error {
                hook(&ChannelError::MaxReconnectsExceeded.to_string());
            }
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, inner: &mut Inner, attempt: u32) {
        let generation = self.advance_generation();
        let delay = self.config.reconnect_interval;

        warn!(
            "Reconnecting in {}ms (attempt {}/{})",
            delay.as_millis(),
            attempt,
            self.config.max_reconnect_attempts
        );
        RECONNECT_COUNTER.increment(1);
        self.emit(ChannelEvent::Reconnecting { attempt, delay });

        let shared = Arc::clone(self);
        let handle = self.runtime.spawn(async move {
            sleep(delay).await;
            shared.reconnect_due(generation);
        });
        inner.reconnect = Some(TaskGuard::new(handle));
    }

    fn reconnect_due(self: &Arc<Self>, generation: u64) {
        let mut inner = self.inner.lock();
        if !self.is_current(generation) || !inner.state.is_disconnected() {
            return;
        }
        // This runs on the reconnect task itself
        if let Some(reconnect) = inner.reconnect.take() {
            reconnect.disarm();
        }
        self.begin_session(&mut inner);
    }

    fn shutdown(&self) {
        let was_disconnected = {
            let mut inner = self.inner.lock();
            self.advance_generation();
            inner.reconnect = None;
            match (inner.session.take(), inner.outbound.take()) {
                // An open session closes its connection once the queue is gone
                (Some(session), Some(_outbound)) => session.disarm(),
                // Still opening: abort
                (session, _) => drop(session),
            }
            inner.stats.connected_since = None;

            let was_disconnected = inner.state.is_disconnected();
            inner.state.disconnect();
            self.publish(&inner);
            was_disconnected
        };

        if !was_disconnected {
            CONNECTED_GAUGE.set(0.0);
            info!("Disconnected from {}", self.transport.endpoint());
            self.emit(ChannelEvent::Disconnected);
            if let Some(hook) = &self.hooks.on_disconnect {
                hook();
            }
        }
    }

    fn send<T: Serialize + ?Sized>(&self, payload: &T) -> bool {
        let text = match serde_json::to_string(payload) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to serialize outbound message: {}", e);
                return false;
            }
        };
        let bytes = text.len();

        {
            let mut inner = self.inner.lock();
            if !inner.state.is_connected() {
                debug!("send_message() while {}", inner.state.status);
                return false;
            }
            let Some(outbound) = inner.outbound.as_ref() else {
                return false;
            };
            if outbound.send(text).is_err() {
                return false;
            }
            inner.stats.messages_sent += 1;
        }

        MESSAGES_SENT_COUNTER.increment(1);
        self.emit(ChannelEvent::MessageSent { bytes });
        true
    }

    fn publish(&self, inner: &Inner) {
        self.state_tx.send_replace(inner.state.clone());
    }

    fn emit(&self, event: ChannelEvent) {
        if let Some(events) = &self.events
            && let Err(e) = events.try_send(event)
        {
            debug!("Dropping channel event: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config() -> ChannelConfig {
        ChannelConfig {
            simulation_timing: SimulationConfig {
                connect_delay_min: Duration::from_millis(1000),
                connect_delay_max: Duration::from_millis(1000),
                message_interval_min: Duration::from_secs(1),
                message_interval_max: Duration::from_secs(1),
                seed: Some(9),
                ..SimulationConfig::default()
            },
            ..ChannelConfig::default()
        }
    }

    const QUOTE: &str = r#"{"type":"price_update","payload":{"symbol":"AAPL","price":100.0,"change":0.0,"changePercent":0.0,"volume":1},"timestamp":"2024-03-01T14:30:00Z"}"#;

    #[tokio::test(start_paused = true)]
    async fn frames_arriving_while_connecting_are_not_delivered() {
        let channel = LiveChannel::new(config()).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let _sub = channel.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        channel.connect();
        assert!(channel.is_connecting());
        let generation = channel.shared.generation.load(Ordering::SeqCst);
        channel.shared.handle_text(generation, QUOTE);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(channel.last_message().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_generation_cannot_deliver() {
        let channel = LiveChannel::new(config()).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let _sub = channel.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        channel.connect();
        sleep(Duration::from_millis(1100)).await;
        assert!(channel.is_connected());

        let generation = channel.shared.generation.load(Ordering::SeqCst);
        channel.shared.handle_text(generation, QUOTE);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        channel.shared.handle_text(generation - 1, QUOTE);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_frame_is_counted_and_dropped() {
        let channel = LiveChannel::new(config()).unwrap();
        channel.connect();
        sleep(Duration::from_millis(1100)).await;

        let generation = channel.shared.generation.load(Ordering::SeqCst);
        channel.shared.handle_text(generation, "{not json");
        assert!(channel.is_connected());
        assert_eq!(channel.stats().messages_dropped, 1);
        assert_eq!(channel.stats().messages_delivered, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_is_recorded_without_closing() {
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = errors.clone();
        let channel = LiveChannel::builder(config())
            .on_error(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();
        channel.connect();
        sleep(Duration::from_millis(1100)).await;

        let generation = channel.shared.generation.load(Ordering::SeqCst);
        channel
            .shared
            .transport_error(generation, "socket hiccup".to_string());
        assert!(channel.is_connected());
        assert_eq!(channel.error().as_deref(), Some("socket hiccup"));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn build_outside_runtime_fails() {
        assert!(matches!(
            LiveChannel::new(ChannelConfig::default()),
            Err(ChannelError::NoRuntime)
        ));
    }
}
