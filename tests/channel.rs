// Channel lifecycle tests driven on tokio's paused clock.

use async_trait::async_trait;
use parking_lot::Mutex;
use rs_livefeed::{
    ChannelError, ChannelMessage, LiveChannel,
    config::{ChannelConfig, SimulationConfig},
    events::{ChannelEvent, create_event_channel},
    market_feed::MarketFeedView,
    transport::{Connection, SimulatedTransport, Transport, TransportEvent},
};
use std::collections::VecDeque;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;
use tokio::time::sleep;

const QUOTE: &str = r#"{"type":"price_update","payload":{"symbol":"AAPL","price":100.0,"change":0.0,"changePercent":0.0,"volume":1},"timestamp":"2024-03-01T14:30:00Z"}"#;

/// Connect after 500ms, then one message per second.
fn fixed_config() -> ChannelConfig {
    ChannelConfig {
        simulation_timing: SimulationConfig {
            connect_delay_min: Duration::from_millis(500),
            connect_delay_max: Duration::from_millis(500),
            message_interval_min: Duration::from_secs(1),
            message_interval_max: Duration::from_secs(1),
            seed: Some(11),
            ..SimulationConfig::default()
        },
        ..ChannelConfig::default()
    }
}

fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let inner = count.clone();
    (count, move || {
        inner.fetch_add(1, Ordering::SeqCst);
    })
}

/// Fails the first `fail_first` opens, then serves `frames` and optionally closes.
struct ScriptedTransport {
    opens: AtomicUsize,
    closes: Arc<AtomicUsize>,
    fail_first: usize,
    frames: Vec<String>,
    close_after_frames: bool,
}

impl ScriptedTransport {
    fn new(fail_first: usize, frames: Vec<String>, close_after_frames: bool) -> Self {
        Self {
            opens: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            fail_first,
            frames,
            close_after_frames,
        }
    }

    fn always_failing() -> Self {
        Self::new(usize::MAX, Vec::new(), false)
    }

    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn endpoint(&self) -> String {
        "scripted".to_string()
    }

    async fn open(&self) -> Result<Box<dyn Connection>, ChannelError> {
        let n = self.opens.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first {
            return Err(ChannelError::ConnectionFailed("refused".to_string()));
        }
        Ok(Box::new(ScriptedConnection {
            frames: self.frames.iter().cloned().collect(),
            close_after_frames: self.close_after_frames,
            closes: self.closes.clone(),
        }))
    }
}

struct ScriptedConnection {
    frames: VecDeque<String>,
    close_after_frames: bool,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        if self.frames.is_empty() && !self.close_after_frames {
            std::future::pending::<()>().await;
        }
        sleep(Duration::from_millis(100)).await;
        self.frames.pop_front().map(TransportEvent::Text)
    }

    async fn send(&mut self, _text: String) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn connect_is_idempotent() {
    let (connects, on_connect) = counter();
    let (event_tx, mut event_rx) = create_event_channel();
    let channel = LiveChannel::builder(fixed_config())
        .on_connect(on_connect)
        .events(event_tx)
        .build()
        .unwrap();

    channel.connect();
    channel.connect();
    assert!(channel.is_connecting());

    sleep(Duration::from_millis(600)).await;
    assert!(channel.is_connected());
    channel.connect();
    sleep(Duration::from_millis(100)).await;

    assert_eq!(connects.load(Ordering::SeqCst), 1);
    let mut connecting_events = 0;
    while let Ok(event) = event_rx.try_recv() {
        if matches!(event, ChannelEvent::Connecting { .. }) {
            connecting_events += 1;
        }
    }
    assert_eq!(connecting_events, 1);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_work() {
    let (connects, on_connect) = counter();
    let channel = LiveChannel::builder(fixed_config())
        .on_connect(on_connect)
        .build()
        .unwrap();
    let received = Arc::new(AtomicUsize::new(0));
    let sink = received.clone();
    let _sub = channel.subscribe(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    channel.connect();
    sleep(Duration::from_millis(1600)).await;
    assert_eq!(received.load(Ordering::SeqCst), 1);

    channel.disconnect();
    let before = channel.stats();
    sleep(Duration::from_secs(60)).await;

    assert_eq!(received.load(Ordering::SeqCst), 1);
    assert_eq!(connects.load(Ordering::SeqCst), 1);
    let state = channel.state();
    assert!(state.is_disconnected());
    assert_eq!(state.connection_attempts, 0);
    assert_eq!(channel.stats().messages_delivered, before.messages_delivered);
}

#[tokio::test(start_paused = true)]
async fn disconnect_while_connecting_prevents_connect() {
    let (connects, on_connect) = counter();
    let channel = LiveChannel::builder(fixed_config())
        .on_connect(on_connect)
        .build()
        .unwrap();

    channel.connect();
    sleep(Duration::from_millis(200)).await;
    channel.disconnect();
    sleep(Duration::from_secs(10)).await;

    assert_eq!(connects.load(Ordering::SeqCst), 0);
    assert!(channel.state().is_disconnected());
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_reconnect() {
    let transport = Arc::new(ScriptedTransport::always_failing());
    let channel = LiveChannel::builder(fixed_config())
        .transport(transport.clone())
        .build()
        .unwrap();

    channel.connect();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(transport.opens(), 1);
    assert_eq!(channel.state().connection_attempts, 1);

    channel.disconnect();
    sleep(fixed_config().reconnect_interval * 3).await;

    assert_eq!(transport.opens(), 1);
    let state = channel.state();
    assert!(state.is_disconnected());
    assert_eq!(state.connection_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn disconnect_closes_open_connection() {
    let transport = Arc::new(ScriptedTransport::new(0, Vec::new(), false));
    let channel = LiveChannel::builder(fixed_config())
        .transport(transport.clone())
        .build()
        .unwrap();

    channel.connect();
    sleep(Duration::from_millis(10)).await;
    assert!(channel.is_connected());
    assert_eq!(transport.closes(), 0);

    channel.disconnect();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(transport.closes(), 1);
    assert!(channel.state().is_disconnected());
}

#[tokio::test(start_paused = true)]
async fn disconnect_inside_subscriber_stops_delivery() {
    let (on_message_calls, on_message) = counter();
    let (event_tx, mut event_rx) = create_event_channel();
    let channel = Arc::new(
        LiveChannel::builder(fixed_config())
            .on_message(move |_| on_message())
            .events(event_tx)
            .build()
            .unwrap(),
    );

    let handle = Arc::downgrade(&channel);
    let _first = channel.subscribe(move |_| {
        if let Some(channel) = handle.upgrade() {
            channel.disconnect();
        }
    });
    let seen_by_second = Arc::new(Mutex::new(Vec::new()));
    let sink = seen_by_second.clone();
    let status = Arc::downgrade(&channel);
    let _second = channel.subscribe(move |_| {
        if let Some(channel) = status.upgrade() {
            sink.lock().push(channel.state().status);
        }
    });

    channel.connect();
    sleep(Duration::from_secs(10)).await;

    assert!(channel.state().is_disconnected());
    assert!(seen_by_second.lock().is_empty());
    assert_eq!(on_message_calls.load(Ordering::SeqCst), 0);
    while let Ok(event) = event_rx.try_recv() {
        assert!(!matches!(event, ChannelEvent::MessageReceived(_)));
    }
}

#[tokio::test(start_paused = true)]
async fn disconnect_is_safe_in_any_state() {
    let (disconnects, on_disconnect) = counter();
    let channel = LiveChannel::builder(fixed_config())
        .on_disconnect(on_disconnect)
        .build()
        .unwrap();

    channel.disconnect();
    channel.disconnect();
    assert_eq!(disconnects.load(Ordering::SeqCst), 0);

    channel.connect();
    sleep(Duration::from_millis(600)).await;
    channel.disconnect();
    channel.disconnect();
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn reconnect_stops_after_budget() {
    let transport = Arc::new(ScriptedTransport::always_failing());
    let (errors_seen, on_error) = {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = seen.clone();
        (seen, move |e: &str| sink.lock().push(e.to_string()))
    };
    let config = ChannelConfig {
        max_reconnect_attempts: 3,
        reconnect_interval: Duration::from_secs(3),
        ..fixed_config()
    };
    let channel = LiveChannel::builder(config)
        .transport(transport.clone())
        .on_error(on_error)
        .build()
        .unwrap();

    channel.connect();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(transport.opens(), 1);
    assert_eq!(channel.state().connection_attempts, 1);

    sleep(Duration::from_millis(3100)).await;
    assert_eq!(transport.opens(), 2);

    sleep(Duration::from_secs(60)).await;
    // initial attempt plus three reconnects
    assert_eq!(transport.opens(), 4);
    let state = channel.state();
    assert!(state.is_disconnected());
    assert_eq!(state.connection_attempts, 3);
    assert!(state.is_exhausted());
    let exhausted = ChannelError::MaxReconnectsExceeded.to_string();
    assert_eq!(state.error.as_ref(), Some(&exhausted));
    assert_eq!(errors_seen.lock().last(), Some(&exhausted));

    // Manual connect starts a fresh budget
    channel.connect();
    assert_eq!(channel.state().connection_attempts, 0);
    assert!(channel.is_connecting());
    sleep(Duration::from_millis(10)).await;
    assert_eq!(transport.opens(), 5);
    assert_eq!(channel.state().connection_attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn successful_reconnect_resets_attempts() {
    let transport = Arc::new(ScriptedTransport::new(2, Vec::new(), false));
    let (connects, on_connect) = counter();
    let channel = LiveChannel::builder(fixed_config())
        .transport(transport.clone())
        .on_connect(on_connect)
        .build()
        .unwrap();

    channel.connect();
    sleep(Duration::from_millis(3100)).await;
    assert_eq!(channel.state().connection_attempts, 2);
    assert!(channel.error().is_some());

    sleep(Duration::from_secs(3)).await;
    assert_eq!(transport.opens(), 3);
    let state = channel.state();
    assert!(state.is_connected());
    assert_eq!(state.connection_attempts, 0);
    assert!(state.error.is_none());
    assert_eq!(connects.load(Ordering::SeqCst), 1);
    assert_eq!(channel.stats().reconnects, 2);
}

#[tokio::test(start_paused = true)]
async fn unexpected_close_schedules_reconnect() {
    let transport = Arc::new(ScriptedTransport::new(0, vec![QUOTE.to_string()], true));
    let (disconnects, on_disconnect) = counter();
    let (connects, on_connect) = counter();
    let channel = LiveChannel::builder(fixed_config())
        .transport(transport.clone())
        .on_connect(on_connect)
        .on_disconnect(on_disconnect)
        .build()
        .unwrap();

    channel.connect();
    sleep(Duration::from_millis(250)).await;
    let state = channel.state();
    assert!(state.is_disconnected());
    assert_eq!(state.connection_attempts, 1);
    assert!(state.last_message.is_some());
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);

    sleep(Duration::from_secs(3)).await;
    assert_eq!(transport.opens(), 2);
    assert_eq!(connects.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn every_subscriber_gets_every_message() {
    let (on_message_calls, on_message) = counter();
    let channel = LiveChannel::builder(fixed_config())
        .on_message(move |_| on_message())
        .build()
        .unwrap();

    let inboxes: Vec<Arc<Mutex<Vec<ChannelMessage>>>> =
        (0..3).map(|_| Arc::new(Mutex::new(Vec::new()))).collect();
    let _subs: Vec<_> = inboxes
        .iter()
        .map(|inbox| {
            let inbox = inbox.clone();
            channel.subscribe(move |message| inbox.lock().push(message.clone()))
        })
        .collect();
    assert_eq!(channel.subscriber_count(), 3);

    channel.connect();
    sleep(Duration::from_millis(1600)).await;

    let first = inboxes[0].lock().clone();
    assert_eq!(first.len(), 1);
    for inbox in &inboxes {
        assert_eq!(*inbox.lock(), first);
    }
    assert_eq!(on_message_calls.load(Ordering::SeqCst), 1);
    assert_eq!(channel.last_message().as_deref(), Some(&first[0]));
}

#[tokio::test(start_paused = true)]
async fn unsubscribed_handler_stops_receiving() {
    let channel = LiveChannel::new(fixed_config()).unwrap();
    let received = Arc::new(AtomicUsize::new(0));
    let sink = received.clone();
    let subscription = channel.subscribe(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    channel.connect();
    sleep(Duration::from_millis(1600)).await;
    assert_eq!(received.load(Ordering::SeqCst), 1);

    subscription.unsubscribe();
    assert_eq!(channel.subscriber_count(), 0);
    sleep(Duration::from_secs(5)).await;
    assert_eq!(received.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn send_requires_connection() {
    let transport = Arc::new(SimulatedTransport::new(fixed_config().simulation_timing));
    let channel = LiveChannel::builder(fixed_config())
        .transport(transport.clone())
        .build()
        .unwrap();

    assert!(!channel.send_message(&serde_json::json!({"action": "subscribe"})));
    channel.connect();
    assert!(!channel.send_message("while connecting"));

    sleep(Duration::from_millis(600)).await;
    assert!(channel.send_message(&serde_json::json!({"action": "subscribe"})));
    sleep(Duration::from_millis(10)).await;
    assert_eq!(
        transport.sent_messages(),
        vec![r#"{"action":"subscribe"}"#.to_string()]
    );
    assert_eq!(channel.stats().messages_sent, 1);
}

#[tokio::test(start_paused = true)]
async fn nothing_is_delivered_before_connected() {
    let mut config = fixed_config();
    config.simulation_timing.connect_delay_min = Duration::from_secs(2);
    config.simulation_timing.connect_delay_max = Duration::from_secs(2);
    let channel = LiveChannel::new(config).unwrap();
    let received = Arc::new(AtomicUsize::new(0));
    let sink = received.clone();
    let _sub = channel.subscribe(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    channel.connect();
    sleep(Duration::from_millis(1900)).await;
    assert!(channel.is_connecting());
    assert_eq!(received.load(Ordering::SeqCst), 0);

    sleep(Duration::from_millis(1200)).await;
    assert!(channel.is_connected());
    assert_eq!(received.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn bad_frames_are_dropped_without_disconnecting() {
    let frames = vec!["garbage".to_string(), QUOTE.to_string()];
    let transport = Arc::new(ScriptedTransport::new(0, frames, false));
    let channel = LiveChannel::builder(fixed_config())
        .transport(transport)
        .build()
        .unwrap();
    let feed = MarketFeedView::attach(&channel);

    channel.connect();
    sleep(Duration::from_secs(1)).await;

    assert!(channel.is_connected());
    let stats = channel.stats();
    assert_eq!(stats.messages_dropped, 1);
    assert_eq!(stats.messages_delivered, 1);
    assert_eq!(feed.snapshot().prices().get("AAPL"), Some(&100.0));
}

#[tokio::test(start_paused = true)]
async fn state_changes_are_observable() {
    let channel = LiveChannel::new(fixed_config()).unwrap();
    let mut state_rx = channel.watch_state();

    channel.connect();
    assert!(state_rx.borrow_and_update().is_connecting());

    state_rx.changed().await.unwrap();
    let state = state_rx.borrow_and_update().clone();
    assert!(state.is_connected());
    assert!(state.connection_id.is_some());
}

#[tokio::test(start_paused = true)]
async fn dropping_channel_stops_the_feed() {
    let channel = LiveChannel::new(fixed_config()).unwrap();
    let received = Arc::new(AtomicUsize::new(0));
    let sink = received.clone();
    let feed_sub = channel.subscribe(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });

    channel.connect();
    sleep(Duration::from_millis(1600)).await;
    drop(channel);
    sleep(Duration::from_secs(10)).await;

    assert_eq!(received.load(Ordering::SeqCst), 1);
    drop(feed_sub);
}
