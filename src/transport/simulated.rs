// file: src/transport/simulated.rs
// description: synthetic-timer transport that fabricates feed messages instead of using a socket

use super::{Connection, Transport, TransportEvent};
use crate::{config::SimulationConfig, error::ChannelError, simulator::MessageSynthesizer};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, trace};

/// Never fails on its own: opening always succeeds after a random delay, and the
/// connection produces one message per random interval until closed.
pub struct SimulatedTransport {
    timing: SimulationConfig,
    opens: AtomicU64,
    sent: Arc<Mutex<Vec<String>>>,
}

impl SimulatedTransport {
    pub fn new(timing: SimulationConfig) -> Self {
        Self {
            timing,
            opens: AtomicU64::new(0),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Payloads accepted by `send` on any connection, oldest first
    pub fn sent_messages(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

}

#[async_trait]
impl Transport for SimulatedTransport {
    fn endpoint(&self) -> String {
        "simulated".to_string()
    }

    async fn open(&self) -> Result<Box<dyn Connection>, ChannelError> {
        if self.timing.symbols.is_empty() {
            return Err(ChannelError::InvalidConfig(
                "simulation needs at least one symbol".to_string(),
            ));
        }
        let open_index = self.opens.fetch_add(1, Ordering::Relaxed);
        // Each connection gets its own stream, still reproducible under a seed
        let seed = self.timing.seed.map(|seed| seed.wrapping_add(open_index));
        let mut synth = MessageSynthesizer::new(self.timing.symbols.clone(), seed);

        let delay = synth.delay(self.timing.connect_delay_min..=self.timing.connect_delay_max);
        debug!("Simulated connect completes in {}ms", delay.as_millis());
        sleep(delay).await;

        Ok(Box::new(SimulatedConnection::new(
            synth,
            self.timing.clone(),
            self.sent.clone(),
        )))
    }
}

pub struct SimulatedConnection {
    synth: MessageSynthesizer,
    timing: SimulationConfig,
    next_at: Instant,
    sent: Arc<Mutex<Vec<String>>>,
    closed: bool,
}

impl SimulatedConnection {
    fn new(
        mut synth: MessageSynthesizer,
        timing: SimulationConfig,
        sent: Arc<Mutex<Vec<String>>>,
    ) -> Self {
        let first = synth.delay(timing.message_interval_min..=timing.message_interval_max);
        Self {
            synth,
            timing,
            next_at: Instant::now() + first,
            sent,
            closed: false,
        }
    }
}

#[async_trait]
impl Connection for SimulatedConnection {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        if self.closed {
            return None;
        }

        // Cancel safe: the deadline only moves once it has been reached
        sleep_until(self.next_at).await;
        let interval = self
            .synth
            .delay(self.timing.message_interval_min..=self.timing.message_interval_max);
        self.next_at = Instant::now() + interval;

        let message = self.synth.next_message();
        match message.to_json() {
            Ok(text) => Some(TransportEvent::Text(text)),
            Err(e) => Some(TransportEvent::Error(e.to_string())),
        }
    }

    async fn send(&mut self, text: String) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::ConnectionClosed);
        }
        trace!("Simulated send: {}", text);
        self.sent.lock().push(text);
        Ok(())
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}
