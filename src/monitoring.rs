use crate::{
    channel_state::{ChannelStats, ConnectionState},
    error::ChannelError,
};
use anyhow::Result;
use metrics::{Counter, Gauge, counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{net::SocketAddr, sync::LazyLock};
use tracing::{error, info};

// Global metrics
pub static MESSAGES_RECEIVED_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("livefeed_messages_received_total"));
pub static MESSAGES_DROPPED_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("livefeed_messages_dropped_total"));
pub static MESSAGES_SENT_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("livefeed_messages_sent_total"));
pub static RECONNECT_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("livefeed_reconnects_total"));
pub static CONNECTED_GAUGE: LazyLock<Gauge> = LazyLock::new(|| gauge!("livefeed_connected"));

pub async fn setup_metrics(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    let builder = PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("service", "rs-livefeed")
        .add_global_label("version", env!("CARGO_PKG_VERSION"));

    match builder.install() {
        Ok(_handle) => {
            info!(
                "Prometheus metrics server started on http://{}/metrics",
                addr
            );

            // Initialize metrics with default values
            MESSAGES_RECEIVED_COUNTER.absolute(0);
            MESSAGES_DROPPED_COUNTER.absolute(0);
            MESSAGES_SENT_COUNTER.absolute(0);
            RECONNECT_COUNTER.absolute(0);
            CONNECTED_GAUGE.set(0.0);

            Ok(())
        }
        Err(e) => {
            error!("Failed to start metrics server: {}", e);
            Err(ChannelError::MetricsError(e.to_string()).into())
        }
    }
}

#[derive(Debug)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub status: String,
    pub last_error: Option<String>,
    pub last_message_time: Option<chrono::DateTime<chrono::Utc>>,
    pub total_messages: u64,
    pub dropped_messages: u64,
    pub reconnect_count: u64,
    pub uptime: chrono::Duration,
}

impl HealthStatus {
    pub fn from_channel(state: &ConnectionState, stats: &ChannelStats) -> Self {
        let uptime = stats
            .connected_since
            .map(|since| chrono::Utc::now() - since)
            .unwrap_or_else(chrono::Duration::zero);

        Self {
            is_healthy: state.is_connected(),
            status: state.status.label().to_string(),
            last_error: state.error.clone(),
            last_message_time: stats.last_message_time,
            total_messages: stats.messages_delivered,
            dropped_messages: stats.messages_dropped,
            reconnect_count: stats.reconnects,
            uptime,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "status": if self.is_healthy { "healthy" } else { "unhealthy" },
            "connection": self.status,
            "last_error": self.last_error,
            "last_message_time": self.last_message_time,
            "total_messages": self.total_messages,
            "dropped_messages": self.dropped_messages,
            "reconnect_count": self.reconnect_count,
            "uptime_seconds": self.uptime.num_seconds(),
            "timestamp": chrono::Utc::now()
        })
    }
}
