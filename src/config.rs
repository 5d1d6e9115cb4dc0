// file: src/config.rs
// description: configuration model for the live channel, simulation timings and the demo binary

use crate::{cli::Args, error::ChannelError};
use anyhow::Result;
use std::time::Duration;
use url::Url;

pub const DEFAULT_URL: &str = "wss://stream.example.com/feed";
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub channel: ChannelConfig,
    pub display: DisplayConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: Url,
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
    /// Use the synthetic transport instead of opening a socket
    pub simulation: bool,
    pub simulation_timing: SimulationConfig,
}

/// Timings and seed for the synthetic transport. Delays are drawn uniformly from
/// the inclusive `min..=max` ranges.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub connect_delay_min: Duration,
    pub connect_delay_max: Duration,
    pub message_interval_min: Duration,
    pub message_interval_max: Duration,
    pub seed: Option<u64>,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DisplayConfig {
    pub format: String,
    pub colored: bool,
    pub quiet: bool,
    pub max_messages: u64,
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: Url::parse(DEFAULT_URL).expect("default url is valid"),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            simulation: true,
            simulation_timing: SimulationConfig::default(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            connect_delay_min: Duration::from_millis(500),
            connect_delay_max: Duration::from_millis(2000),
            message_interval_min: Duration::from_millis(1000),
            message_interval_max: Duration::from_millis(5000),
            seed: None,
            symbols: ["AAPL", "MSFT", "GOOGL", "AMZN", "TSLA", "NVDA", "SPY", "VTI"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl ChannelConfig {
    pub fn validate(&self) -> Result<(), ChannelError> {
        let timing = &self.simulation_timing;
        if timing.connect_delay_min > timing.connect_delay_max {
            return Err(ChannelError::InvalidConfig(
                "connect delay min exceeds max".to_string(),
            ));
        }
        if timing.message_interval_min > timing.message_interval_max {
            return Err(ChannelError::InvalidConfig(
                "message interval min exceeds max".to_string(),
            ));
        }
        if timing.message_interval_max.is_zero() {
            return Err(ChannelError::InvalidConfig(
                "message interval must be non-zero".to_string(),
            ));
        }
        if timing.symbols.is_empty() {
            return Err(ChannelError::InvalidConfig(
                "simulation needs at least one symbol".to_string(),
            ));
        }
        if !self.simulation && !matches!(self.url.scheme(), "ws" | "wss") {
            return Err(ChannelError::InvalidConfig(format!(
                "unsupported url scheme '{}'",
                self.url.scheme()
            )));
        }
        Ok(())
    }
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self> {
        let url = Url::parse(&args.url)?;

        let mut simulation_timing = SimulationConfig {
            seed: args.seed,
            ..SimulationConfig::default()
        };
        if !args.symbols.is_empty() {
            simulation_timing.symbols = args.symbols.clone();
        }

        let channel = ChannelConfig {
            url,
            reconnect_interval: Duration::from_millis(args.reconnect_interval_ms),
            max_reconnect_attempts: args.max_reconnects,
            simulation: !args.live,
            simulation_timing,
        };
        channel.validate()?;

        Ok(Config {
            channel,
            display: DisplayConfig {
                format: args.format.clone(),
                colored: !args.no_color,
                quiet: args.quiet,
                max_messages: args.max_messages,
            },
            metrics: MetricsConfig {
                enabled: args.metrics,
                port: args.metrics_port,
            },
        })
    }
}
