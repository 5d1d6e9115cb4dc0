use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "rs-livefeed",
    about = "live data channel for personal finance dashboards, simulated or over websocket",
    version
)]
pub struct Args {
    /// WebSocket endpoint URL (used with --live)
    #[arg(short, long, default_value = crate::config::DEFAULT_URL)]
    pub url: String,

    /// Connect to the real endpoint instead of the simulated feed
    #[arg(long)]
    pub live: bool,

    /// Delay before each automatic reconnect, in milliseconds
    #[arg(long, default_value = "3000")]
    pub reconnect_interval_ms: u64,

    /// Maximum consecutive reconnection attempts
    #[arg(long, default_value = "5")]
    pub max_reconnects: u32,

    /// Symbols to request, comma separated (e.g. AAPL,MSFT)
    #[arg(short, long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Seed for the simulated feed, for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Output logs in JSON format
    #[arg(long)]
    pub json_logs: bool,

    /// Enable metrics server
    #[arg(long)]
    pub metrics: bool,

    /// Metrics server port
    #[arg(long, default_value = "9090")]
    pub metrics_port: u16,

    /// Output format: table, json, minimal
    #[arg(long, default_value = "table")]
    pub format: String,

    /// Disable colored output (useful for piping to files)
    #[arg(long)]
    pub no_color: bool,

    /// Quiet mode - only the status line and errors
    #[arg(long)]
    pub quiet: bool,

    /// Stop after this many messages (0 for unlimited)
    #[arg(long, default_value = "0")]
    pub max_messages: u64,
}
