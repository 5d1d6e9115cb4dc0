use crate::{
    channel_state::ConnectionStatus,
    market_feed::MarketFeed,
    message::{ChannelMessage, MessagePayload, Severity},
};

// ANSI color codes
pub struct Colors;

impl Colors {
    pub const RESET: &'static str = "\x1b[0m";
    pub const BOLD: &'static str = "\x1b[1m";
    pub const DIM: &'static str = "\x1b[2m";

    pub const RED: &'static str = "\x1b[31m";
    pub const GREEN: &'static str = "\x1b[32m";
    pub const YELLOW: &'static str = "\x1b[33m";
    pub const CYAN: &'static str = "\x1b[36m";
    pub const WHITE: &'static str = "\x1b[37m";
    pub const GRAY: &'static str = "\x1b[90m";

    pub const BRIGHT_RED: &'static str = "\x1b[91m";
    pub const BRIGHT_GREEN: &'static str = "\x1b[92m";
    pub const BRIGHT_YELLOW: &'static str = "\x1b[93m";
    pub const BRIGHT_MAGENTA: &'static str = "\x1b[95m";
    pub const BRIGHT_CYAN: &'static str = "\x1b[96m";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Minimal,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "minimal" => OutputFormat::Minimal,
            _ => OutputFormat::Table,
        }
    }
}

pub struct MessageFormatter {
    format: OutputFormat,
    colored: bool,
    message_count: u64,
}

impl MessageFormatter {
    pub fn new(format: OutputFormat, colored: bool) -> Self {
        Self {
            format,
            colored,
            message_count: 0,
        }
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.colored {
            format!("{}{}{}", color, text, Colors::RESET)
        } else {
            text.to_string()
        }
    }

    pub fn header(&self) -> Option<String> {
        match self.format {
            OutputFormat::Table => Some(self.paint(
                Colors::GRAY,
                &format!("{:<8} │ {:<16} │ {}", "TIME", "TYPE", "DETAIL"),
            )),
            OutputFormat::Json | OutputFormat::Minimal => None,
        }
    }

    /// Colored dot plus label, e.g. `● Live`
    pub fn status_line(&self, status: ConnectionStatus, detail: &str) -> String {
        let color = match status {
            ConnectionStatus::Connected => Colors::BRIGHT_GREEN,
            ConnectionStatus::Connecting => Colors::BRIGHT_YELLOW,
            ConnectionStatus::Disconnected => Colors::BRIGHT_RED,
        };
        let dot = self.paint(color, "●");
        if detail.is_empty() {
            format!("{} {}", dot, status.label())
        } else {
            format!("{} {} {}", dot, status.label(), self.paint(Colors::DIM, detail))
        }
    }

    pub fn format_message(&mut self, message: &ChannelMessage) -> String {
        self.message_count += 1;
        match self.format {
            OutputFormat::Json => message
                .to_json()
                .unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e)),
            OutputFormat::Minimal => format!("{} {}", message.kind(), self.detail(message, false)),
            OutputFormat::Table => format!(
                "{:<8} │ {:<16} │ {}",
                message.timestamp().format("%H:%M:%S"),
                message.kind().as_str(),
                self.detail(message, self.colored)
            ),
        }
    }

    fn detail(&self, message: &ChannelMessage, colored: bool) -> String {
        let paint = |color: &str, text: String| {
            if colored {
                format!("{}{}{}", color, text, Colors::RESET)
            } else {
                text
            }
        };

        match message.payload() {
            MessagePayload::PriceUpdate(quote) => {
                let color = if quote.change >= 0.0 {
                    Colors::GREEN
                } else {
                    Colors::RED
                };
                format!(
                    "{} {:.2} {}",
                    quote.symbol,
                    quote.price,
                    paint(
                        color,
                        format!("{:+.2} ({:+.2}%)", quote.change, quote.change_percent)
                    )
                )
            }
            MessagePayload::PortfolioUpdate(portfolio) => {
                let color = if portfolio.day_change >= 0.0 {
                    Colors::GREEN
                } else {
                    Colors::RED
                };
                format!(
                    "total {:.2} {}",
                    portfolio.total_value,
                    paint(
                        color,
                        format!(
                            "{:+.2} ({:+.2}%)",
                            portfolio.day_change, portfolio.day_change_percent
                        )
                    )
                )
            }
            MessagePayload::NewsUpdate(news) => {
                format!("[{}] {}", news.source, news.headline)
            }
            MessagePayload::AlertTrigger(alert) => {
                let color = match alert.severity {
                    Severity::Info => Colors::CYAN,
                    Severity::Warning => Colors::YELLOW,
                    Severity::Critical => Colors::BRIGHT_RED,
                };
                paint(color, format!("{}: {}", alert.alert_type, alert.message))
            }
            MessagePayload::MarketStatus(status) => status.message.clone(),
        }
    }

    /// Multi-line summary of the accumulated feed
    pub fn summary(&self, feed: &MarketFeed) -> String {
        let mut lines = vec![self.paint(Colors::BOLD, "Feed summary")];
        for (symbol, price) in feed.prices() {
            lines.push(format!("  {:<6} {:>10.2}", symbol, price));
        }
        if let Some(portfolio) = feed.portfolio() {
            lines.push(format!(
                "  portfolio {:.2} ({:+.2}%)",
                portfolio.total_value, portfolio.day_change_percent
            ));
        }
        if let Some(status) = feed.market_status() {
            lines.push(format!("  market: {}", status.message));
        }
        lines.push(format!(
            "  {} news item(s), {} alert(s)",
            feed.news_len(),
            feed.alerts_len()
        ));
        lines.join("\n")
    }
}
