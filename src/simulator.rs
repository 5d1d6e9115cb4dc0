// file: src/simulator.rs
// description: random synthesis of feed messages for the simulated transport

use crate::message::{
    AlertTrigger, ChannelMessage, MarketSession, MarketStatus, MessageKind, MessagePayload,
    NewsUpdate, PortfolioUpdate, PriceUpdate, Sentiment, Severity,
};
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::time::Duration;

const HEADLINES: &[&str] = &[
    "Fed signals steady rates through next quarter",
    "Tech earnings beat expectations across the board",
    "Treasury yields slip as inflation cools",
    "Consumer spending rises for third straight month",
    "Energy stocks rally on supply concerns",
    "Housing starts fall short of forecasts",
];

const SOURCES: &[&str] = &["Reuters", "Bloomberg", "MarketWatch", "CNBC"];

const ALERTS: &[(&str, &str, Severity)] = &[
    ("price_target", "Price target reached", Severity::Info),
    ("budget_limit", "Dining budget is 90% spent", Severity::Warning),
    ("bill_due", "Credit card payment due in 3 days", Severity::Warning),
    ("large_transaction", "Unusually large transaction detected", Severity::Critical),
    ("low_balance", "Checking balance below threshold", Severity::Critical),
];

/// Stateful generator: quotes and the portfolio value follow a random walk so
/// consecutive updates look plausible.
pub struct MessageSynthesizer {
    rng: fastrand::Rng,
    symbols: Vec<String>,
    prices: HashMap<String, f64>,
    portfolio_value: f64,
    portfolio_open: f64,
}

impl MessageSynthesizer {
    pub fn new(symbols: Vec<String>, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        let prices = symbols
            .iter()
            .map(|symbol| (symbol.clone(), 50.0 + rng.f64() * 450.0))
            .collect();
        let portfolio_open = 100_000.0 + rng.f64() * 50_000.0;

        Self {
            rng,
            symbols,
            prices,
            portfolio_value: portfolio_open,
            portfolio_open,
        }
    }

    /// Uniform draw from an inclusive duration range
    pub fn delay(&mut self, range: RangeInclusive<Duration>) -> Duration {
        let (min, max) = range.into_inner();
        let min_ms = min.as_millis() as u64;
        let max_ms = max.as_millis() as u64;
        Duration::from_millis(self.rng.u64(min_ms..=max_ms.max(min_ms)))
    }

    pub fn next_message(&mut self) -> ChannelMessage {
        let kind = MessageKind::ALL[self.rng.usize(..MessageKind::ALL.len())];
        ChannelMessage::now(self.payload(kind))
    }

    pub fn payload(&mut self, kind: MessageKind) -> MessagePayload {
        match kind {
            MessageKind::PriceUpdate => MessagePayload::PriceUpdate(self.price_update()),
            MessageKind::PortfolioUpdate => {
                MessagePayload::PortfolioUpdate(self.portfolio_update())
            }
            MessageKind::NewsUpdate => MessagePayload::NewsUpdate(self.news_update()),
            MessageKind::AlertTrigger => MessagePayload::AlertTrigger(self.alert()),
            MessageKind::MarketStatus => MessagePayload::MarketStatus(self.market_status()),
        }
    }

    fn price_update(&mut self) -> PriceUpdate {
        let symbol = self.symbols[self.rng.usize(..self.symbols.len())].clone();
        let step = (self.rng.f64() - 0.5) * 0.04;
        let previous = self.prices.get(&symbol).copied().unwrap_or(100.0);
        let price = round2(previous * (1.0 + step));
        self.prices.insert(symbol.clone(), price);

        let change = round2(price - previous);
        PriceUpdate {
            symbol,
            price,
            change,
            change_percent: round2(change / previous * 100.0),
            volume: self.rng.u64(10_000..5_000_000),
        }
    }

    fn portfolio_update(&mut self) -> PortfolioUpdate {
        let step = (self.rng.f64() - 0.5) * 0.01;
        self.portfolio_value = round2(self.portfolio_value * (1.0 + step));
        let day_change = round2(self.portfolio_value - self.portfolio_open);

        PortfolioUpdate {
            total_value: self.portfolio_value,
            day_change,
            day_change_percent: round2(day_change / self.portfolio_open * 100.0),
            cash_balance: round2(5_000.0 + self.rng.f64() * 20_000.0),
        }
    }

    fn news_update(&mut self) -> NewsUpdate {
        let sentiment = match self.rng.u8(..3) {
            0 => Sentiment::Positive,
            1 => Sentiment::Negative,
            _ => Sentiment::Neutral,
        };
        let tagged = self.symbols[self.rng.usize(..self.symbols.len())].clone();

        NewsUpdate {
            id: uuid::Uuid::new_v4().to_string(),
            headline: HEADLINES[self.rng.usize(..HEADLINES.len())].to_string(),
            source: SOURCES[self.rng.usize(..SOURCES.len())].to_string(),
            sentiment,
            symbols: vec![tagged],
        }
    }

    fn alert(&mut self) -> AlertTrigger {
        let (alert_type, message, severity) = ALERTS[self.rng.usize(..ALERTS.len())];
        AlertTrigger {
            id: uuid::Uuid::new_v4().to_string(),
            alert_type: alert_type.to_string(),
            message: message.to_string(),
            severity,
        }
    }

    fn market_status(&mut self) -> MarketStatus {
        let (status, message) = match self.rng.u8(..4) {
            0 => (MarketSession::Open, "Markets are open"),
            1 => (MarketSession::Closed, "Markets are closed"),
            2 => (MarketSession::PreMarket, "Pre-market trading"),
            _ => (MarketSession::AfterHours, "After-hours trading"),
        };
        MarketStatus {
            status,
            message: message.to_string(),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols() -> Vec<String> {
        vec!["AAPL".to_string(), "MSFT".to_string()]
    }

    #[test]
    fn seeded_synthesis_is_reproducible() {
        let mut a = MessageSynthesizer::new(symbols(), Some(7));
        let mut b = MessageSynthesizer::new(symbols(), Some(7));
        for _ in 0..20 {
            let left = a.next_message();
            let right = b.next_message();
            assert_eq!(left.kind(), right.kind());
        }
    }

    #[test]
    fn price_walk_reports_change_from_previous() {
        let mut synth = MessageSynthesizer::new(vec!["AAPL".to_string()], Some(1));
        let first = synth.price_update();
        let second = synth.price_update();
        assert_eq!(second.symbol, "AAPL");
        assert!((second.change - round2(second.price - first.price)).abs() < 0.011);
        assert!(second.price > 0.0);
    }

    #[test]
    fn delay_stays_in_range() {
        let mut synth = MessageSynthesizer::new(symbols(), Some(3));
        let range = Duration::from_millis(500)..=Duration::from_millis(2000);
        for _ in 0..100 {
            let delay = synth.delay(range.clone());
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(2000));
        }
        let fixed = Duration::from_secs(1)..=Duration::from_secs(1);
        assert_eq!(synth.delay(fixed), Duration::from_secs(1));
    }

    #[test]
    fn every_kind_can_be_synthesized() {
        let mut synth = MessageSynthesizer::new(symbols(), None);
        for kind in MessageKind::ALL {
            assert_eq!(synth.payload(kind).kind(), kind);
        }
    }
}
