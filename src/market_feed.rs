// file: src/market_feed.rs
// description: per-domain accumulators that fold the generic message stream into dashboard views

use crate::{
    channel::LiveChannel,
    message::{
        AlertTrigger, ChannelMessage, MarketStatus, MessagePayload, NewsUpdate, PortfolioUpdate,
        PriceUpdate,
    },
    subscribers::Subscription,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

pub const NEWS_CAPACITY: usize = 10;
pub const ALERT_CAPACITY: usize = 5;

/// Latest view of each feed domain.
///
/// Quotes are keyed by symbol with last-write-wins; arrival order decides, timestamps
/// are not compared. News and alerts are kept most-recent-first and truncated to
/// [`NEWS_CAPACITY`] and [`ALERT_CAPACITY`].
#[derive(Debug, Clone, Default)]
pub struct MarketFeed {
    quotes: HashMap<String, PriceUpdate>,
    portfolio: Option<PortfolioUpdate>,
    news: VecDeque<NewsUpdate>,
    alerts: VecDeque<AlertTrigger>,
    market_status: Option<MarketStatus>,
}

impl MarketFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, message: &ChannelMessage) {
        match message.payload() {
            MessagePayload::PriceUpdate(quote) => {
                self.quotes.insert(quote.symbol.clone(), quote.clone());
            }
            MessagePayload::PortfolioUpdate(portfolio) => {
                self.portfolio = Some(portfolio.clone());
            }
            MessagePayload::NewsUpdate(news) => {
                push_bounded(&mut self.news, news.clone(), NEWS_CAPACITY);
            }
            MessagePayload::AlertTrigger(alert) => {
                push_bounded(&mut self.alerts, alert.clone(), ALERT_CAPACITY);
            }
            MessagePayload::MarketStatus(status) => {
                self.market_status = Some(status.clone());
            }
        }
    }

    pub fn quote(&self, symbol: &str) -> Option<&PriceUpdate> {
        self.quotes.get(symbol)
    }

    /// Latest price per symbol, sorted by symbol
    pub fn prices(&self) -> BTreeMap<String, f64> {
        self.quotes
            .iter()
            .map(|(symbol, quote)| (symbol.clone(), quote.price))
            .collect()
    }

    pub fn portfolio(&self) -> Option<&PortfolioUpdate> {
        self.portfolio.as_ref()
    }

    /// Most recent first
    pub fn news(&self) -> impl Iterator<Item = &NewsUpdate> {
        self.news.iter()
    }

    /// Most recent first
    pub fn alerts(&self) -> impl Iterator<Item = &AlertTrigger> {
        self.alerts.iter()
    }

    pub fn news_len(&self) -> usize {
        self.news.len()
    }

    pub fn alerts_len(&self) -> usize {
        self.alerts.len()
    }

    pub fn market_status(&self) -> Option<&MarketStatus> {
        self.market_status.as_ref()
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T, capacity: usize) {
    buffer.push_front(item);
    buffer.truncate(capacity);
}

/// A [`MarketFeed`] kept current by a channel subscription.
///
/// Dropping the view unsubscribes it.
pub struct MarketFeedView {
    feed: Arc<Mutex<MarketFeed>>,
    _subscription: Subscription,
}

impl MarketFeedView {
    pub fn attach(channel: &LiveChannel) -> Self {
        let feed = Arc::new(Mutex::new(MarketFeed::new()));
        let sink = feed.clone();
        let subscription = channel.subscribe(move |message| sink.lock().apply(message));
        Self {
            feed,
            _subscription: subscription,
        }
    }

    pub fn snapshot(&self) -> MarketFeed {
        self.feed.lock().clone()
    }

    /// Run `f` against the live feed without cloning it
    pub fn with<R>(&self, f: impl FnOnce(&MarketFeed) -> R) -> R {
        f(&self.feed.lock())
    }
}
