// file: src/message.rs
// description: live feed message model and the JSON wire codec used by every transport

use crate::error::ChannelError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Discriminator carried in the `type` field of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    PriceUpdate,
    PortfolioUpdate,
    NewsUpdate,
    AlertTrigger,
    MarketStatus,
}

impl MessageKind {
    pub const ALL: [MessageKind; 5] = [
        MessageKind::PriceUpdate,
        MessageKind::PortfolioUpdate,
        MessageKind::NewsUpdate,
        MessageKind::AlertTrigger,
        MessageKind::MarketStatus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::PriceUpdate => "price_update",
            MessageKind::PortfolioUpdate => "portfolio_update",
            MessageKind::NewsUpdate => "news_update",
            MessageKind::AlertTrigger => "alert_trigger",
            MessageKind::MarketStatus => "market_status",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    pub symbol: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub volume: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioUpdate {
    pub total_value: f64,
    pub day_change: f64,
    pub day_change_percent: f64,
    #[serde(default)]
    pub cash_balance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsUpdate {
    pub id: String,
    pub headline: String,
    pub source: String,
    #[serde(default = "neutral")]
    pub sentiment: Sentiment,
    #[serde(default)]
    pub symbols: Vec<String>,
}

fn neutral() -> Sentiment {
    Sentiment::Neutral
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertTrigger {
    pub id: String,
    pub alert_type: String,
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketSession {
    Open,
    Closed,
    PreMarket,
    AfterHours,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketStatus {
    pub status: MarketSession,
    #[serde(default)]
    pub message: String,
}

/// Kind-specific body of a [`ChannelMessage`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessagePayload {
    PriceUpdate(PriceUpdate),
    PortfolioUpdate(PortfolioUpdate),
    NewsUpdate(NewsUpdate),
    AlertTrigger(AlertTrigger),
    MarketStatus(MarketStatus),
}

impl MessagePayload {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessagePayload::PriceUpdate(_) => MessageKind::PriceUpdate,
            MessagePayload::PortfolioUpdate(_) => MessageKind::PortfolioUpdate,
            MessagePayload::NewsUpdate(_) => MessageKind::NewsUpdate,
            MessagePayload::AlertTrigger(_) => MessageKind::AlertTrigger,
            MessagePayload::MarketStatus(_) => MessageKind::MarketStatus,
        }
    }
}

/// One immutable message on the live feed.
///
/// On the wire it is `{ "type": ..., "payload": {...}, "timestamp": ... }`, with the payload
/// shape selected by `type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "WireMessage")]
pub struct ChannelMessage {
    payload: MessagePayload,
    timestamp: DateTime<Utc>,
}

impl ChannelMessage {
    pub fn new(payload: MessagePayload, timestamp: DateTime<Utc>) -> Self {
        Self { payload, timestamp }
    }

    /// Stamp a payload with the current time
    pub fn now(payload: MessagePayload) -> Self {
        Self::new(payload, Utc::now())
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    pub fn payload(&self) -> &MessagePayload {
        &self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn from_json(text: &str) -> Result<Self, ChannelError> {
        serde_json::from_str(text).map_err(|e| ChannelError::InvalidMessage(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, ChannelError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Serialize)]
struct WireMessageRef<'a> {
    #[serde(rename = "type")]
    kind: MessageKind,
    payload: &'a MessagePayload,
    timestamp: &'a DateTime<Utc>,
}

impl Serialize for ChannelMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireMessageRef {
            kind: self.kind(),
            payload: &self.payload,
            timestamp: &self.timestamp,
        }
        .serialize(serializer)
    }
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(rename = "type")]
    kind: MessageKind,
    payload: serde_json::Value,
    timestamp: DateTime<Utc>,
}

impl TryFrom<WireMessage> for ChannelMessage {
    type Error = String;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let payload = decode_payload(wire.kind, wire.payload)
            .map_err(|e| format!("invalid {} payload: {}", wire.kind, e))?;
        Ok(ChannelMessage::new(payload, wire.timestamp))
    }
}

fn decode_payload(
    kind: MessageKind,
    value: serde_json::Value,
) -> Result<MessagePayload, serde_json::Error> {
    Ok(match kind {
        MessageKind::PriceUpdate => MessagePayload::PriceUpdate(serde_json::from_value(value)?),
        MessageKind::PortfolioUpdate => {
            MessagePayload::PortfolioUpdate(serde_json::from_value(value)?)
        }
        MessageKind::NewsUpdate => MessagePayload::NewsUpdate(serde_json::from_value(value)?),
        MessageKind::AlertTrigger => MessagePayload::AlertTrigger(serde_json::from_value(value)?),
        MessageKind::MarketStatus => MessagePayload::MarketStatus(serde_json::from_value(value)?),
    })
}
