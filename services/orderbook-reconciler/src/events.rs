//! Feed message definitions for the reconciler
//!
//! A subscription delivers one `snapshot` followed by any number of `update`
//! messages. Level entries arrive as raw JSON values and are validated one
//! by one, so a malformed entry costs only itself and never the whole batch.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use types::errors::LevelError;
use types::ids::MarketId;
use types::level::LevelUpdate;
use types::numeric::{parse_decimal, Price, Quantity};
use types::side::BookSide;

/// Kind of book message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Full replacement of both sides
    Snapshot,
    /// Incremental price-level changes
    Update,
}

/// A price-level entry exactly as delivered by the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLevel {
    pub price: Value,
    pub qty: Value,
}

impl RawLevel {
    pub fn new(price: impl Into<Value>, qty: impl Into<Value>) -> Self {
        Self {
            price: price.into(),
            qty: qty.into(),
        }
    }

    /// Validate this entry into a `LevelUpdate`.
    pub fn parse(&self) -> Result<LevelUpdate, LevelError> {
        let price = Price::try_from(decimal_field("price", &self.price)?)?;
        let qty = Quantity::try_from(decimal_field("qty", &self.qty)?)?;
        Ok(LevelUpdate::new(price, qty))
    }
}

fn decimal_field(field: &'static str, value: &Value) -> Result<Decimal, LevelError> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => {
            return Err(LevelError::Unparsable {
                field,
                raw: other.to_string(),
            })
        }
    };
    parse_decimal(&raw).ok_or(LevelError::Unparsable { field, raw })
}

/// One order book message from the market-data feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub symbol: MarketId,
    pub timestamp: DateTime<Utc>,
    /// Integrity value computed by the venue; carried through, never verified here.
    #[serde(default)]
    pub checksum: u32,
    #[serde(default)]
    pub bids: Vec<RawLevel>,
    #[serde(default)]
    pub asks: Vec<RawLevel>,
}

/// Valid entries of one side plus the errors of the entries that were skipped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedLevels {
    pub updates: Vec<LevelUpdate>,
    pub rejected: Vec<LevelError>,
}

impl BookMessage {
    pub fn snapshot(
        symbol: MarketId,
        timestamp: DateTime<Utc>,
        checksum: u32,
        bids: Vec<RawLevel>,
        asks: Vec<RawLevel>,
    ) -> Self {
        Self {
            kind: MessageKind::Snapshot,
            symbol,
            timestamp,
            checksum,
            bids,
            asks,
        }
    }

    pub fn update(
        symbol: MarketId,
        timestamp: DateTime<Utc>,
        checksum: u32,
        bids: Vec<RawLevel>,
        asks: Vec<RawLevel>,
    ) -> Self {
        Self {
            kind: MessageKind::Update,
            symbol,
            timestamp,
            checksum,
            bids,
            asks,
        }
    }

    /// Validate every entry of one side, keeping delivery order.
    pub fn parse_side(&self, side: BookSide) -> ParsedLevels {
        let raw = match side {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        };

        let mut parsed = ParsedLevels::default();
        for entry in raw {
            match entry.parse() {
                Ok(update) => parsed.updates.push(update),
                Err(err) => parsed.rejected.push(err),
            }
        }
        parsed
    }

    /// Get the message type as a string label for logging.
    pub fn event_type_label(&self) -> &'static str {
        match self.kind {
            MessageKind::Snapshot => "snapshot",
            MessageKind::Update => "update",
        }
    }
}
