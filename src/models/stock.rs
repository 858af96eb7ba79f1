use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Currency, PriceQuote};

/// Exchange a tracked instrument trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Market {
    #[serde(rename = "KOSPI")]
    Kospi,
    #[serde(rename = "KOSDAQ")]
    Kosdaq,
    #[serde(rename = "NASDAQ")]
    Nasdaq,
    #[serde(rename = "NYSE")]
    Nyse,
}

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Kospi => "KOSPI",
            Market::Kosdaq => "KOSDAQ",
            Market::Nasdaq => "NASDAQ",
            Market::Nyse => "NYSE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "KOSPI" => Some(Market::Kospi),
            "KOSDAQ" => Some(Market::Kosdaq),
            "NASDAQ" => Some(Market::Nasdaq),
            "NYSE" => Some(Market::Nyse),
            _ => None,
        }
    }

    /// Korean exchanges quote in KRW and need the `.KS` suffix for the
    /// chart-style quote endpoint.
    pub fn is_domestic(&self) -> bool {
        matches!(self, Market::Kospi | Market::Kosdaq)
    }

    /// Currency used when a live quote is unavailable for this market.
    pub fn default_currency(&self) -> Currency {
        if self.is_domestic() {
            Currency::Krw
        } else {
            Currency::Usd
        }
    }

    /// Infer the market for a row that carries no market column. Six-digit
    /// numeric tickers are Korean listings, everything else defaults to NASDAQ.
    pub fn infer_from_ticker(ticker: &str) -> Self {
        if ticker.len() == 6 && ticker.chars().all(|c| c.is_ascii_digit()) {
            Market::Kospi
        } else {
            Market::Nasdaq
        }
    }
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mention sentiment recorded for an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    Unknown,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
            Sentiment::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            "neutral" => Sentiment::Neutral,
            _ => Sentiment::Unknown,
        }
    }
}

/// One tracked instrument as loaded from the mention store.
///
/// Records are rebuilt wholesale on every snapshot recomputation and never
/// mutated in place.
#[derive(Debug, Clone)]
pub struct StockRecord {
    pub ticker: String,
    pub name: String,
    pub market: Market,
    pub mention_count: u32,
    pub last_mentioned_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub sentiment: Sentiment,
    /// Legacy mention counter carried by the old storage path
    pub post_count: Option<u32>,
    pub description: Option<String>,
}

/// A stock record merged with its (possibly absent) live quote.
///
/// A failed price lookup leaves `current_price` and `price_change` null; the
/// service never substitutes fabricated values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedStock {
    pub ticker: String,
    pub name: String,
    pub market: Market,
    pub mention_count: u32,
    /// Canonical mention counter; copies `post_count` when the legacy path
    /// supplied one
    pub mentions: u32,
    pub last_mentioned_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub sentiment: Sentiment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub current_price: Option<f64>,
    pub currency: Currency,
    pub price_change: Option<String>,
}

impl EnrichedStock {
    /// Merge a base record with the outcome of its price lookup.
    pub fn merge(record: StockRecord, quote: Option<PriceQuote>) -> Self {
        let (current_price, currency, price_change) = match quote {
            Some(q) => (Some(q.current_price), q.currency, Some(q.change_percent)),
            None => (None, record.market.default_currency(), None),
        };

        let mentions = record.post_count.unwrap_or(record.mention_count);

        Self {
            ticker: record.ticker,
            name: record.name,
            market: record.market,
            mention_count: record.mention_count,
            mentions,
            last_mentioned_at: record.last_mentioned_at,
            tags: record.tags,
            sentiment: record.sentiment,
            post_count: record.post_count,
            description: record.description,
            current_price,
            currency,
            price_change,
        }
    }
}
