use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quote currency. Korean listings price in KRW, everything else in USD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "KRW")]
    Krw,
    #[serde(rename = "USD")]
    Usd,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Krw => "KRW",
            Currency::Usd => "USD",
        }
    }

    /// Map a provider currency code; anything that is not KRW is treated as USD.
    pub fn from_provider_code(code: &str) -> Self {
        if code.eq_ignore_ascii_case("KRW") {
            Currency::Krw
        } else {
            Currency::Usd
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live market data for one (ticker, market) pair.
///
/// Only successful fetches are ever represented as a `PriceQuote`; a failed
/// lookup is `None` at the call site and is never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Current price, rounded per currency (KRW: whole units, USD: 2 decimals)
    pub current_price: f64,
    pub currency: Currency,
    /// Sign-prefixed day change, e.g. "+1.23%" or "-0.45%"
    pub change_percent: String,
    pub fetched_at: DateTime<Utc>,
}
