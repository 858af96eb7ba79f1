use async_trait::async_trait;
use chrono::{Duration, Utc};
use isahc::{config::Configurable, prelude::*, HttpClient};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{debug, warn};

use crate::constants::{PRICE_TTL_SECS, QUOTE_BASE_URL, QUOTE_TIMEOUT_SECS, QUOTE_USER_AGENT};
use crate::error::{AppError, Result};
use crate::models::{Currency, Market, PriceQuote};
use crate::services::entity_cache::EntityCache;

/// The fields the aggregation pipeline needs from a chart-style quote payload.
/// Any payload that cannot produce all three is a fetch failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartMeta {
    pub regular_market_price: f64,
    pub previous_close: f64,
    pub currency: String,
}

/// External price-provider collaborator. Implemented over HTTP in production
/// and with fakes in tests.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn chart_meta(&self, symbol: &str, from: i64, to: i64) -> Result<ChartMeta>;
}

/// HTTP client for a Yahoo-chart-shaped quote endpoint.
pub struct ChartApiClient {
    client: HttpClient,
    base_url: String,
}

impl ChartApiClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(QUOTE_BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Result<Self> {
        let client = HttpClient::builder()
            .timeout(StdDuration::from_secs(QUOTE_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl QuoteProvider for ChartApiClient {
    async fn chart_meta(&self, symbol: &str, from: i64, to: i64) -> Result<ChartMeta> {
        let url = format!(
            "{}/{}?period1={}&period2={}&interval=1d",
            self.base_url, symbol, from, to
        );

        let request = isahc::Request::builder()
            .uri(&url)
            .method("GET")
            .header("User-Agent", QUOTE_USER_AGENT)
            .body(())
            .map_err(|e| AppError::Network(format!("Request build error: {}", e)))?;

        let mut response = self.client.send_async(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Network(format!(
                "Quote endpoint returned {} for {}",
                status.as_u16(),
                symbol
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| AppError::Network(format!("Response body error: {}", e)))?;
        let payload: Value = serde_json::from_str(&text)?;
        parse_chart_meta(&payload)
    }
}

/// Extract the quote meta block, treating any shape deviation as a failure.
pub fn parse_chart_meta(payload: &Value) -> Result<ChartMeta> {
    let meta = payload
        .pointer("/chart/result/0/meta")
        .ok_or_else(|| AppError::Parse("Missing chart.result[0].meta".to_string()))?;

    let regular_market_price = meta
        .get("regularMarketPrice")
        .and_then(Value::as_f64)
        .ok_or_else(|| AppError::Parse("Missing regularMarketPrice".to_string()))?;

    let previous_close = meta
        .get("chartPreviousClose")
        .or_else(|| meta.get("regularMarketPreviousClose"))
        .and_then(Value::as_f64)
        .ok_or_else(|| AppError::Parse("Missing previous close".to_string()))?;

    let currency = meta
        .get("currency")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Parse("Missing currency".to_string()))?
        .to_string();

    Ok(ChartMeta {
        regular_market_price,
        previous_close,
        currency,
    })
}

/// Suffix domestic listings for the chart endpoint; foreign tickers pass
/// through unchanged.
pub fn normalize_symbol(ticker: &str, market: Market) -> String {
    if market.is_domestic() {
        format!("{}.KS", ticker)
    } else {
        ticker.to_string()
    }
}

/// KRW quotes round to whole units, USD to two decimals.
fn round_price(value: f64, currency: Currency) -> f64 {
    match currency {
        Currency::Krw => value.round(),
        Currency::Usd => (value * 100.0).round() / 100.0,
    }
}

/// Sign-prefixed day change, e.g. "+1.23%".
fn format_change_percent(change: f64, previous_close: f64) -> String {
    let percent = (change / previous_close * 100.0 * 100.0).round() / 100.0;
    if change >= 0.0 {
        format!("+{:.2}%", percent)
    } else {
        format!("{:.2}%", percent)
    }
}

/// Fetches one instrument's live price, with a short-TTL cache in front of
/// the network call.
///
/// Failure semantics are strict: a network error, timeout, or malformed
/// payload returns `None`, is never cached, and is never replaced with a
/// placeholder price. Every failed lookup pays the full retry cost on the
/// next access, trading failure amplification for freshness.
pub struct PriceLookupService {
    provider: Arc<dyn QuoteProvider>,
    cache: EntityCache<String, PriceQuote>,
    ttl: Duration,
}

impl PriceLookupService {
    pub fn new(provider: Arc<dyn QuoteProvider>) -> Self {
        Self::with_ttl(provider, Duration::seconds(PRICE_TTL_SECS))
    }

    pub fn with_ttl(provider: Arc<dyn QuoteProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            cache: EntityCache::new(),
            ttl,
        }
    }

    pub async fn fetch(&self, ticker: &str, market: Market) -> Option<PriceQuote> {
        let cache_key = format!("{}|{}", ticker, market);

        if let Some(cached) = self.cache.get(&cache_key).await {
            debug!(ticker, %market, "Using cached price");
            return Some(cached);
        }

        let symbol = normalize_symbol(ticker, market);
        let to = Utc::now().timestamp();
        let from = to - 86400;

        let meta = match self.provider.chart_meta(&symbol, from, to).await {
            Ok(meta) => meta,
            Err(e) => {
                warn!(ticker, %market, error = %e, "Price fetch failed, returning null");
                return None;
            }
        };

        if meta.previous_close <= 0.0 {
            warn!(ticker, %market, "Provider returned non-positive previous close");
            return None;
        }

        let currency = Currency::from_provider_code(&meta.currency);
        let change = meta.regular_market_price - meta.previous_close;
        let quote = PriceQuote {
            current_price: round_price(meta.regular_market_price, currency),
            currency,
            change_percent: format_change_percent(change, meta.previous_close),
            fetched_at: Utc::now(),
        };

        // Success is the only path that writes the cache.
        self.cache.set(cache_key, quote.clone(), self.ttl).await;

        Some(quote)
    }

    pub async fn cached_entry_count(&self) -> usize {
        self.cache.len().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockProvider {
        calls: AtomicUsize,
        failing_symbols: HashSet<String>,
        price: f64,
        previous_close: f64,
        currency: String,
    }

    impl MockProvider {
        fn new(price: f64, previous_close: f64, currency: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failing_symbols: HashSet::new(),
                price,
                previous_close,
                currency: currency.to_string(),
            }
        }

        fn failing_for(mut self, symbols: &[&str]) -> Self {
            self.failing_symbols = symbols.iter().map(|s| s.to_string()).collect();
            self
        }
    }

    #[async_trait]
    impl QuoteProvider for MockProvider {
        async fn chart_meta(&self, symbol: &str, _from: i64, _to: i64) -> Result<ChartMeta> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing_symbols.contains(symbol) {
                return Err(AppError::Network("connection refused".to_string()));
            }
            Ok(ChartMeta {
                regular_market_price: self.price,
                previous_close: self.previous_close,
                currency: self.currency.clone(),
            })
        }
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol("005930", Market::Kospi), "005930.KS");
        assert_eq!(normalize_symbol("035720", Market::Kosdaq), "035720.KS");
        assert_eq!(normalize_symbol("TSLA", Market::Nasdaq), "TSLA");
        assert_eq!(normalize_symbol("BRK", Market::Nyse), "BRK");
    }

    #[test]
    fn test_parse_chart_meta_happy_path_and_fallback_field() {
        let payload = json!({
            "chart": { "result": [ { "meta": {
                "regularMarketPrice": 182.5,
                "chartPreviousClose": 180.0,
                "currency": "USD"
            } } ] }
        });
        let meta = parse_chart_meta(&payload).unwrap();
        assert_eq!(meta.regular_market_price, 182.5);
        assert_eq!(meta.previous_close, 180.0);

        let payload = json!({
            "chart": { "result": [ { "meta": {
                "regularMarketPrice": 182.5,
                "regularMarketPreviousClose": 179.0,
                "currency": "USD"
            } } ] }
        });
        assert_eq!(parse_chart_meta(&payload).unwrap().previous_close, 179.0);
    }

    #[test]
    fn test_parse_chart_meta_rejects_malformed_payloads() {
        assert!(parse_chart_meta(&json!({})).is_err());
        assert!(parse_chart_meta(&json!({ "chart": { "result": [] } })).is_err());
        let missing_price = json!({
            "chart": { "result": [ { "meta": { "chartPreviousClose": 1.0, "currency": "USD" } } ] }
        });
        assert!(parse_chart_meta(&missing_price).is_err());
    }

    #[test]
    fn test_change_percent_formatting() {
        assert_eq!(format_change_percent(2.5, 200.0), "+1.25%");
        assert_eq!(format_change_percent(-3.0, 100.0), "-3.00%");
        assert_eq!(format_change_percent(0.0, 100.0), "+0.00%");
    }

    #[tokio::test]
    async fn test_usd_quote_rounds_to_two_decimals() {
        let provider = Arc::new(MockProvider::new(182.4567, 180.0, "USD"));
        let service = PriceLookupService::new(provider);

        let quote = service.fetch("AAPL", Market::Nasdaq).await.unwrap();
        assert_eq!(quote.current_price, 182.46);
        assert_eq!(quote.currency, Currency::Usd);
    }

    #[tokio::test]
    async fn test_krw_quote_rounds_to_whole_units() {
        let provider = Arc::new(MockProvider::new(71_423.7, 70_000.0, "KRW"));
        let service = PriceLookupService::new(provider);

        let quote = service.fetch("005930", Market::Kospi).await.unwrap();
        assert_eq!(quote.current_price, 71_424.0);
        assert_eq!(quote.currency, Currency::Krw);
    }

    #[tokio::test]
    async fn test_successful_fetch_is_cached_within_ttl() {
        let provider = Arc::new(MockProvider::new(100.0, 99.0, "USD"));
        let service = PriceLookupService::new(provider.clone());

        service.fetch("TSLA", Market::Nasdaq).await.unwrap();
        service.fetch("TSLA", Market::Nasdaq).await.unwrap();

        // Second fetch was served from cache, no second provider call.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.cached_entry_count().await, 1);
    }

    #[tokio::test]
    async fn test_expired_quote_is_refetched_from_provider() {
        let provider = Arc::new(MockProvider::new(100.0, 99.0, "USD"));
        let service = PriceLookupService::with_ttl(provider.clone(), Duration::seconds(0));

        service.fetch("TSLA", Market::Nasdaq).await.unwrap();
        service.fetch("TSLA", Market::Nasdaq).await.unwrap();

        // A zero TTL expires immediately, so the second lookup goes back to
        // the provider instead of reusing the stale entry.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_returns_none_and_is_never_cached() {
        let provider = Arc::new(MockProvider::new(100.0, 99.0, "USD").failing_for(&["TSLA"]));
        let service = PriceLookupService::new(provider.clone());

        assert!(service.fetch("TSLA", Market::Nasdaq).await.is_none());
        assert_eq!(service.cached_entry_count().await, 0);

        // No negative caching: the next lookup attempts the network again.
        assert!(service.fetch("TSLA", Market::Nasdaq).await.is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_positive_previous_close_is_a_failure() {
        let provider = Arc::new(MockProvider::new(100.0, 0.0, "USD"));
        let service = PriceLookupService::new(provider);

        assert!(service.fetch("TSLA", Market::Nasdaq).await.is_none());
        assert_eq!(service.cached_entry_count().await, 0);
    }
}
