use chrono::{TimeZone, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::{EnrichedStock, Market, Sentiment, StockRecord};
use crate::services::quotes::PriceLookupService;
use crate::services::storage::MentionStore;

/// Builds the full enriched pick list: base records from storage (with a
/// fallback chain), concurrent price enrichment, and field normalization.
///
/// Output ordering is not guaranteed; the request handler sorts.
pub struct AggregationPipeline {
    store: Arc<dyn MentionStore>,
    quotes: Arc<PriceLookupService>,
    top_limit: u32,
}

impl AggregationPipeline {
    pub fn new(
        store: Arc<dyn MentionStore>,
        quotes: Arc<PriceLookupService>,
        top_limit: u32,
    ) -> Self {
        Self {
            store,
            quotes,
            top_limit,
        }
    }

    pub async fn run(&self) -> Result<Vec<EnrichedStock>> {
        let records = self.load_base_records().await;
        info!(count = records.len(), "Enriching pick list with live prices");

        // Full-batch join: one slow or failing instrument never blocks or
        // drops the others.
        let enriched = join_all(records.into_iter().map(|record| async {
            let quote = self.quotes.fetch(&record.ticker, record.market).await;
            EnrichedStock::merge(record, quote)
        }))
        .await;

        Ok(enriched)
    }

    /// Primary storage fetch, then the legacy method, then a single
    /// hard-coded placeholder record. The placeholder is an intentional,
    /// logged degradation path so the endpoint keeps answering while storage
    /// is down.
    async fn load_base_records(&self) -> Vec<StockRecord> {
        match self.store.top_mentions(self.top_limit).await {
            Ok(records) if !records.is_empty() => return records,
            Ok(_) => warn!("Primary mention query returned no rows, trying legacy method"),
            Err(e) => warn!(error = %e, "Primary mention query failed, trying legacy method"),
        }

        match self.store.top_mentions_legacy(self.top_limit).await {
            Ok(records) if !records.is_empty() => return records,
            Ok(_) => warn!("Legacy mention query returned no rows"),
            Err(e) => warn!(error = %e, "Legacy mention query failed"),
        }

        warn!("All storage paths exhausted, serving placeholder record set");
        placeholder_records()
    }
}

fn placeholder_records() -> Vec<StockRecord> {
    vec![StockRecord {
        ticker: "TSLA".to_string(),
        name: "Tesla".to_string(),
        market: Market::Nasdaq,
        mention_count: 42,
        last_mentioned_at: Utc.with_ymd_and_hms(2025, 8, 9, 0, 0, 0).unwrap(),
        tags: vec![
            "ev".to_string(),
            "ai".to_string(),
            "autonomous-driving".to_string(),
        ],
        sentiment: Sentiment::Positive,
        post_count: Some(42),
        description: Some("Electric vehicles and autonomous driving".to_string()),
    }]
}
