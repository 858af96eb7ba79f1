use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::error::{AppError, Result};
use crate::models::{Market, Sentiment, StockRecord};

/// Read-only storage collaborator for mention data.
///
/// `top_mentions` is the primary path; `top_mentions_legacy` queries the old
/// table shape and exists only as the pipeline's fallback.
#[async_trait]
pub trait MentionStore: Send + Sync {
    async fn top_mentions(&self, limit: u32) -> Result<Vec<StockRecord>>;
    async fn top_mentions_legacy(&self, limit: u32) -> Result<Vec<StockRecord>>;
}

/// SQLite-backed mention store.
#[derive(Debug)]
pub struct SqliteMentionStore {
    pool: SqlitePool,
    database_path: PathBuf,
}

impl SqliteMentionStore {
    pub async fn new(database_path: PathBuf) -> Result<Self> {
        info!("Opening mention database at: {:?}", database_path);

        if let Some(parent) = database_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(&database_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePool::connect_with(connect_options).await?;
        let store = Self {
            pool,
            database_path,
        };
        store.initialize_database().await?;

        info!("Mention database ready");
        Ok(store)
    }

    /// In-memory store for tests. Single connection, since every `:memory:`
    /// connection is its own database.
    #[cfg(test)]
    pub(crate) async fn in_memory() -> Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self {
            pool,
            database_path: PathBuf::from(":memory:"),
        };
        store.initialize_database().await?;
        Ok(store)
    }

    pub fn database_path(&self) -> &PathBuf {
        &self.database_path
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn initialize_database(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stock_mentions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT NOT NULL UNIQUE,
                company_name TEXT NOT NULL,
                market TEXT,
                mention_count INTEGER NOT NULL DEFAULT 0,
                last_mentioned_at INTEGER NOT NULL,
                sentiment TEXT,
                tags TEXT,
                description TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS legacy_picks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT NOT NULL UNIQUE,
                company_name TEXT NOT NULL,
                market TEXT,
                post_count INTEGER NOT NULL DEFAULT 0,
                last_mentioned_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_mentions_last_mentioned
             ON stock_mentions(last_mentioned_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn parse_timestamp_ms(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| AppError::Parse(format!("Invalid timestamp: {}", ms)))
}

fn row_to_record(row: &SqliteRow) -> Result<StockRecord> {
    let ticker: String = row.try_get("ticker").map_err(AppError::from)?;
    let name: String = row.try_get("company_name").map_err(AppError::from)?;
    let market: Option<String> = row.try_get("market").map_err(AppError::from)?;
    let mention_count: i64 = row.try_get("mention_count").map_err(AppError::from)?;
    let last_mentioned_ms: i64 = row.try_get("last_mentioned_at").map_err(AppError::from)?;
    let sentiment: Option<String> = row.try_get("sentiment").map_err(AppError::from)?;
    let tags: Option<String> = row.try_get("tags").map_err(AppError::from)?;
    let description: Option<String> = row.try_get("description").map_err(AppError::from)?;

    let market = market
        .as_deref()
        .and_then(Market::parse)
        .unwrap_or_else(|| Market::infer_from_ticker(&ticker));

    // Tags are stored as a JSON array; malformed or absent tags degrade to empty.
    let tags = tags
        .as_deref()
        .and_then(|t| serde_json::from_str::<Vec<String>>(t).ok())
        .unwrap_or_default();

    Ok(StockRecord {
        last_mentioned_at: parse_timestamp_ms(last_mentioned_ms)?,
        sentiment: sentiment
            .as_deref()
            .map(Sentiment::parse)
            .unwrap_or(Sentiment::Unknown),
        ticker,
        name,
        market,
        mention_count: mention_count.max(0) as u32,
        tags,
        post_count: None,
        description,
    })
}

#[async_trait]
impl MentionStore for SqliteMentionStore {
    async fn top_mentions(&self, limit: u32) -> Result<Vec<StockRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT ticker, company_name, market, mention_count,
                   last_mentioned_at, sentiment, tags, description
            FROM stock_mentions
            WHERE mention_count > 0
            ORDER BY last_mentioned_at DESC, mention_count DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn top_mentions_legacy(&self, limit: u32) -> Result<Vec<StockRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT ticker, company_name, market, post_count, last_mentioned_at
            FROM legacy_picks
            ORDER BY last_mentioned_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let ticker: String = row.try_get("ticker").map_err(AppError::from)?;
                let name: String = row.try_get("company_name").map_err(AppError::from)?;
                let market: Option<String> = row.try_get("market").map_err(AppError::from)?;
                let post_count: i64 = row.try_get("post_count").map_err(AppError::from)?;
                let last_mentioned_ms: i64 =
                    row.try_get("last_mentioned_at").map_err(AppError::from)?;

                let market = market
                    .as_deref()
                    .and_then(Market::parse)
                    .unwrap_or_else(|| Market::infer_from_ticker(&ticker));
                let post_count = post_count.max(0) as u32;

                Ok(StockRecord {
                    ticker,
                    name,
                    market,
                    mention_count: post_count,
                    last_mentioned_at: parse_timestamp_ms(last_mentioned_ms)?,
                    tags: Vec::new(),
                    sentiment: Sentiment::Unknown,
                    post_count: Some(post_count),
                    description: None,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn insert_mention(
        store: &SqliteMentionStore,
        ticker: &str,
        market: Option<&str>,
        mention_count: i64,
        last_mentioned_ms: i64,
        sentiment: Option<&str>,
        tags: Option<&str>,
    ) {
        sqlx::query(
            "INSERT INTO stock_mentions
             (ticker, company_name, market, mention_count, last_mentioned_at, sentiment, tags)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(ticker)
        .bind(format!("{} Inc", ticker))
        .bind(market)
        .bind(mention_count)
        .bind(last_mentioned_ms)
        .bind(sentiment)
        .bind(tags)
        .execute(store.pool())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_top_mentions_ordered_by_recency() {
        let store = SqliteMentionStore::in_memory().await.unwrap();
        insert_mention(&store, "AAPL", Some("NASDAQ"), 5, 1_000, None, None).await;
        insert_mention(&store, "TSLA", Some("NASDAQ"), 3, 3_000, None, None).await;
        insert_mention(&store, "NVDA", Some("NASDAQ"), 9, 2_000, None, None).await;

        let records = store.top_mentions(10).await.unwrap();
        let tickers: Vec<&str> = records.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["TSLA", "NVDA", "AAPL"]);
    }

    #[tokio::test]
    async fn test_top_mentions_respects_limit_and_skips_zero_counts() {
        let store = SqliteMentionStore::in_memory().await.unwrap();
        insert_mention(&store, "AAPL", None, 5, 1_000, None, None).await;
        insert_mention(&store, "TSLA", None, 0, 3_000, None, None).await;
        insert_mention(&store, "NVDA", None, 9, 2_000, None, None).await;

        let records = store.top_mentions(1).await.unwrap();
        assert_eq!(records.len(), 1);
        // TSLA is more recent but has zero mentions, so NVDA wins.
        assert_eq!(records[0].ticker, "NVDA");
    }

    #[tokio::test]
    async fn test_row_mapping_parses_tags_sentiment_and_market() {
        let store = SqliteMentionStore::in_memory().await.unwrap();
        insert_mention(
            &store,
            "005930",
            None,
            12,
            1_700_000_000_000,
            Some("positive"),
            Some(r#"["semiconductor","memory"]"#),
        )
        .await;

        let records = store.top_mentions(10).await.unwrap();
        let record = &records[0];
        // Numeric 6-digit ticker with no market column infers KOSPI.
        assert_eq!(record.market, Market::Kospi);
        assert_eq!(record.sentiment, Sentiment::Positive);
        assert_eq!(record.tags, vec!["semiconductor", "memory"]);
        assert_eq!(record.mention_count, 12);
        assert!(record.post_count.is_none());
    }

    #[tokio::test]
    async fn test_malformed_tags_degrade_to_empty() {
        let store = SqliteMentionStore::in_memory().await.unwrap();
        insert_mention(&store, "AAPL", Some("NASDAQ"), 1, 1_000, None, Some("not json")).await;

        let records = store.top_mentions(10).await.unwrap();
        assert!(records[0].tags.is_empty());
    }

    #[tokio::test]
    async fn test_legacy_rows_carry_post_count() {
        let store = SqliteMentionStore::in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO legacy_picks (ticker, company_name, market, post_count, last_mentioned_at)
             VALUES ('TSLA', 'Tesla', 'NASDAQ', 42, 2000)",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let records = store.top_mentions_legacy(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].post_count, Some(42));
        assert_eq!(records[0].mention_count, 42);
        assert_eq!(records[0].sentiment, Sentiment::Unknown);
    }
}
