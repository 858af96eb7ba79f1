//! Cache and performance tuning constants.
//!
//! TTLs are deliberately asymmetric: the ranked pick list changes at most a
//! few times per day, while live prices go stale within minutes.

/// TTL for the aggregated pick-list snapshot (12 hours)
pub const SNAPSHOT_TTL_SECS: i64 = 12 * 60 * 60;

/// TTL for a single cached price quote (5 minutes)
pub const PRICE_TTL_SECS: i64 = 5 * 60;

/// How many top-mentioned instruments the pipeline loads from storage
pub const TOP_MENTIONS_LIMIT: u32 = 10;

/// Default page size for the /picks endpoint
pub const DEFAULT_PAGE_LIMIT: usize = 10;

/// Default page number (1-indexed)
pub const DEFAULT_PAGE: usize = 1;

/// Target end-to-end response time for /picks
pub const RESPONSE_TIME_TARGET_MS: u64 = 500;

/// Target rolling cache hit rate for the snapshot slot
pub const CACHE_HIT_RATE_TARGET: f64 = 0.8;

/// Minimum observations before the hit-rate alert can fire
pub const MIN_HIT_RATE_OBSERVATIONS: u64 = 5;

/// Ring buffer capacity for performance samples
pub const METRICS_BUFFER_CAPACITY: usize = 1000;

/// Per-request timeout for the external quote provider
pub const QUOTE_TIMEOUT_SECS: u64 = 4;

/// Fixed identifying header sent with every quote request
pub const QUOTE_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Default base URL for the chart-style quote endpoint
pub const QUOTE_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Cache-Control max-age for successful /picks responses
pub const RESPONSE_MAX_AGE_SECS: u32 = 300;

/// Cache-Control stale-while-revalidate window for successful responses
pub const RESPONSE_SWR_SECS: u32 = 600;
