pub mod entity_cache;
pub mod metrics;
pub mod pipeline;
pub mod quotes;
pub mod snapshot_cache;
pub mod storage;

pub use entity_cache::EntityCache;
pub use metrics::{
    HealthReport, HealthState, MetricsRecorder, PerformanceSample, PerformanceThresholds,
    SharedMetrics,
};
pub use pipeline::AggregationPipeline;
pub use quotes::{ChartApiClient, PriceLookupService, QuoteProvider};
pub use snapshot_cache::{SnapshotCache, SnapshotStats};
pub use storage::{MentionStore, SqliteMentionStore};
