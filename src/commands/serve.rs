use crate::constants::{SNAPSHOT_TTL_SECS, TOP_MENTIONS_LIMIT};
use crate::server::{self, AppState};
use crate::services::{
    AggregationPipeline, ChartApiClient, MetricsRecorder, PriceLookupService, SnapshotCache,
    SqliteMentionStore,
};
use chrono::Duration;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

pub async fn run(database: PathBuf, port: u16) {
    println!("🚀 Starting pickstream server on port {}", port);
    println!("📁 Mention database: {}", database.display());

    let store = match SqliteMentionStore::new(database).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("❌ Failed to open mention database: {}", e);
            std::process::exit(1);
        }
    };

    let provider = match ChartApiClient::new() {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("❌ Failed to build quote client: {}", e);
            std::process::exit(1);
        }
    };

    // Caches are constructed here and injected; no ambient globals. They live
    // for the process lifetime and need no teardown.
    let quotes = Arc::new(PriceLookupService::new(provider));
    let pipeline = Arc::new(AggregationPipeline::new(
        store,
        quotes.clone(),
        TOP_MENTIONS_LIMIT,
    ));
    let snapshot = Arc::new(SnapshotCache::new(Duration::seconds(SNAPSHOT_TTL_SECS)));
    let metrics = Arc::new(MetricsRecorder::new());

    let app_state = AppState {
        snapshot,
        pipeline,
        quotes,
        metrics,
        started_at: Instant::now(),
    };

    if let Err(e) = server::serve(app_state, port).await {
        eprintln!("❌ Server error: {}", e);
        std::process::exit(1);
    }
}
