use crate::constants::TOP_MENTIONS_LIMIT;
use crate::services::{MentionStore, SqliteMentionStore};
use std::path::PathBuf;

pub async fn run(database: PathBuf) {
    println!("📊 pickstream status");
    println!("📁 Mention database: {}", database.display());

    let store = match SqliteMentionStore::new(database).await {
        Ok(store) => store,
        Err(e) => {
            eprintln!("❌ Failed to open mention database: {}", e);
            std::process::exit(1);
        }
    };

    match store.top_mentions(TOP_MENTIONS_LIMIT).await {
        Ok(records) if records.is_empty() => {
            println!("No mentioned instruments recorded yet.");
        }
        Ok(records) => {
            println!("Top {} mentioned instruments:", records.len());
            for (index, record) in records.iter().enumerate() {
                println!(
                    "  {}. {} ({}/{}) - {} mentions, last {}",
                    index + 1,
                    record.name,
                    record.ticker,
                    record.market,
                    record.mention_count,
                    record.last_mentioned_at.format("%Y-%m-%d")
                );
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to query mentions: {}", e);
            std::process::exit(1);
        }
    }
}
