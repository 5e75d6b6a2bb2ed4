//! `chatloom threads` - List stored conversation threads.

use std::sync::Arc;

use chatloom_checkpoint::{InMemoryStore, SqliteStore};
use chatloom_config::AppConfig;
use chatloom_core::CheckpointStore;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let store: Arc<dyn CheckpointStore> = match config.checkpoint.backend.as_str() {
        "memory" => Arc::new(InMemoryStore::new()),
        _ => Arc::new(SqliteStore::new(&config.checkpoint.db_path).await?),
    };

    let ids = store.list_thread_ids().await?;

    if ids.is_empty() {
        println!("No threads stored yet.");
        return Ok(());
    }

    println!("{} thread(s):", ids.len());
    for id in ids {
        let history = store.load(&id).await?;
        println!("  {id}  ({} messages)", history.len());
    }

    Ok(())
}
