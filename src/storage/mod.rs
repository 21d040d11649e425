pub mod files;
pub mod jsonl;
pub mod memory;
pub mod postgres;
pub mod traits;
pub mod workspace;

pub use files::LocalFileStore;
pub use jsonl::JsonlHistoryStore;
pub use memory::{InMemoryFileStore, InMemoryHistoryStore};
pub use postgres::PostgresHistoryStore;
pub use traits::{FileStore, HistoryStore};
pub use workspace::{FileRevision, FileSnapshot, Workspace};

use std::sync::Arc;

use crate::config::HistoryConfig;
use crate::error::Result;

pub async fn open_history_store(config: &HistoryConfig) -> Result<Arc<dyn HistoryStore>> {
    let store: Arc<dyn HistoryStore> = match config {
        HistoryConfig::Memory => Arc::new(InMemoryHistoryStore::new()),
        HistoryConfig::Jsonl { path } => {
            log::info!("Conflict history at {}", path.display());
            Arc::new(JsonlHistoryStore::open(path).await?)
        }
        HistoryConfig::Postgres { url } => {
            let store = PostgresHistoryStore::new(url).await?;
            store.run_migrations().await?;
            log::info!("Conflict history in PostgreSQL");
            Arc::new(store)
        }
    };
    Ok(store)
}
