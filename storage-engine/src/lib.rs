pub mod moka_cache;
pub mod sled_store;

pub use moka_cache::MokaCache;
pub use sled_store::SledStore;

use cacheback::{CacheEntry, EntryStore};
use shared::Result;
use shared::config::{Settings, StoreBackend};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Build the entry store selected by `settings`.
pub fn store_from_settings(settings: &Settings) -> Result<Arc<EntryStore>> {
    match settings.store {
        StoreBackend::Moka => {
            info!(
                "Using in-memory moka store (max entries: {:?})",
                settings.store_max_entries
            );
            Ok(Arc::new(MokaCache::<String, CacheEntry>::new(
                "cacheback".to_string(),
                settings.store_max_entries,
                None,
            )))
        }
        StoreBackend::Sled => {
            let path = Path::new(&settings.data_dir).join("cacheback.sled");
            info!("Using sled store at {}", path.display());
            Ok(Arc::new(SledStore::<CacheEntry>::new(path)?))
        }
    }
}
