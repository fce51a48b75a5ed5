//! Durable client-side storage

pub mod tokens;

use std::sync::Arc;

use crate::config::StorageConfig;

pub use tokens::{FileTokenStore, MemoryTokenStore, TokenStore};

/// Storage handles shared by the services
#[derive(Clone)]
pub struct Repository {
    pub tokens: Arc<dyn TokenStore>,
}

impl Repository {
    /// File-backed storage rooted at the configured directory
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            tokens: Arc::new(FileTokenStore::new(config.path_for(&config.token_key))),
        }
    }

    /// Storage that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            tokens: Arc::new(MemoryTokenStore::default()),
        }
    }
}
