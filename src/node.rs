//! Node bootstrap: wires stores, ledger, identity challenges and the registry
//! from a [`Config`].

use crate::blockchain::Ledger;
use crate::config::Config;
use crate::error::ChainError;
use crate::identity::IdentityChallengeStore;
use crate::persistence::{Database, KeyValueStore, BLOCKS_NAMESPACE, IDENTITY_NAMESPACE};
use crate::registry::StarRegistry;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Open (or create) the database at `config.database.path` and build the registry on top.
pub fn open_registry(config: &Config) -> Result<StarRegistry, ChainError> {
    let db_path = &config.database.path;

    // Ensure data directory (parent of DB path) exists
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                ChainError::Storage(format!("Failed to create data dir {:?}: {}", parent, e))
            })?;
        }
    }

    let blocks: Arc<dyn KeyValueStore> = Arc::new(Database::open(db_path, BLOCKS_NAMESPACE)?);
    let identity: Arc<dyn KeyValueStore> = Arc::new(Database::open(db_path, IDENTITY_NAMESPACE)?);

    let ledger = Ledger::open(blocks)?;
    info!("Ledger ready at {} (height {})", db_path, ledger.height());

    let identity = IdentityChallengeStore::new(identity)
        .with_window(config.registry.validation_window_secs);

    Ok(StarRegistry::new(Arc::new(ledger), Arc::new(identity))
        .with_max_story_bytes(config.registry.max_story_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_registry_creates_data_dir_and_genesis() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.database.path = dir
            .path()
            .join("nested/data/starchain.db")
            .to_string_lossy()
            .into_owned();
        config.registry.validation_window_secs = 60;

        let registry = open_registry(&config).unwrap();
        assert_eq!(registry.ledger().height(), 0);
        assert_eq!(registry.identity().window(), 60);
        assert!(registry.ledger().validate_block(0).unwrap());

        // Reopening resolves the same chain instead of writing a second genesis
        let genesis_hash = registry.ledger().get_by_height(0).unwrap().hash;
        drop(registry);
        let reopened = open_registry(&config).unwrap();
        assert_eq!(reopened.ledger().height(), 0);
        assert_eq!(reopened.ledger().get_by_height(0).unwrap().hash, genesis_hash);
    }
}
