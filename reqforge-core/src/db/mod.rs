//! Persistence backends for projects
//!
//! The store talks to storage only through [`ProjectBackend`], so any medium
//! that can atomically replace one project snapshot and enumerate all of them
//! can be plugged in.

mod json_backend;
mod memory_backend;
mod sqlite_backend;
mod traits;

pub use json_backend::JsonDirBackend;
pub use memory_backend::MemoryBackend;
pub use sqlite_backend::SqliteBackend;
pub use traits::{BackendType, ProjectBackend};

use anyhow::Result;
use tracing::info;

use crate::config::StorageConfig;

/// File name of the SQLite database inside the storage directory
pub const SQLITE_FILE_NAME: &str = "reqforge.db";

/// Creates the backend described by the storage configuration
///
/// Without a storage directory only the memory backend is possible.
pub fn create_backend(config: &StorageConfig) -> Result<Box<dyn ProjectBackend>> {
    let backend: Box<dyn ProjectBackend> = match (config.backend, config.dir.as_ref()) {
        (BackendType::Memory, _) | (_, None) => Box::new(MemoryBackend::new()),
        (BackendType::Json, Some(dir)) => Box::new(JsonDirBackend::new(dir)?),
        (BackendType::Sqlite, Some(dir)) => Box::new(SqliteBackend::new(dir.join(SQLITE_FILE_NAME))?),
    };
    info!(
        backend = %backend.backend_type(),
        location = %backend.location(),
        "Using storage backend"
    );
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_backend_by_type() {
        let dir = TempDir::new().unwrap();
        let mut config = StorageConfig {
            backend: BackendType::Json,
            dir: Some(dir.path().to_path_buf()),
        };
        assert_eq!(create_backend(&config).unwrap().backend_type(), BackendType::Json);

        config.backend = BackendType::Sqlite;
        let sqlite = create_backend(&config).unwrap();
        assert_eq!(sqlite.backend_type(), BackendType::Sqlite);
        assert!(dir.path().join(SQLITE_FILE_NAME).exists());

        config.dir = None;
        assert_eq!(create_backend(&config).unwrap().backend_type(), BackendType::Memory);
    }
}
