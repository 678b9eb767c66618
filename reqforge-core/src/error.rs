use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the requirements store
///
/// Unknown ids are not errors; lookups return `None` and mutations `false`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Loading projects from the backend failed at startup
    #[error("Failed to load projects from {location}: {source}")]
    Load {
        location: String,
        #[source]
        source: anyhow::Error,
    },

    /// The backend rejected a write; the in-memory project was left untouched
    #[error("Failed to persist project {project_id}: {source}")]
    PersistenceFailure {
        project_id: Uuid,
        #[source]
        source: anyhow::Error,
    },
}
