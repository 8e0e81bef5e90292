use thiserror::Error;
use wxproxy_core::DatabaseError;

/// Why a call record was not saved.
///
/// Persistence is advisory: these are logged and reported as a flag, never
/// turned into a failed response.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Could not serialize call record: {0}")]
    Serialize(String),

    #[error("All insert variants failed: {0}")]
    AllVariantsFailed(String),
}

impl From<serde_json::Error> for PersistError {
    fn from(e: serde_json::Error) -> Self {
        PersistError::Serialize(e.to_string())
    }
}
