//! Engine-level errors.

use thiserror::Error;

use crate::types::ValidationError;

/// A collaborator error with its concrete type erased.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors from running the aggregation pipeline against its collaborators.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("event source failed: {0}")]
    Source(BoxError),

    #[error("category registry failed: {0}")]
    Registry(BoxError),

    #[error("statistics store failed: {0}")]
    Store(BoxError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl EngineError {
    pub(crate) fn source_err(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Source(Box::new(e))
    }

    pub(crate) fn registry_err(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Registry(Box::new(e))
    }

    pub(crate) fn store_err(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Store(Box::new(e))
    }
}
