use thiserror::Error;

use crate::source::SourceError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] SourceError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
