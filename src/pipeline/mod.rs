mod error;
mod pipeline;
mod types;

pub use error::PipelineError;
pub use pipeline::IngestionPipeline;
pub use types::{CycleOutcome, ObserverHandle, PipelineSettings, PipelineStats};
