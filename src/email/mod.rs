pub mod common;
pub mod extractor;
pub mod pipeline;

// Re-export commonly used items
pub use common::{ClassificationResult, NormalizedMessage, RawMessage, RunReport};
pub use extractor::extract;
pub use pipeline::IngestionPipeline;
