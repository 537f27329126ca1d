// Pipeline ingestion: the archive file, the downloaded predictions and the engagement lines

pub mod archive;
pub mod engagement;
pub mod ingest_common;
pub mod predictions;

// Re-export key types and functions for external use
pub use archive::read_archive;
pub use engagement::{read_engagement, EngagementLoad, EngagementMetrics, LineOutcome, SkipReason};
pub use predictions::{fetch_predictions, read_cached_predictions};
