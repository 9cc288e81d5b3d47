// Usage aggregation pipeline: rate limiting, pagination, enrichment and progress streaming

pub mod aggregation;
pub mod enricher;
pub mod page_walker;
pub mod progress;
pub mod rate_limiter;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types from each stage
pub use aggregation::{AggregationPipeline, PipelineSettings, PipelineState, RunOutcome, RunSummary};
pub use enricher::{EnrichmentWarning, EntityEnricher};
pub use progress::{ProgressEvent, ProgressStream};
pub use rate_limiter::{Limits, RateLimiter, ServiceLimiters};
