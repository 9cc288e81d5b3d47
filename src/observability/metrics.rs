//! Metrics for the usage pipeline
//!
//! Thin recording helpers over the `metrics` facade, named with the standard
//! Prometheus conventions and rendered by the `/metrics` endpoint.

use std::fmt;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Pipeline runs
    PipelineRunsStarted,
    PipelineRunsCompleted,
    PipelineRunsFailed,
    PipelineRunsDisconnected,
    PipelineEntitiesEnriched,
    PipelineBatchesEmitted,
    PipelineBatchSize,

    // Enrichment
    EnrichmentSubqueryFailures,

    // Content pagination
    ContentPagesFetched,

    // Rate limiting
    RateLimiterWaits,
    RateLimiterWaitSeconds,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::PipelineRunsStarted => "usage_pipeline_runs_started_total",
            MetricName::PipelineRunsCompleted => "usage_pipeline_runs_completed_total",
            MetricName::PipelineRunsFailed => "usage_pipeline_runs_failed_total",
            MetricName::PipelineRunsDisconnected => "usage_pipeline_runs_disconnected_total",
            MetricName::PipelineEntitiesEnriched => "usage_pipeline_entities_enriched_total",
            MetricName::PipelineBatchesEmitted => "usage_pipeline_batches_emitted_total",
            MetricName::PipelineBatchSize => "usage_pipeline_batch_size",
            MetricName::EnrichmentSubqueryFailures => "usage_enrichment_subquery_failures_total",
            MetricName::ContentPagesFetched => "usage_content_pages_fetched_total",
            MetricName::RateLimiterWaits => "usage_rate_limiter_waits_total",
            MetricName::RateLimiterWaitSeconds => "usage_rate_limiter_wait_seconds",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            MetricName::PipelineRunsStarted => "Pipeline runs started",
            MetricName::PipelineRunsCompleted => "Pipeline runs that emitted a complete event",
            MetricName::PipelineRunsFailed => "Pipeline runs that emitted an error event",
            MetricName::PipelineRunsDisconnected => "Pipeline runs stopped because the consumer went away",
            MetricName::PipelineEntitiesEnriched => "Entities turned into enriched records",
            MetricName::PipelineBatchesEmitted => "Batch events emitted",
            MetricName::PipelineBatchSize => "Records per emitted batch",
            MetricName::EnrichmentSubqueryFailures => "Sub-queries replaced by zero defaults, by service",
            MetricName::ContentPagesFetched => "Content listing pages fetched",
            MetricName::RateLimiterWaits => "Acquisitions that had to wait for a slot, by limiter",
            MetricName::RateLimiterWaitSeconds => "Time spent waiting for a limiter slot",
        }
    }

    fn is_histogram(&self) -> bool {
        matches!(self, MetricName::PipelineBatchSize | MetricName::RateLimiterWaitSeconds)
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        [
            MetricName::PipelineRunsStarted,
            MetricName::PipelineRunsCompleted,
            MetricName::PipelineRunsFailed,
            MetricName::PipelineRunsDisconnected,
            MetricName::PipelineEntitiesEnriched,
            MetricName::PipelineBatchesEmitted,
            MetricName::PipelineBatchSize,
            MetricName::EnrichmentSubqueryFailures,
            MetricName::ContentPagesFetched,
            MetricName::RateLimiterWaits,
            MetricName::RateLimiterWaitSeconds,
        ]
        .into_iter()
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder. Calling it again is a no-op.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;

    for metric in MetricName::all_metrics() {
        if metric.is_histogram() {
            ::metrics::describe_histogram!(metric.as_str(), metric.help());
        } else {
            ::metrics::describe_counter!(metric.as_str(), metric.help());
        }
    }

    PROMETHEUS_HANDLE.set(handle).ok();
    info!("Metrics system initialized");
    Ok(())
}

/// Prometheus text exposition, if the recorder is installed
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

// ============================================================================
// Pipeline Metrics
// ============================================================================

pub mod pipeline {
    use super::MetricName;
    use crate::pipeline::RunOutcome;

    pub fn run_started() {
        ::metrics::counter!(MetricName::PipelineRunsStarted.as_str()).increment(1);
    }

    pub fn run_finished(outcome: RunOutcome) {
        let metric = match outcome {
            RunOutcome::Completed => MetricName::PipelineRunsCompleted,
            RunOutcome::Failed => MetricName::PipelineRunsFailed,
            RunOutcome::Disconnected => MetricName::PipelineRunsDisconnected,
        };
        ::metrics::counter!(metric.as_str()).increment(1);
    }

    pub fn entity_enriched() {
        ::metrics::counter!(MetricName::PipelineEntitiesEnriched.as_str()).increment(1);
    }

    pub fn batch_emitted(size: usize) {
        ::metrics::counter!(MetricName::PipelineBatchesEmitted.as_str()).increment(1);
        ::metrics::histogram!(MetricName::PipelineBatchSize.as_str()).record(size as f64);
    }
}

// ============================================================================
// Enrichment Metrics
// ============================================================================

pub mod enrichment {
    use super::MetricName;

    /// Record a sub-query that was absorbed into zero defaults
    pub fn subquery_failed(service: &'static str) {
        ::metrics::counter!(MetricName::EnrichmentSubqueryFailures.as_str(), "service" => service).increment(1);
    }
}

// ============================================================================
// Content Metrics
// ============================================================================

pub mod content {
    use super::MetricName;

    pub fn page_fetched() {
        ::metrics::counter!(MetricName::ContentPagesFetched.as_str()).increment(1);
    }
}

// ============================================================================
// Rate Limiter Metrics
// ============================================================================

pub mod rate_limiter {
    use super::MetricName;

    /// Record one wait for a slot on the named limiter
    pub fn wait(limiter: &str, secs: f64) {
        let limiter = limiter.to_string();
        ::metrics::counter!(MetricName::RateLimiterWaits.as_str(), "limiter" => limiter.clone()).increment(1);
        ::metrics::histogram!(MetricName::RateLimiterWaitSeconds.as_str(), "limiter" => limiter).record(secs);
    }
}
