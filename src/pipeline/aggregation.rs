use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::app::ports::{ConsumerProbe, ContentPort, DirectoryPort, ProfilePort, RateLimiterPort};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipeline::enricher::{EnrichmentWarning, EntityEnricher};
use crate::pipeline::progress::{BatchPayload, ProgressStream};
use crate::pipeline::rate_limiter::ServiceLimiters;
use crate::types::{EnrichedRecord, Entity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Listing,
    Enriching,
    Draining,
    Terminated(RunOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// `complete` was emitted
    Completed,
    /// `error` was emitted
    Failed,
    /// The consumer went away; nothing further was emitted
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub batch_size: usize,
    pub pacing_delay: Duration,
}

impl From<&PipelineConfig> for PipelineSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            pacing_delay: config.pacing_delay(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    pub processed_count: usize,
    pub total_count: usize,
    pub batches_emitted: usize,
    pub warnings: Vec<EnrichmentWarning>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    fn new(run_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            outcome: RunOutcome::Completed,
            processed_count: 0,
            total_count: 0,
            batches_emitted: 0,
            warnings: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }
}

// How the non-error part of a run ended
enum Flow {
    Drained,
    ConsumerGone,
}

/// Lists the directory, enriches every entity in listing order and streams the
/// records in fixed-size batches.
pub struct AggregationPipeline {
    directory: Arc<dyn DirectoryPort>,
    directory_limiter: Arc<dyn RateLimiterPort>,
    enricher: EntityEnricher,
    settings: PipelineSettings,
    state: PipelineState,
}

impl AggregationPipeline {
    pub fn new(
        directory: Arc<dyn DirectoryPort>,
        content: Arc<dyn ContentPort>,
        profile: Arc<dyn ProfilePort>,
        limiters: &ServiceLimiters,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            directory,
            directory_limiter: limiters.directory.clone(),
            enricher: EntityEnricher::new(content, profile, limiters),
            settings,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Drive one run to its end. The stream is consumed: it is closed after
    /// `complete` or `error`, or dropped silently if the consumer disconnected.
    pub async fn run(mut self, stream: ProgressStream) -> RunSummary {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", run_id = %run_id);
        async move {
            crate::observability::metrics::pipeline::run_started();
            let mut summary = RunSummary::new(run_id);

            let flow = self.drive(&stream, &mut summary).await;
            let outcome = match flow {
                Ok(Flow::Drained) => {
                    self.transition(PipelineState::Draining);
                    if stream.complete(summary.processed_count, summary.total_count).await {
                        info!(
                            processed = summary.processed_count,
                            warnings = summary.warnings.len(),
                            "Run complete"
                        );
                        RunOutcome::Completed
                    } else {
                        info!(processed = summary.processed_count, "Consumer left before the complete event");
                        RunOutcome::Disconnected
                    }
                }
                Ok(Flow::ConsumerGone) => {
                    info!(processed = summary.processed_count, "Consumer disconnected, stopping run");
                    drop(stream);
                    RunOutcome::Disconnected
                }
                Err(e) => {
                    error!(error = %e, "Run failed");
                    if stream.fail(e.to_string()).await {
                        RunOutcome::Failed
                    } else {
                        RunOutcome::Disconnected
                    }
                }
            };

            self.transition(PipelineState::Terminated(outcome));
            crate::observability::metrics::pipeline::run_finished(outcome);
            summary.outcome = outcome;
            summary.finished_at = Utc::now();
            summary
        }
        .instrument(span)
        .await
    }

    async fn drive(&mut self, stream: &ProgressStream, summary: &mut RunSummary) -> Result<Flow> {
        self.transition(PipelineState::Listing);
        if stream.is_disconnected() {
            return Ok(Flow::ConsumerGone);
        }
        let entities = self.list_entities().await?;
        let total = entities.len();
        summary.total_count = total;
        info!(total, "Directory listed");

        if !stream.start(total).await {
            return Ok(Flow::ConsumerGone);
        }

        self.transition(PipelineState::Enriching);
        let batch_size = self.settings.batch_size;
        let mut batch: Vec<EnrichedRecord> = Vec::with_capacity(batch_size);

        for (index, entity) in entities.iter().enumerate() {
            if index > 0 && !self.settings.pacing_delay.is_zero() {
                tokio::time::sleep(self.settings.pacing_delay).await;
            }
            if stream.is_disconnected() {
                return Ok(Flow::ConsumerGone);
            }

            let enrichment = match self.enricher.enrich(entity, stream).await {
                Some(enrichment) => enrichment,
                None => return Ok(Flow::ConsumerGone),
            };
            summary.warnings.extend(enrichment.warnings);
            batch.push(enrichment.record);
            summary.processed_count += 1;

            let processed = summary.processed_count;
            if batch.len() == batch_size || processed == total {
                let records = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                let size = records.len();
                let delivered = stream
                    .batch(BatchPayload {
                        records,
                        processed_count: processed,
                        total_count: total,
                        is_complete: processed == total,
                    })
                    .await;
                if !delivered {
                    return Ok(Flow::ConsumerGone);
                }
                summary.batches_emitted += 1;
                crate::observability::metrics::pipeline::batch_emitted(size);
                debug!(processed, total, size, "Batch emitted");
            }
        }

        Ok(Flow::Drained)
    }

    async fn list_entities(&self) -> Result<Vec<Entity>> {
        self.directory_limiter.acquire().await?;
        self.directory.list_entities().await
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = ?self.state, to = ?next, "Pipeline state change");
        self.state = next;
    }
}
