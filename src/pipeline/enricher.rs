use std::sync::Arc;

use tracing::{debug, warn};

use crate::app::ports::{ConsumerProbe, ContentPort, ProfilePort, RateLimiterPort};
use crate::constants::{CONTENT_SERVICE, PROFILE_SERVICE};
use crate::error::{AggregatorError, Result};
use crate::pipeline::page_walker::{PageTotals, PageWalker};
use crate::pipeline::rate_limiter::ServiceLimiters;
use crate::types::{ContentItem, EnrichedRecord, Entity};

/// A sub-query that failed and was replaced by its zero default.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentWarning {
    pub entity_id: String,
    pub service: &'static str,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Enrichment {
    pub record: EnrichedRecord,
    pub warnings: Vec<EnrichmentWarning>,
}

/// Builds one [`EnrichedRecord`] per entity from the content and profile services.
///
/// Each sub-query is rate limited on its own service's limiter and fails on its
/// own: a failed lookup degrades that field to zero and never aborts the run.
pub struct EntityEnricher {
    content: Arc<dyn ContentPort>,
    profile: Arc<dyn ProfilePort>,
    content_limiter: Arc<dyn RateLimiterPort>,
    profile_limiter: Arc<dyn RateLimiterPort>,
}

impl EntityEnricher {
    pub fn new(content: Arc<dyn ContentPort>, profile: Arc<dyn ProfilePort>, limiters: &ServiceLimiters) -> Self {
        Self {
            content,
            profile,
            content_limiter: limiters.content.clone(),
            profile_limiter: limiters.profile.clone(),
        }
    }

    /// Returns `None` only when the consumer went away; no further sub-query is
    /// started once that is observed.
    pub async fn enrich(&self, entity: &Entity, probe: &dyn ConsumerProbe) -> Option<Enrichment> {
        let mut warnings = Vec::new();

        let files = match self.storage_totals(entity, probe).await {
            Ok(totals) => totals,
            Err(AggregatorError::ConsumerDisconnected) => return None,
            Err(e) => {
                warnings.push(degraded(entity, CONTENT_SERVICE, &e));
                PageTotals::default()
            }
        };

        if probe.is_disconnected() {
            return None;
        }

        let messages = match self.message_count(entity).await {
            Ok(count) => count,
            Err(e) => {
                warnings.push(degraded(entity, PROFILE_SERVICE, &e));
                0
            }
        };

        let record = EnrichedRecord::new(entity, files.count, messages, files.total_size);
        debug!(
            entity = %entity.id,
            files = record.file_count,
            bytes = record.total_storage_bytes,
            messages = record.message_count,
            "Entity enriched"
        );
        crate::observability::metrics::pipeline::entity_enriched();
        Some(Enrichment { record, warnings })
    }

    async fn storage_totals(&self, entity: &Entity, probe: &dyn ConsumerProbe) -> Result<PageTotals> {
        let walker = PageWalker::new(self.content_limiter.as_ref(), probe);
        let content = &self.content;
        let owner = entity.id.as_str();
        walker
            .walk(
                move |token| async move { content.list_page(owner, token.as_deref()).await },
                |item: &ContentItem| (1, item.size_bytes.unwrap_or(0)),
            )
            .await
    }

    async fn message_count(&self, entity: &Entity) -> Result<u64> {
        self.profile_limiter.acquire().await?;
        self.profile.message_count(&entity.id).await
    }
}

fn degraded(entity: &Entity, service: &'static str, error: &AggregatorError) -> EnrichmentWarning {
    warn!(entity = %entity.id, service, error = %error, "Sub-query failed, using zero defaults");
    crate::observability::metrics::enrichment::subquery_failed(service);
    EnrichmentWarning {
        entity_id: entity.id.clone(),
        service,
        message: error.to_string(),
    }
}
