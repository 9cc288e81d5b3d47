use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ContentItem, Entity, Page};

/// Directory listing, already bounded and ordered by the service.
#[async_trait]
pub trait DirectoryPort: Send + Sync {
    async fn list_entities(&self) -> Result<Vec<Entity>>;
}

/// Paginated listing of items owned by one entity, excluding soft-deleted items.
#[async_trait]
pub trait ContentPort: Send + Sync {
    async fn list_page(&self, owner: &str, page_token: Option<&str>) -> Result<Page<ContentItem>>;
}

/// Point lookup of an entity's total message count.
#[async_trait]
pub trait ProfilePort: Send + Sync {
    async fn message_count(&self, entity_id: &str) -> Result<u64>;
}

#[async_trait]
pub trait RateLimiterPort: Send + Sync {
    /// Wait for an admission slot. Admissions are never given back.
    async fn acquire(&self) -> Result<()>;
}

/// Whether the consumer of a run is still listening.
pub trait ConsumerProbe: Send + Sync {
    fn is_disconnected(&self) -> bool;
}

/// Probe for runs whose consumer cannot go away (tests, one-shot CLI runs).
pub struct AlwaysConnected;

impl ConsumerProbe for AlwaysConnected {
    fn is_disconnected(&self) -> bool {
        false
    }
}
