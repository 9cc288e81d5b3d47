//! In-memory ports shared by the pipeline unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::app::ports::{ConsumerProbe, ContentPort, DirectoryPort, ProfilePort, RateLimiterPort};
use crate::error::{AggregatorError, Result};
use crate::types::{ContentItem, Entity, Page};

#[derive(Default)]
pub struct CountingLimiter {
    count: AtomicUsize,
}

impl CountingLimiter {
    pub fn acquisitions(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateLimiterPort for CountingLimiter {
    async fn acquire(&self) -> Result<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FlagProbe {
    gone: AtomicBool,
}

impl FlagProbe {
    pub fn disconnect(&self) {
        self.gone.store(true, Ordering::SeqCst);
    }
}

impl ConsumerProbe for FlagProbe {
    fn is_disconnected(&self) -> bool {
        self.gone.load(Ordering::SeqCst)
    }
}

pub struct StaticDirectory {
    pub entities: Vec<Entity>,
}

#[async_trait]
impl DirectoryPort for StaticDirectory {
    async fn list_entities(&self) -> Result<Vec<Entity>> {
        Ok(self.entities.clone())
    }
}

pub struct FailingDirectory;

#[async_trait]
impl DirectoryPort for FailingDirectory {
    async fn list_entities(&self) -> Result<Vec<Entity>> {
        Err(AggregatorError::service("directory", "403 insufficient permissions"))
    }
}

/// Content service with one pre-built page sequence per owner. Owners listed
/// in `failing` get an error on their first page.
#[derive(Default)]
pub struct ScriptedContent {
    pub pages: HashMap<String, Vec<Page<ContentItem>>>,
    pub failing: Vec<String>,
    pub calls: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedContent {
    pub fn with_sizes(self, owner: &str, sizes: &[u64]) -> Self {
        self.with_paged_sizes(owner, &[sizes])
    }

    /// Page `i` links to page `i + 1` through a `page-<n>` token.
    pub fn with_paged_sizes(mut self, owner: &str, pages: &[&[u64]]) -> Self {
        let last = pages.len().saturating_sub(1);
        let built = pages
            .iter()
            .enumerate()
            .map(|(i, sizes)| {
                let items = sizes
                    .iter()
                    .map(|&size| ContentItem { size_bytes: Some(size) })
                    .collect();
                if i < last {
                    Page::with_token(items, format!("page-{}", i + 1))
                } else {
                    Page::last(items)
                }
            })
            .collect();
        self.pages.insert(owner.to_string(), built);
        self
    }

    pub fn failing_for(mut self, owner: &str) -> Self {
        self.failing.push(owner.to_string());
        self
    }
}

#[async_trait]
impl ContentPort for ScriptedContent {
    async fn list_page(&self, owner: &str, page_token: Option<&str>) -> Result<Page<ContentItem>> {
        self.calls
            .lock()
            .unwrap()
            .push((owner.to_string(), page_token.map(str::to_string)));
        if self.failing.iter().any(|o| o == owner) {
            return Err(AggregatorError::service("content", "500 internal error"));
        }
        let pages = match self.pages.get(owner) {
            Some(pages) => pages,
            None => return Ok(Page::last(Vec::new())),
        };
        let index = match page_token {
            None => 0,
            Some(token) => token
                .trim_start_matches("page-")
                .parse::<usize>()
                .map_err(|_| AggregatorError::Pagination(format!("unknown token {}", token)))?,
        };
        pages
            .get(index)
            .cloned()
            .ok_or_else(|| AggregatorError::Pagination(format!("no page {}", index)))
    }
}

#[derive(Default)]
pub struct ScriptedProfile {
    pub counts: HashMap<String, u64>,
    pub failing: Vec<String>,
}

impl ScriptedProfile {
    pub fn with_count(mut self, entity_id: &str, count: u64) -> Self {
        self.counts.insert(entity_id.to_string(), count);
        self
    }

    pub fn failing_for(mut self, entity_id: &str) -> Self {
        self.failing.push(entity_id.to_string());
        self
    }
}

#[async_trait]
impl ProfilePort for ScriptedProfile {
    async fn message_count(&self, entity_id: &str) -> Result<u64> {
        if self.failing.iter().any(|e| e == entity_id) {
            return Err(AggregatorError::service("profile", "429 rate limit exceeded"));
        }
        Ok(self.counts.get(entity_id).copied().unwrap_or(0))
    }
}

pub fn entities(n: usize) -> Vec<Entity> {
    (1..=n)
        .map(|i| Entity::new(format!("user{}@example.com", i), format!("User {}", i)))
        .collect()
}
