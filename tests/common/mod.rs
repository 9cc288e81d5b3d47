#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::Instant;

use usage_streamer::app::ports::{ContentPort, DirectoryPort, ProfilePort};
use usage_streamer::error::{AggregatorError, Result};
use usage_streamer::pipeline::progress::ProgressEvent;
use usage_streamer::types::{ContentItem, Entity, Page};

pub fn members(n: usize) -> Vec<Entity> {
    (1..=n)
        .map(|i| Entity::new(format!("member{}@example.com", i), format!("Member {}", i)))
        .collect()
}

pub struct FakeDirectory {
    pub result: std::result::Result<Vec<Entity>, String>,
}

impl FakeDirectory {
    pub fn listing(entities: Vec<Entity>) -> Self {
        Self { result: Ok(entities) }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl DirectoryPort for FakeDirectory {
    async fn list_entities(&self) -> Result<Vec<Entity>> {
        self.result
            .clone()
            .map_err(|message| AggregatorError::service("directory", message))
    }
}

/// Content service whose owners all have `pages_per_owner` pages of one
/// `bytes_per_item` item each. Records the instant of every call.
pub struct FakeContent {
    pub pages_per_owner: usize,
    pub bytes_per_item: u64,
    pub failing: HashSet<String>,
    pub calls: Mutex<Vec<Instant>>,
}

impl FakeContent {
    pub fn new(pages_per_owner: usize, bytes_per_item: u64) -> Self {
        Self {
            pages_per_owner,
            bytes_per_item,
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_for(mut self, owner: &str) -> Self {
        self.failing.insert(owner.to_string());
        self
    }

    pub fn call_instants(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentPort for FakeContent {
    async fn list_page(&self, owner: &str, page_token: Option<&str>) -> Result<Page<ContentItem>> {
        self.calls.lock().unwrap().push(Instant::now());
        if self.failing.contains(owner) {
            return Err(AggregatorError::service("content", "500 backend error"));
        }
        let index: usize = match page_token {
            None => 0,
            Some(token) => token.trim_start_matches("page-").parse().unwrap(),
        };
        let items = vec![ContentItem {
            size_bytes: Some(self.bytes_per_item),
        }];
        if index + 1 < self.pages_per_owner {
            Ok(Page::with_token(items, format!("page-{}", index + 1)))
        } else {
            Ok(Page::last(items))
        }
    }
}

pub struct FakeProfile {
    pub counts: HashMap<String, u64>,
    pub failing: HashSet<String>,
}

impl FakeProfile {
    pub fn uniform(entities: &[Entity], count: u64) -> Self {
        Self {
            counts: entities.iter().map(|e| (e.id.clone(), count)).collect(),
            failing: HashSet::new(),
        }
    }

    pub fn failing_for(mut self, owner: &str) -> Self {
        self.failing.insert(owner.to_string());
        self
    }
}

#[async_trait]
impl ProfilePort for FakeProfile {
    async fn message_count(&self, entity_id: &str) -> Result<u64> {
        if self.failing.contains(entity_id) {
            return Err(AggregatorError::service("profile", "429 quota exceeded"));
        }
        Ok(self.counts.get(entity_id).copied().unwrap_or(0))
    }
}

pub fn arc<T>(value: T) -> Arc<T> {
    Arc::new(value)
}

/// Structural checks every event sequence must pass: one leading `start`,
/// exactly one terminal event at the end, and processed counts that only grow.
pub fn assert_well_formed(events: &[ProgressEvent]) {
    assert!(matches!(events.first(), Some(ProgressEvent::Start(_))), "first event must be start");
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1, "exactly one terminal event");
    assert!(events.last().unwrap().is_terminal(), "terminal event must be last");

    let mut last_processed = 0;
    for event in events {
        if let ProgressEvent::Batch(batch) = event {
            assert!(batch.processed_count > last_processed);
            assert!(batch.processed_count <= batch.total_count);
            last_processed = batch.processed_count;
        }
    }
}
