use serde::{Deserialize, Serialize};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A directory member whose usage is being aggregated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Primary identifier (the member's primary email address)
    pub id: String,
    /// Human readable name; empty when the directory has none
    #[serde(default)]
    pub display_name: String,
}

impl Entity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Continuation token; `None` or an empty string ends pagination
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_page_token: None,
        }
    }

    pub fn with_token(items: Vec<T>, token: impl Into<String>) -> Self {
        Self {
            items,
            next_page_token: Some(token.into()),
        }
    }
}

/// A stored item owned by an entity. Items without a reported size count as zero bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentItem {
    pub size_bytes: Option<u64>,
}

/// Usage figures for a single entity. Built once by the enricher, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(rename = "primaryEmail")]
    pub id: String,
    #[serde(rename = "fullname")]
    pub display_name: String,
    #[serde(rename = "fileCount")]
    pub file_count: u64,
    #[serde(rename = "emailCount")]
    pub message_count: u64,
    #[serde(rename = "totalStorageBytes")]
    pub total_storage_bytes: u64,
    #[serde(rename = "storageMB")]
    pub storage_mb: f64,
    #[serde(rename = "storageGB")]
    pub storage_gb: f64,
}

impl EnrichedRecord {
    /// Derive the storage units from the raw byte total.
    pub fn new(entity: &Entity, file_count: u64, message_count: u64, total_storage_bytes: u64) -> Self {
        let mb = total_storage_bytes as f64 / BYTES_PER_MB;
        let gb = mb / 1024.0;
        Self {
            id: entity.id.clone(),
            display_name: entity.display_name.clone(),
            file_count,
            message_count,
            total_storage_bytes,
            storage_mb: round2(mb),
            storage_gb: round2(gb),
        }
    }
}

/// Half-up rounding to two decimal places (inputs are never negative).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
