//! # store — remote structured-store seam
//!
//! The daily table lives in a hosted database addressed by typed page
//! properties. [`RemoteStore`] is the three-call contract the upsert gateway
//! needs; [`notion::NotionStore`] talks to the real service and
//! [`memory::MemoryStore`] backs dry runs and tests.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{RecordKey, RemoteId};

pub mod memory;
pub mod notion;
pub mod properties;

pub use memory::MemoryStore;
pub use notion::NotionStore;

/// Property name → typed property value, in the store's JSON shape.
pub type PropertyMap = Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// One remote record as returned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePage {
    pub id:         RemoteId,
    pub properties: PropertyMap,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Exact match on (date, commodity). At most one page is returned.
    async fn query(&self, key: &RecordKey) -> Result<Option<RemotePage>, StoreError>;

    /// New page in the target collection.
    async fn create(&self, properties: PropertyMap) -> Result<RemotePage, StoreError>;

    /// Overwrites only the properties present in `properties`.
    async fn update(&self, id: &RemoteId, properties: PropertyMap) -> Result<RemotePage, StoreError>;
}
