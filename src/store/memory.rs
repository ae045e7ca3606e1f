//! # store::memory — in-process store
//!
//! Same observable semantics as the hosted database: exact-match query,
//! create assigns a fresh id, update merges only the given properties.
//! Used for `DRY_RUN` and by the gateway and pipeline tests.

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{properties, PropertyMap, RemotePage, RemoteStore, StoreError};
use crate::models::{RecordKey, RemoteId};

#[derive(Debug, Default)]
pub struct MemoryStore {
    pages: Mutex<Vec<RemotePage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored page, in creation order.
    #[cfg(test)]
    pub async fn pages(&self) -> Vec<RemotePage> {
        self.pages.lock().await.clone()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.pages.lock().await.len()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn query(&self, key: &RecordKey) -> Result<Option<RemotePage>, StoreError> {
        let pages = self.pages.lock().await;
        Ok(pages
            .iter()
            .find(|p| properties::key_of(&p.properties).ok().as_ref() == Some(key))
            .cloned())
    }

    async fn create(&self, properties: PropertyMap) -> Result<RemotePage, StoreError> {
        let page = RemotePage {
            id: RemoteId(Uuid::new_v4().to_string()),
            properties,
        };
        self.pages.lock().await.push(page.clone());
        Ok(page)
    }

    async fn update(&self, id: &RemoteId, properties: PropertyMap) -> Result<RemotePage, StoreError> {
        let mut pages = self.pages.lock().await;
        let page = pages
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| StoreError::Status { status: 404, body: format!("page {id} not found") })?;
        page.properties.extend(properties);
        Ok(page.clone())
    }
}
