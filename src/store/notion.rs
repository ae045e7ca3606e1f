//! # store::notion — hosted database client
//!
//! Three REST calls: database query, page create, page patch. Every request
//! carries the bearer token, the pinned API version and a timeout.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{properties, PropertyMap, RemotePage, RemoteStore, StoreError};
use crate::config::StoreConfig;
use crate::models::{RecordKey, RemoteId};

const NOTION_VERSION: &str = "2022-06-28";

#[derive(Debug, Clone)]
pub struct NotionStore {
    client:  reqwest::Client,
    config:  StoreConfig,
    timeout: Duration,
}

#[derive(Deserialize)]
struct QueryResponse {
    results: Vec<PageResponse>,
}

#[derive(Deserialize)]
struct PageResponse {
    id:         String,
    #[serde(default)]
    properties: PropertyMap,
}

impl From<PageResponse> for RemotePage {
    fn from(p: PageResponse) -> Self {
        RemotePage { id: RemoteId(p.id), properties: p.properties }
    }
}

impl NotionStore {
    pub fn new(client: reqwest::Client, config: StoreConfig, timeout: Duration) -> Self {
        Self { client, config, timeout }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Value, StoreError> {
        let resp = req
            .bearer_auth(&self.config.token)
            .header("Notion-Version", NOTION_VERSION)
            .timeout(self.timeout)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Status { status, body });
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl RemoteStore for NotionStore {
    async fn query(&self, key: &RecordKey) -> Result<Option<RemotePage>, StoreError> {
        let url = self.url(&format!("databases/{}/query", self.config.database_id));
        let body = json!({ "filter": properties::key_filter(key), "page_size": 10 });

        debug!(%key, "Querying store");
        let value = self.send(self.client.post(&url).json(&body)).await?;
        let parsed: QueryResponse = serde_json::from_value(value)
            .map_err(|e| StoreError::Malformed(format!("query response: {e}")))?;

        if parsed.results.len() > 1 {
            warn!(
                %key,
                matches = parsed.results.len(),
                "⚠️ Duplicate remote records for key, using the first"
            );
        }
        Ok(parsed.results.into_iter().next().map(RemotePage::from))
    }

    async fn create(&self, properties: PropertyMap) -> Result<RemotePage, StoreError> {
        let body = json!({
            "parent": { "database_id": self.config.database_id },
            "properties": properties,
        });
        let value = self.send(self.client.post(self.url("pages")).json(&body)).await?;
        serde_json::from_value::<PageResponse>(value)
            .map(RemotePage::from)
            .map_err(|e| StoreError::Malformed(format!("create response: {e}")))
    }

    async fn update(&self, id: &RemoteId, properties: PropertyMap) -> Result<RemotePage, StoreError> {
        let body = json!({ "properties": properties });
        let value = self
            .send(self.client.patch(self.url(&format!("pages/{id}"))).json(&body))
            .await?;
        serde_json::from_value::<PageResponse>(value)
            .map(RemotePage::from)
            .map_err(|e| StoreError::Malformed(format!("update response: {e}")))
    }
}
