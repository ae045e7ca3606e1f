//! # gateway — idempotent find-or-create by (date, commodity)
//!
//! Every write first queries the store for the record's business key:
//! a hit is patched in place, a miss creates exactly one page. Only the
//! fields present in the [`RecordPatch`] are sent, so a later stage never
//! blanks what an earlier stage wrote.
//!
//! The at-most-one guarantee holds for sequential calls per key. Nothing here
//! retries; a failed run is simply re-run.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::models::{DailyMetalRecord, FieldMask, RecordKey, RecordLinks, RecordPatch, RemoteId};
use crate::store::{properties, RemoteStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpsertAction {
    Created,
    Updated,
    /// Record exists and the patch carried no fields.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteReceipt {
    pub key:       RecordKey,
    pub remote_id: RemoteId,
    pub action:    UpsertAction,
}

#[derive(Clone)]
pub struct RecordUpsertGateway {
    store: Arc<dyn RemoteStore>,
}

impl RecordUpsertGateway {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Writes every field of `record` and attaches the remote id to it.
    #[cfg(test)]
    pub async fn upsert(&self, record: &mut DailyMetalRecord) -> Result<RemoteReceipt, PipelineError> {
        self.upsert_fields(record, FieldMask::ALL, RecordLinks::default()).await
    }

    /// Writes the fields of `record` selected by `fields`, plus any links,
    /// and attaches the remote id to it.
    pub async fn upsert_fields(
        &self,
        record: &mut DailyMetalRecord,
        fields: FieldMask,
        links: RecordLinks,
    ) -> Result<RemoteReceipt, PipelineError> {
        let patch = RecordPatch::from_record(record, fields).with_links(links);
        let receipt = self.upsert_patch(&patch).await?;
        record.remote_id = Some(receipt.remote_id.clone());
        Ok(receipt)
    }

    /// Writes only the fields carried by `patch`.
    async fn upsert_patch(&self, patch: &RecordPatch) -> Result<RemoteReceipt, PipelineError> {
        let key = patch.key;
        let existing = self
            .store
            .query(&key)
            .await
            .map_err(|e| query_failed(key, e))?;

        let props = properties::patch_properties(patch);

        let (remote_id, action) = match existing {
            Some(page) if patch.is_empty() => (page.id, UpsertAction::Unchanged),
            Some(page) => {
                debug!(%key, id = %page.id, fields = props.len(), "Patching existing record");
                let page = self
                    .store
                    .update(&page.id, props)
                    .await
                    .map_err(|e| write_failed(key, e))?;
                (page.id, UpsertAction::Updated)
            }
            None => {
                let mut all = properties::key_properties(&key);
                all.extend(props);
                let page = self.store.create(all).await.map_err(|e| write_failed(key, e))?;
                info!(%key, id = %page.id, "🆕 Created remote record");
                (page.id, UpsertAction::Created)
            }
        };

        Ok(RemoteReceipt { key, remote_id, action })
    }

    /// Previously persisted fields for `key`, if a record exists.
    pub async fn fetch(&self, key: RecordKey) -> Result<Option<DailyMetalRecord>, PipelineError> {
        let Some(page) = self.store.query(&key).await.map_err(|e| query_failed(key, e))? else {
            return Ok(None);
        };
        properties::record_from_properties(Some(page.id), &page.properties)
            .map(Some)
            .map_err(|e| PipelineError::RemoteQueryFailed { key, status: e.to_string() })
    }
}

fn query_failed(key: RecordKey, err: StoreError) -> PipelineError {
    PipelineError::RemoteQueryFailed { key, status: err.to_string() }
}

fn write_failed(key: RecordKey, err: StoreError) -> PipelineError {
    PipelineError::RemoteWriteFailed { key, status: err.to_string() }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::NaiveDate;

    use super::*;
    use crate::models::{Commodity, FileLink, StockSnapshot};
    use crate::store::{MemoryStore, PropertyMap, RemotePage};

    fn make_record(net_change: f64) -> DailyMetalRecord {
        DailyMetalRecord {
            report_date:    NaiveDate::from_ymd_opt(2026, 1, 11).unwrap(),
            commodity:      Commodity::Gold,
            stock:          StockSnapshot::new(1000.0, 250.0, net_change),
            dealer_summary: "JPMORGAN CHASE: 500 (Issued)".to_string(),
            open_interest:  None,
            narrative_note: None,
            remote_id:      None,
        }
    }

    fn make_gateway() -> (Arc<MemoryStore>, RecordUpsertGateway) {
        let store = Arc::new(MemoryStore::new());
        let gateway = RecordUpsertGateway::new(store.clone());
        (store, gateway)
    }

    #[tokio::test]
    async fn test_first_upsert_creates_one_record() {
        let (store, gw) = make_gateway();
        let mut rec = make_record(5.0);

        let receipt = gw.upsert(&mut rec).await.unwrap();

        assert_eq!(receipt.action, UpsertAction::Created);
        assert_eq!(rec.remote_id.as_ref(), Some(&receipt.remote_id));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_second_upsert_updates_same_record() {
        let (store, gw) = make_gateway();
        let first = gw.upsert(&mut make_record(5.0)).await.unwrap();
        let second = gw.upsert(&mut make_record(-40.0)).await.unwrap();

        assert_eq!(second.action, UpsertAction::Updated);
        assert_eq!(first.remote_id, second.remote_id);
        assert_eq!(store.len().await, 1);

        let stored = gw.fetch(first.key).await.unwrap().unwrap();
        assert_eq!(stored.stock.net_change(), -40.0);
    }

    #[tokio::test]
    async fn test_identical_payload_is_idempotent() {
        let (store, gw) = make_gateway();
        gw.upsert(&mut make_record(1.0)).await.unwrap();
        gw.upsert(&mut make_record(1.0)).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_stock_only_patch_keeps_dealer_summary() {
        let (_store, gw) = make_gateway();
        let mut rec = make_record(5.0);
        gw.upsert(&mut rec).await.unwrap();

        let mut fresh = make_record(0.0);
        fresh.stock = StockSnapshot::new(10.0, 10.0, 0.0);
        fresh.dealer_summary = "ignored".to_string();
        let stock_only = FieldMask { dealer_summary: false, ..FieldMask::FACTS };
        let receipt = gw.upsert_fields(&mut fresh, stock_only, RecordLinks::default()).await.unwrap();
        assert_eq!(receipt.action, UpsertAction::Updated);
        assert_eq!(fresh.remote_id, rec.remote_id);

        let stored = gw.fetch(rec.key()).await.unwrap().unwrap();
        assert_eq!(stored.dealer_summary, "JPMORGAN CHASE: 500 (Issued)");
        assert_eq!(stored.stock.total(), 20.0);
    }

    #[tokio::test]
    async fn test_later_stage_fields_survive_full_rewrite_of_earlier_stage() {
        let (_store, gw) = make_gateway();
        let mut rec = make_record(5.0);
        gw.upsert(&mut rec).await.unwrap();
        let mut enriched = make_record(5.0);
        enriched.open_interest = Some(512);
        enriched.narrative_note = Some("note".to_string());
        gw.upsert_fields(&mut enriched, FieldMask::EXTRAS, RecordLinks::default()).await.unwrap();

        // Record built again without extras must not clear them.
        gw.upsert(&mut make_record(6.0)).await.unwrap();

        let stored = gw.fetch(rec.key()).await.unwrap().unwrap();
        assert_eq!(stored.open_interest, Some(512));
        assert_eq!(stored.narrative_note.as_deref(), Some("note"));
    }

    #[tokio::test]
    async fn test_upsert_fields_attaches_id_and_links() {
        let (store, gw) = make_gateway();
        let mut rec = make_record(5.0);
        let links = RecordLinks {
            stock_file: Some(FileLink {
                name: "Gold_Stocks.xls".to_string(),
                url:  "https://raw.example/2026-01-11/Gold_Stocks.xls".to_string(),
            }),
            delivery_notice: None,
        };

        let receipt = gw.upsert_fields(&mut rec, FieldMask::FACTS, links).await.unwrap();

        assert_eq!(receipt.action, UpsertAction::Created);
        assert_eq!(rec.remote_id.as_ref(), Some(&receipt.remote_id));
        let pages = store.pages().await;
        assert_eq!(pages.len(), 1);
        assert!(pages[0].properties.contains_key(properties::STOCK_FILE));
        assert!(!pages[0].properties.contains_key(properties::DELIVERY_NOTICE));
        assert!(!pages[0].properties.contains_key(properties::NOTE));
    }

    #[tokio::test]
    async fn test_empty_patch_on_existing_record_is_unchanged() {
        let (_store, gw) = make_gateway();
        let mut rec = make_record(5.0);
        gw.upsert(&mut rec).await.unwrap();
        let receipt = gw.upsert_patch(&RecordPatch::new(rec.key())).await.unwrap();
        assert_eq!(receipt.action, UpsertAction::Unchanged);
    }

    #[tokio::test]
    async fn test_fetch_missing_is_none() {
        let (_store, gw) = make_gateway();
        assert!(gw.fetch(make_record(0.0).key()).await.unwrap().is_none());
    }

    // ── Failure paths ─────────────────────────────────────────────────────────

    struct FailingStore {
        fail_query: bool,
    }

    #[async_trait]
    impl RemoteStore for FailingStore {
        async fn query(&self, _key: &RecordKey) -> Result<Option<RemotePage>, StoreError> {
            if self.fail_query {
                Err(StoreError::Status { status: 503, body: "unavailable".into() })
            } else {
                Ok(None)
            }
        }

        async fn create(&self, _properties: PropertyMap) -> Result<RemotePage, StoreError> {
            Err(StoreError::Status { status: 400, body: "validation_error".into() })
        }

        async fn update(&self, _id: &RemoteId, _properties: PropertyMap) -> Result<RemotePage, StoreError> {
            Err(StoreError::Malformed("unreachable in tests".into()))
        }
    }

    #[tokio::test]
    async fn test_query_failure_carries_key_and_status() {
        let gw = RecordUpsertGateway::new(Arc::new(FailingStore { fail_query: true }));
        let mut rec = make_record(1.0);
        match gw.upsert(&mut rec).await.unwrap_err() {
            PipelineError::RemoteQueryFailed { key, status } => {
                assert_eq!(key, rec.key());
                assert!(status.contains("503"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(rec.remote_id.is_none());
    }

    #[tokio::test]
    async fn test_write_failure_is_remote_write_failed() {
        let gw = RecordUpsertGateway::new(Arc::new(FailingStore { fail_query: false }));
        let err = gw.upsert(&mut make_record(1.0)).await.unwrap_err();
        assert!(matches!(err, PipelineError::RemoteWriteFailed { ref status, .. } if status.contains("400")));
    }
}
