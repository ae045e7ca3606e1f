//! # pipeline — one daily batch over every tracked commodity
//!
//! ```text
//!  fetch (opt) ─▶ archive (opt) ─▶ delivery text
//!                                      │
//!        for each commodity, in order: ▼
//!   ReportParser ─┐
//!                 ├─▶ FactAggregator ─▶ gateway (stock + dealers)
//!   Extractor ────┘                         │
//!                                           ▼
//!                       OI + price + note ─▶ gateway (enrichment)
//! ```
//!
//! Commodities run sequentially so no two upserts for one key overlap.
//! A failure anywhere is confined to its commodity and lands in the
//! [`RunReport`]; the run itself only fails on bad configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

use crate::collab::{ai, archive::Archive, fetch, market, prompt};
use crate::config::{AiProvider, Config};
use crate::engine::{delivery, FactAggregator, ReportParser};
use crate::error::PipelineError;
use crate::gateway::{RecordUpsertGateway, RemoteReceipt};
use crate::layout::{CommodityLayout, LayoutTable};
use crate::models::{
    Commodity, DailyMetalRecord, DealerActivity, FieldMask, FileLink, RecordExtras, RecordLinks, StockSnapshot,
};
use crate::store::RemoteStore;

// ─── Run Summary ──────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct CommodityOutcome {
    pub commodity:        Commodity,
    /// Result of the stock + dealer upsert.
    pub stored:           Result<RemoteReceipt, PipelineError>,
    /// False when this run's stock figures could not be read.
    pub stock_available:  bool,
    /// Write failure of the enrichment upsert, if any.
    pub enrichment_error: Option<PipelineError>,
    /// Final view of the record after both stages.
    pub record:           Option<DailyMetalRecord>,
}

impl CommodityOutcome {
    pub fn is_success(&self) -> bool {
        self.stored.is_ok() && self.enrichment_error.is_none()
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub date:           NaiveDate,
    pub layout_version: String,
    pub outcomes:       Vec<CommodityOutcome>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn records(&self) -> Vec<&DailyMetalRecord> {
        self.outcomes.iter().filter_map(|o| o.record.as_ref()).collect()
    }

    /// One line per commodity, then a totals line.
    pub fn log_summary(&self) {
        for o in &self.outcomes {
            match (&o.stored, &o.enrichment_error) {
                (Ok(r), None) => info!(
                    commodity = %o.commodity,
                    action = ?r.action,
                    id = %r.remote_id,
                    stock = o.stock_available,
                    "✅ Stored"
                ),
                (Ok(r), Some(e)) => warn!(
                    commodity = %o.commodity,
                    id = %r.remote_id,
                    kind = e.kind(),
                    error = %e,
                    "⚠️ Stored, enrichment failed"
                ),
                (Err(e), _) => error!(commodity = %o.commodity, kind = e.kind(), error = %e, "❌ Failed"),
            }
        }
        info!(
            date = %self.date,
            layout = %self.layout_version,
            succeeded = self.succeeded(),
            failed = self.failed(),
            "🏁 Run complete"
        );
    }
}

// ─── Pipeline ─────────────────────────────────────────────────────────────────

pub struct Pipeline {
    config:     Config,
    layout:     LayoutTable,
    client:     reqwest::Client,
    parser:     ReportParser,
    aggregator: FactAggregator,
    gateway:    RecordUpsertGateway,
    archive:    Option<Archive>,
}

impl Pipeline {
    pub fn new(config: Config, layout: LayoutTable, store: Arc<dyn RemoteStore>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("cme-metals/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        let archive = config
            .archive
            .clone()
            .map(|a| Archive::new(client.clone(), a, config.http_timeout));

        Ok(Self {
            parser: ReportParser::new(layout.layout_version.clone()),
            aggregator: FactAggregator::new(config.top_n),
            gateway: RecordUpsertGateway::new(store),
            archive,
            client,
            config,
            layout,
        })
    }

    pub async fn run(&self) -> RunReport {
        let date = self.config.report_date;
        let dir = self.config.report_dir();
        info!(%date, dir = %dir.display(), layout = %self.layout.layout_version, "🚀 Starting daily run");

        let files = self.all_files();

        if self.config.fetch_reports {
            let saved = fetch::download_all(&self.client, &self.config, &dir, &files).await;
            info!(saved, expected = files.len(), "Report download finished");
        }

        let links = self.archive_files(&files).await;

        let delivery_text = self.load_delivery_text().await;
        if delivery_text.is_none() {
            warn!(file = %self.config.delivery_report, "Delivery report unavailable, dealer summaries left unchanged");
        }

        let mut outcomes = Vec::with_capacity(Commodity::ALL.len());
        for commodity in Commodity::ALL {
            outcomes.push(self.process(commodity, delivery_text.as_deref(), &links).await);
        }

        RunReport {
            date,
            layout_version: self.layout.layout_version.clone(),
            outcomes,
        }
    }

    fn all_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self.layout.report_files().into_iter().map(str::to_string).collect();
        files.push(self.config.delivery_report.clone());
        files
    }

    fn report_path(&self, file: &str) -> PathBuf {
        self.config.report_dir().join(file)
    }

    async fn archive_files(&self, files: &[String]) -> HashMap<String, FileLink> {
        let mut links = HashMap::new();
        let Some(archive) = &self.archive else {
            return links;
        };

        for file in files {
            let bytes = match tokio::fs::read(self.report_path(file)).await {
                Ok(b) => b,
                Err(e) => {
                    debug!(file = %file, error = %e, "Nothing to archive");
                    continue;
                }
            };
            match archive.store(self.config.report_date, file, &bytes).await {
                Ok(link) => {
                    links.insert(file.clone(), link);
                }
                Err(e) => warn!(file = %file, error = %e, "Archive failed, record keeps previous link"),
            }
        }
        links
    }

    async fn load_delivery_text(&self) -> Option<String> {
        let path = self.report_path(&self.config.delivery_report);
        let task = tokio::task::spawn_blocking(move || delivery::load_report_text(&path));
        match tokio::time::timeout(self.config.parse_timeout, task).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                error!(error = %e, "Delivery report task failed");
                None
            }
            Err(_) => {
                warn!(timeout = ?self.config.parse_timeout, "Delivery report extraction timed out");
                None
            }
        }
    }

    async fn parse_stock(&self, layout: &CommodityLayout) -> Result<StockSnapshot, PipelineError> {
        let commodity = layout.commodity;
        let cells = layout.cells.ok_or_else(|| {
            PipelineError::report_unavailable(
                commodity,
                format!("layout {} has no verified cells", self.layout.layout_version),
            )
        })?;

        let path = self.report_path(&layout.file);
        let parser = self.parser.clone();
        let task = tokio::task::spawn_blocking(move || parser.parse_file(&path, commodity, &cells));

        match tokio::time::timeout(self.config.parse_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(PipelineError::report_unavailable(commodity, format!("parser task failed: {e}"))),
            Err(_) => Err(PipelineError::report_unavailable(
                commodity,
                format!("parse timed out after {:?}", self.config.parse_timeout),
            )),
        }
    }

    async fn process(
        &self,
        commodity: Commodity,
        delivery_text: Option<&str>,
        archived: &HashMap<String, FileLink>,
    ) -> CommodityOutcome {
        let date = self.config.report_date;

        let Some(layout) = self.layout.get(commodity) else {
            let err = PipelineError::report_unavailable(commodity, "no layout entry");
            return CommodityOutcome {
                commodity,
                stored: Err(err),
                stock_available: false,
                enrichment_error: None,
                record: None,
            };
        };

        // ── Stage 1: stock + dealer facts ────────────────────────────────────
        let stock = self.parse_stock(layout).await;
        if let Err(e) = &stock {
            warn!(commodity = %commodity, error = %e, "Stock figures unavailable, keeping stored values");
        }
        let stock_available = stock.is_ok();

        let activities: Vec<DealerActivity> = delivery_text
            .map(|text| delivery::extract(text, commodity))
            .unwrap_or_default();

        let mut record = self.aggregator.aggregate(
            commodity,
            date,
            stock.unwrap_or_default(),
            &activities,
            RecordExtras::default(),
        );

        let fields = FieldMask {
            stock: stock_available,
            dealer_summary: delivery_text.is_some(),
            ..FieldMask::FACTS
        };
        let links = RecordLinks {
            stock_file:      archived.get(&layout.file).cloned(),
            delivery_notice: archived.get(&self.config.delivery_report).cloned(),
        };

        let receipt = match self.gateway.upsert_fields(&mut record, fields, links).await {
            Ok(r) => r,
            Err(e) => {
                error!(commodity = %commodity, error = %e, "Upsert failed");
                return CommodityOutcome {
                    commodity,
                    stored: Err(e),
                    stock_available,
                    enrichment_error: None,
                    record: None,
                };
            }
        };
        info!(commodity = %commodity, action = ?receipt.action, summary = %record.dealer_summary, "📊 Facts stored");

        // ── Stage 2: enrichment ──────────────────────────────────────────────
        let (enriched, enrichment_error) = self
            .enrich(layout, record, stock_available, delivery_text.is_some(), &activities)
            .await;

        CommodityOutcome {
            commodity,
            stored: Ok(receipt),
            stock_available,
            enrichment_error,
            record: Some(enriched),
        }
    }

    /// Open interest and narrative note, written as a second partial patch.
    async fn enrich(
        &self,
        layout: &CommodityLayout,
        fresh: DailyMetalRecord,
        stock_available: bool,
        has_delivery: bool,
        activities: &[DealerActivity],
    ) -> (DailyMetalRecord, Option<PipelineError>) {
        let commodity = layout.commodity;
        let mut enrichment_error = None;

        // Missing figures fall back to what the store already holds.
        let base = if stock_available && has_delivery {
            fresh
        } else {
            match self.gateway.fetch(fresh.key()).await {
                Ok(Some(stored)) => DailyMetalRecord {
                    stock: if stock_available { fresh.stock } else { stored.stock },
                    dealer_summary: if has_delivery { fresh.dealer_summary } else { stored.dealer_summary },
                    ..fresh
                },
                Ok(None) => fresh,
                Err(e) => {
                    warn!(commodity = %commodity, error = %e, "Could not read back stored record");
                    enrichment_error = Some(e);
                    fresh
                }
            }
        };

        let open_interest = match market::fetch_open_interest(
            &self.client,
            &self.config,
            layout.oi_product_id,
            base.report_date,
        )
        .await
        {
            Ok(oi) => Some(oi),
            Err(e) => {
                warn!(commodity = %commodity, error = %e, "Open interest unavailable");
                None
            }
        };

        let note = match self.config.ai_provider {
            AiProvider::Disabled => ai::rule_based_note(&base.stock, activities),
            provider => {
                let price = match market::fetch_price_move(&self.client, &self.config, &layout.ticker).await {
                    Ok(p) => Some(p),
                    Err(e) => {
                        warn!(commodity = %commodity, error = %e, "Price move unavailable");
                        None
                    }
                };
                let text = prompt::build_prompt(&base, price.as_ref(), open_interest);
                match ai::call_ai(&self.client, &self.config, &text).await {
                    Ok(note) => note,
                    Err(e) => {
                        warn!(commodity = %commodity, %provider, error = %e, "Narrative unavailable");
                        ai::AI_FAILURE_NOTE.to_string()
                    }
                }
            }
        };

        let extras = RecordExtras { open_interest, narrative_note: Some(note) };
        let mut enriched = self.aggregator.aggregate(commodity, base.report_date, base.stock, activities, extras);
        if !has_delivery {
            enriched.dealer_summary = base.dealer_summary;
        }
        enriched.remote_id = base.remote_id;

        if let Err(e) = self
            .gateway
            .upsert_fields(&mut enriched, FieldMask::EXTRAS, RecordLinks::default())
            .await
        {
            error!(commodity = %commodity, error = %e, "Enrichment upsert failed");
            enrichment_error = Some(e);
        } else {
            debug!(commodity = %commodity, oi = ?enriched.open_interest, "Enrichment stored");
        }

        (enriched, enrichment_error)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
