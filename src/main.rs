//! # cme-metals — daily CME metals warehouse & delivery batch
//!
//! ## Flow
//!
//! ```text
//!  exchange reports ──▶ ReportParser ──────────┐
//!  (xls / html / pdf)                          ├─▶ FactAggregator ─▶ RecordUpsertGateway ─▶ store
//!                   ──▶ DeliveryActivity ──────┘          ▲                   (find-or-create
//!                       Extractor                         │                    by date + metal)
//!                                   open interest · price · AI note
//! ```
//!
//! One run processes one trading day for every tracked metal, sequentially.
//! A failed metal is logged and skipped; only configuration errors stop the
//! process.
//!
//! ## Environment Variables
//!
//! | Variable             | Default                          | Description                         |
//! |----------------------|----------------------------------|-------------------------------------|
//! | `NOTION_TOKEN`       | required unless `DRY_RUN`        | Store bearer token                  |
//! | `NOTION_DATABASE_ID` | required unless `DRY_RUN`        | Target database                     |
//! | `AI_PROVIDER`        | `none`                           | `gemini`, `claude`, `openai`, `none`|
//! | `REPORT_DATE`        | yesterday                        | Trading day, `YYYY-MM-DD`           |
//! | `DATA_DIR`           | `data`                           | Report cache root                   |
//! | `LAYOUT_FILE`        | `layouts/cme_metals.json`        | Per-metal cell layout               |
//! | `FETCH_REPORTS`      | `false`                          | Download reports first              |
//! | `DRY_RUN`            | `false`                          | In-process store, prints records    |
//! | `RUST_LOG`           | `cme_metals=debug`               | Tracing filter                      |

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod collab;
mod config;
mod engine;
mod error;
mod gateway;
mod layout;
mod models;
mod pipeline;
mod store;

use config::Config;
use layout::LayoutTable;
use pipeline::Pipeline;
use store::{MemoryStore, NotionStore, RemoteStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env()
            .add_directive("cme_metals=debug".parse()?)
            .add_directive("reqwest=warn".parse()?))
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════╗
  ║   CME METALS — Daily Warehouse Batch      ║
  ║   Stocks · Deliveries · Open Interest     ║
  ╚═══════════════════════════════════════════╝"#);

    // ── 1. Configuration (fatal before any network call) ────────────────────
    let config = Config::from_env().context("Failed to load config")?;
    let layout = LayoutTable::load(&config.layout_file)?;

    info!(
        date     = %config.report_date,
        layout   = %layout.layout_version,
        provider = %config.ai_provider,
        dry_run  = config.dry_run,
        archive  = config.archive.is_some(),
        "Configuration loaded"
    );

    // ── 2. Store ─────────────────────────────────────────────────────────────
    let store: Arc<dyn RemoteStore> = if config.dry_run {
        info!("🧪 Dry run: records stay in memory");
        Arc::new(MemoryStore::new())
    } else {
        let store_config = config.store.clone().context("Store credentials missing")?;
        Arc::new(NotionStore::new(reqwest::Client::new(), store_config, config.http_timeout))
    };

    // ── 3. Run ───────────────────────────────────────────────────────────────
    let dry_run = config.dry_run;
    let pipeline = Pipeline::new(config, layout, store)?;
    let report = pipeline.run().await;
    report.log_summary();

    if dry_run {
        let json = serde_json::to_string_pretty(&report.records())
            .context("Failed to serialise records")?;
        println!("{json}");
    }

    Ok(())
}
