//! # collab::market — price move and open interest
//!
//! Two independent endpoints:
//! 1. Chart API for the futures ticker → last two daily closes.
//! 2. Exchange volume endpoint keyed by product id and trade date → open
//!    interest per contract month; the front (largest) month is used.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::PipelineError;

/// Exchange endpoints reject requests without a browser user agent.
pub const BROWSER_UA: &str = "Mozilla/5.0";

/// Latest close and its change against the previous close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceMove {
    pub close:      f64,
    pub change_pct: f64,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Vec<ChartResult>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// Change of the last close versus the one before it.
pub fn price_move_from_closes(closes: &[f64]) -> Option<PriceMove> {
    let [.., prev, last] = closes else {
        return None;
    };
    if *prev == 0.0 {
        return None;
    }
    Some(PriceMove {
        close:      *last,
        change_pct: (last - prev) / prev * 100.0,
    })
}

pub async fn fetch_price_move(
    client: &reqwest::Client,
    config: &Config,
    ticker: &str,
) -> Result<PriceMove, PipelineError> {
    let url = format!(
        "{}/v8/finance/chart/{ticker}?range=5d&interval=1d",
        config.price_base_url.trim_end_matches('/')
    );

    let resp = client
        .get(&url)
        .header("User-Agent", BROWSER_UA)
        .timeout(config.http_timeout)
        .send()
        .await
        .map_err(|e| PipelineError::external("price provider", e))?;

    if !resp.status().is_success() {
        return Err(PipelineError::external("price provider", format!("HTTP {}", resp.status())));
    }

    let data: ChartResponse = resp
        .json()
        .await
        .map_err(|e| PipelineError::external("price provider", e))?;

    let closes: Vec<f64> = data
        .chart
        .result
        .into_iter()
        .next()
        .and_then(|r| r.indicators.quote.into_iter().next())
        .map(|q| q.close.into_iter().flatten().collect())
        .unwrap_or_default();

    debug!(ticker, closes = closes.len(), "Price history fetched");

    price_move_from_closes(&closes)
        .ok_or_else(|| PipelineError::external("price provider", format!("fewer than two closes for {ticker}")))
}

/// Largest `openInterest` across the response's `items`. Values arrive as
/// comma-grouped strings or plain numbers.
pub fn open_interest_from_items(body: &Value) -> Option<u64> {
    body.get("items")?
        .as_array()?
        .iter()
        .filter_map(|item| match item.get("openInterest")? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.replace(',', "").trim().parse::<u64>().ok(),
            _ => None,
        })
        .max()
}

pub async fn fetch_open_interest(
    client: &reqwest::Client,
    config: &Config,
    product_id: u32,
    date: NaiveDate,
) -> Result<u64, PipelineError> {
    let url = format!(
        "{}/CmeWS/mvc/Volume/Details/F/{product_id}/{}/P",
        config.exchange_base_url.trim_end_matches('/'),
        date.format("%Y%m%d")
    );

    let resp = client
        .get(&url)
        .header("User-Agent", BROWSER_UA)
        .timeout(config.http_timeout)
        .send()
        .await
        .map_err(|e| PipelineError::external("open interest", e))?;

    if !resp.status().is_success() {
        return Err(PipelineError::external("open interest", format!("HTTP {}", resp.status())));
    }

    let body: Value = resp
        .json()
        .await
        .map_err(|e| PipelineError::external("open interest", e))?;

    open_interest_from_items(&body)
        .ok_or_else(|| PipelineError::external("open interest", format!("no items for product {product_id}")))
}
