//! # store::properties
//!
//! Mapping between [`DailyMetalRecord`] fields and the store's typed
//! properties (title, date, select, number, rich text, files).
//!
//! | Field                   | Property                     | Type      |
//! |-------------------------|------------------------------|-----------|
//! | title                   | `Name`                       | title     |
//! | report date             | `Date`                       | date      |
//! | commodity               | `Metal Type`                 | select    |
//! | registered / eligible   | `Total Registered` / `Total Eligible` | number |
//! | total / ratio           | `Combined Total` / `Reg/Total Ratio`  | number |
//! | net change              | `Net Change`                 | number    |
//! | open interest           | `OI (Open Interest)`         | number    |
//! | dealer summary          | `JPM/Asahi etc Stock change` | rich text |
//! | narrative note          | `Activity Note`              | rich text |
//! | archived files          | `Stock File URL` / `Delivery Notice URL` | files |

use chrono::NaiveDate;
use serde_json::{json, Value};
use thiserror::Error;

use super::PropertyMap;
use crate::models::{
    Commodity, DailyMetalRecord, FileLink, RecordKey, RecordPatch, RemoteId, StockSnapshot,
};

pub const TITLE:           &str = "Name";
pub const DATE:            &str = "Date";
pub const METAL:           &str = "Metal Type";
pub const REGISTERED:      &str = "Total Registered";
pub const ELIGIBLE:        &str = "Total Eligible";
pub const TOTAL:           &str = "Combined Total";
pub const NET_CHANGE:      &str = "Net Change";
pub const RATIO:           &str = "Reg/Total Ratio";
pub const OPEN_INTEREST:   &str = "OI (Open Interest)";
pub const DEALER_SUMMARY:  &str = "JPM/Asahi etc Stock change";
pub const NOTE:            &str = "Activity Note";
pub const STOCK_FILE:      &str = "Stock File URL";
pub const DELIVERY_NOTICE: &str = "Delivery Notice URL";

/// The store rejects longer rich-text segments.
pub const RICH_TEXT_LIMIT: usize = 2000;

#[derive(Debug, Error, PartialEq)]
pub enum PropertyError {
    #[error("property '{0}' is missing or has the wrong type")]
    Missing(&'static str),

    #[error("property '{name}' holds an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

// ─── Encoders ─────────────────────────────────────────────────────────────────

fn title(text: &str) -> Value {
    json!({ "title": [{ "text": { "content": text } }] })
}

fn date(d: NaiveDate) -> Value {
    json!({ "date": { "start": d.format("%Y-%m-%d").to_string() } })
}

fn select(name: &str) -> Value {
    json!({ "select": { "name": name } })
}

fn number(v: f64) -> Value {
    json!({ "number": v })
}

fn rich_text(text: &str) -> Value {
    let clipped: String = text.chars().take(RICH_TEXT_LIMIT).collect();
    json!({ "rich_text": [{ "text": { "content": clipped } }] })
}

fn files(link: &FileLink) -> Value {
    json!({ "files": [{ "name": link.name, "external": { "url": link.url } }] })
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// Identity properties written when a page is first created.
pub fn key_properties(key: &RecordKey) -> PropertyMap {
    let mut props = PropertyMap::new();
    props.insert(TITLE.into(), title(&key.title()));
    props.insert(DATE.into(), date(key.date));
    props.insert(METAL.into(), select(key.commodity.name()));
    props
}

/// Only the fields the patch carries; nothing else is touched remotely.
pub fn patch_properties(patch: &RecordPatch) -> PropertyMap {
    let mut props = PropertyMap::new();

    if let Some(stock) = &patch.stock {
        props.insert(REGISTERED.into(), number(stock.registered()));
        props.insert(ELIGIBLE.into(), number(stock.eligible()));
        props.insert(TOTAL.into(), number(stock.total()));
        props.insert(NET_CHANGE.into(), number(stock.net_change()));
        props.insert(RATIO.into(), number(round4(stock.registered_ratio())));
    }
    if let Some(summary) = &patch.dealer_summary {
        props.insert(DEALER_SUMMARY.into(), rich_text(summary));
    }
    if let Some(oi) = patch.open_interest {
        props.insert(OPEN_INTEREST.into(), number(oi as f64));
    }
    if let Some(note) = &patch.narrative_note {
        props.insert(NOTE.into(), rich_text(note));
    }
    if let Some(link) = &patch.stock_file {
        props.insert(STOCK_FILE.into(), files(link));
    }
    if let Some(link) = &patch.delivery_notice {
        props.insert(DELIVERY_NOTICE.into(), files(link));
    }
    props
}

/// Full property set of a record, identity included.
#[cfg(test)]
pub fn record_properties(record: &DailyMetalRecord) -> PropertyMap {
    let mut props = key_properties(&record.key());
    props.extend(patch_properties(&RecordPatch::from_record(record, crate::models::FieldMask::ALL)));
    props
}

/// Query filter matching exactly one (date, commodity) pair.
pub fn key_filter(key: &RecordKey) -> Value {
    json!({
        "and": [
            { "property": DATE,  "date":   { "equals": key.date.format("%Y-%m-%d").to_string() } },
            { "property": METAL, "select": { "equals": key.commodity.name() } }
        ]
    })
}

// ─── Decoders ─────────────────────────────────────────────────────────────────

fn read_number(props: &PropertyMap, name: &str) -> Option<f64> {
    props.get(name)?.get("number")?.as_f64()
}

fn read_rich_text(props: &PropertyMap, name: &str) -> Option<String> {
    let parts = props.get(name)?.get("rich_text")?.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| {
            p.pointer("/text/content")
                .or_else(|| p.get("plain_text"))
                .and_then(Value::as_str)
        })
        .collect();
    (!text.is_empty()).then_some(text)
}

fn read_date(props: &PropertyMap) -> Result<NaiveDate, PropertyError> {
    let raw = props
        .get(DATE)
        .and_then(|p| p.pointer("/date/start"))
        .and_then(Value::as_str)
        .ok_or(PropertyError::Missing(DATE))?;
    // Date-times come back as "2026-01-11T00:00:00.000+00:00".
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|_| PropertyError::Invalid { name: DATE, value: raw.to_string() })
}

fn read_commodity(props: &PropertyMap) -> Result<Commodity, PropertyError> {
    let raw = props
        .get(METAL)
        .and_then(|p| p.pointer("/select/name"))
        .and_then(Value::as_str)
        .ok_or(PropertyError::Missing(METAL))?;
    raw.parse()
        .map_err(|_| PropertyError::Invalid { name: METAL, value: raw.to_string() })
}

/// Business key of a stored page.
pub fn key_of(props: &PropertyMap) -> Result<RecordKey, PropertyError> {
    Ok(RecordKey::new(read_date(props)?, read_commodity(props)?))
}

/// Rebuilds a record from stored properties. Derived stock fields are
/// recomputed; empty numbers read as zero, empty open interest as absent.
pub fn record_from_properties(
    id: Option<RemoteId>,
    props: &PropertyMap,
) -> Result<DailyMetalRecord, PropertyError> {
    let key = key_of(props)?;

    let stock = StockSnapshot::new(
        read_number(props, REGISTERED).unwrap_or(0.0),
        read_number(props, ELIGIBLE).unwrap_or(0.0),
        read_number(props, NET_CHANGE).unwrap_or(0.0),
    );

    let open_interest = read_number(props, OPEN_INTEREST)
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.round() as u64);

    Ok(DailyMetalRecord {
        report_date:    key.date,
        commodity:      key.commodity,
        stock,
        dealer_summary: read_rich_text(props, DEALER_SUMMARY).unwrap_or_default(),
        open_interest,
        narrative_note: read_rich_text(props, NOTE),
        remote_id:      id,
    })
}
