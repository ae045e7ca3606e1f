//! # models::record
//!
//! [`DailyMetalRecord`] is the unit the pipeline persists: one per
//! (report date, commodity). Uniqueness of that pair is enforced by the
//! upsert gateway against the remote store, not here.
//!
//! [`RecordPatch`] is the write-side view: every field optional, so a stage
//! can update only what it computed and leave the rest of the remote record
//! untouched.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Commodity, StockSnapshot};

/// Written when the delivery report has no rows for a commodity.
pub const NO_ACTIVITY: &str = "No significant activity.";

// ─── Keys & Handles ───────────────────────────────────────────────────────────

/// Business key of a daily record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RecordKey {
    pub date:      NaiveDate,
    pub commodity: Commodity,
}

impl RecordKey {
    pub fn new(date: NaiveDate, commodity: Commodity) -> Self {
        Self { date, commodity }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.commodity, self.date)
    }
}

/// Opaque page handle assigned by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(pub String);

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named external link stored in a file-reference property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileLink {
    pub name: String,
    pub url:  String,
}

// ─── Record ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyMetalRecord {
    pub report_date:    NaiveDate,
    pub commodity:      Commodity,
    pub stock:          StockSnapshot,
    pub dealer_summary: String,
    /// `None` until the open-interest figure has been fetched.
    pub open_interest:  Option<u64>,
    /// Filled by the narrative step only.
    pub narrative_note: Option<String>,
    /// Attached on the first successful upsert.
    pub remote_id:      Option<RemoteId>,
}

impl DailyMetalRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.report_date, self.commodity)
    }
}

impl RecordKey {
    pub fn title(&self) -> String {
        format!("{} - {}", self.commodity, self.date)
    }
}

/// Optional facts supplied by collaborators. Absent stays absent: the
/// aggregator never turns a missing open interest into zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordExtras {
    pub open_interest:  Option<u64>,
    pub narrative_note: Option<String>,
}

// ─── Write-side Patch ─────────────────────────────────────────────────────────

/// Which record fields a write carries. Unset fields are left as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMask {
    pub stock:          bool,
    pub dealer_summary: bool,
    /// Open interest and narrative note.
    pub extras:         bool,
}

impl FieldMask {
    #[cfg(test)]
    pub const ALL: FieldMask = FieldMask { stock: true, dealer_summary: true, extras: true };
    /// Stage one: stock figures and dealer summary.
    pub const FACTS: FieldMask = FieldMask { stock: true, dealer_summary: true, extras: false };
    /// Stage two: enrichment only.
    pub const EXTRAS: FieldMask = FieldMask { stock: false, dealer_summary: false, extras: true };
}

/// Archived report links attached to a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordLinks {
    pub stock_file:      Option<FileLink>,
    pub delivery_notice: Option<FileLink>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordPatch {
    pub key:             RecordKey,
    pub stock:           Option<StockSnapshot>,
    pub dealer_summary:  Option<String>,
    pub open_interest:   Option<u64>,
    pub narrative_note:  Option<String>,
    pub stock_file:      Option<FileLink>,
    pub delivery_notice: Option<FileLink>,
}

impl RecordPatch {
    pub fn new(key: RecordKey) -> Self {
        Self {
            key,
            stock:           None,
            dealer_summary:  None,
            open_interest:   None,
            narrative_note:  None,
            stock_file:      None,
            delivery_notice: None,
        }
    }

    /// The record's fields selected by `fields`. Absent extras stay absent
    /// even when selected.
    pub fn from_record(record: &DailyMetalRecord, fields: FieldMask) -> Self {
        Self {
            stock:          fields.stock.then_some(record.stock),
            dealer_summary: fields.dealer_summary.then(|| record.dealer_summary.clone()),
            open_interest:  record.open_interest.filter(|_| fields.extras),
            narrative_note: record.narrative_note.clone().filter(|_| fields.extras),
            ..Self::new(record.key())
        }
    }

    pub fn with_links(mut self, links: RecordLinks) -> Self {
        self.stock_file = links.stock_file;
        self.delivery_notice = links.delivery_notice;
        self
    }

    /// True when the patch would write nothing besides the key.
    pub fn is_empty(&self) -> bool {
        self.stock.is_none()
            && self.dealer_summary.is_none()
            && self.open_interest.is_none()
            && self.narrative_note.is_none()
            && self.stock_file.is_none()
            && self.delivery_notice.is_none()
    }
}
