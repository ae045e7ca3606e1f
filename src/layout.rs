//! # layout — versioned per-commodity report layout table
//!
//! The exchange's stock reports are fixed-layout spreadsheets whose row
//! positions move when a reporting period changes. Coordinates therefore live
//! in a data file (`layouts/cme_metals.json`) together with a version string,
//! and every parse failure names that version.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::models::Commodity;

/// Zero-based `(row, column)` of one cell in the extracted grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRef(pub usize, pub usize);

impl CellRef {
    pub fn row(&self) -> usize {
        self.0
    }

    pub fn col(&self) -> usize {
        self.1
    }
}

/// Where the three stock figures sit in one commodity's report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellMap {
    pub registered: CellRef,
    pub eligible:   CellRef,
    pub net_change: CellRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommodityLayout {
    pub commodity:     Commodity,
    /// Stock report file name; two metals may share one file.
    pub file:          String,
    /// `None` when no verified coordinates exist for the current template.
    #[serde(default)]
    pub cells:         Option<CellMap>,
    /// Futures ticker for the price provider.
    pub ticker:        String,
    /// Exchange product id for the open-interest endpoint.
    pub oi_product_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutTable {
    pub layout_version: String,
    pub commodities:    Vec<CommodityLayout>,
}

impl LayoutTable {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read layout file {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("Invalid layout file {}", path.display()))
    }

    /// Parses and validates: every commodity of the enumeration must appear
    /// exactly once.
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let table: LayoutTable = serde_json::from_str(raw).context("layout JSON does not match schema")?;

        if table.layout_version.trim().is_empty() {
            bail!("layout_version must not be empty");
        }

        let mut seen = BTreeSet::new();
        for entry in &table.commodities {
            if !seen.insert(entry.commodity) {
                bail!("duplicate layout entry for {}", entry.commodity);
            }
            if entry.file.trim().is_empty() {
                bail!("empty report file name for {}", entry.commodity);
            }
        }
        if let Some(missing) = Commodity::ALL.into_iter().find(|c| !seen.contains(c)) {
            bail!("no layout entry for {missing}");
        }

        Ok(table)
    }

    pub fn get(&self, commodity: Commodity) -> Option<&CommodityLayout> {
        self.commodities.iter().find(|l| l.commodity == commodity)
    }

    /// Distinct stock report files, in name order.
    pub fn report_files(&self) -> BTreeSet<&str> {
        self.commodities.iter().map(|l| l.file.as_str()).collect()
    }
}
