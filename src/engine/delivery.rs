//! # engine::delivery
//!
//! Dealer activity from the metals issues-and-stops report.
//!
//! The report is page-broken plain text with one block per contract. Two kinds
//! of lines drive the scan:
//!
//! ```text
//! CONTRACT: JANUARY 2026 COMEX 100 GOLD FUTURES   <- section header (commodity)
//! ISSUED                                          <- direction sub-header
//! JPMORGAN CHASE 500                              <- data row
//! STOPPED
//! CITI 300
//! TOTAL: 800                                      <- stop-listed
//! ```
//!
//! Direction comes only from the most recent sub-header inside the active
//! section. Column positions are never consulted: they differ between report
//! revisions, sub-headers do not.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, trace};

use crate::models::{Commodity, DealerActivity, Direction};

/// Aggregate markers. Any word of the leading text disqualifies the row.
pub const STOP_LIST: &[&str] = &["TOTAL", "TOTALS", "SUBTOTAL"];

/// Column-header and banner labels. Only the first word is checked, so firms
/// such as `INTERCONTINENTAL EXCHANGE` or `DAILY METALS TRADING` survive.
pub const HEADER_LEADS: &[&str] = &[
    "FIRM", "NBR", "ORIG", "NAME", "ISSUED", "STOPPED", "BUSINESS", "RUN", "CONTRACT",
    "SETTLEMENT", "INTENT", "DATE", "MONTH", "PAGE", "REPORT", "YTD",
];

/// Shorter leading text is a stray fragment, not a firm.
pub const MIN_FIRM_NAME_LEN: usize = 3;

/// Why a line produced no activity. Logged, never returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSkip {
    OutsideSection,
    StopListed,
    HeaderRow,
    ShortFirmName,
    NoVolume,
    NonPositiveVolume,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Blank,
    Section(Commodity),
    SubHeader(Direction),
    Row { firm: String, volume: i64 },
    Skip(RowSkip),
}

// ─── Line Classification ──────────────────────────────────────────────────────

fn words(line: &str) -> impl Iterator<Item = String> + '_ {
    line.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_uppercase())
}

fn classify(raw: &str) -> Line {
    let line = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.is_empty() {
        return Line::Blank;
    }

    let has_digit = line.chars().any(|c| c.is_ascii_digit());

    // A metal name opens a section when the line is a banner, not a firm row
    // that happens to contain the word.
    let mut commodity = None;
    let mut banner = false;
    for w in words(&line) {
        if commodity.is_none() {
            commodity = Commodity::from_report_token(&w);
        }
        banner |= w == "CONTRACT" || w == "FUTURES";
    }
    if let Some(c) = commodity {
        if !has_digit || banner {
            return Line::Section(c);
        }
    }

    if !has_digit {
        match words(&line).next().as_deref() {
            Some("ISSUED" | "ISSUES" | "ISSUER" | "ISSUERS") => return Line::SubHeader(Direction::Issued),
            Some("STOPPED" | "STOPS" | "STOPPER" | "STOPPERS") => return Line::SubHeader(Direction::Stopped),
            _ => return Line::Skip(RowSkip::NoVolume),
        }
    }

    parse_row(&line)
}

fn parse_row(line: &str) -> Line {
    let Some(idx) = line.find(|c: char| c.is_ascii_digit()) else {
        return Line::Skip(RowSkip::NoVolume);
    };
    let (lead, rest) = line.split_at(idx);
    let negative = lead.ends_with('-');
    // `LABEL: value` lines.
    if lead.trim_end().ends_with(':') {
        return Line::Skip(RowSkip::HeaderRow);
    }
    let firm = lead
        .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | '.' | ',' | '|' | '#'))
        .trim();

    if firm.chars().count() < MIN_FIRM_NAME_LEN {
        return Line::Skip(RowSkip::ShortFirmName);
    }
    if words(firm).any(|w| STOP_LIST.contains(&w.as_str())) {
        return Line::Skip(RowSkip::StopListed);
    }
    if words(firm).next().is_some_and(|w| HEADER_LEADS.contains(&w.as_str())) {
        return Line::Skip(RowSkip::HeaderRow);
    }

    let volume = rest
        .split_whitespace()
        .find_map(|tok| tok.replace(',', "").parse::<i64>().ok());
    match volume {
        None => Line::Skip(RowSkip::NoVolume),
        Some(v) => {
            let v = if negative { -v } else { v };
            Line::Row { firm: firm.to_string(), volume: v }
        }
    }
}

// ─── Lazy Scan ────────────────────────────────────────────────────────────────

/// Single-pass iterator over one commodity's rows, in report order.
/// Restarting means calling [`scan`] again.
pub struct DeliveryRows<'a> {
    lines:      std::str::Lines<'a>,
    commodity:  Commodity,
    in_section: bool,
    direction:  Direction,
}

impl Iterator for DeliveryRows<'_> {
    type Item = DealerActivity;

    fn next(&mut self) -> Option<DealerActivity> {
        for raw in self.lines.by_ref() {
            let skip = match classify(raw) {
                Line::Blank => continue,
                Line::Section(c) => {
                    self.in_section = c == self.commodity;
                    self.direction = Direction::Unknown;
                    continue;
                }
                Line::SubHeader(d) => {
                    if self.in_section {
                        self.direction = d;
                    }
                    continue;
                }
                Line::Row { .. } if !self.in_section => RowSkip::OutsideSection,
                Line::Row { volume, .. } if volume <= 0 => RowSkip::NonPositiveVolume,
                Line::Row { firm, volume } => {
                    return Some(DealerActivity::new(firm, volume as u64, self.direction));
                }
                Line::Skip(reason) => reason,
            };
            if self.in_section {
                trace!(commodity = %self.commodity, ?skip, line = raw.trim(), "Row skipped");
            }
        }
        None
    }
}

pub fn scan(text: &str, commodity: Commodity) -> DeliveryRows<'_> {
    DeliveryRows {
        lines: text.lines(),
        commodity,
        in_section: false,
        direction: Direction::Unknown,
    }
}

/// Every activity for `commodity`, one entry per (firm, direction) with
/// volumes summed, ranked by volume descending then firm name.
pub fn extract(text: &str, commodity: Commodity) -> Vec<DealerActivity> {
    let mut merged: BTreeMap<(String, Direction), u64> = BTreeMap::new();
    for a in scan(text, commodity) {
        let slot = merged.entry((a.firm_name, a.direction)).or_default();
        *slot = slot.saturating_add(a.volume);
    }

    let mut out: Vec<DealerActivity> = merged
        .into_iter()
        .map(|((firm, direction), volume)| DealerActivity::new(firm, volume, direction))
        .collect();
    out.sort_by(|a, b| {
        b.volume
            .cmp(&a.volume)
            .then_with(|| a.firm_name.cmp(&b.firm_name))
            .then_with(|| a.direction.cmp(&b.direction))
    });

    debug!(commodity = %commodity, entries = out.len(), "Delivery activity extracted");
    out
}

// ─── Report Loading ───────────────────────────────────────────────────────────

/// Report text, or `None` when the file is absent or unreadable. PDFs are
/// converted to text; anything else is read as (lossy) UTF-8.
pub fn load_report_text(path: &Path) -> Option<String> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Delivery report not readable");
            return None;
        }
    };

    if bytes.starts_with(b"%PDF") {
        match pdf_extract::extract_text_from_mem(&bytes) {
            Ok(text) => Some(text),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "PDF text extraction failed");
                None
            }
        }
    } else {
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
BUSINESS DATE: 01/09/2026 RUN DATE: 01/09/2026
EXCHANGE: COMEX
CONTRACT: JANUARY 2026 COMEX 100 GOLD FUTURES
SETTLEMENT: 4,325.700000000 USD
FIRM NBR ORIG FIRM NAME ISSUED STOPPED
Issued
JPMORGAN CHASE 500
  BOFA   SECURITIES   120
TOTAL: 620
Stopped
CITI 300
GOLDMAN SACHS 45
JPMORGAN CHASE 10
TOTAL: 355
\x0c
CONTRACT: JANUARY 2026 COMEX 5000 SILVER FUTURES
Issued
HSBC 77
Stopped
JPMORGAN CHASE 1,250
";

    #[test]
    fn test_direction_from_sub_headers() {
        let text = "GOLD\nIssued\nJPMORGAN CHASE 500\nStopped\nCITI 300\n";
        let got = extract(text, Commodity::Gold);
        assert_eq!(
            got,
            vec![
                DealerActivity::new("JPMORGAN CHASE", 500, Direction::Issued),
                DealerActivity::new("CITI", 300, Direction::Stopped),
            ]
        );
    }

    #[test]
    fn test_gold_section_ranked() {
        let got = extract(REPORT, Commodity::Gold);
        let summary: Vec<String> = got.iter().map(|a| a.to_string()).collect();
        assert_eq!(
            summary,
            vec![
                "JPMORGAN CHASE: 500 (Issued)",
                "CITI: 300 (Stopped)",
                "BOFA SECURITIES: 120 (Issued)",
                "GOLDMAN SACHS: 45 (Stopped)",
                "JPMORGAN CHASE: 10 (Stopped)",
            ]
        );
    }

    #[test]
    fn test_section_boundary_excludes_other_metals() {
        let got = extract(REPORT, Commodity::Silver);
        assert_eq!(
            got,
            vec![
                DealerActivity::new("JPMORGAN CHASE", 1250, Direction::Stopped),
                DealerActivity::new("HSBC", 77, Direction::Issued),
            ]
        );
        assert!(extract(REPORT, Commodity::Copper).is_empty());
    }

    #[test]
    fn test_never_returns_stop_listed_or_non_positive() {
        let text = "COPPER\nIssued\nTOTAL 900\nFIRM 12\nMACQUARIE 0\nSTONEX -5\nWELLS FARGO 8\n";
        let got = extract(text, Commodity::Copper);
        assert_eq!(got, vec![DealerActivity::new("WELLS FARGO", 8, Direction::Issued)]);
        for a in &got {
            assert!(a.volume > 0);
            assert!(!STOP_LIST.iter().any(|s| a.firm_name.to_uppercase().split(' ').any(|w| w == *s)));
        }
    }

    #[test]
    fn test_firms_sharing_banner_words_are_kept() {
        let text = "GOLD\nStopped\nINTERCONTINENTAL EXCHANGE 40\nDAILY METALS TRADING 7\n";
        let got = extract(text, Commodity::Gold);
        assert_eq!(
            got,
            vec![
                DealerActivity::new("INTERCONTINENTAL EXCHANGE", 40, Direction::Stopped),
                DealerActivity::new("DAILY METALS TRADING", 7, Direction::Stopped),
            ]
        );
    }

    #[test]
    fn test_header_rows_with_numbers_skipped() {
        let text = "GOLD\nIssued\nSETTLEMENT: 4,325.70 USD\nPAGE 2 OF 9\nDATE 01/09/2026\nCITI 3\n";
        assert_eq!(classify("SETTLEMENT: 4,325.70 USD"), Line::Skip(RowSkip::HeaderRow));
        assert_eq!(classify("PAGE 2 OF 9"), Line::Skip(RowSkip::HeaderRow));
        let got = extract(text, Commodity::Gold);
        assert_eq!(got, vec![DealerActivity::new("CITI", 3, Direction::Issued)]);
    }

    #[test]
    fn test_merged_volume_saturates() {
        let text = "GOLD\nIssued\nACME METALS 9000000000000000000\n\
                    ACME METALS 9000000000000000000\nACME METALS 9000000000000000000\n";
        let got = extract(text, Commodity::Gold);
        assert_eq!(got, vec![DealerActivity::new("ACME METALS", u64::MAX, Direction::Issued)]);
    }

    #[test]
    fn test_short_and_numeric_only_rows_dropped() {
        let text = "ZINC\nStopped\n072 C 40\nAB 3\nASAHI REFINING 6\n";
        let got = extract(text, Commodity::Zinc);
        assert_eq!(got, vec![DealerActivity::new("ASAHI REFINING", 6, Direction::Stopped)]);
    }

    #[test]
    fn test_rows_before_sub_header_are_unknown() {
        let text = "PLATINUM\nMITSUI 14\n";
        let got = extract(text, Commodity::Platinum);
        assert_eq!(got, vec![DealerActivity::new("MITSUI", 14, Direction::Unknown)]);
    }

    #[test]
    fn test_repeated_firm_is_merged_and_ties_sorted_by_name() {
        let text = "LEAD\nIssued\nZETA METALS 5\nALPHA METALS 3\nALPHA METALS 2\n";
        let got = extract(text, Commodity::Lead);
        assert_eq!(
            got,
            vec![
                DealerActivity::new("ALPHA METALS", 5, Direction::Issued),
                DealerActivity::new("ZETA METALS", 5, Direction::Issued),
            ]
        );
    }

    #[test]
    fn test_empty_section_yields_nothing() {
        assert!(extract("PALLADIUM\nIssued\nStopped\n", Commodity::Palladium).is_empty());
        assert!(extract("", Commodity::Gold).is_empty());
    }

    #[test]
    fn test_scan_is_lazy_and_single_pass() {
        let mut rows = scan(REPORT, Commodity::Gold);
        assert_eq!(rows.next().map(|a| a.firm_name), Some("JPMORGAN CHASE".to_string()));
        assert_eq!(rows.by_ref().count(), 4);
        assert!(rows.next().is_none());
    }

    #[test]
    fn test_firm_word_containing_metal_name_is_a_row() {
        let text = "SILVER\nIssued\nGOLDMAN SACHS 9\nGOLD STAR TRADING 4\n";
        let got = extract(text, Commodity::Silver);
        assert_eq!(got.len(), 2);
        assert_eq!(got[1].firm_name, "GOLD STAR TRADING");
    }

    #[test]
    fn test_missing_report_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_report_text(&dir.path().join("MetalsIssuesAndStopsReport.pdf")).is_none());

        let path = dir.path().join("issues.txt");
        std::fs::write(&path, "GOLD\nIssued\nCITI 1\n").unwrap();
        let text = load_report_text(&path).unwrap();
        assert_eq!(extract(&text, Commodity::Gold).len(), 1);
    }
}
