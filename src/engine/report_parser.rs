//! # engine::report_parser
//!
//! Turns one warehouse stock report into a [`StockSnapshot`].
//!
//! The exchange serves these reports with an `.xls` extension, but the
//! payload is frequently an HTML table. Decoding therefore tries each
//! [`GridStrategy`] in turn and keeps the first one that yields a non-empty
//! two-dimensional grid of cell strings. The three stock figures are then read
//! at the coordinates declared by the layout table.
//!
//! Cell cleaning is forgiving: a blank or non-numeric cell becomes `0.0` for
//! that field only. When *none* of the three coordinates resolves to a number
//! the layout has almost certainly drifted, and the parse fails with
//! [`PipelineError::ReportUnavailable`] instead of producing zeros.

use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Reader};
use csv::{ReaderBuilder, Trim};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::layout::{CellMap, CellRef};
use crate::models::{Commodity, StockSnapshot};

// ─── Cell Grid ────────────────────────────────────────────────────────────────

/// Rectangular-ish matrix of cell text, row-major, zero-based.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellGrid {
    rows: Vec<Vec<String>>,
}

impl CellGrid {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn cell(&self, at: CellRef) -> Option<&str> {
        self.rows.get(at.row())?.get(at.col()).map(String::as_str)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// At least one row and some row with two or more cells.
    pub fn is_usable(&self) -> bool {
        !self.rows.is_empty() && self.rows.iter().any(|r| r.len() >= 2)
    }
}

// ─── Decoding Strategies ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridStrategy {
    /// `<table>` markup served under a spreadsheet extension.
    HtmlTable,
    /// Genuine binary or OOXML workbook.
    Workbook,
    /// Tab / comma separated text, one row per line.
    Delimited,
}

impl GridStrategy {
    pub const ORDER: [GridStrategy; 3] = [
        GridStrategy::HtmlTable,
        GridStrategy::Workbook,
        GridStrategy::Delimited,
    ];

    pub fn read(self, bytes: &[u8]) -> Option<CellGrid> {
        let grid = match self {
            GridStrategy::HtmlTable => read_html_table(bytes),
            GridStrategy::Workbook  => read_workbook(bytes),
            GridStrategy::Delimited => read_delimited(bytes),
        }?;
        grid.is_usable().then_some(grid)
    }
}

/// First strategy that produces a usable grid, with its name for logging.
pub fn decode_grid(bytes: &[u8]) -> Option<(GridStrategy, CellGrid)> {
    GridStrategy::ORDER
        .into_iter()
        .find_map(|s| s.read(bytes).map(|g| (s, g)))
}

fn read_html_table(bytes: &[u8]) -> Option<CellGrid> {
    let text = String::from_utf8_lossy(bytes);
    if !text.to_ascii_lowercase().contains("<table") {
        return None;
    }

    let doc = Html::parse_document(&text);
    let table_sel = Selector::parse("table").ok()?;
    let row_sel = Selector::parse("tr").ok()?;
    let cell_sel = Selector::parse("td, th").ok()?;

    // First table with content, like a spreadsheet's first sheet.
    doc.select(&table_sel).find_map(|table| {
        let grid = CellGrid::new(expand_spans(table, &row_sel, &cell_sel));
        grid.is_usable().then_some(grid)
    })
}

/// Upper bound for `colspan` / `rowspan` attributes.
const MAX_SPAN: usize = 1000;

fn span(cell: &ElementRef<'_>, attr: &str) -> usize {
    cell.value()
        .attr(attr)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .clamp(1, MAX_SPAN)
}

/// Row-major text with merged cells repeated into every position they cover,
/// so coordinates match the spreadsheet view of the same report.
fn expand_spans(table: ElementRef<'_>, row_sel: &Selector, cell_sel: &Selector) -> Vec<Vec<String>> {
    // Per column: text still owed to the rows below, and how many rows.
    let mut carried: Vec<Option<(String, usize)>> = Vec::new();
    let mut rows = Vec::new();

    for tr in table.select(row_sel) {
        let mut row: Vec<String> = Vec::new();
        let mut cells = tr.select(cell_sel);

        loop {
            let col = row.len();
            if let Some(slot) = carried.get_mut(col) {
                if let Some((text, left)) = slot.take() {
                    if left > 1 {
                        *slot = Some((text.clone(), left - 1));
                    }
                    row.push(text);
                    continue;
                }
            }

            let Some(td) = cells.next() else {
                // Spans still pending further right keep their columns.
                if carried.iter().skip(col).any(Option::is_some) {
                    row.push(String::new());
                    continue;
                }
                break;
            };

            let text = collapse_ws(&td.text().collect::<String>());
            let rowspan = span(&td, "rowspan");
            for _ in 0..span(&td, "colspan") {
                if rowspan > 1 {
                    let at = row.len();
                    if carried.len() <= at {
                        carried.resize(at + 1, None);
                    }
                    carried[at] = Some((text.clone(), rowspan - 1));
                }
                row.push(text.clone());
            }
        }
        rows.push(row);
    }
    rows
}

fn read_workbook(bytes: &[u8]) -> Option<CellGrid> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).ok()?;
    let range = workbook.worksheet_range_at(0)?.ok()?;

    // Ranges start at the first non-empty cell; pad back to A1 so layout
    // coordinates stay absolute.
    let (row_off, col_off) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut rows = vec![Vec::new(); row_off];
    for row in range.rows() {
        let mut cells = vec![String::new(); col_off];
        cells.extend(row.iter().map(data_to_string));
        rows.push(cells);
    }
    Some(CellGrid::new(rows))
}

fn data_to_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f)  => f.to_string(),
        Data::Int(i)    => i.to_string(),
        Data::Bool(b)   => b.to_string(),
        _               => String::new(),
    }
}

fn read_delimited(bytes: &[u8]) -> Option<CellGrid> {
    let text = std::str::from_utf8(bytes).ok()?;
    let delimiter = if text.contains('\t') { b'\t' } else { b',' };

    // Quoted numbers like "1,234" are common in comma files.
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let rows = reader
        .records()
        .map(|record| record.map(|r| r.iter().map(str::to_string).collect()))
        .collect::<Result<Vec<Vec<String>>, _>>()
        .ok()?;
    Some(CellGrid::new(rows))
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ─── Numeric Cleaning ─────────────────────────────────────────────────────────

/// Strips thousands separators and whitespace; `None` for anything that is
/// not a finite number afterwards.
pub fn clean_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

// ─── Parser ───────────────────────────────────────────────────────────────────

/// Stateless parser bound to one layout version.
#[derive(Debug, Clone)]
pub struct ReportParser {
    layout_version: String,
}

impl ReportParser {
    pub fn new(layout_version: impl Into<String>) -> Self {
        Self { layout_version: layout_version.into() }
    }

    pub fn parse_file(
        &self,
        path: &Path,
        commodity: Commodity,
        cells: &CellMap,
    ) -> Result<StockSnapshot, PipelineError> {
        let bytes = std::fs::read(path).map_err(|e| {
            PipelineError::report_unavailable(commodity, format!("{}: {e}", path.display()))
        })?;
        self.parse(&bytes, commodity, cells)
    }

    pub fn parse(
        &self,
        bytes: &[u8],
        commodity: Commodity,
        cells: &CellMap,
    ) -> Result<StockSnapshot, PipelineError> {
        let (strategy, grid) = decode_grid(bytes).ok_or_else(|| {
            PipelineError::report_unavailable(commodity, "no table could be extracted from the report")
        })?;

        debug!(
            commodity = %commodity,
            ?strategy,
            rows = grid.height(),
            "Report grid decoded"
        );

        let registered = read_cell(&grid, cells.registered);
        let eligible = read_cell(&grid, cells.eligible);
        let net_change = read_cell(&grid, cells.net_change);

        if registered.is_none() && eligible.is_none() && net_change.is_none() {
            return Err(PipelineError::report_unavailable(
                commodity,
                format!(
                    "layout {} no longer matches: none of {:?} / {:?} / {:?} holds a number",
                    self.layout_version, cells.registered, cells.eligible, cells.net_change
                ),
            ));
        }

        for (field, value, at) in [
            ("registered", registered, cells.registered),
            ("eligible", eligible, cells.eligible),
            ("net_change", net_change, cells.net_change),
        ] {
            if value.is_none() {
                warn!(
                    commodity = %commodity,
                    field,
                    row = at.row(),
                    col = at.col(),
                    cell = ?grid.cell(at),
                    "Non-numeric cell, using 0"
                );
            }
        }

        Ok(StockSnapshot::new(
            registered.unwrap_or(0.0),
            eligible.unwrap_or(0.0),
            net_change.unwrap_or(0.0),
        ))
    }
}

fn read_cell(grid: &CellGrid, at: CellRef) -> Option<f64> {
    grid.cell(at).and_then(clean_number)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn make_cells() -> CellMap {
        CellMap {
            registered: CellRef(2, 3),
            eligible:   CellRef(3, 3),
            net_change: CellRef(2, 1),
        }
    }

    fn make_html(reg: &str, elig: &str, change: &str) -> String {
        format!(
            "<html><body><table>\
             <tr><th>Depository</th><th>Prev</th><th>Out</th><th>Total</th></tr>\
             <tr><td>Brinks</td><td>1</td><td>2</td><td>3</td></tr>\
             <tr><td>TOTAL REGISTERED</td><td>{change}</td><td>0</td><td>{reg}</td></tr>\
             <tr><td>TOTAL ELIGIBLE</td><td>0</td><td>0</td><td>{elig}</td></tr>\
             </table></body></html>"
        )
    }

    fn parser() -> ReportParser {
        ReportParser::new("test-1")
    }

    #[test]
    fn test_html_report_with_thousands_separators() {
        let html = make_html("1,000", " 250 ", "-1,234.5");
        let s = parser().parse(html.as_bytes(), Commodity::Gold, &make_cells()).unwrap();
        assert_eq!(s.registered(), 1000.0);
        assert_eq!(s.eligible(), 250.0);
        assert_eq!(s.total(), 1250.0);
        assert!((s.registered_ratio() - 0.8).abs() < 1e-12);
        assert_eq!(s.net_change(), -1234.5);
    }

    #[test]
    fn test_bad_cell_defaults_only_that_field() {
        let html = make_html("1,000", "n/a", "");
        let s = parser().parse(html.as_bytes(), Commodity::Silver, &make_cells()).unwrap();
        assert_eq!(s.registered(), 1000.0);
        assert_eq!(s.eligible(), 0.0);
        assert_eq!(s.net_change(), 0.0);
        assert_eq!(s.registered_ratio(), 1.0);
    }

    #[test]
    fn test_out_of_range_coordinate_defaults_to_zero() {
        let html = make_html("10", "30", "1");
        let cells = CellMap { eligible: CellRef(500, 3), ..make_cells() };
        let s = parser().parse(html.as_bytes(), Commodity::Copper, &cells).unwrap();
        assert_eq!(s.eligible(), 0.0);
        assert_eq!(s.total(), 10.0);
    }

    #[test]
    fn test_layout_drift_is_report_unavailable() {
        let html = make_html("x", "y", "z");
        let err = parser().parse(html.as_bytes(), Commodity::Zinc, &make_cells()).unwrap_err();
        match err {
            PipelineError::ReportUnavailable { commodity, reason } => {
                assert_eq!(commodity, Commodity::Zinc);
                assert!(reason.contains("test-1"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unreadable_payload_is_report_unavailable() {
        let err = parser().parse(&[0xff, 0xfe, 0x00, 0x01], Commodity::Lead, &make_cells()).unwrap_err();
        assert_eq!(err.kind(), "report_unavailable");
    }

    #[test]
    fn test_delimited_fallback() {
        let text = "a,b,c,d\n1,2,3,4\nx,\"5\",y,\"1,000\"\nx,0,y,250\n";
        let (strategy, grid) = decode_grid(text.as_bytes()).unwrap();
        assert_eq!(strategy, GridStrategy::Delimited);
        assert_eq!(grid.cell(CellRef(2, 3)), Some("1,000"));

        let s = parser().parse(text.as_bytes(), Commodity::Gold, &make_cells()).unwrap();
        assert_eq!(s.registered(), 1000.0);
        assert_eq!(s.eligible(), 250.0);
        assert_eq!(s.net_change(), 5.0);
    }

    #[test]
    fn test_delimited_escaped_quotes() {
        let text = "name,qty\n\"ACME \"\"X\"\"\",12\n";
        let (_, grid) = decode_grid(text.as_bytes()).unwrap();
        assert_eq!(grid.cell(CellRef(1, 0)), Some("ACME \"X\""));
        assert_eq!(grid.cell(CellRef(1, 1)), Some("12"));
    }

    #[test]
    fn test_tab_delimited_rows_may_differ_in_width() {
        let text = "Depository\tTotal\nTOTAL REGISTERED\t5\t1,000\n";
        let (strategy, grid) = decode_grid(text.as_bytes()).unwrap();
        assert_eq!(strategy, GridStrategy::Delimited);
        assert_eq!(grid.cell(CellRef(1, 2)), Some("1,000"));
    }

    #[test]
    fn test_colspan_is_expanded() {
        let html = "<table>\
            <tr><td colspan=\"2\">TOTAL REGISTERED</td><td>5</td><td>1,000</td></tr>\
            </table>";
        let (_, grid) = decode_grid(html.as_bytes()).unwrap();
        assert_eq!(grid.cell(CellRef(0, 0)), Some("TOTAL REGISTERED"));
        assert_eq!(grid.cell(CellRef(0, 1)), Some("TOTAL REGISTERED"));
        assert_eq!(grid.cell(CellRef(0, 2)), Some("5"));
        assert_eq!(grid.cell(CellRef(0, 3)), Some("1,000"));
    }

    #[test]
    fn test_rowspan_is_carried_down() {
        let html = "<table>\
            <tr><td rowspan=\"2\">BRINKS</td><td>Registered</td><td>10</td></tr>\
            <tr><td>Eligible</td><td>20</td></tr>\
            <tr><td>MALCA</td><td>Registered</td><td>30</td></tr>\
            </table>";
        let (_, grid) = decode_grid(html.as_bytes()).unwrap();
        assert_eq!(grid.cell(CellRef(1, 0)), Some("BRINKS"));
        assert_eq!(grid.cell(CellRef(1, 1)), Some("Eligible"));
        assert_eq!(grid.cell(CellRef(1, 2)), Some("20"));
        assert_eq!(grid.cell(CellRef(2, 0)), Some("MALCA"));
        assert_eq!(grid.cell(CellRef(2, 2)), Some("30"));
    }

    #[test]
    fn test_merged_label_keeps_layout_coordinates() {
        let html = "<table>\
            <tr><td colspan=\"2\">TOTAL REGISTERED</td><td>-5</td><td>1,000</td></tr>\
            <tr><td colspan=\"2\">TOTAL ELIGIBLE</td><td>0</td><td>250</td></tr>\
            </table>";
        let cells = CellMap {
            registered: CellRef(0, 3),
            eligible:   CellRef(1, 3),
            net_change: CellRef(0, 2),
        };
        let s = parser().parse(html.as_bytes(), Commodity::Gold, &cells).unwrap();
        assert_eq!(s.registered(), 1000.0);
        assert_eq!(s.eligible(), 250.0);
        assert_eq!(s.net_change(), -5.0);
    }

    #[test]
    fn test_html_wins_over_delimited() {
        let html = make_html("1", "1", "1");
        let (strategy, _) = decode_grid(html.as_bytes()).unwrap();
        assert_eq!(strategy, GridStrategy::HtmlTable);
    }

    #[test]
    fn test_missing_file_is_report_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = parser()
            .parse_file(&dir.path().join("Gold_Stocks.xls"), Commodity::Gold, &make_cells())
            .unwrap_err();
        assert_eq!(err.kind(), "report_unavailable");
    }

    #[test]
    fn test_parse_file_reads_disguised_html() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Gold_Stocks.xls");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(make_html("2,000", "2,000", "-5").as_bytes()).unwrap();

        let s = parser().parse_file(&path, Commodity::Gold, &make_cells()).unwrap();
        assert_eq!(s.total(), 4000.0);
        assert_eq!(s.registered_ratio(), 0.5);
    }

    #[test]
    fn test_clean_number() {
        assert_eq!(clean_number(" 12,345.50 "), Some(12345.5));
        assert_eq!(clean_number("-7"), Some(-7.0));
        assert_eq!(clean_number(""), None);
        assert_eq!(clean_number("NaN"), None);
        assert_eq!(clean_number("abc"), None);
    }
}
