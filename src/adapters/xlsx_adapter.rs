//! Excel workbook sink. Each run replaces the `GoodStocks` sheet with the
//! scan table and appends one row to the `RunLog` sheet. Any other sheets in
//! an existing workbook are carried over cell by cell.

use crate::domain::aggregate::{ScanRow, SCAN_COLUMNS};
use crate::domain::error::ScanError;
use crate::domain::scan::ScanReport;
use crate::domain::universe::Universe;
use crate::ports::sink_port::ScanSink;
use calamine::{open_workbook, CellType, Data, Range, Reader, Xlsx};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const SINK: &str = "excel";
const SCAN_SHEET: &str = "GoodStocks";
const RUN_LOG_SHEET: &str = "RunLog";
const RUN_LOG_COLUMNS: [&str; 5] = ["Timestamp", "Universe size", "Candidates", "Skipped", "Notes"];

fn xlsx_err(e: XlsxError) -> ScanError {
    ScanError::sink(SINK, e)
}

pub struct ExcelSink {
    path: PathBuf,
}

impl ExcelSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

/// A cell value read back from an existing workbook. Formatting is not kept.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Number(f64),
    Text(String),
    Bool(bool),
    /// Excel serial date.
    Date(f64),
    Formula(String),
}

impl Cell {
    fn from_data(data: &Data) -> Option<Self> {
        match data {
            Data::Int(i) => Some(Cell::Number(*i as f64)),
            Data::Float(f) => Some(Cell::Number(*f)),
            Data::String(s) => Some(Cell::Text(s.clone())),
            Data::Bool(b) => Some(Cell::Bool(*b)),
            Data::DateTime(dt) => Some(Cell::Date(dt.as_f64())),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Some(Cell::Text(s.clone())),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct KeptSheet {
    name: String,
    cells: BTreeMap<(u32, u16), Cell>,
}

impl KeptSheet {
    /// First row below every occupied cell.
    fn next_row(&self) -> u32 {
        self.cells.keys().map(|(row, _)| row + 1).max().unwrap_or(0)
    }
}

/// Cells of a range with absolute sheet coordinates.
fn placed<T: CellType>(range: &Range<T>) -> impl Iterator<Item = (u32, u16, &T)> {
    let (row0, col0) = range.start().unwrap_or((0, 0));
    range
        .cells()
        .map(move |(r, c, v)| (row0 + r as u32, (col0 as usize + c) as u16, v))
}

/// Every sheet of the workbook at `path`, in order. A missing file reads as
/// an empty workbook.
fn read_existing(path: &Path) -> Result<Vec<KeptSheet>, String> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(|e| format!("{}: {}", path.display(), e))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let values = workbook
            .worksheet_range(&name)
            .map_err(|e| format!("{}: sheet {}: {}", path.display(), name, e))?;
        let mut cells: BTreeMap<(u32, u16), Cell> = placed(&values)
            .filter_map(|(row, col, data)| Cell::from_data(data).map(|cell| ((row, col), cell)))
            .collect();

        // A sheet without formulas reports an empty range here.
        if let Ok(formulas) = workbook.worksheet_formula(&name) {
            for (row, col, formula) in placed(&formulas) {
                if !formula.is_empty() {
                    cells.insert((row, col), Cell::Formula(formula.clone()));
                }
            }
        }
        sheets.push(KeptSheet { name, cells });
    }
    Ok(sheets)
}

fn write_header(sheet: &mut Worksheet, columns: &[&str], bold: &Format) -> Result<(), XlsxError> {
    for (col, name) in columns.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *name, bold)?;
    }
    sheet.set_freeze_panes(1, 0)?;
    Ok(())
}

fn write_optional(sheet: &mut Worksheet, row: u32, col: u16, value: Option<f64>) -> Result<(), XlsxError> {
    if let Some(v) = value {
        sheet.write_number(row, col, v)?;
    }
    Ok(())
}

fn write_scan_row(sheet: &mut Worksheet, row: u32, scan: &ScanRow) -> Result<(), XlsxError> {
    sheet.write_string(row, 0, &scan.timestamp)?;
    sheet.write_string(row, 1, &scan.ticker)?;
    sheet.write_string(row, 2, &scan.strategy)?;
    sheet.write_number(row, 3, scan.score)?;
    sheet.write_number(row, 4, scan.close)?;
    write_optional(sheet, row, 5, scan.rsi14)?;
    write_optional(sheet, row, 6, scan.sma50)?;
    write_optional(sheet, row, 7, scan.sma200)?;
    write_optional(sheet, row, 8, scan.dist_52w_high)?;
    write_optional(sheet, row, 9, scan.vol5x20)?;
    Ok(())
}

fn write_kept_cells(sheet: &mut Worksheet, kept: &KeptSheet, date: &Format) -> Result<(), XlsxError> {
    for (&(row, col), cell) in &kept.cells {
        match cell {
            Cell::Number(n) => sheet.write_number(row, col, *n)?,
            Cell::Text(t) => sheet.write_string(row, col, t)?,
            Cell::Bool(b) => sheet.write_boolean(row, col, *b)?,
            Cell::Date(serial) => sheet.write_number_with_format(row, col, *serial, date)?,
            Cell::Formula(f) => sheet.write_formula(row, col, f.as_str())?,
        };
    }
    Ok(())
}

fn write_scan_sheet(sheet: &mut Worksheet, report: &ScanReport, bold: &Format) -> Result<(), XlsxError> {
    write_header(sheet, &SCAN_COLUMNS, bold)?;
    for (i, row) in report.rows.iter().enumerate() {
        write_scan_row(sheet, i as u32 + 1, row)?;
    }
    sheet.set_column_width(0, 20)?;
    sheet.set_column_width(2, 28)?;
    Ok(())
}

/// Copy the previous log, then append this run below it.
fn write_run_log(
    sheet: &mut Worksheet,
    previous: Option<&KeptSheet>,
    report: &ScanReport,
    universe: &Universe,
    bold: &Format,
    date: &Format,
) -> Result<(), XlsxError> {
    let row = match previous.filter(|kept| !kept.cells.is_empty()) {
        Some(kept) => {
            write_kept_cells(sheet, kept, date)?;
            sheet.set_freeze_panes(1, 0)?;
            kept.next_row()
        }
        None => {
            write_header(sheet, &RUN_LOG_COLUMNS, bold)?;
            1
        }
    };
    sheet.write_string(row, 0, report.timestamp())?;
    sheet.write_number(row, 1, report.universe_size as f64)?;
    sheet.write_number(row, 2, report.candidates() as f64)?;
    sheet.write_number(row, 3, report.skipped.len() as f64)?;
    sheet.write_string(row, 4, format!("Auto scan update ({}, {})", universe.label, report.aggregation))?;
    sheet.set_column_width(0, 20)?;
    sheet.set_column_width(4, 36)?;
    Ok(())
}

/// Rebuild the workbook in its existing sheet order. `GoodStocks` and
/// `RunLog` are added at the end when the workbook lacks them.
fn build_workbook(
    report: &ScanReport,
    universe: &Universe,
    existing: &[KeptSheet],
) -> Result<Workbook, XlsxError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let date = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");

    let mut names: Vec<&str> = existing.iter().map(|s| s.name.as_str()).collect();
    for required in [SCAN_SHEET, RUN_LOG_SHEET] {
        if !names.contains(&required) {
            names.push(required);
        }
    }

    for name in names {
        let kept = existing.iter().find(|s| s.name == name);
        let sheet = workbook.add_worksheet();
        sheet.set_name(name)?;
        match name {
            SCAN_SHEET => write_scan_sheet(sheet, report, &bold)?,
            RUN_LOG_SHEET => write_run_log(sheet, kept, report, universe, &bold, &date)?,
            _ => {
                if let Some(kept) = kept {
                    write_kept_cells(sheet, kept, &date)?;
                }
            }
        }
    }
    Ok(workbook)
}

impl ScanSink for ExcelSink {
    fn name(&self) -> &'static str {
        SINK
    }

    fn write(&self, report: &ScanReport, universe: &Universe) -> Result<(), ScanError> {
        let parent = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent {
            std::fs::create_dir_all(parent)
                .map_err(|e| ScanError::sink(SINK, format!("{}: {}", parent.display(), e)))?;
        }

        // An unreadable workbook is left untouched rather than replaced.
        let existing = read_existing(&self.path).map_err(|e| ScanError::sink(SINK, e))?;
        let mut workbook = build_workbook(report, universe, &existing).map_err(xlsx_err)?;
        workbook.save(&self.path).map_err(xlsx_err)?;
        tracing::info!(
            path = %self.path.display(),
            rows = report.rows.len(),
            kept_sheets = existing.len(),
            "wrote Excel workbook"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregate::AggregationMode;
    use chrono::{TimeZone, Utc};

    fn report() -> ScanReport {
        ScanReport {
            rows: vec![ScanRow {
                timestamp: "2024-06-03 21:05 UTC".into(),
                ticker: "NVDA".into(),
                strategy: "rsi_momentum+volume_surge".into(),
                score: 2.0,
                close: 120.5,
                rsi14: Some(58.0),
                sma50: Some(110.0),
                sma200: None,
                dist_52w_high: Some(0.02),
                vol5x20: Some(1.7),
            }],
            skipped: Vec::new(),
            universe_size: 1,
            run_at: Utc.with_ymd_and_hms(2024, 6, 3, 21, 5, 0).unwrap(),
            aggregation: AggregationMode::Sum,
        }
    }

    fn open(path: &Path) -> Xlsx<std::io::BufReader<std::fs::File>> {
        open_workbook(path).unwrap()
    }

    fn text(s: &str) -> Data {
        Data::String(s.into())
    }

    #[test]
    fn writes_workbook_into_new_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data").join("playbook.xlsx");
        let universe = Universe::new("list", vec!["NVDA".into()]).unwrap();

        let sink = ExcelSink::new(path.clone());
        sink.write(&report(), &universe).unwrap();

        let mut book = open(&path);
        assert_eq!(book.sheet_names(), vec!["GoodStocks", "RunLog"]);
        let scans = book.worksheet_range("GoodStocks").unwrap();
        assert_eq!(scans.get_value((0, 1)), Some(&text("Ticker")));
        assert_eq!(scans.get_value((1, 1)), Some(&text("NVDA")));
        let log = book.worksheet_range("RunLog").unwrap();
        assert_eq!(log.rows().count(), 2);
        assert_eq!(log.get_value((1, 4)), Some(&text("Auto scan update (list, sum)")));
    }

    #[test]
    fn rerun_keeps_other_sheets_and_appends_run_log() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("playbook.xlsx");

        let mut seed = Workbook::new();
        let notes = seed.add_worksheet();
        notes.set_name("Playbook").unwrap();
        notes.write_string(0, 0, "Rule").unwrap();
        notes.write_string(0, 1, "Weight").unwrap();
        notes.write_string(1, 0, "Cut losers at 8%").unwrap();
        notes.write_number(1, 1, 0.08).unwrap();
        notes.write_formula(1, 2, "=B2*100").unwrap();
        notes.write_boolean(2, 0, true).unwrap();
        seed.add_worksheet().set_name("GoodStocks").unwrap();
        seed.save(&path).unwrap();

        let universe = Universe::new("list", vec!["NVDA".into()]).unwrap();
        let sink = ExcelSink::new(path.clone());
        sink.write(&report(), &universe).unwrap();
        let mut empty = report();
        empty.rows.clear();
        sink.write(&empty, &universe).unwrap();

        let mut book = open(&path);
        assert_eq!(book.sheet_names(), vec!["Playbook", "GoodStocks", "RunLog"]);

        let playbook = book.worksheet_range("Playbook").unwrap();
        assert_eq!(playbook.get_value((1, 0)), Some(&text("Cut losers at 8%")));
        assert_eq!(playbook.get_value((1, 1)), Some(&Data::Float(0.08)));
        assert_eq!(playbook.get_value((2, 0)), Some(&Data::Bool(true)));
        let formulas = book.worksheet_formula("Playbook").unwrap();
        assert_eq!(
            formulas.get_value((1, 2)).map(|f| f.trim_start_matches('=')),
            Some("B2*100")
        );

        let log = book.worksheet_range("RunLog").unwrap();
        assert_eq!(log.rows().count(), 3);
        assert_eq!(log.get_value((0, 0)), Some(&text("Timestamp")));
        assert_eq!(log.get_value((1, 2)), Some(&Data::Float(1.0)));
        assert_eq!(log.get_value((2, 2)), Some(&Data::Float(0.0)));

        // Only the latest scan table remains.
        let scans = book.worksheet_range("GoodStocks").unwrap();
        assert_eq!(scans.rows().count(), 1);
    }

    #[test]
    fn unreadable_workbook_is_left_alone() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("playbook.xlsx");
        std::fs::write(&path, "not a zip").unwrap();
        let universe = Universe::new("list", vec!["NVDA".into()]).unwrap();

        let err = ExcelSink::new(path.clone()).write(&report(), &universe).unwrap_err();
        assert!(matches!(err, ScanError::SinkWrite { ref sink, .. } if sink == "excel"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not a zip");
    }

    #[test]
    fn unwritable_path_is_sink_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let sink = ExcelSink::new(blocker.join("playbook.xlsx"));
        let universe = Universe::new("list", vec!["NVDA".into()]).unwrap();
        let err = sink.write(&report(), &universe).unwrap_err();
        assert!(matches!(err, ScanError::SinkWrite { ref sink, .. } if sink == "excel"));
    }
}
