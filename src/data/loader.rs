use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context};
use calamine::{open_workbook_from_rs, Data, DataType, Reader, Xlsx};
use chrono::{Duration, NaiveDate, NaiveDateTime};

use super::model::{
    required_columns, CategoricalColumn, CellValue, NumericColumn, Record, Table, DATE_COLUMN,
};
use crate::config::DashboardConfig;
use crate::error::{DashboardError, Result};

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Declared format of a source, derived from its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// `.xlsx` workbook; the first sheet is read.
    Spreadsheet,
    /// `.csv` with a header row.
    Csv,
}

impl SourceFormat {
    pub fn from_name(name: &str) -> Result<Self> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "xlsx" => Ok(SourceFormat::Spreadsheet),
            "csv" => Ok(SourceFormat::Csv),
            _ => Err(DashboardError::UnsupportedFormat {
                name: name.to_string(),
            }),
        }
    }
}

/// Where the session's table comes from.
#[derive(Debug, Clone)]
pub enum DataSource {
    /// The configured default dataset.
    Default,
    /// A user-supplied file: its name (for the format) and raw bytes.
    Upload { name: String, bytes: Vec<u8> },
}

/// Load the table for a session.
pub fn load(source: &DataSource, config: &DashboardConfig) -> Result<Arc<Table>> {
    match source {
        DataSource::Default => load_default(&config.default_dataset),
        DataSource::Upload { name, bytes } => load_bytes(name, bytes).map(Arc::new),
    }
}

/// Load a dataset from a file.  Dispatch by extension.
pub fn load_file(path: &Path) -> Result<Table> {
    let name = path.display().to_string();
    let format = SourceFormat::from_name(&name)?;
    let bytes = std::fs::read(path)
        .with_context(|| format!("reading {name}"))
        .map_err(|e| DashboardError::load(&name, e))?;
    parse(&name, format, &bytes)
}

/// Load a dataset from an in-memory upload.
pub fn load_bytes(name: &str, bytes: &[u8]) -> Result<Table> {
    let format = SourceFormat::from_name(name)?;
    parse(name, format, bytes)
}

static DEFAULT_TABLE: Mutex<Option<(PathBuf, Arc<Table>)>> = Mutex::new(None);

/// Load the default dataset, memoised for the process lifetime.
///
/// The slot holds one table keyed by its path; asking for another path
/// replaces it.
pub fn load_default(path: &Path) -> Result<Arc<Table>> {
    let mut slot = DEFAULT_TABLE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some((cached_path, table)) = slot.as_ref() {
        if cached_path == path {
            log::debug!("Default dataset cache hit for {}", path.display());
            return Ok(Arc::clone(table));
        }
    }

    let table = Arc::new(load_file(path)?);
    *slot = Some((path.to_path_buf(), Arc::clone(&table)));
    Ok(table)
}

fn parse(name: &str, format: SourceFormat, bytes: &[u8]) -> Result<Table> {
    let sheet = match format {
        SourceFormat::Spreadsheet => read_spreadsheet(bytes),
        SourceFormat::Csv => read_csv(bytes),
    };
    let table = sheet
        .and_then(build_table)
        .map_err(|e| DashboardError::load(name, e))?;

    log::info!(
        "Loaded {} rows × {} columns from {name}",
        table.len(),
        table.column_names.len()
    );
    Ok(table)
}

// ---------------------------------------------------------------------------
// Raw readers
// ---------------------------------------------------------------------------

/// Header plus untyped-or-typed cells, before column validation.
struct RawSheet {
    headers: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

/// CSV layout: header row, comma-delimited. Every cell is kept as text and
/// typed later according to the column it lands in.
fn read_csv(bytes: &[u8]) -> anyhow::Result<RawSheet> {
    let mut reader = csv::Reader::from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if headers.iter().all(|h| h.trim().is_empty()) {
        bail!("missing header row");
    }

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {}", row_no + 2))?;
        rows.push(record.iter().map(CellValue::from).collect());
    }

    Ok(RawSheet { headers, rows })
}

/// Read the first worksheet of an `.xlsx` workbook; the first row is the header.
fn read_spreadsheet(bytes: &[u8]) -> anyhow::Result<RawSheet> {
    let mut workbook: Xlsx<_> =
        open_workbook_from_rs(Cursor::new(bytes)).context("opening workbook")?;
    let range = workbook
        .worksheet_range_at(0)
        .context("workbook has no worksheets")?
        .context("reading first worksheet")?;

    let mut rows_iter = range.rows();
    let header_row = rows_iter.next().context("missing header row")?;
    let headers: Vec<String> = header_row
        .iter()
        .map(|c| c.as_string().unwrap_or_else(|| c.to_string()))
        .collect();

    if headers.iter().all(|h| h.trim().is_empty()) {
        bail!("missing header row");
    }

    let rows = rows_iter
        .map(|row| row.iter().map(excel_cell).collect())
        .collect();

    Ok(RawSheet { headers, rows })
}

fn excel_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Null,
        Data::Int(i) => CellValue::Integer(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::String(s) if s.trim().is_empty() => CellValue::Null,
        Data::String(s) => CellValue::String(s.clone()),
        Data::Error(e) => {
            log::debug!("Spreadsheet error cell {e:?} read as empty");
            CellValue::Null
        }
        other => other
            .as_datetime()
            .map(|dt| CellValue::Date(dt.date()))
            .unwrap_or_else(|| CellValue::String(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Column validation and typing
// ---------------------------------------------------------------------------

/// Resolved source positions of every required column.
struct ColumnLayout {
    date: usize,
    categorical: [usize; CategoricalColumn::ALL.len()],
    numeric: [usize; NumericColumn::ALL.len()],
    extra: Vec<(usize, String)>,
}

impl ColumnLayout {
    fn resolve(headers: &[String]) -> anyhow::Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);

        let missing: Vec<&str> = required_columns().filter(|c| find(c).is_none()).collect();
        if !missing.is_empty() {
            bail!("missing required column(s): {}", missing.join(", "));
        }

        let position =
            |name: &str| find(name).with_context(|| format!("missing required column '{name}'"));

        let date = position(DATE_COLUMN)?;
        let mut categorical = [0; CategoricalColumn::ALL.len()];
        for (slot, col) in categorical.iter_mut().zip(CategoricalColumn::ALL) {
            *slot = position(col.header())?;
        }
        let mut numeric = [0; NumericColumn::ALL.len()];
        for (slot, col) in numeric.iter_mut().zip(NumericColumn::ALL) {
            *slot = position(col.header())?;
        }

        let required: Vec<&str> = required_columns().collect();
        let extra = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !required.contains(&h.trim()))
            .map(|(i, h)| (i, h.clone()))
            .collect();

        Ok(ColumnLayout {
            date,
            categorical,
            numeric,
            extra,
        })
    }
}

static NULL_CELL: CellValue = CellValue::Null;

fn build_table(sheet: RawSheet) -> anyhow::Result<Table> {
    let layout = ColumnLayout::resolve(&sheet.headers)?;

    let mut records = Vec::with_capacity(sheet.rows.len());
    for (row_no, row) in sheet.rows.iter().enumerate() {
        if row.iter().all(CellValue::is_null) {
            log::debug!("Skipping blank row {}", row_no + 2);
            continue;
        }
        let record = build_record(&layout, row).with_context(|| format!("row {}", row_no + 2))?;
        records.push(record);
    }

    Ok(Table::from_records(records, sheet.headers))
}

fn build_record(layout: &ColumnLayout, row: &[CellValue]) -> anyhow::Result<Record> {
    let cell = |i: usize| row.get(i).unwrap_or(&NULL_CELL);
    let text = |col: CategoricalColumn| cell_to_text(cell(layout.categorical[col as usize]));
    let number = |col: NumericColumn| {
        cell_to_f64(cell(layout.numeric[col as usize]))
            .with_context(|| format!("column '{}'", col.header()))
    };

    let date = cell_to_date(cell(layout.date)).with_context(|| format!("column '{DATE_COLUMN}'"))?;

    let extra: BTreeMap<String, CellValue> = layout
        .extra
        .iter()
        .map(|(i, name)| (name.clone(), refine_cell(cell(*i))))
        .collect();

    Ok(Record {
        date,
        product_type: text(CategoricalColumn::ProductType),
        department: text(CategoricalColumn::Department),
        shift: text(CategoricalColumn::Shift),
        manager: text(CategoricalColumn::Manager),
        factory_unit: text(CategoricalColumn::FactoryUnit),
        machine_unit: text(CategoricalColumn::MachineUnit),
        productivity_zone: text(CategoricalColumn::ProductivityZone),
        anomaly_conduct: text(CategoricalColumn::AnomalyConduct),
        labor_presence: number(NumericColumn::LaborPresence)?,
        labor_total_output: number(NumericColumn::LaborTotalOutput)?,
        labor_target_output: number(NumericColumn::LaborTargetOutput)?,
        productivity: number(NumericColumn::Productivity)?,
        labor_efficiency_rate: number(NumericColumn::LaborEfficiencyRate)?,
        extra,
    })
}

fn cell_to_text(cell: &CellValue) -> String {
    match cell {
        CellValue::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Empty cells become NaN; anything else must be numeric.
fn cell_to_f64(cell: &CellValue) -> anyhow::Result<f64> {
    match cell {
        CellValue::Float(v) => Ok(*v),
        CellValue::Integer(i) => Ok(*i as f64),
        CellValue::Null => Ok(f64::NAN),
        CellValue::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                return Ok(f64::NAN);
            }
            t.parse::<f64>()
                .with_context(|| format!("'{s}' is not a number"))
        }
        other => bail!("expected a number, found '{other}'"),
    }
}

fn cell_to_date(cell: &CellValue) -> anyhow::Result<NaiveDate> {
    match cell {
        CellValue::Date(d) => Ok(*d),
        CellValue::String(s) => parse_date(s).with_context(|| format!("'{s}' is not a date")),
        CellValue::Float(serial) => {
            excel_serial_date(*serial).with_context(|| format!("{serial} is not a date serial"))
        }
        CellValue::Integer(serial) => excel_serial_date(*serial as f64)
            .with_context(|| format!("{serial} is not a date serial")),
        CellValue::Null => bail!("missing date"),
        CellValue::Bool(b) => bail!("expected a date, found '{b}'"),
    }
}

/// Excel serial day numbers count from 1899-12-30.
fn excel_serial_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let days = Duration::try_days(serial.floor() as i64)?;
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_signed(days)
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
];

/// Parse a date or datetime string; datetimes are truncated to their date.
/// Slash-separated dates are month-first.
fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Type a text cell for an extra column.
fn refine_cell(cell: &CellValue) -> CellValue {
    match cell {
        CellValue::String(s) => guess_cell_type(s),
        other => other.clone(),
    }
}

fn guess_cell_type(s: &str) -> CellValue {
    let t = s.trim();
    if t.is_empty() {
        return CellValue::Null;
    }
    if let Ok(i) = t.parse::<i64>() {
        return CellValue::Integer(i);
    }
    if let Ok(f) = t.parse::<f64>() {
        return CellValue::Float(f);
    }
    if t == "true" || t == "false" {
        return CellValue::Bool(t == "true");
    }
    if let Some(d) = parse_date(t) {
        return CellValue::Date(d);
    }
    CellValue::String(t.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook, Worksheet};

    const HEADER: &str = "Date,Product_Type,Department,Shift,Manager,Factory_Unit,Machine_Unit,\
Productivity_Zone,Anomaly_Conduct,Labor_Presence,Labor_Total_Output,Labor_Target_Output,\
Productivity,Labor_Efficiency_Rate";

    fn csv_with(rows: &[&str]) -> Vec<u8> {
        let mut text = String::from(HEADER);
        for r in rows {
            text.push('\n');
            text.push_str(r);
        }
        text.into_bytes()
    }

    #[test]
    fn csv_rows_become_records_in_order() {
        let bytes = csv_with(&[
            "2024-01-02,Bolt,Assembly,Morning,Ana,F1,007,Green,None,8,95,100,95,91.5",
            "2024-01-01,Nut,Paint,Night,Ben,F2,M2,Red,Late,7.5,60,100,60,70",
        ]);
        let table = load_bytes("upload.csv", &bytes).unwrap();

        assert_eq!(table.len(), 2);
        let first = &table.records[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(first.department, "Assembly");
        // categorical text is kept verbatim, not coerced to a number
        assert_eq!(first.machine_unit, "007");
        assert_eq!(first.labor_efficiency_rate, 91.5);
        assert_eq!(table.records[1].shift, "Night");
        assert_eq!(table.column_names.len(), 14);
    }

    #[test]
    fn unsupported_extension_is_rejected_before_parsing() {
        let err = load_bytes("data.json", b"[]").unwrap_err();
        assert!(matches!(err, DashboardError::UnsupportedFormat { .. }));
        assert!(SourceFormat::from_name("REPORT.XLSX").is_ok());
        assert!(matches!(
            SourceFormat::from_name("noext"),
            Err(DashboardError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn missing_required_column_is_a_load_error() {
        let bytes = b"Date,Department\n2024-01-01,A\n";
        let err = load_bytes("short.csv", bytes).unwrap_err();
        match err {
            DashboardError::Load { cause, .. } => {
                let msg = format!("{cause:#}");
                assert!(msg.contains("Product_Type"));
                assert!(msg.contains("Labor_Efficiency_Rate"));
            }
            other => panic!("expected Load error, got {other:?}"),
        }
    }

    #[test]
    fn empty_source_has_no_header() {
        let err = load_bytes("empty.csv", b"").unwrap_err();
        assert!(matches!(err, DashboardError::Load { .. }));
    }

    #[test]
    fn garbage_workbook_is_a_load_error() {
        let err = load_bytes("broken.xlsx", b"definitely not a zip archive").unwrap_err();
        assert!(matches!(err, DashboardError::Load { .. }));
    }

    #[test]
    fn non_numeric_measure_reports_row_and_column() {
        let row = "2024-01-01,Bolt,A,Morning,Ana,F1,M1,Green,None,eight,95,100,95,90";
        let bytes = csv_with(&[row]);
        let err = load_bytes("bad.csv", &bytes).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("row 2"), "{msg}");
        assert!(msg.contains("Labor_Presence"), "{msg}");
    }

    #[test]
    fn blank_numeric_cells_load_as_nan() {
        let bytes = csv_with(&["2024-01-01,Bolt,A,Morning,Ana,F1,M1,Green,,8,95,,95,90"]);
        let table = load_bytes("gaps.csv", &bytes).unwrap();
        let rec = &table.records[0];
        assert!(rec.labor_target_output.is_nan());
        assert_eq!(rec.anomaly_conduct, "");
    }

    #[test]
    fn extra_columns_are_kept_and_typed() {
        let text = format!(
            "{HEADER},Batch,Inspected\n\
             2024-01-01,Bolt,A,Morning,Ana,F1,M1,Green,None,8,95,100,95,90,42,true\n"
        );
        let table = load_bytes("extra.csv", text.as_bytes()).unwrap();
        let rec = &table.records[0];
        assert_eq!(rec.extra["Batch"], CellValue::Integer(42));
        assert_eq!(rec.extra["Inspected"], CellValue::Bool(true));
        assert_eq!(table.column_names.len(), 16);
    }

    #[test]
    fn date_formats_and_serials() {
        let jan2 = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(parse_date("2024-01-02"), Some(jan2));
        assert_eq!(parse_date("01/02/2024"), Some(jan2));
        assert_eq!(parse_date("2024-01-02 17:45:00"), Some(jan2));
        assert_eq!(parse_date("02.01.2024"), Some(jan2));
        assert_eq!(parse_date("yesterday"), None);
        // 45293 is 2024-01-02 in the 1900 date system
        assert_eq!(excel_serial_date(45293.75), Some(jan2));
        assert_eq!(excel_serial_date(f64::NAN), None);
        assert_eq!(excel_serial_date(1e18), None);
        assert_eq!(excel_serial_date(1e9), None);
    }

    /// Writes the required header into row 0.
    fn write_header(sheet: &mut Worksheet) {
        for (col, name) in required_columns().enumerate() {
            sheet.write_string(0, col as u16, name).unwrap();
        }
    }

    /// Fills every column after `Date`, with a numeric machine unit and an
    /// empty anomaly cell.
    fn write_body(sheet: &mut Worksheet, row: u32) {
        let labels = ["Bolt", "Assembly", "Morning", "Ana", "F1"];
        for (i, text) in labels.into_iter().enumerate() {
            sheet.write_string(row, 1 + i as u16, text).unwrap();
        }
        sheet.write_number(row, 6, 7.0).unwrap();
        sheet.write_string(row, 7, "Green").unwrap();
        for (i, value) in [8.0, 95.0, 100.0, 95.0, 91.5].into_iter().enumerate() {
            sheet.write_number(row, 9 + i as u16, value).unwrap();
        }
    }

    #[test]
    fn workbook_reads_first_sheet_with_typed_cells() {
        let mut workbook = Workbook::new();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        {
            let sheet = workbook.add_worksheet();
            write_header(sheet);
            let date = ExcelDateTime::from_ymd(2024, 3, 5).unwrap();
            sheet
                .write_datetime_with_format(1, 0, &date, &date_format)
                .unwrap();
            write_body(sheet, 1);
            sheet.write_number(2, 0, 45293.0).unwrap();
            write_body(sheet, 2);
        }
        {
            let notes = workbook.add_worksheet();
            notes.write_string(0, 0, "Notes").unwrap();
            notes.write_string(1, 0, "not part of the dataset").unwrap();
        }
        let bytes = workbook.save_to_buffer().unwrap();

        let table = load_bytes("plant.xlsx", &bytes).unwrap();
        assert_eq!(table.len(), 2);
        let headers: Vec<String> = required_columns().map(String::from).collect();
        assert_eq!(table.column_names, headers);

        let first = &table.records[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(first.machine_unit, "7");
        assert_eq!(first.anomaly_conduct, "");
        assert_eq!(first.labor_efficiency_rate, 91.5);
        assert_eq!(
            table.records[1].date,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
    }

    #[test]
    fn oversized_date_serial_is_a_load_error() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        write_header(sheet);
        sheet.write_number(1, 0, 1e18).unwrap();
        write_body(sheet, 1);
        let bytes = workbook.save_to_buffer().unwrap();

        let err = load_bytes("big.xlsx", &bytes).unwrap_err();
        assert!(matches!(err, DashboardError::Load { .. }), "{err}");
    }

    #[test]
    fn default_dataset_is_memoised_per_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("default.csv");
        std::fs::write(
            &path,
            csv_with(&["2024-01-01,Bolt,A,Morning,Ana,F1,M1,Green,None,8,95,100,95,90"]),
        )
        .unwrap();

        let first = load_default(&path).unwrap();
        let second = load_default(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
