use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{DashboardError, Result};

// ---------------------------------------------------------------------------
// CellValue – a single dynamically typed cell
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value, used for extra source columns, group keys
/// and derived columns. `BTreeMap` / `HashMap` keys downstream, so it must be
/// `Ord` and `Hash`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    Null,
}

// -- Manual Eq/Ord so we can put CellValue in BTreeSet --
// Equality, ordering and hashing all compare floats by bit pattern.

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for CellValue {}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use CellValue::*;
        fn discriminant(v: &CellValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
                Date(_) => 5,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for CellValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::String(s) => s.hash(state),
            CellValue::Integer(i) => i.hash(state),
            CellValue::Float(f) => f.to_bits().hash(state),
            CellValue::Bool(b) => b.hash(state),
            CellValue::Date(d) => d.hash(state),
            CellValue::Null => {}
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::String(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Date(d) => write!(f, "{d}"),
            CellValue::Null => Ok(()),
        }
    }
}

impl CellValue {
    /// Try to interpret the value as an `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(v) => Some(*v),
            CellValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Column identifiers
// ---------------------------------------------------------------------------

pub const DATE_COLUMN: &str = "Date";

/// The categorical columns every dataset must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CategoricalColumn {
    ProductType,
    Department,
    Shift,
    Manager,
    FactoryUnit,
    MachineUnit,
    ProductivityZone,
    AnomalyConduct,
}

impl CategoricalColumn {
    pub const ALL: [CategoricalColumn; 8] = [
        CategoricalColumn::ProductType,
        CategoricalColumn::Department,
        CategoricalColumn::Shift,
        CategoricalColumn::Manager,
        CategoricalColumn::FactoryUnit,
        CategoricalColumn::MachineUnit,
        CategoricalColumn::ProductivityZone,
        CategoricalColumn::AnomalyConduct,
    ];

    /// Header text in the source file.
    pub fn header(self) -> &'static str {
        match self {
            CategoricalColumn::ProductType => "Product_Type",
            CategoricalColumn::Department => "Department",
            CategoricalColumn::Shift => "Shift",
            CategoricalColumn::Manager => "Manager",
            CategoricalColumn::FactoryUnit => "Factory_Unit",
            CategoricalColumn::MachineUnit => "Machine_Unit",
            CategoricalColumn::ProductivityZone => "Productivity_Zone",
            CategoricalColumn::AnomalyConduct => "Anomaly_Conduct",
        }
    }

    /// Lower-case, dash-separated form used in chart ids.
    pub fn slug(self) -> String {
        self.header().to_ascii_lowercase().replace('_', "-")
    }
}

impl FromStr for CategoricalColumn {
    type Err = DashboardError;

    /// Accepts the header text case-insensitively, with `_` or `-`.
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        CategoricalColumn::ALL
            .into_iter()
            .find(|c| c.header().to_ascii_lowercase() == wanted)
            .ok_or_else(|| {
                DashboardError::InvalidFilter(format!("unknown categorical column '{s}'"))
            })
    }
}

impl fmt::Display for CategoricalColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// The numeric columns every dataset must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NumericColumn {
    LaborPresence,
    LaborTotalOutput,
    LaborTargetOutput,
    Productivity,
    LaborEfficiencyRate,
}

impl NumericColumn {
    pub const ALL: [NumericColumn; 5] = [
        NumericColumn::LaborPresence,
        NumericColumn::LaborTotalOutput,
        NumericColumn::LaborTargetOutput,
        NumericColumn::Productivity,
        NumericColumn::LaborEfficiencyRate,
    ];

    pub fn header(self) -> &'static str {
        match self {
            NumericColumn::LaborPresence => "Labor_Presence",
            NumericColumn::LaborTotalOutput => "Labor_Total_Output",
            NumericColumn::LaborTargetOutput => "Labor_Target_Output",
            NumericColumn::Productivity => "Productivity",
            NumericColumn::LaborEfficiencyRate => "Labor_Efficiency_Rate",
        }
    }
}

impl fmt::Display for NumericColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// Every header a source must provide, in canonical order.
pub fn required_columns() -> impl Iterator<Item = &'static str> {
    std::iter::once(DATE_COLUMN)
        .chain(CategoricalColumn::ALL.into_iter().map(CategoricalColumn::header))
        .chain(NumericColumn::ALL.into_iter().map(NumericColumn::header))
}

// ---------------------------------------------------------------------------
// Record – one row of the dataset
// ---------------------------------------------------------------------------

/// A single observation (one row of the source sheet).
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub date: NaiveDate,
    pub product_type: String,
    pub department: String,
    pub shift: String,
    pub manager: String,
    pub factory_unit: String,
    pub machine_unit: String,
    pub productivity_zone: String,
    pub anomaly_conduct: String,
    /// Hours at the machine.
    pub labor_presence: f64,
    pub labor_total_output: f64,
    pub labor_target_output: f64,
    /// Percentage, not range checked.
    pub productivity: f64,
    /// Percentage, not range checked.
    pub labor_efficiency_rate: f64,
    /// Non-required source columns: column_name → value.
    pub extra: BTreeMap<String, CellValue>,
}

impl Record {
    pub fn category(&self, column: CategoricalColumn) -> &str {
        match column {
            CategoricalColumn::ProductType => &self.product_type,
            CategoricalColumn::Department => &self.department,
            CategoricalColumn::Shift => &self.shift,
            CategoricalColumn::Manager => &self.manager,
            CategoricalColumn::FactoryUnit => &self.factory_unit,
            CategoricalColumn::MachineUnit => &self.machine_unit,
            CategoricalColumn::ProductivityZone => &self.productivity_zone,
            CategoricalColumn::AnomalyConduct => &self.anomaly_conduct,
        }
    }

    pub fn value(&self, column: NumericColumn) -> f64 {
        match column {
            NumericColumn::LaborPresence => self.labor_presence,
            NumericColumn::LaborTotalOutput => self.labor_total_output,
            NumericColumn::LaborTargetOutput => self.labor_target_output,
            NumericColumn::Productivity => self.productivity,
            NumericColumn::LaborEfficiencyRate => self.labor_efficiency_rate,
        }
    }
}

// ---------------------------------------------------------------------------
// Table – the complete loaded dataset
// ---------------------------------------------------------------------------

/// The full parsed dataset with pre-computed distinct values.
#[derive(Debug, Clone, Default)]
pub struct Table {
    /// All records, in source order.
    pub records: Vec<Record>,
    /// Header row of the source, verbatim and in source order.
    pub column_names: Vec<String>,
    /// For each categorical column the sorted set of distinct values.
    pub unique_values: BTreeMap<CategoricalColumn, BTreeSet<String>>,
}

impl Table {
    /// Build the distinct-value index from the loaded records.
    pub fn from_records(records: Vec<Record>, column_names: Vec<String>) -> Self {
        let mut unique_values: BTreeMap<CategoricalColumn, BTreeSet<String>> =
            CategoricalColumn::ALL
                .into_iter()
                .map(|c| (c, BTreeSet::new()))
                .collect();

        for rec in &records {
            for col in CategoricalColumn::ALL {
                unique_values
                    .entry(col)
                    .or_default()
                    .insert(rec.category(col).to_string());
            }
        }

        Table {
            records,
            column_names,
            unique_values,
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Earliest and latest date, `None` for an empty table.
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        date_bounds(self.records.iter())
    }

    /// Observed min/max of a numeric column, ignoring NaN.
    pub fn value_bounds(&self, column: NumericColumn) -> Option<(f64, f64)> {
        value_bounds(self.records.iter().map(|r| r.value(column)))
    }
}

pub(crate) fn date_bounds<'a>(
    records: impl Iterator<Item = &'a Record>,
) -> Option<(NaiveDate, NaiveDate)> {
    records.fold(None, |acc, r| match acc {
        None => Some((r.date, r.date)),
        Some((lo, hi)) => Some((lo.min(r.date), hi.max(r.date))),
    })
}

pub(crate) fn value_bounds(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.filter(|v| !v.is_nan()).fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}
