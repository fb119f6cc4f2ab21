use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::model::{date_bounds, value_bounds, CategoricalColumn, NumericColumn, Record, Table};
use crate::error::{DashboardError, Result};

// ---------------------------------------------------------------------------
// Filter predicate
// ---------------------------------------------------------------------------

/// Inclusive date interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Inclusive numeric interval. NaN never falls inside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub low: f64,
    pub high: f64,
}

impl ValueRange {
    pub fn new(low: f64, high: f64) -> Self {
        ValueRange { low, high }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }
}

/// The user's constraints on a table.
///
/// * `date_range` unset → no date constraint
/// * a column absent from `allowed`, or mapped to an empty set → no constraint
///   on that column ("select nothing" shows everything)
/// * `efficiency_rate_range` unset → no constraint, NaN rates pass; when set,
///   NaN rates fail
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub date_range: Option<DateRange>,
    pub allowed: BTreeMap<CategoricalColumn, BTreeSet<String>>,
    pub efficiency_rate_range: Option<ValueRange>,
}

impl FilterSpec {
    /// A spec with no constraints at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// The default controls for a table: full observed date and efficiency
    /// ranges, no categorical restriction.
    pub fn observed(table: &Table) -> Self {
        FilterSpec {
            date_range: table.date_bounds().map(|(lo, hi)| DateRange::new(lo, hi)),
            allowed: BTreeMap::new(),
            efficiency_rate_range: table
                .value_bounds(NumericColumn::LaborEfficiencyRate)
                .map(|(lo, hi)| ValueRange::new(lo, hi)),
        }
    }

    pub fn with_date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.date_range = Some(DateRange::new(start, end));
        self
    }

    pub fn with_efficiency_range(mut self, low: f64, high: f64) -> Self {
        self.efficiency_rate_range = Some(ValueRange::new(low, high));
        self
    }

    /// Restrict `column` to `values` (replacing any previous set).
    pub fn allow<I, S>(mut self, column: CategoricalColumn, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed
            .insert(column, values.into_iter().map(Into::into).collect());
        self
    }

    /// Like [`FilterSpec::allow`] but with the column given by header name.
    pub fn allow_named<I, S>(self, column: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let column: CategoricalColumn = column.parse()?;
        Ok(self.allow(column, values))
    }

    /// Reject internally inconsistent specs.
    pub fn validate(&self) -> Result<()> {
        if let Some(r) = &self.date_range {
            if r.start > r.end {
                return Err(DashboardError::InvalidFilter(format!(
                    "date range start {} is after end {}",
                    r.start, r.end
                )));
            }
        }
        if let Some(r) = &self.efficiency_rate_range {
            if r.low.is_nan() || r.high.is_nan() {
                return Err(DashboardError::InvalidFilter(
                    "efficiency rate range has a NaN bound".into(),
                ));
            }
            if r.low > r.high {
                return Err(DashboardError::InvalidFilter(format!(
                    "efficiency rate range low {} is above high {}",
                    r.low, r.high
                )));
            }
        }
        Ok(())
    }

    /// Whether `record` satisfies every active constraint.
    pub fn matches(&self, record: &Record) -> bool {
        if let Some(range) = &self.date_range {
            if !range.contains(record.date) {
                return false;
            }
        }
        for (col, selected) in &self.allowed {
            if selected.is_empty() {
                continue; // nothing selected → no restriction
            }
            if !selected.contains(record.category(*col)) {
                return false;
            }
        }
        if let Some(range) = &self.efficiency_rate_range {
            if !range.contains(record.labor_efficiency_rate) {
                return false;
            }
        }
        true
    }

    /// Stable hash of the spec, used to memoise filter results.
    ///
    /// Specs that differ only by an empty allow-set versus an absent one
    /// hash differently even though they select the same rows.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.date_range.map(|r| (r.start, r.end)).hash(&mut hasher);
        self.allowed.hash(&mut hasher);
        self.efficiency_rate_range
            .map(|r| (r.low.to_bits(), r.high.to_bits()))
            .hash(&mut hasher);
        hasher.finish()
    }
}

// ---------------------------------------------------------------------------
// FilteredView
// ---------------------------------------------------------------------------

/// The rows of a table that passed a [`FilterSpec`], in table order.
#[derive(Debug, Clone)]
pub struct FilteredView<'a> {
    table: &'a Table,
    indices: Vec<usize>,
}

impl PartialEq for FilteredView<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.table, other.table) && self.indices == other.indices
    }
}

impl<'a> FilteredView<'a> {
    pub(crate) fn from_indices(table: &'a Table, indices: Vec<usize>) -> Self {
        FilteredView { table, indices }
    }

    pub fn table(&self) -> &'a Table {
        self.table
    }

    /// Positions of the surviving rows in the underlying table.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &'a Record> + '_ {
        let table = self.table;
        self.indices.iter().map(move |&i| &table.records[i])
    }

    /// Values of a numeric column, aligned with the view's rows.
    pub fn values(&self, column: NumericColumn) -> Vec<f64> {
        self.records().map(|r| r.value(column)).collect()
    }

    /// Apply a further spec to this view's rows.
    pub fn refine(&self, spec: &FilterSpec) -> Result<FilteredView<'a>> {
        spec.validate()?;
        let indices = self
            .indices
            .iter()
            .copied()
            .filter(|&i| spec.matches(&self.table.records[i]))
            .collect();
        Ok(FilteredView::from_indices(self.table, indices))
    }

    /// The spec spanning exactly what this view contains: observed date and
    /// efficiency ranges plus the observed value set of every column.
    pub fn observed_spec(&self) -> FilterSpec {
        let mut allowed: BTreeMap<CategoricalColumn, BTreeSet<String>> = BTreeMap::new();
        for rec in self.records() {
            for col in CategoricalColumn::ALL {
                allowed
                    .entry(col)
                    .or_default()
                    .insert(rec.category(col).to_string());
            }
        }
        let efficiency = value_bounds(self.records().map(|r| r.labor_efficiency_rate));
        FilterSpec {
            date_range: date_bounds(self.records()).map(|(lo, hi)| DateRange::new(lo, hi)),
            allowed,
            efficiency_rate_range: efficiency.map(|(lo, hi)| ValueRange::new(lo, hi)),
        }
    }

    /// Copy the surviving rows into a standalone table.
    pub fn to_table(&self) -> Table {
        let records = self.records().cloned().collect();
        Table::from_records(records, self.table.column_names.clone())
    }
}

impl Table {
    /// Every row, unfiltered.
    pub fn full_view(&self) -> FilteredView<'_> {
        FilteredView::from_indices(self, (0..self.len()).collect())
    }
}

/// Return the rows of `table` that pass all active constraints of `spec`.
pub fn apply_filter<'a>(table: &'a Table, spec: &FilterSpec) -> Result<FilteredView<'a>> {
    spec.validate()?;
    let indices: Vec<usize> = table
        .records
        .iter()
        .enumerate()
        .filter(|(_, rec)| spec.matches(rec))
        .map(|(i, _)| i)
        .collect();

    log::debug!("Filter kept {} of {} rows", indices.len(), table.len());
    Ok(FilteredView::from_indices(table, indices))
}
