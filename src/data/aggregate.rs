//! Grouped reductions over a [`FilteredView`].
//!
//! Every reduction skips NaN values: a sum over only NaN is `0`, a mean over
//! only NaN is NaN and a count counts the non-NaN values. Groups only exist
//! for key combinations that occur in the view; nothing is zero-filled.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use statrs::statistics::{Data, OrderStatistics};

use super::derive::{day_of_week, period_key, period_start, target_productivity_ratio, Granularity};
use super::filter::FilteredView;
use super::model::{value_bounds, CategoricalColumn, CellValue, NumericColumn, Record};

// ---------------------------------------------------------------------------
// Keys and measures
// ---------------------------------------------------------------------------

/// The value being reduced: a numeric column or the target ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Measure {
    Column(NumericColumn),
    TargetProductivity,
}

impl Measure {
    pub fn value_of(self, record: &Record) -> f64 {
        match self {
            Measure::Column(col) => record.value(col),
            Measure::TargetProductivity => target_productivity_ratio(record),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Measure::Column(col) => col.header(),
            Measure::TargetProductivity => "Labor_Target_Productivity",
        }
    }
}

impl From<NumericColumn> for Measure {
    fn from(col: NumericColumn) -> Self {
        Measure::Column(col)
    }
}

/// One component of a grouping key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GroupKey {
    Column(CategoricalColumn),
    /// Week/month number or year.
    Period(Granularity),
    /// First day of the week/month/year.
    PeriodStart(Granularity),
    DayOfWeek,
    Date,
}

impl GroupKey {
    pub fn value_of(self, record: &Record) -> CellValue {
        match self {
            GroupKey::Column(col) => CellValue::String(record.category(col).to_string()),
            GroupKey::Period(g) => CellValue::Integer(period_key(record.date, g) as i64),
            GroupKey::PeriodStart(g) => CellValue::Date(period_start(record.date, g)),
            GroupKey::DayOfWeek => CellValue::from(day_of_week(record.date)),
            GroupKey::Date => CellValue::Date(record.date),
        }
    }
}

impl From<CategoricalColumn> for GroupKey {
    fn from(col: CategoricalColumn) -> Self {
        GroupKey::Column(col)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Column(col) => write!(f, "{col}"),
            GroupKey::Period(Granularity::Week) => f.write_str("Week"),
            GroupKey::Period(Granularity::Month) => f.write_str("Month"),
            GroupKey::Period(Granularity::Year) => f.write_str("Year"),
            GroupKey::PeriodStart(g) => write!(f, "{g}_start"),
            GroupKey::DayOfWeek => f.write_str("Day_of_Week"),
            GroupKey::Date => f.write_str("Date"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Mean,
    Sum,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOrder {
    Descending,
    Ascending,
}

// ---------------------------------------------------------------------------
// Accumulation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    sum: f64,
    /// Non-NaN values seen.
    count: usize,
    /// Rows seen.
    rows: usize,
}

impl Accumulator {
    fn push(&mut self, value: f64) {
        self.rows += 1;
        if !value.is_nan() {
            self.sum += value;
            self.count += 1;
        }
    }

    fn finish(&self, agg: Aggregation) -> f64 {
        match agg {
            Aggregation::Sum => self.sum,
            Aggregation::Count => self.count as f64,
            Aggregation::Mean if self.count == 0 => f64::NAN,
            Aggregation::Mean => self.sum / self.count as f64,
        }
    }
}

/// One group of a single-measure aggregation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    pub key: Vec<CellValue>,
    pub value: f64,
    /// Rows in the group, NaN values included.
    pub rows: usize,
}

/// One group of a multi-measure aggregation; `values` follows the order of
/// the requested measures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub key: Vec<CellValue>,
    pub values: Vec<f64>,
    pub rows: usize,
}

/// Group rows by the cartesian key and reduce every measure per group.
/// Groups are returned in order of first appearance.
pub fn summarize(
    view: &FilteredView<'_>,
    keys: &[GroupKey],
    measures: &[Measure],
    agg: Aggregation,
) -> Vec<GroupSummary> {
    let mut index: HashMap<Vec<CellValue>, usize> = HashMap::new();
    let mut groups: Vec<(Vec<CellValue>, usize, Vec<Accumulator>)> = Vec::new();

    for rec in view.records() {
        let key: Vec<CellValue> = keys.iter().map(|k| k.value_of(rec)).collect();
        let slot = match index.get(&key) {
            Some(&slot) => slot,
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, 0, vec![Accumulator::default(); measures.len()]));
                groups.len() - 1
            }
        };
        let (_, rows, accs) = &mut groups[slot];
        *rows += 1;
        for (acc, measure) in accs.iter_mut().zip(measures) {
            acc.push(measure.value_of(rec));
        }
    }

    groups
        .into_iter()
        .map(|(key, rows, accs)| GroupSummary {
            key,
            values: accs.iter().map(|a| a.finish(agg)).collect(),
            rows,
        })
        .collect()
}

/// Group rows by the cartesian key of `keys` and reduce `measure` per group.
pub fn group_aggregate(
    view: &FilteredView<'_>,
    keys: &[GroupKey],
    measure: impl Into<Measure>,
    agg: Aggregation,
) -> Vec<GroupRow> {
    summarize(view, keys, &[measure.into()], agg)
        .into_iter()
        .map(|s| GroupRow {
            value: s.values.first().copied().unwrap_or(f64::NAN),
            key: s.key,
            rows: s.rows,
        })
        .collect()
}

/// Number of rows per group, as `value`.
pub fn count_rows(view: &FilteredView<'_>, keys: &[GroupKey]) -> Vec<GroupRow> {
    summarize(view, keys, &[], Aggregation::Count)
        .into_iter()
        .map(|s| GroupRow {
            value: s.rows as f64,
            key: s.key,
            rows: s.rows,
        })
        .collect()
}

/// The `n` groups with the highest (or lowest) value of the first measure.
/// NaN-valued groups rank last either way; ties keep first-appearance order.
pub fn rank_groups(
    view: &FilteredView<'_>,
    key: GroupKey,
    measures: &[Measure],
    agg: Aggregation,
    n: usize,
    order: RankOrder,
) -> Vec<GroupSummary> {
    let mut groups = summarize(view, &[key], measures, agg);
    let lead = |g: &GroupSummary| g.values.first().copied().unwrap_or(f64::NAN);
    groups.sort_by(|a, b| {
        let (x, y) = (lead(a), lead(b));
        match (x.is_nan(), y.is_nan()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (false, false) => match order {
                RankOrder::Descending => y.total_cmp(&x),
                RankOrder::Ascending => x.total_cmp(&y),
            },
        }
    });
    groups.truncate(n);
    groups
}

// ---------------------------------------------------------------------------
// Weekly resampling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyPoint {
    /// Monday of the ISO week.
    pub week_start: NaiveDate,
    /// Sunday of the ISO week.
    pub week_end: NaiveDate,
    pub mean: f64,
    pub rows: usize,
}

/// Mean of `measure` per ISO week, ascending. Weeks without rows are omitted.
pub fn resample_weekly_mean(
    view: &FilteredView<'_>,
    measure: impl Into<Measure>,
) -> Vec<WeeklyPoint> {
    let measure = measure.into();
    let mut weeks: BTreeMap<NaiveDate, Accumulator> = BTreeMap::new();
    for rec in view.records() {
        weeks
            .entry(period_start(rec.date, Granularity::Week))
            .or_default()
            .push(measure.value_of(rec));
    }

    weeks
        .into_iter()
        .map(|(week_start, acc)| WeeklyPoint {
            week_start,
            week_end: week_start + Duration::days(6),
            mean: acc.finish(Aggregation::Mean),
            rows: acc.rows,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Pivot
// ---------------------------------------------------------------------------

/// Mean matrix indexed by two keys; labels are sorted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotTable {
    pub row_key: String,
    pub column_key: String,
    pub rows: Vec<CellValue>,
    pub columns: Vec<CellValue>,
    /// `cells[r][c]`; `None` where no finite value exists.
    pub cells: Vec<Vec<Option<f64>>>,
}

pub fn pivot_mean(
    view: &FilteredView<'_>,
    row_key: GroupKey,
    column_key: GroupKey,
    measure: impl Into<Measure>,
) -> PivotTable {
    let measure = measure.into();
    let mut acc: BTreeMap<(CellValue, CellValue), Accumulator> = BTreeMap::new();
    let mut row_labels = BTreeSet::new();
    let mut col_labels = BTreeSet::new();

    for rec in view.records() {
        let r = row_key.value_of(rec);
        let c = column_key.value_of(rec);
        row_labels.insert(r.clone());
        col_labels.insert(c.clone());
        acc.entry((r, c)).or_default().push(measure.value_of(rec));
    }

    let rows: Vec<CellValue> = row_labels.into_iter().collect();
    let columns: Vec<CellValue> = col_labels.into_iter().collect();
    let cells = rows
        .iter()
        .map(|r| {
            columns
                .iter()
                .map(|c| {
                    acc.get(&(r.clone(), c.clone()))
                        .filter(|a| a.count > 0)
                        .map(|a| a.finish(Aggregation::Mean))
                })
                .collect()
        })
        .collect();

    PivotTable {
        row_key: row_key.to_string(),
        column_key: column_key.to_string(),
        rows,
        columns,
        cells,
    }
}

// ---------------------------------------------------------------------------
// Distributions
// ---------------------------------------------------------------------------

/// Five-number summary of one group, for box plots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxSummary {
    pub key: Vec<CellValue>,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    /// Non-NaN values in the group.
    pub count: usize,
}

/// Per-group five-number summary of `measure`, groups in first-appearance
/// order. A group whose values are all NaN reports NaN statistics.
pub fn distribution(
    view: &FilteredView<'_>,
    keys: &[GroupKey],
    measure: impl Into<Measure>,
) -> Vec<BoxSummary> {
    let measure = measure.into();
    let mut index: HashMap<Vec<CellValue>, usize> = HashMap::new();
    let mut groups: Vec<(Vec<CellValue>, Vec<f64>)> = Vec::new();

    for rec in view.records() {
        let key: Vec<CellValue> = keys.iter().map(|k| k.value_of(rec)).collect();
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            groups.push((key, Vec::new()));
            groups.len() - 1
        });
        let v = measure.value_of(rec);
        if !v.is_nan() {
            groups[slot].1.push(v);
        }
    }

    groups
        .into_iter()
        .map(|(key, values)| box_summary(key, values))
        .collect()
}

fn box_summary(key: Vec<CellValue>, values: Vec<f64>) -> BoxSummary {
    let count = values.len();
    let Some((min, max)) = value_bounds(values.iter().copied()) else {
        return BoxSummary {
            key,
            min: f64::NAN,
            q1: f64::NAN,
            median: f64::NAN,
            q3: f64::NAN,
            max: f64::NAN,
            count,
        };
    };
    let mut data = Data::new(values);
    BoxSummary {
        key,
        min,
        q1: data.quantile(0.25),
        median: data.quantile(0.5),
        q3: data.quantile(0.75),
        max,
        count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::fixtures::{record, table};
    use crate::data::model::Table;
    use approx::assert_relative_eq;

    fn shop() -> Table {
        let rows = [
            ("2024-01-01", "A", "Day", 5.0, 10.0),
            ("2024-01-02", "A", "Night", 7.0, 10.0),
            ("2024-01-03", "B", "Day", 3.0, 10.0),
            ("2024-01-09", "B", "Day", f64::NAN, 0.0),
            ("2024-02-05", "A", "Day", 9.0, 10.0),
        ];
        table(
            rows.into_iter()
                .map(|(date, dept, shift, out, target)| {
                    let mut r = record(date);
                    r.department = dept.into();
                    r.shift = shift.into();
                    r.labor_total_output = out;
                    r.labor_target_output = target;
                    r
                })
                .collect(),
        )
    }

    fn key(parts: &[&str]) -> Vec<CellValue> {
        parts.iter().map(|p| CellValue::from(*p)).collect()
    }

    #[test]
    fn sum_mean_count_skip_nan() {
        let t = shop();
        let view = t.full_view();
        let dept = [GroupKey::Column(CategoricalColumn::Department)];
        let output = NumericColumn::LaborTotalOutput;

        let sums = group_aggregate(&view, &dept, output, Aggregation::Sum);
        assert_eq!(sums.len(), 2);
        assert_eq!(sums[0].key, key(&["A"]));
        assert_eq!(sums[0].value, 21.0);
        assert_eq!(sums[1].value, 3.0);
        assert_eq!(sums[1].rows, 2);

        let means = group_aggregate(&view, &dept, output, Aggregation::Mean);
        assert_relative_eq!(means[0].value, 7.0);
        assert_relative_eq!(means[1].value, 3.0);

        let counts = group_aggregate(&view, &dept, output, Aggregation::Count);
        assert_eq!(counts[1].value, 1.0);
    }

    #[test]
    fn groups_follow_first_appearance_and_skip_empty_combinations() {
        let t = shop();
        let view = t.full_view();
        let keys = [
            GroupKey::Column(CategoricalColumn::Shift),
            GroupKey::Column(CategoricalColumn::Department),
        ];
        let presence = NumericColumn::LaborPresence;
        let rows = group_aggregate(&view, &keys, presence, Aggregation::Count);
        let got: Vec<Vec<CellValue>> = rows.into_iter().map(|r| r.key).collect();
        // (Night, B) never occurs, so it is not emitted
        let expected = vec![key(&["Day", "A"]), key(&["Night", "A"]), key(&["Day", "B"])];
        assert_eq!(got, expected);
    }

    #[test]
    fn count_rows_includes_nan_rows() {
        let t = shop();
        let view = t.full_view();
        let rows = count_rows(&view, &[GroupKey::Column(CategoricalColumn::Department)]);
        let counts: Vec<f64> = rows.iter().map(|r| r.value).collect();
        assert_eq!(counts, vec![3.0, 2.0]);
    }

    #[test]
    fn target_ratio_mean_ignores_zero_target_rows() {
        let t = shop();
        let view = t.full_view();
        let rows = group_aggregate(
            &view,
            &[GroupKey::Column(CategoricalColumn::Department)],
            Measure::TargetProductivity,
            Aggregation::Mean,
        );
        assert_relative_eq!(rows[0].value, 70.0);
        assert_relative_eq!(rows[1].value, 30.0);
    }

    #[test]
    fn summarize_keeps_measure_order() {
        let t = shop();
        let view = t.full_view();
        let s = summarize(
            &view,
            &[GroupKey::Column(CategoricalColumn::Department)],
            &[
                NumericColumn::LaborTotalOutput.into(),
                NumericColumn::LaborTargetOutput.into(),
            ],
            Aggregation::Sum,
        );
        assert_eq!(s[0].values, vec![21.0, 30.0]);
        assert_eq!(s[1].values, vec![3.0, 10.0]);
    }

    #[test]
    fn rank_groups_orders_both_ways() {
        let t = shop();
        let view = t.full_view();
        let measures = [Measure::from(NumericColumn::LaborTotalOutput)];
        let dept = GroupKey::Column(CategoricalColumn::Department);

        let sum = Aggregation::Sum;

        let top = rank_groups(&view, dept, &measures, sum, 1, RankOrder::Descending);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].key, key(&["A"]));

        let bottom = rank_groups(&view, dept, &measures, sum, 5, RankOrder::Ascending);
        assert_eq!(bottom[0].key, key(&["B"]));
        assert_eq!(bottom.len(), 2);
    }

    #[test]
    fn weekly_resample_omits_empty_weeks() {
        let t = shop();
        let view = t.full_view();
        let weeks = resample_weekly_mean(&view, NumericColumn::LaborTotalOutput);
        let starts: Vec<String> = weeks.iter().map(|w| w.week_start.to_string()).collect();
        // weeks of 2024-01-15, -22 and -29 have no rows
        assert_eq!(starts, vec!["2024-01-01", "2024-01-08", "2024-02-05"]);
        assert_relative_eq!(weeks[0].mean, 5.0);
        assert!(weeks[1].mean.is_nan());
        assert_eq!(weeks[1].rows, 1);
        assert_eq!(weeks[0].week_end.to_string(), "2024-01-07");
    }

    #[test]
    fn pivot_has_sorted_labels_and_holes() {
        let t = shop();
        let view = t.full_view();
        let p = pivot_mean(
            &view,
            GroupKey::Column(CategoricalColumn::Department),
            GroupKey::Period(Granularity::Month),
            NumericColumn::LaborTotalOutput,
        );
        assert_eq!(p.rows, key(&["A", "B"]));
        assert_eq!(
            p.columns,
            vec![CellValue::Integer(1), CellValue::Integer(2)]
        );
        assert_eq!(p.cells[0], vec![Some(6.0), Some(9.0)]);
        assert_eq!(p.cells[1], vec![Some(3.0), None]);
        assert_eq!(p.column_key, "Month");
    }

    #[test]
    fn distribution_reports_quartiles() {
        let mut rows = Vec::new();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            let mut r = record("2024-01-01");
            r.productivity = v;
            rows.push(r);
        }
        let t = table(rows);
        let view = t.full_view();
        let boxes = distribution(&view, &[], NumericColumn::Productivity);
        assert_eq!(boxes.len(), 1);
        let b = &boxes[0];
        assert_eq!((b.min, b.max, b.count), (1.0, 5.0, 5));
        assert_relative_eq!(b.median, 3.0, epsilon = 1e-9);
        assert!(b.q1 >= 1.0 && b.q1 <= b.median);
        assert!(b.q3 >= b.median && b.q3 <= 5.0);
    }

    #[test]
    fn empty_view_aggregates_to_nothing() {
        let t = table(vec![]);
        let view = t.full_view();
        let p = NumericColumn::Productivity;
        assert!(group_aggregate(&view, &[GroupKey::Date], p, Aggregation::Sum).is_empty());
        assert!(resample_weekly_mean(&view, p).is_empty());
        assert!(distribution(&view, &[GroupKey::DayOfWeek], p).is_empty());
    }
}
