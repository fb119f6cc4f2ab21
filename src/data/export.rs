use std::sync::Arc;

use arrow::array::{ArrayRef, Date32Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate};

use super::derive::DerivedColumn;
use super::filter::FilteredView;
use super::model::{CategoricalColumn, CellValue, NumericColumn, DATE_COLUMN};
use crate::error::Result;

/// Days from 0001-01-01 to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn date32(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

/// NaN becomes null so consumers render it as "no data".
fn nullable(values: impl Iterator<Item = f64>) -> ArrayRef {
    let values: Vec<Option<f64>> = values.map(|v| (!v.is_nan()).then_some(v)).collect();
    Arc::new(Float64Array::from(values))
}

/// Convert the view (plus the requested derived columns) into an Arrow
/// record batch.
///
/// Schema: `Date` (Date32), the categorical columns (Utf8), the numeric
/// columns (nullable Float64), then one column per derived column.
pub fn to_record_batch(view: &FilteredView<'_>, derived: &[DerivedColumn]) -> Result<RecordBatch> {
    let mut fields = Vec::new();
    let mut columns: Vec<ArrayRef> = Vec::new();

    fields.push(Field::new(DATE_COLUMN, DataType::Date32, false));
    let dates: Vec<i32> = view.records().map(|r| date32(r.date)).collect();
    columns.push(Arc::new(Date32Array::from(dates)));

    for col in CategoricalColumn::ALL {
        fields.push(Field::new(col.header(), DataType::Utf8, false));
        columns.push(Arc::new(StringArray::from_iter_values(
            view.records().map(|r| r.category(col)),
        )));
    }

    for col in NumericColumn::ALL {
        fields.push(Field::new(col.header(), DataType::Float64, true));
        columns.push(nullable(view.records().map(|r| r.value(col))));
    }

    for &col in derived {
        let values: Vec<CellValue> = view.records().map(|r| col.value_of(r)).collect();
        let (data_type, array): (DataType, ArrayRef) = match col {
            DerivedColumn::TargetProductivity => (
                DataType::Float64,
                nullable(values.iter().map(|v| v.as_f64().unwrap_or(f64::NAN))),
            ),
            DerivedColumn::Week | DerivedColumn::Month | DerivedColumn::Year => (
                DataType::Int64,
                Arc::new(Int64Array::from(
                    values
                        .iter()
                        .map(|v| match v {
                            CellValue::Integer(i) => Some(*i),
                            _ => None,
                        })
                        .collect::<Vec<Option<i64>>>(),
                )),
            ),
            DerivedColumn::MonthStart => (
                DataType::Date32,
                Arc::new(Date32Array::from(
                    values
                        .iter()
                        .map(|v| match v {
                            CellValue::Date(d) => Some(date32(*d)),
                            _ => None,
                        })
                        .collect::<Vec<Option<i32>>>(),
                )),
            ),
            DerivedColumn::DayOfWeek => (
                DataType::Utf8,
                Arc::new(StringArray::from_iter_values(values.iter().map(|v| v.to_string()))),
            ),
        };
        fields.push(Field::new(col.name(), data_type, true));
        columns.push(array);
    }

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::fixtures::{record, table};
    use arrow::array::Array;

    #[test]
    fn batch_has_fixed_columns_then_derived() {
        let mut rows = vec![record("1970-01-02"), record("2024-03-15")];
        rows[1].labor_target_output = 0.0;
        rows[1].productivity = f64::NAN;
        let t = table(rows);
        let view = t.full_view();

        let derived = [DerivedColumn::TargetProductivity, DerivedColumn::Month];
        let batch = to_record_batch(&view, &derived).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 1 + 8 + 5 + 2);

        let dates = batch
            .column(0)
            .as_any()
            .downcast_ref::<Date32Array>()
            .unwrap();
        assert_eq!(dates.value(0), 1);

        let productivity = batch.column_by_name("Productivity").unwrap();
        assert_eq!(productivity.null_count(), 1);

        let ratio = batch
            .column_by_name("Labor_Target_Productivity")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(ratio.value(0), 90.0);
        assert!(ratio.is_null(1));

        let month = batch
            .column_by_name("Month")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(month.value(1), 3);
    }

    #[test]
    fn empty_view_gives_empty_batch() {
        let t = table(vec![]);
        let batch = to_record_batch(&t.full_view(), &[DerivedColumn::DayOfWeek]).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 15);
    }
}
