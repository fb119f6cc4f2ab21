//! Row-level derived values: target ratio, calendar periods, weekdays.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::filter::FilteredView;
use super::model::{CellValue, Record};
use crate::error::DashboardError;

/// `100 * total_output / target_output`; NaN when the target is zero.
pub fn target_productivity_ratio(record: &Record) -> f64 {
    if record.labor_target_output == 0.0 {
        return f64::NAN;
    }
    100.0 * record.labor_total_output / record.labor_target_output
}

/// Ratio for every row of the view, aligned with its row order.
pub fn target_productivity_ratios(view: &FilteredView<'_>) -> Vec<f64> {
    view.records().map(target_productivity_ratio).collect()
}

/// Calendar bucket size for interval aggregation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Week,
    #[default]
    Month,
    Year,
}

impl FromStr for Granularity {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "week" | "weekly" => Ok(Granularity::Week),
            "month" | "monthly" => Ok(Granularity::Month),
            "year" | "yearly" => Ok(Granularity::Year),
            other => Err(DashboardError::Config(format!("unknown granularity '{other}'"))),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Year => "year",
        })
    }
}

/// ISO week number, month number or year of `date`.
///
/// Week numbers repeat across years, as do month numbers.
pub fn period_key(date: NaiveDate, granularity: Granularity) -> i32 {
    match granularity {
        Granularity::Week => date.iso_week().week() as i32,
        Granularity::Month => date.month() as i32,
        Granularity::Year => date.year(),
    }
}

/// First day of the period containing `date`: the Monday of its ISO week,
/// the first of its month, or 1 January.
pub fn period_start(date: NaiveDate, granularity: Granularity) -> NaiveDate {
    match granularity {
        Granularity::Week => date - Duration::days(date.weekday().num_days_from_monday() as i64),
        Granularity::Month => date.with_day(1).unwrap_or(date),
        Granularity::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
    }
}

/// English weekday name, e.g. "Monday".
pub fn day_of_week(date: NaiveDate) -> &'static str {
    match date.weekday() {
        chrono::Weekday::Mon => "Monday",
        chrono::Weekday::Tue => "Tuesday",
        chrono::Weekday::Wed => "Wednesday",
        chrono::Weekday::Thu => "Thursday",
        chrono::Weekday::Fri => "Friday",
        chrono::Weekday::Sat => "Saturday",
        chrono::Weekday::Sun => "Sunday",
    }
}

/// Columns a chart may ask to have materialised next to the view's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DerivedColumn {
    TargetProductivity,
    Week,
    Month,
    Year,
    MonthStart,
    DayOfWeek,
}

impl DerivedColumn {
    pub fn name(self) -> &'static str {
        match self {
            DerivedColumn::TargetProductivity => "Labor_Target_Productivity",
            DerivedColumn::Week => "Week",
            DerivedColumn::Month => "Month",
            DerivedColumn::Year => "Year",
            DerivedColumn::MonthStart => "Month_Start",
            DerivedColumn::DayOfWeek => "Day_of_Week",
        }
    }

    pub fn value_of(self, record: &Record) -> CellValue {
        match self {
            DerivedColumn::TargetProductivity => {
                CellValue::Float(target_productivity_ratio(record))
            }
            DerivedColumn::Week => {
                CellValue::Integer(period_key(record.date, Granularity::Week) as i64)
            }
            DerivedColumn::Month => {
                CellValue::Integer(period_key(record.date, Granularity::Month) as i64)
            }
            DerivedColumn::Year => {
                CellValue::Integer(period_key(record.date, Granularity::Year) as i64)
            }
            DerivedColumn::MonthStart => {
                CellValue::Date(period_start(record.date, Granularity::Month))
            }
            DerivedColumn::DayOfWeek => CellValue::from(day_of_week(record.date)),
        }
    }
}

/// Materialise one derived column for the view, aligned with its rows.
pub fn derive_column(view: &FilteredView<'_>, column: DerivedColumn) -> Vec<CellValue> {
    view.records().map(|r| column.value_of(r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::fixtures::{record, table};

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn ratio_is_percentage_of_target() {
        let mut r = record("2024-01-01");
        r.labor_total_output = 45.0;
        r.labor_target_output = 60.0;
        assert_eq!(target_productivity_ratio(&r), 75.0);
    }

    #[test]
    fn zero_target_gives_nan_not_infinity() {
        let mut r = record("2024-01-01");
        r.labor_total_output = 10.0;
        r.labor_target_output = 0.0;
        assert!(target_productivity_ratio(&r).is_nan());
        r.labor_total_output = 0.0;
        assert!(target_productivity_ratio(&r).is_nan());
    }

    #[test]
    fn period_keys_follow_iso_calendar() {
        // 2021-01-03 is a Sunday in ISO week 53 of 2020
        assert_eq!(period_key(d("2021-01-03"), Granularity::Week), 53);
        assert_eq!(period_key(d("2021-01-04"), Granularity::Week), 1);
        assert_eq!(period_key(d("2021-07-15"), Granularity::Month), 7);
        assert_eq!(period_key(d("2021-07-15"), Granularity::Year), 2021);
    }

    #[test]
    fn period_start_aligns_to_monday_month_and_year() {
        let start = |day: &str, g: Granularity| period_start(d(day), g).to_string();
        assert_eq!(start("2024-01-07", Granularity::Week), "2024-01-01");
        assert_eq!(start("2024-01-08", Granularity::Week), "2024-01-08");
        assert_eq!(start("2024-02-29", Granularity::Month), "2024-02-01");
        assert_eq!(start("2024-02-29", Granularity::Year), "2024-01-01");
    }

    #[test]
    fn derived_column_aligns_with_view_rows() {
        let t = table(vec![record("2024-03-04"), record("2024-03-09")]);
        let view = t.full_view();
        assert_eq!(
            derive_column(&view, DerivedColumn::DayOfWeek),
            vec![CellValue::from("Monday"), CellValue::from("Saturday")]
        );
        assert_eq!(
            derive_column(&view, DerivedColumn::MonthStart),
            vec![CellValue::Date(d("2024-03-01")); 2]
        );
    }

    #[test]
    fn granularity_parses_menu_words() {
        assert_eq!("Weekly".parse::<Granularity>().unwrap(), Granularity::Week);
        assert_eq!("year".parse::<Granularity>().unwrap(), Granularity::Year);
        assert!("daily".parse::<Granularity>().is_err());
    }
}
