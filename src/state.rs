use std::sync::Arc;

use crate::catalogue::{build_charts, ChartOptions, ChartSelection, ChartSpec};
use crate::data::filter::{apply_filter, FilterSpec, FilteredView};
use crate::data::model::{CategoricalColumn, Table};
use crate::error::Result;

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Everything one dashboard session holds between requests, independent of
/// rendering.
#[derive(Debug, Clone)]
pub struct Session {
    /// Loaded dataset, shared with other sessions.
    table: Arc<Table>,

    /// Current filter controls.
    filters: FilterSpec,

    /// Indices of the last filter result, keyed by spec fingerprint.
    cached: Option<(u64, Vec<usize>)>,

    /// Menu entry whose charts are shown.
    pub selection: ChartSelection,

    /// Granularity and anomaly band width.
    pub options: ChartOptions,
}

impl Session {
    /// Start a session with the table's observed ranges and no categorical
    /// restriction.
    pub fn new(table: Arc<Table>) -> Self {
        let filters = FilterSpec::observed(&table);
        Session {
            table,
            filters,
            cached: None,
            selection: ChartSelection::default(),
            options: ChartOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ChartOptions) -> Self {
        self.options = options;
        self
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn filters(&self) -> &FilterSpec {
        &self.filters
    }

    /// Replace the filter controls. An invalid spec leaves the session as it
    /// was.
    pub fn set_filters(&mut self, filters: FilterSpec) -> Result<()> {
        filters.validate()?;
        self.filters = filters;
        Ok(())
    }

    /// Toggle a single value in a column's allow-set.
    pub fn toggle_filter_value(&mut self, column: CategoricalColumn, value: &str) {
        let selected = self.filters.allowed.entry(column).or_default();
        if !selected.remove(value) {
            selected.insert(value.to_string());
        }
    }

    /// Select every observed value of a column.
    pub fn select_all(&mut self, column: CategoricalColumn) {
        if let Some(all_vals) = self.table.unique_values.get(&column) {
            self.filters.allowed.insert(column, all_vals.clone());
        }
    }

    /// Clear a column's allow-set, which lifts its restriction.
    pub fn select_none(&mut self, column: CategoricalColumn) {
        self.filters.allowed.remove(&column);
    }

    pub fn set_selection(&mut self, selection: ChartSelection) {
        self.selection = selection;
    }

    /// Rows passing the current filters. Reuses the previous result while
    /// the filters are unchanged.
    pub fn view(&mut self) -> Result<FilteredView<'_>> {
        let fingerprint = self.filters.fingerprint();
        match &self.cached {
            Some((fp, indices)) if *fp == fingerprint => {
                log::debug!("filter memo hit ({} rows)", indices.len());
                Ok(FilteredView::from_indices(&self.table, indices.clone()))
            }
            _ => {
                let view = apply_filter(&self.table, &self.filters)?;
                self.cached = Some((fingerprint, view.indices().to_vec()));
                Ok(view)
            }
        }
    }

    /// Chart data for the current selection over the current view.
    pub fn charts(&mut self) -> Result<Vec<ChartSpec>> {
        let selection = self.selection;
        let options = self.options;
        let view = self.view()?;
        build_charts(selection, &view, &options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::Theme;
    use crate::data::model::fixtures::{record, table};
    use crate::error::DashboardError;

    fn session() -> Session {
        let depts = ["A", "B", "A", "C"];
        let rows = depts
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let mut r = record(&format!("2024-01-0{}", i + 1));
                r.department = (*d).into();
                r.labor_efficiency_rate = 80.0 + i as f64;
                r
            })
            .collect();
        Session::new(Arc::new(table(rows)))
    }

    #[test]
    fn starts_with_observed_ranges_and_every_row() {
        let mut s = session();
        let range = s.filters().efficiency_rate_range.unwrap();
        assert_eq!((range.low, range.high), (80.0, 83.0));
        assert!(s.filters().allowed.is_empty());
        assert_eq!(s.view().unwrap().len(), 4);
    }

    #[test]
    fn toggle_twice_restores_no_restriction() {
        let mut s = session();
        s.toggle_filter_value(CategoricalColumn::Department, "A");
        assert_eq!(s.view().unwrap().indices(), &[0, 2]);

        s.toggle_filter_value(CategoricalColumn::Department, "C");
        assert_eq!(s.view().unwrap().indices(), &[0, 2, 3]);

        s.toggle_filter_value(CategoricalColumn::Department, "A");
        s.toggle_filter_value(CategoricalColumn::Department, "C");
        assert_eq!(s.view().unwrap().len(), 4);
    }

    #[test]
    fn select_all_and_none_both_show_everything() {
        let mut s = session();
        s.select_all(CategoricalColumn::Department);
        assert_eq!(s.filters().allowed[&CategoricalColumn::Department].len(), 3);
        assert_eq!(s.view().unwrap().len(), 4);

        s.select_none(CategoricalColumn::Department);
        assert_eq!(s.view().unwrap().len(), 4);
    }

    #[test]
    fn invalid_filters_are_rejected_and_kept_out() {
        let mut s = session();
        let before = s.filters().clone();
        let err = s
            .set_filters(FilterSpec::new().with_efficiency_range(90.0, 10.0))
            .unwrap_err();
        assert!(matches!(err, DashboardError::InvalidFilter(_)));
        assert_eq!(s.filters(), &before);
    }

    #[test]
    fn memo_follows_filter_changes() {
        let mut s = session();
        assert_eq!(s.view().unwrap().len(), 4);
        let narrow = FilterSpec::new().with_efficiency_range(81.0, 82.0);
        s.set_filters(narrow).unwrap();
        assert_eq!(s.view().unwrap().indices(), &[1, 2]);
        // same spec again hits the memo and gives the same rows
        assert_eq!(s.view().unwrap().indices(), &[1, 2]);
    }

    #[test]
    fn charts_follow_selection() {
        let mut s = session();
        s.set_selection(ChartSelection::Theme(Theme::DepartmentDynamics));
        let charts = s.charts().unwrap();
        assert_eq!(charts[0].id, "productivity-by-department");
    }
}
