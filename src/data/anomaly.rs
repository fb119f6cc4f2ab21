//! Mean ± k·σ outlier flags.
//!
//! σ is the sample standard deviation. A group needs at least two finite
//! values for σ to exist; smaller groups flag nothing. NaN is never flagged.

use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;
use statrs::statistics::{Data, Distribution};

use super::aggregate::{GroupKey, GroupRow, Measure};
use super::filter::FilteredView;
use super::model::CellValue;
use crate::error::{DashboardError, Result};

/// Band width multiplier used by every anomaly chart.
pub const DEFAULT_K: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnomalyBand {
    pub mean: f64,
    pub std_dev: f64,
    pub lower: f64,
    pub upper: f64,
}

impl AnomalyBand {
    /// `None` when fewer than two finite values are present.
    pub fn from_values(values: &[f64], k: f64) -> Option<Self> {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.len() < 2 {
            return None;
        }
        let data = Data::new(finite);
        let mean = data.mean()?;
        let std_dev = data.std_dev()?;
        Some(AnomalyBand {
            mean,
            std_dev,
            lower: mean - k * std_dev,
            upper: mean + k * std_dev,
        })
    }

    /// Strictly outside the band. With σ = 0 only values ≠ μ are outside.
    pub fn is_outside(&self, value: f64) -> bool {
        value < self.lower || value > self.upper
    }
}

fn check_k(k: f64) -> Result<()> {
    if !k.is_finite() || k < 0.0 {
        return Err(DashboardError::InvalidFilter(format!(
            "anomaly multiplier must be a finite non-negative number, got {k}"
        )));
    }
    Ok(())
}

/// Flag each value against the band of its own group.
pub fn flag_grouped<K: Eq + Hash>(values: &[f64], groups: &[K], k: f64) -> Vec<bool> {
    let mut members: HashMap<&K, Vec<f64>> = HashMap::new();
    for (v, g) in values.iter().zip(groups) {
        members.entry(g).or_default().push(*v);
    }
    let bands: HashMap<&K, Option<AnomalyBand>> = members
        .into_iter()
        .map(|(g, vals)| (g, AnomalyBand::from_values(&vals, k)))
        .collect();

    values
        .iter()
        .zip(groups)
        .map(|(v, g)| {
            bands
                .get(g)
                .copied()
                .flatten()
                .is_some_and(|band| band.is_outside(*v))
        })
        .collect()
}

/// Per-row anomaly flags, aligned with the view's rows, using the band of
/// the row's `group` value.
pub fn anomaly_flags(
    view: &FilteredView<'_>,
    measure: impl Into<Measure>,
    group: GroupKey,
    k: f64,
) -> Result<Vec<bool>> {
    check_k(k)?;
    let measure = measure.into();
    let values: Vec<f64> = view.records().map(|r| measure.value_of(r)).collect();
    let groups: Vec<CellValue> = view.records().map(|r| group.value_of(r)).collect();
    let flags = flag_grouped(&values, &groups, k);
    log::debug!(
        "{} of {} rows flagged on {} by {group}",
        flags.iter().filter(|f| **f).count(),
        flags.len(),
        measure.name()
    );
    Ok(flags)
}

/// Flags over an already aggregated series (e.g. per-period means), grouped
/// by the key component at `key_position`.
pub fn flag_series(rows: &[GroupRow], key_position: usize, k: f64) -> Result<Vec<bool>> {
    check_k(k)?;
    let values: Vec<f64> = rows.iter().map(|r| r.value).collect();
    let groups: Vec<CellValue> = rows
        .iter()
        .map(|r| r.key.get(key_position).cloned().unwrap_or(CellValue::Null))
        .collect();
    Ok(flag_grouped(&values, &groups, k))
}

/// Band over every row of the view, ungrouped.
pub fn anomaly_band(
    view: &FilteredView<'_>,
    measure: impl Into<Measure>,
    k: f64,
) -> Result<Option<AnomalyBand>> {
    check_k(k)?;
    let measure = measure.into();
    let values: Vec<f64> = view.records().map(|r| measure.value_of(r)).collect();
    Ok(AnomalyBand::from_values(&values, k))
}

/// One-sided `μ − kσ` threshold over the whole view.
pub fn lower_threshold(
    view: &FilteredView<'_>,
    measure: impl Into<Measure>,
    k: f64,
) -> Result<Option<f64>> {
    Ok(anomaly_band(view, measure, k)?.map(|b| b.lower))
}
