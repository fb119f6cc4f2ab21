//! The dashboard's chart catalogue.
//!
//! Every menu entry is a [`ChartSelection`]; [`CATALOGUE`] maps it to the
//! function that builds the data of its charts from a [`FilteredView`].
//! Nothing here draws: a [`ChartSpec`] names the chart, its shape and the
//! numbers behind it.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::config::DashboardConfig;
use crate::data::aggregate::{
    count_rows, distribution, group_aggregate, pivot_mean, rank_groups, resample_weekly_mean,
    summarize, Aggregation, BoxSummary, GroupKey, GroupRow, GroupSummary, Measure, PivotTable,
    RankOrder, WeeklyPoint,
};
use crate::data::anomaly::{flag_series, lower_threshold, DEFAULT_K};
use crate::data::derive::Granularity;
use crate::data::filter::FilteredView;
use crate::data::model::{CategoricalColumn as Cat, CellValue, NumericColumn as Num, Record};
use crate::error::{DashboardError, Result};

// ---------------------------------------------------------------------------
// Selections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AnalysisCategory {
    Metrics,
    Parameters,
    Themes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Metric {
    LaborPresence,
    TotalOutput,
    Productivity,
    TargetProductivity,
    EfficiencyRate,
    ProductivityZone,
    AnomalyConduct,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::LaborPresence,
        Metric::TotalOutput,
        Metric::Productivity,
        Metric::TargetProductivity,
        Metric::EfficiencyRate,
        Metric::ProductivityZone,
        Metric::AnomalyConduct,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Metric::LaborPresence => "labor-presence",
            Metric::TotalOutput => "total-output",
            Metric::Productivity => "productivity",
            Metric::TargetProductivity => "target-productivity",
            Metric::EfficiencyRate => "efficiency-rate",
            Metric::ProductivityZone => "productivity-zone",
            Metric::AnomalyConduct => "anomaly-conduct",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Parameter {
    Product,
    Department,
    Shift,
    TimeIntervals,
    Manager,
    FactoryUnits,
    MachineUnit,
}

impl Parameter {
    pub const ALL: [Parameter; 7] = [
        Parameter::Product,
        Parameter::Department,
        Parameter::Shift,
        Parameter::TimeIntervals,
        Parameter::Manager,
        Parameter::FactoryUnits,
        Parameter::MachineUnit,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Parameter::Product => "product",
            Parameter::Department => "department",
            Parameter::Shift => "shift",
            Parameter::TimeIntervals => "time-intervals",
            Parameter::Manager => "manager",
            Parameter::FactoryUnits => "factory-units",
            Parameter::MachineUnit => "machine-unit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Theme {
    ProductivityPulse,
    DepartmentDynamics,
    ProductivityPanorama,
    TargetTracker,
    ShiftSynergy,
    EfficiencyCompass,
    ProductivityEvolution,
}

impl Theme {
    pub const ALL: [Theme; 7] = [
        Theme::ProductivityPulse,
        Theme::DepartmentDynamics,
        Theme::ProductivityPanorama,
        Theme::TargetTracker,
        Theme::ShiftSynergy,
        Theme::EfficiencyCompass,
        Theme::ProductivityEvolution,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Theme::ProductivityPulse => "productivity-pulse",
            Theme::DepartmentDynamics => "department-dynamics",
            Theme::ProductivityPanorama => "productivity-panorama",
            Theme::TargetTracker => "target-tracker",
            Theme::ShiftSynergy => "shift-synergy",
            Theme::EfficiencyCompass => "efficiency-compass",
            Theme::ProductivityEvolution => "productivity-evolution",
        }
    }
}

/// One menu entry: analysis category × metric/parameter/theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChartSelection {
    Metric(Metric),
    Parameter(Parameter),
    Theme(Theme),
}

impl Default for ChartSelection {
    fn default() -> Self {
        ChartSelection::Metric(Metric::LaborPresence)
    }
}

impl ChartSelection {
    pub fn category(self) -> AnalysisCategory {
        match self {
            ChartSelection::Metric(_) => AnalysisCategory::Metrics,
            ChartSelection::Parameter(_) => AnalysisCategory::Parameters,
            ChartSelection::Theme(_) => AnalysisCategory::Themes,
        }
    }

    /// Every selection, in menu order.
    pub fn all() -> Vec<ChartSelection> {
        Metric::ALL
            .into_iter()
            .map(ChartSelection::Metric)
            .chain(Parameter::ALL.into_iter().map(ChartSelection::Parameter))
            .chain(Theme::ALL.into_iter().map(ChartSelection::Theme))
            .collect()
    }
}

impl fmt::Display for ChartSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartSelection::Metric(m) => write!(f, "metric:{}", m.slug()),
            ChartSelection::Parameter(p) => write!(f, "parameter:{}", p.slug()),
            ChartSelection::Theme(t) => write!(f, "theme:{}", t.slug()),
        }
    }
}

impl FromStr for ChartSelection {
    type Err = DashboardError;

    /// Parses the `category:item` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        ChartSelection::all()
            .into_iter()
            .find(|sel| sel.to_string() == wanted)
            .ok_or_else(|| DashboardError::Config(format!("unknown chart selection '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Chart data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartOptions {
    pub granularity: Granularity,
    pub anomaly_k: f64,
}

impl Default for ChartOptions {
    fn default() -> Self {
        ChartOptions {
            granularity: Granularity::default(),
            anomaly_k: DEFAULT_K,
        }
    }
}

impl From<&DashboardConfig> for ChartOptions {
    fn from(config: &DashboardConfig) -> Self {
        ChartOptions {
            granularity: config.granularity,
            anomaly_k: config.anomaly_k,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    GroupedBar,
    StackedBar,
    Line,
    Area,
    Box,
    Pie,
    Histogram,
    Scatter,
    Heatmap,
    Treemap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub x: CellValue,
    pub y: CellValue,
    pub series: CellValue,
    pub flagged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChartData {
    Groups {
        keys: Vec<String>,
        measure: String,
        aggregation: Aggregation,
        rows: Vec<GroupRow>,
    },
    Summary {
        keys: Vec<String>,
        measures: Vec<String>,
        aggregation: Aggregation,
        rows: Vec<GroupSummary>,
    },
    Weekly {
        measure: String,
        points: Vec<WeeklyPoint>,
    },
    Distribution {
        keys: Vec<String>,
        measure: String,
        boxes: Vec<BoxSummary>,
        threshold: Option<f64>,
    },
    Pivot(PivotTable),
    Flagged {
        keys: Vec<String>,
        measure: String,
        rows: Vec<GroupRow>,
        anomalous: Vec<bool>,
    },
    Scatter {
        x: String,
        y: String,
        series: String,
        points: Vec<ScatterPoint>,
        threshold: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub id: String,
    pub kind: ChartKind,
    pub data: ChartData,
}

pub type BuildFn = fn(&FilteredView<'_>, &ChartOptions) -> Result<Vec<ChartSpec>>;

/// Selection → chart builder.
pub const CATALOGUE: &[(ChartSelection, BuildFn)] = &[
    (ChartSelection::Metric(Metric::LaborPresence), labor_presence),
    (ChartSelection::Metric(Metric::TotalOutput), total_output),
    (ChartSelection::Metric(Metric::Productivity), productivity),
    (ChartSelection::Metric(Metric::TargetProductivity), target_productivity),
    (ChartSelection::Metric(Metric::EfficiencyRate), efficiency_rate),
    (ChartSelection::Metric(Metric::ProductivityZone), productivity_zone),
    (ChartSelection::Metric(Metric::AnomalyConduct), anomaly_conduct),
    (ChartSelection::Parameter(Parameter::Product), by_product),
    (ChartSelection::Parameter(Parameter::Department), by_department),
    (ChartSelection::Parameter(Parameter::Shift), by_shift),
    (ChartSelection::Parameter(Parameter::TimeIntervals), by_time_interval),
    (ChartSelection::Parameter(Parameter::Manager), by_manager),
    (ChartSelection::Parameter(Parameter::FactoryUnits), by_factory_unit),
    (ChartSelection::Parameter(Parameter::MachineUnit), by_machine_unit),
    (ChartSelection::Theme(Theme::ProductivityPulse), productivity_pulse),
    (ChartSelection::Theme(Theme::DepartmentDynamics), department_dynamics),
    (ChartSelection::Theme(Theme::ProductivityPanorama), productivity_panorama),
    (ChartSelection::Theme(Theme::TargetTracker), target_tracker),
    (ChartSelection::Theme(Theme::ShiftSynergy), shift_synergy),
    (ChartSelection::Theme(Theme::EfficiencyCompass), efficiency_compass),
    (ChartSelection::Theme(Theme::ProductivityEvolution), productivity_evolution),
];

/// Build the data for every chart of `selection`.
pub fn build_charts(
    selection: ChartSelection,
    view: &FilteredView<'_>,
    options: &ChartOptions,
) -> Result<Vec<ChartSpec>> {
    let (_, build) = CATALOGUE
        .iter()
        .find(|(s, _)| *s == selection)
        .ok_or_else(|| DashboardError::Config(format!("no charts registered for {selection}")))?;
    let charts = build(view, options)?;
    log::debug!(
        "{selection}: built {} charts over {} rows",
        charts.len(),
        view.len()
    );
    Ok(charts)
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

fn by(col: Cat) -> GroupKey {
    GroupKey::Column(col)
}

fn key_names(keys: &[GroupKey]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

fn groups(
    id: impl Into<String>,
    kind: ChartKind,
    view: &FilteredView<'_>,
    keys: &[GroupKey],
    measure: impl Into<Measure>,
    aggregation: Aggregation,
) -> ChartSpec {
    let measure = measure.into();
    ChartSpec {
        id: id.into(),
        kind,
        data: ChartData::Groups {
            keys: key_names(keys),
            measure: measure.name().to_string(),
            aggregation,
            rows: group_aggregate(view, keys, measure, aggregation),
        },
    }
}

fn counts(
    id: impl Into<String>,
    kind: ChartKind,
    view: &FilteredView<'_>,
    keys: &[GroupKey],
) -> ChartSpec {
    ChartSpec {
        id: id.into(),
        kind,
        data: ChartData::Groups {
            keys: key_names(keys),
            measure: "rows".to_string(),
            aggregation: Aggregation::Count,
            rows: count_rows(view, keys),
        },
    }
}

fn summary_of(
    keys: &[GroupKey],
    measures: &[Measure],
    aggregation: Aggregation,
    rows: Vec<GroupSummary>,
) -> ChartData {
    ChartData::Summary {
        keys: key_names(keys),
        measures: measures.iter().map(|m| m.name().to_string()).collect(),
        aggregation,
        rows,
    }
}

const OUTPUT_VS_TARGET: [Measure; 2] = [
    Measure::Column(Num::LaborTotalOutput),
    Measure::Column(Num::LaborTargetOutput),
];

fn output_vs_target(id: impl Into<String>, view: &FilteredView<'_>, key: GroupKey) -> ChartSpec {
    let keys = [key];
    ChartSpec {
        id: id.into(),
        kind: ChartKind::GroupedBar,
        data: summary_of(
            &keys,
            &OUTPUT_VS_TARGET,
            Aggregation::Sum,
            summarize(view, &keys, &OUTPUT_VS_TARGET, Aggregation::Sum),
        ),
    }
}

fn boxes(
    id: impl Into<String>,
    view: &FilteredView<'_>,
    keys: &[GroupKey],
    measure: impl Into<Measure>,
    threshold: Option<f64>,
) -> ChartSpec {
    let measure = measure.into();
    ChartSpec {
        id: id.into(),
        kind: ChartKind::Box,
        data: ChartData::Distribution {
            keys: key_names(keys),
            measure: measure.name().to_string(),
            boxes: distribution(view, keys, measure),
            threshold,
        },
    }
}

/// A scatter axis: a grouping value or a measured value.
#[derive(Debug, Clone, Copy)]
enum Axis {
    Key(GroupKey),
    Value(Measure),
}

impl Axis {
    fn value_of(self, record: &Record) -> CellValue {
        match self {
            Axis::Key(k) => k.value_of(record),
            Axis::Value(m) => CellValue::Float(m.value_of(record)),
        }
    }

    fn name(self) -> String {
        match self {
            Axis::Key(k) => k.to_string(),
            Axis::Value(m) => m.name().to_string(),
        }
    }
}

/// Raw-row scatter. With a threshold, points whose numeric `y` lies below
/// it are flagged.
fn scatter(
    id: impl Into<String>,
    view: &FilteredView<'_>,
    x: Axis,
    y: Axis,
    series: GroupKey,
    threshold: Option<f64>,
) -> ChartSpec {
    let points = view
        .records()
        .map(|r| {
            let y_value = y.value_of(r);
            let flagged = match (threshold, y_value.as_f64()) {
                (Some(t), Some(v)) => v < t,
                _ => false,
            };
            ScatterPoint {
                x: x.value_of(r),
                y: y_value,
                series: series.value_of(r),
                flagged,
            }
        })
        .collect();
    ChartSpec {
        id: id.into(),
        kind: ChartKind::Scatter,
        data: ChartData::Scatter {
            x: x.name(),
            y: y.name(),
            series: series.to_string(),
            points,
            threshold,
        },
    }
}

/// Per-period, per-shift productivity means with each shift's outliers.
fn shift_interval_anomalies(view: &FilteredView<'_>, options: &ChartOptions) -> Result<ChartSpec> {
    let keys = [GroupKey::Period(options.granularity), by(Cat::Shift)];
    let rows = group_aggregate(view, &keys, Num::Productivity, Aggregation::Mean);
    let anomalous = flag_series(&rows, 1, options.anomaly_k)?;
    Ok(ChartSpec {
        id: "productivity-anomalies-by-shift".into(),
        kind: ChartKind::Line,
        data: ChartData::Flagged {
            keys: key_names(&keys),
            measure: Num::Productivity.header().to_string(),
            rows,
            anomalous,
        },
    })
}

// -- Metrics --

fn labor_presence(view: &FilteredView<'_>, _: &ChartOptions) -> Result<Vec<ChartSpec>> {
    Ok(vec![
        groups(
            "presence-by-zone-and-shift",
            ChartKind::GroupedBar,
            view,
            &[by(Cat::ProductivityZone), by(Cat::Shift)],
            Num::LaborPresence,
            Aggregation::Sum,
        ),
        groups(
            "presence-by-shift-and-machine-unit",
            ChartKind::StackedBar,
            view,
            &[by(Cat::Shift), by(Cat::MachineUnit)],
            Num::LaborPresence,
            Aggregation::Sum,
        ),
        groups(
            "presence-by-weekday-and-shift",
            ChartKind::Line,
            view,
            &[GroupKey::DayOfWeek, by(Cat::Shift)],
            Num::LaborPresence,
            Aggregation::Mean,
        ),
    ])
}

fn total_output(view: &FilteredView<'_>, _: &ChartOptions) -> Result<Vec<ChartSpec>> {
    Ok(vec![
        groups(
            "output-by-department-and-shift",
            ChartKind::GroupedBar,
            view,
            &[by(Cat::Department), by(Cat::Shift)],
            Num::LaborTotalOutput,
            Aggregation::Sum,
        ),
        groups(
            "monthly-output-by-department",
            ChartKind::StackedBar,
            view,
            &[
                GroupKey::PeriodStart(Granularity::Month),
                by(Cat::Department),
            ],
            Num::LaborTotalOutput,
            Aggregation::Sum,
        ),
        boxes(
            "output-distribution-by-department-and-shift",
            view,
            &[by(Cat::Department), by(Cat::Shift)],
            Num::LaborTotalOutput,
            None,
        ),
        groups(
            "output-by-factory-unit-and-department",
            ChartKind::GroupedBar,
            view,
            &[by(Cat::FactoryUnit), by(Cat::Department)],
            Num::LaborTotalOutput,
            Aggregation::Sum,
        ),
        boxes(
            "output-distribution-by-factory-unit-and-zone",
            view,
            &[by(Cat::FactoryUnit), by(Cat::ProductivityZone)],
            Num::LaborTotalOutput,
            None,
        ),
    ])
}

fn productivity(view: &FilteredView<'_>, _: &ChartOptions) -> Result<Vec<ChartSpec>> {
    Ok(vec![
        groups(
            "presence-by-product",
            ChartKind::Bar,
            view,
            &[by(Cat::ProductType)],
            Num::LaborPresence,
            Aggregation::Mean,
        ),
        groups(
            "productivity-by-shift",
            ChartKind::Bar,
            view,
            &[by(Cat::Shift)],
            Num::Productivity,
            Aggregation::Mean,
        ),
    ])
}

fn target_productivity(view: &FilteredView<'_>, _: &ChartOptions) -> Result<Vec<ChartSpec>> {
    Ok(vec![
        output_vs_target("output-vs-target-by-department", view, by(Cat::Department)),
        output_vs_target("output-vs-target-by-shift", view, by(Cat::Shift)),
        output_vs_target("output-vs-target-by-zone", view, by(Cat::ProductivityZone)),
        groups(
            "target-productivity-by-department",
            ChartKind::Bar,
            view,
            &[by(Cat::Department)],
            Measure::TargetProductivity,
            Aggregation::Mean,
        ),
    ])
}

fn efficiency_rate(view: &FilteredView<'_>, _: &ChartOptions) -> Result<Vec<ChartSpec>> {
    Ok(vec![
        ChartSpec {
            id: "efficiency-weekly-mean".into(),
            kind: ChartKind::Line,
            data: ChartData::Weekly {
                measure: Num::LaborEfficiencyRate.header().to_string(),
                points: resample_weekly_mean(view, Num::LaborEfficiencyRate),
            },
        },
        groups(
            "efficiency-by-product",
            ChartKind::Bar,
            view,
            &[by(Cat::ProductType)],
            Num::LaborEfficiencyRate,
            Aggregation::Mean,
        ),
        boxes(
            "efficiency-distribution-by-department",
            view,
            &[by(Cat::Department)],
            Num::LaborEfficiencyRate,
            None,
        ),
    ])
}

fn productivity_zone(view: &FilteredView<'_>, _: &ChartOptions) -> Result<Vec<ChartSpec>> {
    Ok(vec![
        counts(
            "zone-by-department",
            ChartKind::Histogram,
            view,
            &[by(Cat::Department), by(Cat::ProductivityZone)],
        ),
        counts(
            "zone-share",
            ChartKind::Pie,
            view,
            &[by(Cat::ProductivityZone)],
        ),
        counts(
            "zone-weekly-trend",
            ChartKind::Area,
            view,
            &[
                GroupKey::PeriodStart(Granularity::Week),
                by(Cat::ProductivityZone),
            ],
        ),
    ])
}

fn anomaly_conduct(view: &FilteredView<'_>, _: &ChartOptions) -> Result<Vec<ChartSpec>> {
    Ok(vec![
        counts(
            "anomaly-conduct-by-shift",
            ChartKind::Histogram,
            view,
            &[by(Cat::AnomalyConduct), by(Cat::Shift)],
        ),
        counts(
            "anomaly-conduct-by-date",
            ChartKind::StackedBar,
            view,
            &[GroupKey::Date, by(Cat::AnomalyConduct)],
        ),
        counts(
            "anomaly-conduct-by-department",
            ChartKind::Histogram,
            view,
            &[by(Cat::AnomalyConduct), by(Cat::Department)],
        ),
        counts(
            "anomaly-conduct-by-factory-unit",
            ChartKind::Histogram,
            view,
            &[by(Cat::AnomalyConduct), by(Cat::FactoryUnit)],
        ),
        scatter(
            "presence-vs-anomaly-conduct",
            view,
            Axis::Value(Num::LaborPresence.into()),
            Axis::Key(by(Cat::AnomalyConduct)),
            by(Cat::AnomalyConduct),
            None,
        ),
    ])
}

// -- Parameters --

fn by_product(view: &FilteredView<'_>, _: &ChartOptions) -> Result<Vec<ChartSpec>> {
    let product = by(Cat::ProductType);
    let (measures, sum) = (&OUTPUT_VS_TARGET, Aggregation::Sum);
    let top = rank_groups(view, product, measures, sum, 5, RankOrder::Descending);
    let bottom = rank_groups(view, product, measures, sum, 5, RankOrder::Ascending);

    Ok(vec![
        ChartSpec {
            id: "top-products-by-output".into(),
            kind: ChartKind::GroupedBar,
            data: summary_of(&[product], measures, sum, top),
        },
        ChartSpec {
            id: "bottom-products-by-output".into(),
            kind: ChartKind::GroupedBar,
            data: summary_of(&[product], measures, sum, bottom),
        },
        output_vs_target("output-vs-target-by-department", view, by(Cat::Department)),
        groups(
            "output-by-product",
            ChartKind::Bar,
            view,
            &[product],
            Num::LaborTotalOutput,
            Aggregation::Sum,
        ),
        groups(
            "output-by-date-and-product",
            ChartKind::StackedBar,
            view,
            &[GroupKey::Date, product],
            Num::LaborTotalOutput,
            Aggregation::Sum,
        ),
        groups(
            "productivity-by-product-and-zone",
            ChartKind::StackedBar,
            view,
            &[product, by(Cat::ProductivityZone)],
            Num::Productivity,
            Aggregation::Mean,
        ),
        groups(
            "presence-by-product-and-department",
            ChartKind::GroupedBar,
            view,
            &[product, by(Cat::Department)],
            Num::LaborPresence,
            Aggregation::Mean,
        ),
        groups(
            "productivity-by-factory-unit-and-product",
            ChartKind::GroupedBar,
            view,
            &[by(Cat::FactoryUnit), product],
            Num::Productivity,
            Aggregation::Mean,
        ),
        boxes(
            "productivity-distribution-by-shift-and-product",
            view,
            &[by(Cat::Shift), product],
            Num::Productivity,
            None,
        ),
    ])
}

/// The four charts every single-column parameter page shows.
fn dimension_charts(view: &FilteredView<'_>, col: Cat) -> Vec<ChartSpec> {
    let slug = col.slug();
    vec![
        groups(
            format!("productivity-by-{slug}"),
            ChartKind::Bar,
            view,
            &[by(col)],
            Num::Productivity,
            Aggregation::Mean,
        ),
        groups(
            format!("output-by-{slug}-and-product"),
            ChartKind::GroupedBar,
            view,
            &[by(col), by(Cat::ProductType)],
            Num::LaborTotalOutput,
            Aggregation::Sum,
        ),
        counts(
            format!("zone-by-{slug}"),
            ChartKind::Histogram,
            view,
            &[by(col), by(Cat::ProductivityZone)],
        ),
        boxes(
            format!("efficiency-distribution-by-{slug}"),
            view,
            &[by(col)],
            Num::LaborEfficiencyRate,
            None,
        ),
    ]
}

fn by_department(view: &FilteredView<'_>, _: &ChartOptions) -> Result<Vec<ChartSpec>> {
    let mut charts = vec![output_vs_target(
        "output-vs-target-by-department",
        view,
        by(Cat::Department),
    )];
    charts.extend(dimension_charts(view, Cat::Department));
    Ok(charts)
}

fn by_shift(view: &FilteredView<'_>, _: &ChartOptions) -> Result<Vec<ChartSpec>> {
    let mut charts = dimension_charts(view, Cat::Shift);
    charts.push(groups(
        "productivity-by-shift-and-zone",
        ChartKind::StackedBar,
        view,
        &[by(Cat::Shift), by(Cat::ProductivityZone)],
        Num::Productivity,
        Aggregation::Mean,
    ));
    Ok(charts)
}

fn by_manager(view: &FilteredView<'_>, _: &ChartOptions) -> Result<Vec<ChartSpec>> {
    Ok(dimension_charts(view, Cat::Manager))
}

fn by_factory_unit(view: &FilteredView<'_>, _: &ChartOptions) -> Result<Vec<ChartSpec>> {
    Ok(dimension_charts(view, Cat::FactoryUnit))
}

fn by_machine_unit(view: &FilteredView<'_>, _: &ChartOptions) -> Result<Vec<ChartSpec>> {
    Ok(dimension_charts(view, Cat::MachineUnit))
}

fn by_time_interval(view: &FilteredView<'_>, options: &ChartOptions) -> Result<Vec<ChartSpec>> {
    let period = GroupKey::Period(options.granularity);
    let mut charts = vec![
        groups(
            "productivity-trend",
            ChartKind::Line,
            view,
            &[period],
            Num::Productivity,
            Aggregation::Mean,
        ),
        groups(
            "output-by-period",
            ChartKind::Bar,
            view,
            &[period],
            Num::LaborTotalOutput,
            Aggregation::Mean,
        ),
    ];
    if options.granularity == Granularity::Month {
        charts.push(counts(
            "zone-by-month",
            ChartKind::Histogram,
            view,
            &[period, by(Cat::ProductivityZone)],
        ));
    }
    charts.push(boxes(
        "efficiency-distribution-by-period",
        view,
        &[period],
        Num::LaborEfficiencyRate,
        None,
    ));

    // rows carrying an anomaly-conduct entry, overlaid on the trend
    let mut overlay = scatter(
        "productivity-with-anomaly-conduct",
        view,
        Axis::Key(period),
        Axis::Value(Num::Productivity.into()),
        by(Cat::AnomalyConduct),
        None,
    );
    if let ChartData::Scatter { points, .. } = &mut overlay.data {
        points.retain(|p| !p.series.to_string().is_empty());
        for p in points.iter_mut() {
            p.flagged = true;
        }
    }
    charts.push(overlay);
    Ok(charts)
}

// -- Themes --

fn productivity_pulse(view: &FilteredView<'_>, options: &ChartOptions) -> Result<Vec<ChartSpec>> {
    let period = GroupKey::Period(options.granularity);
    Ok(vec![
        groups(
            "productivity-trend-by-shift",
            ChartKind::Line,
            view,
            &[period, by(Cat::Shift)],
            Num::Productivity,
            Aggregation::Mean,
        ),
        groups(
            "productivity-by-shift",
            ChartKind::Bar,
            view,
            &[by(Cat::Shift)],
            Num::Productivity,
            Aggregation::Mean,
        ),
        shift_interval_anomalies(view, options)?,
        boxes(
            "productivity-distribution-by-period-and-shift",
            view,
            &[period, by(Cat::Shift)],
            Num::Productivity,
            None,
        ),
    ])
}

fn department_dynamics(view: &FilteredView<'_>, _: &ChartOptions) -> Result<Vec<ChartSpec>> {
    Ok(vec![
        groups(
            "productivity-by-department",
            ChartKind::Bar,
            view,
            &[by(Cat::Department)],
            Num::Productivity,
            Aggregation::Mean,
        ),
        scatter(
            "productivity-by-manager-and-department",
            view,
            Axis::Key(by(Cat::Manager)),
            Axis::Value(Num::Productivity.into()),
            by(Cat::Department),
            None,
        ),
        groups(
            "productivity-by-manager",
            ChartKind::Bar,
            view,
            &[by(Cat::Manager)],
            Num::Productivity,
            Aggregation::Mean,
        ),
        boxes(
            "efficiency-distribution-by-department-and-manager",
            view,
            &[by(Cat::Department), by(Cat::Manager)],
            Num::LaborEfficiencyRate,
            None,
        ),
        scatter(
            "output-by-manager-and-department",
            view,
            Axis::Key(by(Cat::Manager)),
            Axis::Value(Num::LaborTotalOutput.into()),
            by(Cat::Department),
            None,
        ),
    ])
}

fn productivity_panorama(view: &FilteredView<'_>, _: &ChartOptions) -> Result<Vec<ChartSpec>> {
    let units = [by(Cat::FactoryUnit), by(Cat::MachineUnit)];
    Ok(vec![
        groups(
            "productivity-by-factory-and-machine-unit",
            ChartKind::StackedBar,
            view,
            &units,
            Num::Productivity,
            Aggregation::Mean,
        ),
        groups(
            "productivity-by-machine-unit",
            ChartKind::Bar,
            view,
            &[by(Cat::MachineUnit)],
            Num::Productivity,
            Aggregation::Mean,
        ),
        groups(
            "productivity-unit-map",
            ChartKind::Scatter,
            view,
            &units,
            Num::Productivity,
            Aggregation::Mean,
        ),
        boxes(
            "productivity-distribution-by-factory-and-machine-unit",
            view,
            &units,
            Num::Productivity,
            None,
        ),
        boxes(
            "productivity-distribution-by-factory-unit",
            view,
            &[by(Cat::FactoryUnit)],
            Num::Productivity,
            None,
        ),
    ])
}

fn target_tracker(view: &FilteredView<'_>, _: &ChartOptions) -> Result<Vec<ChartSpec>> {
    let units = [by(Cat::FactoryUnit), by(Cat::MachineUnit)];
    Ok(vec![
        groups(
            "productivity-by-factory-and-machine-unit",
            ChartKind::GroupedBar,
            view,
            &units,
            Num::Productivity,
            Aggregation::Mean,
        ),
        groups(
            "productivity-hierarchy",
            ChartKind::Treemap,
            view,
            &units,
            Num::Productivity,
            Aggregation::Sum,
        ),
        boxes(
            "productivity-distribution-by-factory-and-machine-unit",
            view,
            &units,
            Num::Productivity,
            None,
        ),
    ])
}

fn shift_synergy(view: &FilteredView<'_>, options: &ChartOptions) -> Result<Vec<ChartSpec>> {
    let threshold = lower_threshold(view, Num::Productivity, options.anomaly_k)?;
    Ok(vec![
        groups(
            "productivity-by-shift-department-and-zone",
            ChartKind::GroupedBar,
            view,
            &[
                by(Cat::Shift),
                by(Cat::Department),
                by(Cat::ProductivityZone),
            ],
            Num::Productivity,
            Aggregation::Mean,
        ),
        scatter(
            "productivity-over-time-below-threshold",
            view,
            Axis::Key(GroupKey::Date),
            Axis::Value(Num::Productivity.into()),
            by(Cat::Shift),
            threshold,
        ),
        scatter(
            "productivity-by-shift-and-zone-below-threshold",
            view,
            Axis::Key(by(Cat::Shift)),
            Axis::Value(Num::Productivity.into()),
            by(Cat::ProductivityZone),
            threshold,
        ),
        boxes(
            "productivity-distribution-by-shift-and-zone",
            view,
            &[by(Cat::Shift), by(Cat::ProductivityZone)],
            Num::Productivity,
            threshold,
        ),
        boxes(
            "productivity-distribution-by-zone-and-shift",
            view,
            &[by(Cat::ProductivityZone), by(Cat::Shift)],
            Num::Productivity,
            None,
        ),
    ])
}

fn efficiency_compass(view: &FilteredView<'_>, _: &ChartOptions) -> Result<Vec<ChartSpec>> {
    let measures = [
        Measure::Column(Num::LaborEfficiencyRate),
        Measure::Column(Num::Productivity),
    ];
    let dept = [by(Cat::Department)];
    Ok(vec![
        scatter(
            "efficiency-vs-productivity-by-department",
            view,
            Axis::Value(Num::LaborEfficiencyRate.into()),
            Axis::Value(Num::Productivity.into()),
            by(Cat::Department),
            None,
        ),
        boxes(
            "efficiency-distribution-by-machine-unit",
            view,
            &[by(Cat::MachineUnit)],
            Num::LaborEfficiencyRate,
            None,
        ),
        ChartSpec {
            id: "efficiency-and-productivity-by-department".into(),
            kind: ChartKind::GroupedBar,
            data: summary_of(
                &dept,
                &measures,
                Aggregation::Mean,
                summarize(view, &dept, &measures, Aggregation::Mean),
            ),
        },
        scatter(
            "efficiency-vs-productivity-by-machine-unit",
            view,
            Axis::Value(Num::LaborEfficiencyRate.into()),
            Axis::Value(Num::Productivity.into()),
            by(Cat::MachineUnit),
            None,
        ),
    ])
}

fn productivity_evolution(
    view: &FilteredView<'_>,
    options: &ChartOptions,
) -> Result<Vec<ChartSpec>> {
    let period = GroupKey::Period(options.granularity);
    Ok(vec![
        ChartSpec {
            id: "productivity-year-month-heatmap".into(),
            kind: ChartKind::Heatmap,
            data: ChartData::Pivot(pivot_mean(
                view,
                GroupKey::Period(Granularity::Year),
                GroupKey::Period(Granularity::Month),
                Num::Productivity,
            )),
        },
        groups(
            "productivity-trend-by-shift",
            ChartKind::Line,
            view,
            &[period, by(Cat::Shift)],
            Num::Productivity,
            Aggregation::Mean,
        ),
        groups(
            "overall-productivity-trend",
            ChartKind::Line,
            view,
            &[period],
            Num::Productivity,
            Aggregation::Mean,
        ),
        shift_interval_anomalies(view, options)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::FilterSpec;
    use crate::data::model::fixtures::{record, table};
    use crate::data::model::Table;
    use std::collections::HashSet;

    fn plant() -> Table {
        let mut rows = Vec::new();
        let shifts = ["Day", "Night"];
        let zones = ["Green", "Yellow", "Red"];
        for i in 0..30u32 {
            let mut r = record(&format!("2024-{:02}-{:02}", 1 + i % 3, 1 + i % 28));
            r.shift = shifts[(i % 2) as usize].into();
            r.productivity_zone = zones[(i % 3) as usize].into();
            r.department = format!("D{}", i % 4);
            r.product_type = format!("P{}", i % 6);
            r.productivity = 70.0 + (i % 7) as f64 * 4.0;
            let conduct = if i % 5 == 0 { "Late" } else { "" };
            r.anomaly_conduct = conduct.into();
            rows.push(r);
        }
        table(rows)
    }

    #[test]
    fn every_selection_is_registered_once() {
        for sel in ChartSelection::all() {
            let hits = CATALOGUE.iter().filter(|(s, _)| *s == sel).count();
            assert_eq!(hits, 1, "{sel}");
        }
        assert_eq!(CATALOGUE.len(), 21);
    }

    #[test]
    fn every_selection_builds_with_unique_ids() {
        let t = plant();
        let view = t.full_view();
        for sel in ChartSelection::all() {
            let charts = build_charts(sel, &view, &ChartOptions::default()).unwrap();
            assert!(!charts.is_empty(), "{sel}");
            let ids: HashSet<&str> = charts.iter().map(|c| c.id.as_str()).collect();
            assert_eq!(ids.len(), charts.len(), "duplicate chart id in {sel}");
        }
    }

    #[test]
    fn empty_view_still_builds() {
        let t = plant();
        let spec = FilterSpec::new().with_efficiency_range(500.0, 600.0);
        let view = crate::apply_filter(&t, &spec).unwrap();
        assert!(view.is_empty());
        for sel in ChartSelection::all() {
            build_charts(sel, &view, &ChartOptions::default()).unwrap();
        }
    }

    #[test]
    fn zone_by_month_only_for_monthly_intervals() {
        let t = plant();
        let view = t.full_view();
        let sel = ChartSelection::Parameter(Parameter::TimeIntervals);
        let has_zone = |g| {
            let opts = ChartOptions {
                granularity: g,
                ..ChartOptions::default()
            };
            build_charts(sel, &view, &opts)
                .unwrap()
                .iter()
                .any(|c| c.id == "zone-by-month")
        };
        assert!(has_zone(Granularity::Month));
        assert!(!has_zone(Granularity::Week));
    }

    #[test]
    fn anomaly_overlay_keeps_only_rows_with_conduct() {
        let t = plant();
        let view = t.full_view();
        let charts = build_charts(
            ChartSelection::Parameter(Parameter::TimeIntervals),
            &view,
            &ChartOptions::default(),
        )
        .unwrap();
        let overlay = charts
            .iter()
            .find(|c| c.id == "productivity-with-anomaly-conduct")
            .unwrap();
        match &overlay.data {
            ChartData::Scatter { points, .. } => {
                assert_eq!(points.len(), 6);
                assert!(points.iter().all(|p| p.flagged));
            }
            other => panic!("unexpected data {other:?}"),
        }
    }

    #[test]
    fn shift_synergy_flags_points_below_threshold() {
        let mut rows: Vec<_> = (0..8).map(|_| record("2024-01-01")).collect();
        rows[7].productivity = 10.0;
        let t = table(rows);
        let view = t.full_view();
        let selection = ChartSelection::Theme(Theme::ShiftSynergy);
        let charts = build_charts(selection, &view, &ChartOptions::default()).unwrap();
        let over_time = charts
            .iter()
            .find(|c| c.id == "productivity-over-time-below-threshold")
            .unwrap();
        match &over_time.data {
            ChartData::Scatter { points, threshold, .. } => {
                assert!(threshold.is_some());
                let flagged: Vec<bool> = points.iter().map(|p| p.flagged).collect();
                assert_eq!(flagged, [vec![false; 7], vec![true]].concat());
            }
            other => panic!("unexpected data {other:?}"),
        }
    }

    #[test]
    fn selection_parses_from_display_form() {
        let sel: ChartSelection = "theme:shift-synergy".parse().unwrap();
        assert_eq!(sel, ChartSelection::Theme(Theme::ShiftSynergy));
        assert_eq!(sel.category(), AnalysisCategory::Themes);
        assert!("theme:unknown".parse::<ChartSelection>().is_err());
    }

    #[test]
    fn chart_data_serializes_nan_as_null() {
        let mut r = record("2024-01-01");
        r.labor_target_output = 0.0;
        let t = table(vec![r]);
        let view = t.full_view();
        let charts = build_charts(
            ChartSelection::Metric(Metric::TargetProductivity),
            &view,
            &ChartOptions::default(),
        )
        .unwrap();
        let json = serde_json::to_value(&charts).unwrap();
        let ratio = charts
            .iter()
            .position(|c| c.id == "target-productivity-by-department")
            .unwrap();
        assert_eq!(json[ratio]["data"]["type"], "groups");
        assert!(json[ratio]["data"]["rows"][0]["value"].is_null());
    }
}
