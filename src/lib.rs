//! Filtering and derived-metrics engine for factory labor-productivity data.
//!
//! Load a [`Table`] once, narrow it with a [`FilterSpec`], and ask the
//! resulting [`FilteredView`] for the grouped values, weekly series and
//! anomaly flags each chart of the dashboard draws.

pub mod catalogue;
pub mod config;
pub mod data;
pub mod error;
pub mod state;

pub use config::DashboardConfig;
pub use data::filter::{apply_filter, FilterSpec, FilteredView};
pub use data::model::{CategoricalColumn, NumericColumn, Record, Table};
pub use error::{DashboardError, Result};
