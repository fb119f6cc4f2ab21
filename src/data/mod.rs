/// Data layer: core types, loading, filtering and derived metrics.
///
/// Architecture:
/// ```text
///  .xlsx / .csv
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → Table
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  Table    │  Vec<Record>, distinct values per column
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  FilterSpec → FilteredView (surviving indices)
///   └──────────┘
///        │
///        ▼
///   ┌──────────────────────────────┐
///   │ derive / aggregate / anomaly  │  on-demand values for charts
///   └──────────────────────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  export   │  FilteredView → Arrow RecordBatch
///   └──────────┘
/// ```

pub mod aggregate;
pub mod anomaly;
pub mod derive;
pub mod export;
pub mod filter;
pub mod loader;
pub mod model;
