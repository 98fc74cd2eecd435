mod analyzer;
mod stats;
mod types;

pub use analyzer::TelemetryAnalyzer;
pub use types::{AnalyticsResult, FleetStatistics, MetricSummary, RollingStats, Trend};
