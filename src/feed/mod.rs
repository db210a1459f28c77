//! Result feed: text output to metrics to rolling chart buffers

pub mod chart;
pub mod parser;
pub mod statistics;

pub use chart::{ChartBuffer, ChartPoint, ChartSeries, DirectionChart, Granularity, Window};
pub use parser::{parse_result, scan, Metric, Metrics, ParsedResult};
pub use statistics::{SessionStats, StatisticsError, ThroughputStats};
