use crate::dial::Direction;
use crate::feed::parser::{Metrics, ParsedResult};
use hdrhistogram::Histogram;
use thiserror::Error;
use tracing::{debug, warn};

/// Histogram lower bound in bits per second
pub const HISTOGRAM_LOW_BOUND_BPS: u64 = 1;

/// Histogram upper bound in bits per second
pub const HISTOGRAM_HIGH_BOUND_BPS: u64 = 10_000_000_000;

/// Histogram significant digits for precision
pub const HISTOGRAM_SIGNIFICANT_DIGITS: u8 = 3;

#[derive(Debug, Error)]
pub enum StatisticsError {
    #[error("Failed to create histogram: {0}")]
    Create(String),

    #[error("Failed to record throughput: {0}")]
    Record(String),
}

/// Achieved throughput of one direction across repeated runs
#[derive(Debug)]
pub struct ThroughputStats {
    hist: Histogram<u64>,
    runs: usize,
    failed: usize,
    last_ratio: Option<f64>,
}

impl ThroughputStats {
    pub fn new() -> Result<Self, StatisticsError> {
        let hist = Histogram::<u64>::new_with_bounds(
            HISTOGRAM_LOW_BOUND_BPS,
            HISTOGRAM_HIGH_BOUND_BPS,
            HISTOGRAM_SIGNIFICANT_DIGITS,
        )
        .map_err(|e| StatisticsError::Create(e.to_string()))?;
        Ok(Self {
            hist,
            runs: 0,
            failed: 0,
            last_ratio: None,
        })
    }

    /// Add one run's metrics; failed runs are counted but not recorded
    pub fn record(&mut self, metrics: &Metrics) -> Result<(), StatisticsError> {
        self.runs += 1;
        self.last_ratio = metrics.delivery_ratio();

        match metrics.throughput {
            Some(tp) if metrics.error.is_none() && tp >= 1.0 => {
                let clamped = (tp as u64).clamp(HISTOGRAM_LOW_BOUND_BPS, HISTOGRAM_HIGH_BOUND_BPS);
                if clamped != tp as u64 {
                    warn!(throughput = tp, "Throughput clamped to histogram bounds");
                }
                self.hist.record(clamped).map_err(|e| {
                    warn!(throughput = tp, error = %e, "Failed to record throughput");
                    StatisticsError::Record(e.to_string())
                })?;
            }
            _ => {
                self.failed += 1;
                debug!(error = ?metrics.error, "Run recorded as failed");
            }
        }
        Ok(())
    }

    /// Runs seen, including failed ones
    pub fn runs(&self) -> usize {
        self.runs
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Number of throughput samples
    pub fn count(&self) -> u64 {
        self.hist.len()
    }

    pub fn mean(&self) -> f64 {
        self.hist.mean()
    }

    pub fn min(&self) -> u64 {
        self.hist.min()
    }

    pub fn max(&self) -> u64 {
        self.hist.max()
    }

    pub fn percentile(&self, quantile: f64) -> u64 {
        self.hist.value_at_quantile(quantile)
    }

    /// Achieved over attempted rate of the most recent run
    pub fn last_ratio(&self) -> Option<f64> {
        self.last_ratio
    }
}

/// Throughput statistics of both directions
#[derive(Debug)]
pub struct SessionStats {
    cs: ThroughputStats,
    sc: ThroughputStats,
}

impl SessionStats {
    pub fn new() -> Result<Self, StatisticsError> {
        Ok(Self {
            cs: ThroughputStats::new()?,
            sc: ThroughputStats::new()?,
        })
    }

    pub fn record(&mut self, result: &ParsedResult) -> Result<(), StatisticsError> {
        self.cs.record(&result.cs)?;
        self.sc.record(&result.sc)?;
        Ok(())
    }

    pub fn get(&self, direction: Direction) -> &ThroughputStats {
        match direction {
            Direction::ClientToServer => &self.cs,
            Direction::ServerToClient => &self.sc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(bandwidth: f64, throughput: f64) -> Metrics {
        Metrics {
            bandwidth: Some(bandwidth),
            throughput: Some(throughput),
            ..Metrics::default()
        }
    }

    #[test]
    fn test_throughput_statistics() -> Result<(), StatisticsError> {
        let mut stats = ThroughputStats::new()?;
        for tp in [1_000_000.0, 2_000_000.0, 3_000_000.0] {
            stats.record(&metrics(4_000_000.0, tp))?;
        }
        assert_eq!(stats.count(), 3);
        assert_eq!(stats.runs(), 3);
        assert_eq!(stats.failed(), 0);
        assert!(stats.mean() > 1_900_000.0 && stats.mean() < 2_100_000.0);
        assert_eq!(stats.last_ratio(), Some(0.75));
        Ok(())
    }

    #[test]
    fn test_failed_runs_are_counted() -> Result<(), StatisticsError> {
        let mut stats = ThroughputStats::new()?;
        let failed = Metrics {
            bandwidth: Some(80_000.0),
            error: Some("timeout".to_string()),
            ..Metrics::default()
        };
        stats.record(&failed)?;
        assert_eq!(stats.runs(), 1);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.count(), 0);
        Ok(())
    }
}
