//! Extraction of bandwidth test metrics from the test client's text output
//!
//! The output is free text. A `C->S results` or `S->C results` header selects
//! the direction that the following metric lines belong to. Errors are not
//! tied to a direction, so one error candidate is shared by both.

use crate::dial::{DialEngine, Direction};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::debug;

static SC_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)s->c results").expect("valid regex"));
static CS_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)c->s results").expect("valid regex"));

static ERR_QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)err=*(?:"(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*')"#).expect("valid regex")
});
static CRIT_MSG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)crit msg=*(?:"(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*')"#).expect("valid regex")
});
static ERROR_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error:\s*(.*)").expect("valid regex"));

/// A metric that can be read from a result line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Bandwidth,
    Throughput,
    ArrivalVariance,
    ArrivalMin,
    ArrivalAverage,
    ArrivalMax,
}

// Tried in order; a line feeds at most one metric.
static METRIC_PATTERNS: LazyLock<Vec<(Metric, Regex)>> = LazyLock::new(|| {
    [
        (Metric::Bandwidth, r"(?i)attempted bandwidth:\s*([0-9.-]*)\s*bps"),
        (Metric::Throughput, r"(?i)achieved bandwidth:\s*([0-9.-]*)\s*bps"),
        (Metric::ArrivalVariance, r"(?i)interarrival time variance:\s*([0-9.-]*)\s*ms"),
        (Metric::ArrivalMin, r"(?i)interarrival time min:\s*([0-9.-]*)\s*ms"),
        (Metric::ArrivalAverage, r"(?i)average interarrival time:\s*([0-9.-]*)\s*ms"),
        (Metric::ArrivalMax, r"(?i)interarrival time max:\s*([0-9.-]*)\s*ms"),
    ]
    .into_iter()
    .map(|(metric, pattern)| (metric, Regex::new(pattern).expect("valid regex")))
    .collect()
});

/// Metrics of one direction. Bandwidths in bits/sec, arrival times in ms.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throughput: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_var: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Metrics {
    fn set(&mut self, metric: Metric, value: f64) {
        let slot = match metric {
            Metric::Bandwidth => &mut self.bandwidth,
            Metric::Throughput => &mut self.throughput,
            Metric::ArrivalVariance => &mut self.arrival_var,
            Metric::ArrivalMin => &mut self.arrival_min,
            Metric::ArrivalAverage => &mut self.arrival_avg,
            Metric::ArrivalMax => &mut self.arrival_max,
        };
        *slot = Some(value);
    }

    pub fn is_empty(&self) -> bool {
        *self == Metrics::default()
    }

    /// True when the test produced both the attempted and achieved rate.
    /// A zero rate counts as missing: nothing was sent or received.
    pub fn is_complete(&self) -> bool {
        let present = |v: Option<f64>| v.is_some_and(|v| v != 0.0);
        present(self.bandwidth) && present(self.throughput)
    }

    /// Achieved over attempted rate, when both are known
    pub fn delivery_ratio(&self) -> Option<f64> {
        match (self.throughput, self.bandwidth) {
            (Some(tp), Some(bw)) if bw > 0.0 => Some(tp / bw),
            _ => None,
        }
    }
}

/// Metrics of both directions plus the error text found anywhere in the output
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedResult {
    /// Client to server
    pub cs: Metrics,
    /// Server to client
    pub sc: Metrics,
    #[serde(skip)]
    pub error: Option<String>,
}

impl ParsedResult {
    pub fn get(&self, direction: Direction) -> &Metrics {
        match direction {
            Direction::ClientToServer => &self.cs,
            Direction::ServerToClient => &self.sc,
        }
    }

    fn get_mut(&mut self, direction: Direction) -> &mut Metrics {
        match direction {
            Direction::ClientToServer => &mut self.cs,
            Direction::ServerToClient => &mut self.sc,
        }
    }

    /// Mark incomplete directions as failed.
    ///
    /// A direction without both rates gets the shared error and its attempted
    /// rate is set to the configured target, so a failed run can still be
    /// plotted where it was aimed.
    pub fn backfill<F>(&mut self, target_bps: F)
    where
        F: Fn(Direction) -> f64,
    {
        for direction in Direction::ALL {
            let error = self.error.clone();
            let metrics = self.get_mut(direction);
            if !metrics.is_complete() {
                metrics.error = error;
                metrics.bandwidth = Some(target_bps(direction));
                debug!(
                    direction = %direction,
                    error = ?metrics.error,
                    "Incomplete result backfilled with target rate"
                );
            }
        }
    }
}

/// Scan the output without backfilling
pub fn scan(text: &str) -> ParsedResult {
    let mut result = ParsedResult::default();
    let mut direction = None;
    let mut pattern_error: Option<String> = None;
    let mut first_line: Option<String> = None;

    for line in text.lines() {
        if SC_HEADER_RE.is_match(line) {
            direction = Some(Direction::ServerToClient);
        }
        if CS_HEADER_RE.is_match(line) {
            direction = Some(Direction::ClientToServer);
        }

        if let Some(direction) = direction {
            let hit = METRIC_PATTERNS.iter().find_map(|(metric, re)| {
                re.captures(line)
                    .map(|caps| (*metric, caps.get(1).map_or("", |m| m.as_str())))
            });
            if let Some((metric, raw)) = hit {
                match raw.parse::<f64>() {
                    Ok(value) => result.get_mut(direction).set(metric, value),
                    Err(_) => debug!(line = line, "Metric without a number"),
                }
            }
        }

        if let Some(m) = ERR_QUOTED_RE.find(line) {
            pattern_error = Some(m.as_str().to_string());
        } else if let Some(m) = CRIT_MSG_RE.find(line) {
            pattern_error = Some(m.as_str().to_string());
        } else if let Some(caps) = ERROR_PREFIX_RE.captures(line) {
            pattern_error = caps.get(1).map(|m| m.as_str().trim().to_string());
        } else if first_line.is_none() && !line.trim().is_empty() {
            first_line = Some(line.trim().to_string());
        }
    }

    result.error = pattern_error.or(first_line);
    result
}

/// Parse the output and backfill failed directions from the current dials
pub fn parse_result(text: &str, dials: &DialEngine) -> ParsedResult {
    let mut result = scan(text);
    result.backfill(|direction| dials.dials(direction).target_bps());
    result
}
