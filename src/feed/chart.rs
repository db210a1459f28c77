//! Rolling time-window chart buffers
//!
//! Every direction has an "attempted" and an "achieved" series. A timer
//! ticks at a fixed cadence: each tick evicts points that fell out of the
//! window from the left of every series, then appends an empty placeholder at
//! the right of every series, so all series stay time-aligned. Test results
//! arrive between ticks and are added at their arrival time.

use crate::dial::field::BPS_PER_MBPS;
use crate::dial::Direction;
use crate::feed::parser::ParsedResult;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, trace};

/// Ticks per second while the console has focus
pub const FOCUSED_TICKS_PER_SEC: u32 = 7;
/// Ticks per second while the console is in the background
pub const UNFOCUSED_TICKS_PER_SEC: u32 = 1;
/// Seconds of history kept on screen
pub const WINDOW_SECS: u32 = 20;

/// Sampling density of the chart timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Granularity {
    ticks_per_sec: u32,
}

impl Granularity {
    pub const FOCUSED: Granularity = Granularity {
        ticks_per_sec: FOCUSED_TICKS_PER_SEC,
    };
    pub const UNFOCUSED: Granularity = Granularity {
        ticks_per_sec: UNFOCUSED_TICKS_PER_SEC,
    };

    pub fn for_focus(focused: bool) -> Self {
        if focused {
            Self::FOCUSED
        } else {
            Self::UNFOCUSED
        }
    }

    pub fn ticks_per_sec(&self) -> u32 {
        self.ticks_per_sec
    }

    /// Number of ticks in the window
    pub fn ticks(&self) -> u32 {
        WINDOW_SECS * self.ticks_per_sec
    }

    /// Tick period in milliseconds
    pub fn tick_ms(&self) -> f64 {
        1000.0 / self.ticks_per_sec as f64
    }

    /// Tick period for the timer
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.ticks_per_sec as f64)
    }
}

/// Span of the rolling window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub granularity: Granularity,
    /// Trimmed off the left edge of the window; one tick by default
    pub trim_ms: f64,
}

impl Window {
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            trim_ms: granularity.tick_ms(),
        }
    }

    /// A window that keeps the full `ticks * tick_ms` span
    pub fn untrimmed(granularity: Granularity) -> Self {
        Self {
            granularity,
            trim_ms: 0.0,
        }
    }

    pub fn span_ms(&self) -> f64 {
        self.granularity.ticks() as f64 * self.granularity.tick_ms()
    }

    /// Oldest time still inside the window at `now`
    pub fn floor(&self, now_ms: i64) -> f64 {
        now_ms as f64 - self.span_ms() + self.trim_ms
    }
}

/// One point of a series; `value` is Mbps, `None` draws a gap
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPoint {
    pub time_ms: i64,
    pub value: Option<f64>,
    pub error: Option<String>,
}

impl ChartPoint {
    pub fn placeholder(time_ms: i64) -> Self {
        Self {
            time_ms,
            value: None,
            error: None,
        }
    }
}

/// Time-ordered points of one series
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSeries {
    name: &'static str,
    points: VecDeque<ChartPoint>,
}

impl ChartSeries {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            points: VecDeque::new(),
        }
    }

    /// A series filled with the `ticks + 1` placeholders ending at `now`
    pub fn seeded(name: &'static str, now_ms: i64, granularity: Granularity) -> Self {
        let tick_ms = granularity.tick_ms();
        let ticks = granularity.ticks() as i64;
        let points = (-ticks..=0)
            .map(|i| ChartPoint::placeholder(now_ms + (i as f64 * tick_ms).round() as i64))
            .collect();
        Self { name, points }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn points(&self) -> impl Iterator<Item = &ChartPoint> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points that carry a value
    pub fn values(&self) -> impl Iterator<Item = &ChartPoint> {
        self.points.iter().filter(|p| p.value.is_some())
    }

    /// Drop points older than `floor` from the left; stops at the first
    /// point inside the window.
    pub fn evict_before(&mut self, floor: f64) -> usize {
        let mut evicted = 0;
        while self
            .points
            .front()
            .is_some_and(|p| (p.time_ms as f64) < floor)
        {
            self.points.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Add a point, keeping time order
    pub fn push(&mut self, point: ChartPoint) {
        if self.points.back().map_or(true, |last| last.time_ms <= point.time_ms) {
            self.points.push_back(point);
        } else {
            let at = self.points.partition_point(|p| p.time_ms <= point.time_ms);
            self.points.insert(at, point);
        }
    }
}

/// Attempted and achieved series of one direction
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionChart {
    pub attempted: ChartSeries,
    pub achieved: ChartSeries,
}

impl DirectionChart {
    fn seeded(now_ms: i64, granularity: Granularity) -> Self {
        Self {
            attempted: ChartSeries::seeded("attempted", now_ms, granularity),
            achieved: ChartSeries::seeded("achieved", now_ms, granularity),
        }
    }

    fn series_mut(&mut self) -> [&mut ChartSeries; 2] {
        [&mut self.attempted, &mut self.achieved]
    }
}

/// Chart buffers for both directions
#[derive(Debug, Clone, PartialEq)]
pub struct ChartBuffer {
    charts: [DirectionChart; 2],
    window: Window,
}

impl ChartBuffer {
    pub fn new(now_ms: i64, granularity: Granularity) -> Self {
        Self::with_window(now_ms, Window::new(granularity))
    }

    pub fn with_window(now_ms: i64, window: Window) -> Self {
        let granularity = window.granularity;
        Self {
            charts: [
                DirectionChart::seeded(now_ms, granularity),
                DirectionChart::seeded(now_ms, granularity),
            ],
            window,
        }
    }

    pub fn chart(&self, direction: Direction) -> &DirectionChart {
        &self.charts[direction.index()]
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn granularity(&self) -> Granularity {
        self.window.granularity
    }

    /// Evict for all series, then append a placeholder to all series
    pub fn tick(&mut self, now_ms: i64) {
        let floor = self.window.floor(now_ms);
        let mut evicted = 0;
        for chart in self.charts.iter_mut() {
            for series in chart.series_mut() {
                evicted += series.evict_before(floor);
            }
        }
        for chart in self.charts.iter_mut() {
            for series in chart.series_mut() {
                series.push(ChartPoint::placeholder(now_ms));
            }
        }
        if evicted > 0 {
            trace!(now_ms = now_ms, evicted = evicted, "Chart tick");
        }
    }

    /// Plot a parsed result at its arrival time
    pub fn record(&mut self, result: &ParsedResult, now_ms: i64) {
        for direction in Direction::ALL {
            let metrics = result.get(direction);
            let chart = &mut self.charts[direction.index()];
            chart.attempted.push(ChartPoint {
                time_ms: now_ms,
                value: metrics.bandwidth.map(|bps| bps / BPS_PER_MBPS),
                error: metrics.error.clone(),
            });
            chart.achieved.push(ChartPoint {
                time_ms: now_ms,
                value: metrics.throughput.map(|bps| bps / BPS_PER_MBPS),
                error: None,
            });
        }
        debug!(now_ms = now_ms, "Result plotted");
    }

    /// Switch sampling density on focus change; existing points are kept.
    ///
    /// Returns the new granularity so the caller can restart its tick timer.
    pub fn set_focus(&mut self, focused: bool) -> Granularity {
        let granularity = Granularity::for_focus(focused);
        let trimmed = self.window.trim_ms > 0.0;
        self.window = if trimmed {
            Window::new(granularity)
        } else {
            Window::untrimmed(granularity)
        };
        debug!(
            focused = focused,
            ticks_per_sec = granularity.ticks_per_sec(),
            "Chart granularity changed"
        );
        granularity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::parser::scan;

    const T0: i64 = 1_700_000_000_000;
    const CS: Direction = Direction::ClientToServer;

    #[test]
    fn test_granularity_constants() {
        assert_eq!(Granularity::FOCUSED.ticks(), 140);
        assert_eq!(Granularity::UNFOCUSED.ticks(), 20);
        assert_eq!(Granularity::UNFOCUSED.tick_ms(), 1000.0);
        assert_eq!(Granularity::FOCUSED.tick_interval(), Duration::from_secs_f64(1.0 / 7.0));
    }

    #[test]
    fn test_seeded_series() {
        let series = ChartSeries::seeded("attempted", T0, Granularity::FOCUSED);
        assert_eq!(series.len(), 141);
        let times: Vec<i64> = series.points().map(|p| p.time_ms).collect();
        assert_eq!(times[0], T0 - 20_000);
        assert_eq!(*times.last().unwrap(), T0);
        assert!(series.values().next().is_none());
    }

    #[test]
    fn test_untrimmed_window_keeps_ticks_plus_one() {
        let g = Granularity::UNFOCUSED;
        let mut buffer = ChartBuffer::with_window(T0, Window::untrimmed(g));
        let mut now = T0;
        for _ in 0..50 {
            now += 1000;
            buffer.tick(now);
        }
        let floor = now as f64 - g.ticks() as f64 * g.tick_ms();
        for direction in Direction::ALL {
            let chart = buffer.chart(direction);
            for series in [&chart.attempted, &chart.achieved] {
                assert_eq!(series.len(), g.ticks() as usize + 1);
                assert!(series.points().all(|p| p.time_ms as f64 >= floor));
                assert_eq!(series.points().last().unwrap().time_ms, now);
            }
        }
    }

    #[test]
    fn test_trimmed_window_drops_left_edge() {
        let g = Granularity::UNFOCUSED;
        let mut buffer = ChartBuffer::new(T0, g);
        let mut now = T0;
        for _ in 0..50 {
            now += 1000;
            buffer.tick(now);
        }
        let series = &buffer.chart(CS).attempted;
        assert_eq!(series.len(), g.ticks() as usize);
        assert_eq!(series.points().next().unwrap().time_ms, now - 19_000);
    }

    #[test]
    fn test_tick_keeps_series_aligned() {
        let mut buffer = ChartBuffer::new(T0, Granularity::FOCUSED);
        let result = scan("C->S results\nAttempted bandwidth: 80000 bps\nAchieved bandwidth: 60000 bps\n");
        buffer.tick(T0 + 143);
        buffer.record(&result, T0 + 200);
        buffer.tick(T0 + 286);

        let cs = buffer.chart(CS);
        let attempted: Vec<i64> = cs.attempted.points().map(|p| p.time_ms).collect();
        let achieved: Vec<i64> = cs.achieved.points().map(|p| p.time_ms).collect();
        assert_eq!(attempted, achieved);

        let plotted: Vec<&ChartPoint> = cs.attempted.values().collect();
        assert_eq!(plotted.len(), 1);
        assert_eq!(plotted[0].value, Some(0.08));
        assert_eq!(cs.achieved.values().next().unwrap().value, Some(0.06));
    }

    #[test]
    fn test_error_point_carries_label() {
        let mut buffer = ChartBuffer::new(T0, Granularity::FOCUSED);
        let mut result = scan("error: timeout");
        result.backfill(|_| 1_000_000.0);
        buffer.record(&result, T0 + 10);
        let point = buffer.chart(CS).attempted.values().next().unwrap().clone();
        assert_eq!(point.value, Some(1.0));
        assert_eq!(point.error.as_deref(), Some("timeout"));
        assert!(buffer.chart(CS).achieved.values().next().is_none());
    }

    #[test]
    fn test_focus_change_keeps_points() {
        let mut buffer = ChartBuffer::new(T0, Granularity::FOCUSED);
        let before = buffer.chart(CS).attempted.len();
        let granularity = buffer.set_focus(false);
        assert_eq!(granularity, Granularity::UNFOCUSED);
        assert_eq!(buffer.chart(CS).attempted.len(), before);
        assert_eq!(buffer.window().trim_ms, 1000.0);
    }

    #[test]
    fn test_push_out_of_order_is_sorted() {
        let mut series = ChartSeries::new("achieved");
        series.push(ChartPoint::placeholder(10));
        series.push(ChartPoint::placeholder(30));
        series.push(ChartPoint::placeholder(20));
        let times: Vec<i64> = series.points().map(|p| p.time_ms).collect();
        assert_eq!(times, vec![10, 20, 30]);
        assert_eq!(series.evict_before(25.0), 2);
    }
}
