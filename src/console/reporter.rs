use crate::console::nodes::Node;
use crate::console::state::{CameraImage, UiState};
use crate::dial::{DialEngine, Direction};
use crate::feed::{ChartBuffer, ChartSeries, Metrics, ParsedResult, SessionStats};
use chrono::{Local, TimeZone, Utc};
use colored::*;
use tracing::debug;

// Block characters for sparkline levels, lowest first
const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const ERROR_MARK: char = '◆';
const GAP_MARK: char = ' ';

// Delivery ratio thresholds for color coding
const GOOD_RATIO: f64 = 0.95;
const FAIR_RATIO: f64 = 0.75;

/// Width of the direction label column
const LABEL_WIDTH: usize = 4;

/// Prints results, charts and statistics to stdout
pub struct Reporter {
    utc: bool,
}

impl Reporter {
    pub fn new(utc: bool) -> Self {
        Self { utc }
    }

    /// Chart timestamp as `HH:MM:SS`, in UTC or local time
    pub fn format_time(&self, time_ms: i64) -> String {
        if self.utc {
            Self::format_in(&Utc, time_ms)
        } else {
            Self::format_in(&Local, time_ms)
        }
    }

    fn format_in<Tz: TimeZone>(tz: &Tz, time_ms: i64) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        match tz.timestamp_millis_opt(time_ms).single() {
            Some(time) => time.format("%H:%M:%S").to_string(),
            None => "--:--:--".to_string(),
        }
    }

    /// Render a series as one character per point, scaled to `max_mbps`.
    ///
    /// Gaps stay blank, error points show a diamond, and any non-zero value
    /// shows at least the lowest block.
    pub fn sparkline(series: &ChartSeries, max_mbps: f64) -> String {
        series
            .points()
            .map(|point| match (&point.error, point.value) {
                (Some(_), _) => ERROR_MARK,
                (None, None) => GAP_MARK,
                (None, Some(v)) if v <= 0.0 || max_mbps <= 0.0 => LEVELS[0],
                (None, Some(v)) => {
                    let level = ((v / max_mbps) * (LEVELS.len() - 1) as f64).round() as usize;
                    LEVELS[level.min(LEVELS.len() - 1)]
                }
            })
            .collect()
    }

    fn colorize_ratio(ratio: f64) -> ColoredString {
        let text = format!("{:5.1}%", ratio * 100.0);
        if ratio >= GOOD_RATIO {
            text.green()
        } else if ratio >= FAIR_RATIO {
            text.yellow()
        } else {
            text.red()
        }
    }

    fn direction_label(direction: Direction) -> String {
        format!("{:>width$}", direction.tag(), width = LABEL_WIDTH)
    }

    fn format_direction(direction: Direction, metrics: &Metrics) -> String {
        let label = Self::direction_label(direction).bold();
        if let Some(error) = &metrics.error {
            let attempted = metrics.bandwidth.unwrap_or_default() / 1e6;
            return format!(
                "{}: {} (attempted {:.3} Mbps)",
                label,
                format!("✗ {}", error).red(),
                attempted
            );
        }

        let attempted = metrics.bandwidth.unwrap_or_default() / 1e6;
        let achieved = metrics.throughput.unwrap_or_default() / 1e6;
        let mut line = format!(
            "{}: {:>9.3} Mbps attempted, {:>9.3} Mbps achieved",
            label, attempted, achieved
        );
        if let Some(ratio) = metrics.delivery_ratio() {
            line.push_str(&format!("  {}", Self::colorize_ratio(ratio)));
        }
        if let (Some(min), Some(avg), Some(max)) =
            (metrics.arrival_min, metrics.arrival_avg, metrics.arrival_max)
        {
            line.push_str(&format!(
                "\n      interarrival min/avg/max {:.3}/{:.3}/{:.3} ms",
                min, avg, max
            ));
            if let Some(var) = metrics.arrival_var {
                line.push_str(&format!(", variance {:.3} ms", var));
            }
        }
        line
    }

    /// Print one bandwidth run
    pub fn print_result(&self, dials: &DialEngine, result: &ParsedResult, time_ms: i64) {
        debug!(time_ms = time_ms, "Printing bandwidth result");
        println!(
            "{} {} / {}",
            format!("[{}]", self.format_time(time_ms)).dimmed(),
            dials
                .dials(Direction::ClientToServer)
                .param_line(Direction::ClientToServer),
            dials
                .dials(Direction::ServerToClient)
                .param_line(Direction::ServerToClient)
        );
        for direction in Direction::ALL {
            println!("  {}", Self::format_direction(direction, result.get(direction)));
        }
    }

    /// Print both directions' charts as sparklines
    pub fn print_charts(&self, charts: &ChartBuffer) {
        for direction in Direction::ALL {
            let chart = charts.chart(direction);
            let max_mbps = chart
                .attempted
                .values()
                .chain(chart.achieved.values())
                .filter_map(|p| p.value)
                .fold(0.0f64, f64::max);
            let first = chart.attempted.points().next().map(|p| p.time_ms);
            let last = chart.attempted.points().last().map(|p| p.time_ms);

            println!(
                "{} {}",
                Self::direction_label(direction).bold(),
                format!("(max {:.3} Mbps)", max_mbps).dimmed()
            );
            println!(
                "  {} {}",
                "req".cyan(),
                Self::sparkline(&chart.attempted, max_mbps)
            );
            println!(
                "  {} {}",
                "ach".green(),
                Self::sparkline(&chart.achieved, max_mbps)
            );
            if let (Some(first), Some(last)) = (first, last) {
                println!(
                    "      {} .. {}",
                    self.format_time(first).dimmed(),
                    self.format_time(last).dimmed()
                );
            }
        }
    }

    /// Print throughput statistics across all runs
    pub fn print_stats(&self, stats: &SessionStats) {
        println!("\n{}", "Throughput statistics:".bold());
        for direction in Direction::ALL {
            let s = stats.get(direction);
            let label = Self::direction_label(direction);
            if s.count() == 0 {
                println!(
                    "  {}: {} ({} runs, {} failed)",
                    label,
                    "no successful runs".red(),
                    s.runs(),
                    s.failed()
                );
                continue;
            }
            println!(
                "  {}: mean {:.3} Mbps, min {:.3}, max {:.3}, p50 {:.3}, p90 {:.3} ({} runs, {} failed)",
                label,
                s.mean() / 1e6,
                s.min() as f64 / 1e6,
                s.max() as f64 / 1e6,
                s.percentile(0.5) as f64 / 1e6,
                s.percentile(0.9) as f64 / 1e6,
                s.runs(),
                s.failed()
            );
            if let Some(ratio) = s.last_ratio() {
                println!("        last run delivered {}", Self::colorize_ratio(ratio));
            }
        }
    }

    pub fn print_notice(&self, text: &str) {
        println!("{} {}", "!".yellow().bold(), text.yellow());
    }

    /// Print the results pane and the newest image, if any
    pub fn print_output(&self, state: &UiState) {
        println!("{}", state.results());
        if let Some(image) = state.image() {
            self.print_image(image);
        }
    }

    pub fn print_image(&self, image: &CameraImage) {
        println!("{} {}", "Image:".bold(), image.text.trim());
        println!("  {}", image.html.trim().dimmed());
    }

    pub fn print_nodes(&self, title: &str, nodes: &[Node], selected: Option<&Node>) {
        println!("{}", title.bold());
        for node in nodes {
            let marker = if selected == Some(node) { "*" } else { " " };
            println!(
                "  {} {:<12} {:<16} {}:{}",
                marker.green(),
                node.name,
                node.ia(),
                node.addr,
                node.port
            );
        }
    }
}
