//! Everything the console shows, in one place
//!
//! `UiState` is owned by the controller and only mutated from its task, so
//! none of it needs locking.

use crate::console::backend::Form;
use crate::console::constants::CAMERA_DONE_MARKER;
use crate::console::dispatch::{Dispatcher, Finish, LoopTiming, TabSwitch, Ticket};
use crate::console::error::Result;
use crate::console::nodes::{NodeRole, NodeSelection};
use crate::console::notice::NoticeBoard;
use crate::console::tabs::App;
use crate::dial::{
    ChangeReport, DialEngine, DialField, DialSet, Direction, LockableField, RangeNotice,
};
use crate::feed::{parse_result, ChartBuffer, Granularity, ParsedResult, SessionStats};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Text and markup of the newest camera image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CameraImage {
    pub text: String,
    pub html: String,
}

/// What a finished command produced
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Response to a superseded command; nothing changed
    Ignored,
    /// A bandwidth run, parsed and plotted
    Bandwidth { result: ParsedResult, next: Finish },
    /// A camera run; `fetch_image` is set once the image is stored
    Camera { fetch_image: bool },
    /// Any other app
    General,
}

#[derive(Debug)]
pub struct UiState {
    dials: DialEngine,
    charts: ChartBuffer,
    nodes: NodeSelection,
    notices: NoticeBoard,
    dispatcher: Dispatcher,
    stats: SessionStats,
    interval_sec: f64,
    focused: bool,
    addl_opt: String,
    results: String,
    image: Option<CameraImage>,
}

impl UiState {
    pub fn new(addl_opt: impl Into<String>, now_ms: i64) -> Result<Self> {
        let mut state = Self {
            dials: DialEngine::new(),
            charts: ChartBuffer::new(now_ms, Granularity::FOCUSED),
            nodes: NodeSelection::default(),
            notices: NoticeBoard::default(),
            dispatcher: Dispatcher::new(),
            stats: SessionStats::new()?,
            interval_sec: 0.0,
            focused: true,
            addl_opt: addl_opt.into(),
            results: String::new(),
            image: None,
        };
        state.refresh_interval();
        Ok(state)
    }

    pub fn dials(&self) -> &DialEngine {
        &self.dials
    }

    pub fn charts(&self) -> &ChartBuffer {
        &self.charts
    }

    pub fn nodes(&self) -> &NodeSelection {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut NodeSelection {
        &mut self.nodes
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }

    pub fn notices_mut(&mut self) -> &mut NoticeBoard {
        &mut self.notices
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn active_app(&self) -> App {
        self.dispatcher.active_app()
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Text of the results pane
    pub fn results(&self) -> &str {
        &self.results
    }

    pub fn image(&self) -> Option<&CameraImage> {
        self.image.as_ref()
    }

    /// Continuous test interval in seconds
    pub fn interval_sec(&self) -> f64 {
        self.interval_sec
    }

    /// Reset the continuous interval from the current test durations
    pub fn refresh_interval(&mut self) {
        let (cs, sc) = self.durations();
        let interval = LoopTiming::default_interval_sec(cs, sc);
        if interval != self.interval_sec {
            debug!(interval_sec = interval, "Continuous interval updated");
            self.interval_sec = interval;
        }
    }

    /// Set the continuous interval; values below the shorter test duration are raised to it
    pub fn set_interval(&mut self, seconds: f64) -> f64 {
        let (cs, sc) = self.durations();
        let min = LoopTiming::min_interval_sec(cs, sc);
        self.interval_sec = if seconds.is_finite() { seconds.max(min) } else { min };
        self.interval_sec
    }

    fn durations(&self) -> (f64, f64) {
        (
            self.dials.dials(Direction::ClientToServer).seconds(),
            self.dials.dials(Direction::ServerToClient).seconds(),
        )
    }

    fn loop_timing(&self) -> LoopTiming {
        let (cs_sec, sc_sec) = self.durations();
        LoopTiming {
            cs_sec,
            sc_sec,
            interval_sec: self.interval_sec,
        }
    }

    /// A user edit of one dial; engine writes are settled before returning
    pub fn change_dial(
        &mut self,
        direction: Direction,
        field: DialField,
        value: f64,
        now: Instant,
    ) -> Vec<ChangeReport> {
        let mut reports = vec![self.dials.on_field_changed(direction, field, value)];
        reports.extend(self.dials.settle());

        for notice in reports.iter().flat_map(|r| r.notices.iter()) {
            self.show_range_notice(notice, now);
        }
        if field == DialField::Seconds {
            self.refresh_interval();
        }
        reports
    }

    pub fn set_lock(&mut self, direction: Direction, field: LockableField) {
        self.dials.set_lock(direction, field);
    }

    /// Replace a direction's dials, e.g. from command line parameters.
    /// A set with any dial out of range is refused and nothing changes.
    pub fn load_dials(&mut self, direction: Direction, set: DialSet) -> Result<()> {
        set.check_ranges()?;
        self.dials.load(direction, set);
        self.refresh_interval();
        Ok(())
    }

    fn show_range_notice(&mut self, notice: &RangeNotice, now: Instant) {
        self.notices.show(notice.to_string(), now);
    }

    pub fn set_continuous(&mut self, on: bool) -> bool {
        self.dispatcher.set_continuous(on)
    }

    /// Change tabs; a refused switch leaves everything as it was
    pub fn switch_tab(&mut self, app: App, now: Instant) -> bool {
        match self.dispatcher.switch_tab(app) {
            TabSwitch::Locked => false,
            TabSwitch::Switched(notice) => {
                if let Some(text) = notice {
                    self.notices.show(text, now);
                }
                true
            }
        }
    }

    /// Switch chart cadence; returns the new granularity for the tick timer
    pub fn set_focus(&mut self, focused: bool) -> Granularity {
        self.focused = focused;
        self.charts.set_focus(focused)
    }

    pub fn tick(&mut self, now_ms: i64) {
        self.charts.tick(now_ms);
    }

    /// Form fields for a command of the active app
    pub fn build_form(&self) -> Result<Form> {
        let app = self.active_app();
        let mut form = Form::new();
        form.extend(self.nodes.form_fields(NodeRole::Client, app)?);
        form.extend(self.nodes.form_fields(NodeRole::Server, app)?);
        form.push(("addl_opt".to_string(), self.addl_opt.clone()));
        form.push(("apps".to_string(), app.name().to_string()));
        if app == App::BwTester {
            for direction in Direction::ALL {
                form.push((
                    format!("bw_{}", direction.tag()),
                    self.dials.dials(direction).bwtest_arg(direction),
                ));
            }
        }
        Ok(form)
    }

    /// Start a command for the active app
    pub fn begin_command(&mut self, now: Instant) -> Ticket {
        let app = self.active_app();
        let continuing = self.dispatcher.is_continuous();
        if !continuing {
            self.results.clear();
        }
        if app == App::CamerApp {
            self.image = None;
        }
        self.results.push_str(&format!("Executing {} client", app));
        self.dispatcher.begin(app, now)
    }

    /// One progress dot
    pub fn progress_dot(&mut self) {
        self.results.push('.');
    }

    /// Apply a command response
    pub fn finish_command(
        &mut self,
        ticket: &Ticket,
        response: &str,
        now: Instant,
        now_ms: i64,
    ) -> Result<Outcome> {
        self.dispatcher.set_timing(self.loop_timing());
        let next = self.dispatcher.finish(ticket, now);
        if next == Finish::Stale {
            return Ok(Outcome::Ignored);
        }

        // the response replaces the progress line and any earlier output
        self.results.clear();
        self.results.push_str(response);

        let outcome = match ticket.app {
            App::BwTester => {
                let result = parse_result(response, &self.dials);
                match serde_json::to_string(&result) {
                    Ok(json) => debug!(seq = ticket.seq, result = %json, "Parsed bandwidth result"),
                    Err(e) => warn!(error = %e, "Failed to encode bandwidth result"),
                }
                self.charts.record(&result, now_ms);
                self.stats.record(&result)?;
                info!(
                    cs = %self.dials.dials(Direction::ClientToServer).param_line(Direction::ClientToServer),
                    sc = %self.dials.dials(Direction::ServerToClient).param_line(Direction::ServerToClient),
                    "Bandwidth result recorded"
                );
                Outcome::Bandwidth { result, next }
            }
            App::CamerApp => Outcome::Camera {
                fetch_image: response.contains(CAMERA_DONE_MARKER),
            },
            App::SensorApp => Outcome::General,
        };
        Ok(outcome)
    }

    pub fn set_image(&mut self, image: CameraImage) {
        self.image = Some(image);
    }

    /// Stop continuous testing
    pub fn stop(&mut self) {
        self.dispatcher.stop();
    }

    /// Clear output, unlock the default dials and reselect the first nodes
    pub fn reset(&mut self) {
        self.results.clear();
        self.image = None;
        for direction in Direction::ALL {
            self.dials.set_lock(direction, LockableField::Size);
        }
        let app = self.active_app();
        for role in [NodeRole::Client, NodeRole::Server] {
            if let Err(e) = self.nodes.select(role, app, 0) {
                debug!(role = role.suffix(), error = %e, "No node to reselect");
            }
        }
        debug!(app = %app, "Console reset");
    }
}
