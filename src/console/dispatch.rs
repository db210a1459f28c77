//! Command dispatch and the continuous-test schedule
//!
//! A command moves the dispatcher from `Idle` to `Running`; while running,
//! the test controls are disabled and only the commanding app's tab stays
//! enabled. Each command gets a monotonically increasing sequence number, and
//! a response whose ticket is older than the latest command is reported as
//! stale so that it never touches the display.

use crate::console::constants::{CONTINUOUS_BUFFER_MS, CONTINUOUS_DISABLED_TEXT};
use crate::console::tabs::{App, TabState};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Handle for one dispatched command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub seq: u64,
    pub app: App,
    pub started_at: Instant,
}

/// What to do after a response arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finish {
    /// An older command answered after a newer one was sent; ignore it
    Stale,
    /// Continuous testing is on; run again after the delay
    ScheduleNext(Duration),
    /// Back to idle with controls and tabs released
    Released,
}

/// Result of a tab change request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabSwitch {
    /// A running command holds the tabs
    Locked,
    /// Switched; carries the notice to show, if any
    Switched(Option<&'static str>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running(Ticket),
}

/// Test durations and the continuous interval, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopTiming {
    pub cs_sec: f64,
    pub sc_sec: f64,
    pub interval_sec: f64,
}

impl LoopTiming {
    /// Interval set whenever a test duration changes
    pub fn default_interval_sec(cs_sec: f64, sc_sec: f64) -> f64 {
        cs_sec.max(sc_sec) + CONTINUOUS_BUFFER_MS as f64 / 1000.0
    }

    /// Lower bound for a user-chosen interval
    pub fn min_interval_sec(cs_sec: f64, sc_sec: f64) -> f64 {
        cs_sec.min(sc_sec)
    }
}

/// Time left until the next continuous run
pub fn next_run_delay(cs_sec: f64, sc_sec: f64, interval_sec: f64, elapsed: Duration) -> Duration {
    let period_ms = cs_sec.max(sc_sec).max(interval_sec) * 1000.0;
    let remaining = period_ms - elapsed.as_secs_f64() * 1000.0;
    if remaining > 0.0 {
        Duration::from_millis(remaining.round() as u64)
    } else {
        Duration::ZERO
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    state: RunState,
    last_seq: u64,
    continuous: bool,
    controls_enabled: bool,
    tabs: TabState,
    timing: LoopTiming,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self {
            state: RunState::Idle,
            last_seq: 0,
            continuous: false,
            controls_enabled: true,
            tabs: TabState::default(),
            timing: LoopTiming {
                cs_sec: 0.0,
                sc_sec: 0.0,
                interval_sec: 0.0,
            },
        }
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running(_))
    }

    pub fn is_continuous(&self) -> bool {
        self.continuous
    }

    pub fn controls_enabled(&self) -> bool {
        self.controls_enabled
    }

    pub fn tabs(&self) -> &TabState {
        &self.tabs
    }

    pub fn active_app(&self) -> App {
        self.tabs.active()
    }

    /// Timing used for the next `finish`; read from the dials by the caller
    pub fn set_timing(&mut self, timing: LoopTiming) {
        self.timing = timing;
    }

    /// Turn continuous testing on or off; only the bandwidth tab allows it.
    ///
    /// Turning it on holds the controls and tabs until it is turned off again.
    pub fn set_continuous(&mut self, on: bool) -> bool {
        if on && self.tabs.active() != App::BwTester {
            warn!(app = %self.tabs.active(), "Continuous testing needs the bwtester tab");
            return false;
        }
        self.continuous = on;
        if on {
            self.controls_enabled = false;
            self.tabs.lock_to(App::BwTester);
        } else if !self.is_running() {
            self.release();
        }
        debug!(continuous = on, "Continuous mode changed");
        true
    }

    /// Switch the active tab; leaving the bandwidth tab ends continuous testing
    pub fn switch_tab(&mut self, app: App) -> TabSwitch {
        if self.continuous && app != App::BwTester && !self.is_running() {
            self.continuous = false;
            self.release();
            self.tabs.activate(app);
            info!(app = %app, "Continuous testing disabled by tab change");
            return TabSwitch::Switched(Some(CONTINUOUS_DISABLED_TEXT));
        }
        if !self.tabs.activate(app) {
            return TabSwitch::Locked;
        }
        TabSwitch::Switched(None)
    }

    fn release(&mut self) {
        self.controls_enabled = true;
        self.tabs.release();
    }

    /// Start a command for `app`; any running command is superseded
    pub fn begin(&mut self, app: App, now: Instant) -> Ticket {
        if let RunState::Running(previous) = &self.state {
            debug!(seq = previous.seq, "Superseding running command");
        }
        self.last_seq += 1;
        let ticket = Ticket {
            seq: self.last_seq,
            app,
            started_at: now,
        };
        self.controls_enabled = false;
        self.tabs.lock_to(app);
        self.state = RunState::Running(ticket.clone());
        info!(seq = ticket.seq, app = %app, "Command started");
        ticket
    }

    /// Handle the response for `ticket`
    pub fn finish(&mut self, ticket: &Ticket, now: Instant) -> Finish {
        let current = match &self.state {
            RunState::Running(current) if current.seq == ticket.seq => current.clone(),
            _ => {
                debug!(seq = ticket.seq, latest = self.last_seq, "Stale response ignored");
                return Finish::Stale;
            }
        };

        self.state = RunState::Idle;
        let elapsed = now.saturating_duration_since(current.started_at);

        if self.continuous && current.app == App::BwTester {
            let LoopTiming {
                cs_sec,
                sc_sec,
                interval_sec,
            } = self.timing;
            let delay = next_run_delay(cs_sec, sc_sec, interval_sec, elapsed);
            debug!(
                seq = current.seq,
                elapsed_ms = elapsed.as_millis() as u64,
                delay_ms = delay.as_millis() as u64,
                "Next continuous run scheduled"
            );
            return Finish::ScheduleNext(delay);
        }

        self.release();
        info!(
            seq = current.seq,
            elapsed_ms = elapsed.as_millis() as u64,
            "Command finished"
        );
        Finish::Released
    }

    /// Stop continuous testing and release the controls if idle
    pub fn stop(&mut self) {
        self.set_continuous(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing() -> LoopTiming {
        LoopTiming {
            cs_sec: 3.0,
            sc_sec: 4.0,
            interval_sec: 5.0,
        }
    }

    #[test]
    fn test_next_run_delay() {
        let delay = next_run_delay(3.0, 4.0, 5.0, Duration::from_secs(2));
        assert_eq!(delay, Duration::from_millis(3000));
        assert_eq!(
            next_run_delay(3.0, 4.0, 5.0, Duration::from_secs(9)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_interval_bounds() {
        assert_eq!(LoopTiming::default_interval_sec(3.0, 4.0), 5.0);
        assert_eq!(LoopTiming::min_interval_sec(3.0, 4.0), 3.0);
    }

    #[test]
    fn test_single_run_releases_controls() {
        let mut dispatcher = Dispatcher::new();
        let t0 = Instant::now();
        let ticket = dispatcher.begin(App::CamerApp, t0);
        assert!(!dispatcher.controls_enabled());
        assert!(!dispatcher.tabs().is_enabled(App::BwTester));
        assert_eq!(dispatcher.finish(&ticket, t0), Finish::Released);
        assert!(dispatcher.controls_enabled());
        assert!(dispatcher.tabs().is_enabled(App::BwTester));
        assert_eq!(dispatcher.state(), &RunState::Idle);
    }

    #[test]
    fn test_continuous_schedules_next_run() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.set_timing(timing());
        assert!(dispatcher.set_continuous(true));
        let t0 = Instant::now();
        let ticket = dispatcher.begin(App::BwTester, t0);
        let finish = dispatcher.finish(&ticket, t0 + Duration::from_secs(2));
        assert_eq!(finish, Finish::ScheduleNext(Duration::from_millis(3000)));
        assert!(!dispatcher.controls_enabled());
        assert!(!dispatcher.is_running());
    }

    #[test]
    fn test_stale_response_is_ignored() {
        let mut dispatcher = Dispatcher::new();
        let t0 = Instant::now();
        let first = dispatcher.begin(App::BwTester, t0);
        let second = dispatcher.begin(App::BwTester, t0);
        assert!(second.seq > first.seq);
        assert_eq!(dispatcher.finish(&first, t0), Finish::Stale);
        assert!(dispatcher.is_running());
        assert_eq!(dispatcher.finish(&second, t0), Finish::Released);
        assert_eq!(dispatcher.finish(&second, t0), Finish::Stale);
    }

    #[test]
    fn test_tab_switch_disables_continuous() {
        let mut dispatcher = Dispatcher::new();
        assert!(dispatcher.set_continuous(true));
        assert_eq!(
            dispatcher.switch_tab(App::SensorApp),
            TabSwitch::Switched(Some(CONTINUOUS_DISABLED_TEXT))
        );
        assert!(!dispatcher.is_continuous());
        assert!(!dispatcher.set_continuous(true));
        assert_eq!(dispatcher.switch_tab(App::BwTester), TabSwitch::Switched(None));
    }

    #[test]
    fn test_locked_tab_refuses_switch() {
        let mut dispatcher = Dispatcher::new();
        let _ticket = dispatcher.begin(App::BwTester, Instant::now());
        assert_eq!(dispatcher.switch_tab(App::CamerApp), TabSwitch::Locked);
        dispatcher.stop();
        assert!(!dispatcher.controls_enabled());
    }
}
