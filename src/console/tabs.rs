//! Tool tabs and their enabled state

use std::fmt;
use tracing::debug;

/// One of the tools reachable from the console
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum App {
    BwTester,
    CamerApp,
    SensorApp,
}

impl App {
    pub const ALL: [App; 3] = [App::BwTester, App::CamerApp, App::SensorApp];

    /// Name sent as the `apps` form field and used to key node lists
    pub fn name(self) -> &'static str {
        match self {
            App::BwTester => "bwtester",
            App::CamerApp => "camerapp",
            App::SensorApp => "sensorapp",
        }
    }

    fn index(self) -> usize {
        match self {
            App::BwTester => 0,
            App::CamerApp => 1,
            App::SensorApp => 2,
        }
    }
}

impl fmt::Display for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which tab is shown and which tabs may be switched to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabState {
    active: App,
    enabled: [bool; 3],
}

impl Default for TabState {
    fn default() -> Self {
        Self {
            active: App::BwTester,
            enabled: [true; 3],
        }
    }
}

impl TabState {
    pub fn active(&self) -> App {
        self.active
    }

    pub fn is_enabled(&self, app: App) -> bool {
        self.enabled[app.index()]
    }

    /// Switch tabs; refused while the target tab is disabled
    pub fn activate(&mut self, app: App) -> bool {
        if !self.is_enabled(app) {
            debug!(app = %app, "Tab is locked");
            return false;
        }
        self.active = app;
        true
    }

    /// Disable every tab except `app`
    pub fn lock_to(&mut self, app: App) {
        for other in App::ALL {
            self.enabled[other.index()] = other == app;
        }
        debug!(app = %app, "Tabs locked");
    }

    /// Enable every tab
    pub fn release(&mut self) {
        self.enabled = [true; 3];
        debug!("Tabs released");
    }
}
