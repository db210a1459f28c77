//! Console for driving the test apps through the backend

pub mod backend;
pub mod config;
pub mod constants;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod nodes;
pub mod notice;
pub mod progress;
pub mod reporter;
pub mod state;
pub mod tabs;

pub use backend::{Backend, Form, HttpBackend};
pub use config::Config;
pub use constants::*;
pub use controller::{now_ms, Controller};
pub use dispatch::{next_run_delay, Dispatcher, Finish, LoopTiming, RunState, TabSwitch, Ticket};
pub use error::{ConsoleError, Result};
pub use logging::init_logging;
pub use nodes::{Node, NodeCatalog, NodeList, NodeRole, NodeSelection};
pub use notice::{Notice, NoticeBoard};
pub use progress::CommandProgress;
pub use reporter::Reporter;
pub use state::{CameraImage, Outcome, UiState};
pub use tabs::{App, TabState};
