use crate::console::constants::REQUEST_TIMEOUT_MS;
use crate::console::error::{ConsoleError, Result};
use clap::Args;
use std::time::Duration;
use tracing::debug;

/// Options shared by every console command
#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Base URL of the test backend
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub backend: String,

    /// Backend request timeout in milliseconds
    #[arg(long, default_value_t = REQUEST_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Name of the client node to use (first listed when omitted)
    #[arg(long)]
    pub client: Option<String>,

    /// Name of the server node to use (first listed when omitted)
    #[arg(long)]
    pub server: Option<String>,

    /// Additional options passed through to the test client
    #[arg(long, default_value = "")]
    pub addl_opt: String,

    /// Show chart times in UTC instead of local time
    #[arg(long)]
    pub utc: bool,

    /// Do not draw progress or charts, print results only
    #[arg(long)]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Log format (text or json)
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub log_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: "http://127.0.0.1:8080".to_string(),
            timeout_ms: REQUEST_TIMEOUT_MS,
            client: None,
            server: None,
            addl_opt: String::new(),
            utc: false,
            quiet: false,
            log_level: "warn".to_string(),
            log_format: "text".to_string(),
        }
    }
}

impl Config {
    /// Per-request timeout for backend calls
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Whether log lines are emitted as JSON
    pub fn is_json_format(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    /// Charts tick at the focused rate only when someone is watching them
    pub fn charts_focused(&self, stdout_is_terminal: bool) -> bool {
        !self.quiet && stdout_is_terminal
    }

    /// Reject settings the console cannot start with
    pub fn validate(&self) -> Result<()> {
        debug!(backend = %self.backend, "Checking console options");
        if !(self.backend.starts_with("http://") || self.backend.starts_with("https://")) {
            return Err(ConsoleError::Config(format!(
                "backend must be an http(s) URL, got '{}'",
                self.backend
            )));
        }
        if self.timeout_ms == 0 {
            return Err(ConsoleError::Config("timeout must be > 0".into()));
        }
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        let level = self.log_level.to_lowercase();
        if !LEVELS.contains(&level.as_str()) {
            return Err(ConsoleError::Config(format!(
                "unknown log level '{}', expected {}",
                self.log_level,
                LEVELS.join("/")
            )));
        }
        Ok(())
    }
}
