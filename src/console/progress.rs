use crate::console::constants::PROGRESS_DOT_INTERVAL_MS;
use crate::console::tabs::App;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// "Executing <app> client" line that grows a dot every tick while a
/// command is pending
pub struct CommandProgress {
    pb: ProgressBar,
    base: String,
    dots: usize,
}

impl CommandProgress {
    pub fn new(app: App, visible: bool) -> Self {
        let pb = if visible {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden())
        };
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);

        let base = format!("Executing {} client", app);
        pb.set_message(base.clone());
        Self { pb, base, dots: 0 }
    }

    /// Interval between dots
    pub fn interval() -> Duration {
        Duration::from_millis(PROGRESS_DOT_INTERVAL_MS)
    }

    /// Append one dot
    pub fn tick(&mut self) {
        self.dots += 1;
        self.pb.set_message(self.message());
        self.pb.tick();
    }

    pub fn message(&self) -> String {
        format!("{}{}", self.base, ".".repeat(self.dots))
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}
