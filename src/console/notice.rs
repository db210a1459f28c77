//! Short-lived notice banner
//!
//! Only one notice is visible at a time; a new notice replaces the old one
//! and restarts its lifetime.

use crate::console::constants::NOTICE_LIFETIME;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub shown_at: Instant,
}

#[derive(Debug, Clone)]
pub struct NoticeBoard {
    current: Option<Notice>,
    lifetime: Duration,
    history: Vec<String>,
}

impl Default for NoticeBoard {
    fn default() -> Self {
        Self::with_lifetime(NOTICE_LIFETIME)
    }
}

impl NoticeBoard {
    pub fn with_lifetime(lifetime: Duration) -> Self {
        Self {
            current: None,
            lifetime,
            history: Vec::new(),
        }
    }

    pub fn show(&mut self, text: impl Into<String>, now: Instant) {
        let text = text.into();
        warn!(notice = %text, "Notice shown");
        self.history.push(text.clone());
        self.current = Some(Notice {
            text,
            shown_at: now,
        });
    }

    /// The visible notice, if it has not expired yet
    pub fn current(&self, now: Instant) -> Option<&str> {
        self.current
            .as_ref()
            .filter(|n| now.duration_since(n.shown_at) < self.lifetime)
            .map(|n| n.text.as_str())
    }

    /// Drop the notice once its lifetime is over
    pub fn expire(&mut self, now: Instant) {
        if self.current(now).is_none() {
            self.current = None;
        }
    }

    /// Every notice shown so far, oldest first
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Take the notices shown since the last call
    pub fn drain_history(&mut self) -> Vec<String> {
        std::mem::take(&mut self.history)
    }
}
