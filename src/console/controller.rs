//! Drives the console against a backend
//!
//! All state changes happen on the controller's task. While a request is
//! pending the controller keeps appending progress dots and ticking the
//! charts; the continuous loop sleeps between runs the same way.

use crate::console::backend::Backend;
use crate::console::constants::IMAGE_FETCH_DELAY_MS;
use crate::console::dispatch::Finish;
use crate::console::error::{ConsoleError, Result};
use crate::console::nodes::{Node, NodeList, NodeRole};
use crate::console::progress::CommandProgress;
use crate::console::state::{CameraImage, Outcome, UiState};
use crate::console::tabs::App;
use crate::dial::{ChangeReport, DialField, Direction};
use crate::feed::{Granularity, ParsedResult};
use std::time::{Duration, Instant};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Wall clock in epoch milliseconds, the chart time base
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub struct Controller<B: Backend> {
    backend: B,
    state: UiState,
    show_progress: bool,
}

impl<B: Backend> Controller<B> {
    pub fn new(backend: B, state: UiState, show_progress: bool) -> Self {
        Self {
            backend,
            state,
            show_progress,
        }
    }

    pub fn state(&self) -> &UiState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut UiState {
        &mut self.state
    }

    /// Load the client list, then the servers that go with the chosen client
    pub async fn load_nodes(&mut self, client: Option<&str>, server: Option<&str>) -> Result<()> {
        let clients = match self.backend.get_nodes(NodeList::ClientsDefault).await {
            Ok(clients) => clients,
            Err(e) => return Err(self.notify(e)),
        };
        self.state.nodes_mut().set_catalog(NodeRole::Client, clients);

        let app = self.state.active_app();
        let chosen = match client {
            Some(name) => self.state.nodes_mut().select_named(NodeRole::Client, app, name),
            None => self.state.nodes().selected(NodeRole::Client, app),
        }
        .map(Node::clone);
        let chosen = match chosen {
            Ok(node) => node,
            Err(e) => return Err(self.notify(e)),
        };
        self.select_client(&chosen, server).await
    }

    /// Refresh the server list for `client` and pick a server
    pub async fn select_client(&mut self, client: &Node, server: Option<&str>) -> Result<()> {
        let list = NodeList::servers_for(client);
        debug!(client = %client.name, list = list.name(), "Loading servers");
        let servers = match self.backend.get_nodes(list).await {
            Ok(servers) => servers,
            Err(e) => return Err(self.notify(e)),
        };
        self.state.nodes_mut().set_catalog(NodeRole::Server, servers);

        if let Some(name) = server {
            let app = self.state.active_app();
            if let Err(e) = self.state.nodes_mut().select_named(NodeRole::Server, app, name) {
                return Err(self.notify(e));
            }
        }
        Ok(())
    }

    /// Switch tabs and offer the new app's servers
    pub fn switch_tab(&mut self, app: App) -> bool {
        if !self.state.switch_tab(app, Instant::now()) {
            return false;
        }
        if let Err(e) = self.state.nodes_mut().select(NodeRole::Server, app, 0) {
            debug!(app = %app, error = %e, "No servers listed for app");
        }
        true
    }

    pub fn on_dial_changed(
        &mut self,
        direction: Direction,
        field: DialField,
        value: f64,
    ) -> Vec<ChangeReport> {
        self.state.change_dial(direction, field, value, Instant::now())
    }

    pub fn set_focus(&mut self, focused: bool) -> Granularity {
        self.state.set_focus(focused)
    }

    /// Run the active app's client once
    pub async fn run_command(&mut self) -> Result<Outcome> {
        let form = self.state.build_form()?;
        let ticket = self.state.begin_command(Instant::now());
        let mut progress = CommandProgress::new(ticket.app, self.show_progress);

        let mut dots = interval(CommandProgress::interval());
        dots.set_missed_tick_behavior(MissedTickBehavior::Delay);
        dots.tick().await;
        let mut chart_ticks = interval(self.state.charts().granularity().tick_interval());
        chart_ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // the request borrows the backend; it must be gone before the image fetch
        let response = {
            let request = self.backend.command(&form);
            tokio::pin!(request);
            loop {
                tokio::select! {
                    response = &mut request => break response,
                    _ = dots.tick() => {
                        self.state.progress_dot();
                        progress.tick();
                    }
                    _ = chart_ticks.tick() => self.state.tick(now_ms()),
                }
            }
        };
        progress.finish();

        let text = match response {
            Ok(text) => text,
            Err(e) => {
                warn!(seq = ticket.seq, error = %e, "Command request failed");
                let message = e.to_string();
                self.state.notices_mut().show(message.clone(), Instant::now());
                message
            }
        };

        let outcome = self
            .state
            .finish_command(&ticket, &text, Instant::now(), now_ms())?;
        if let Outcome::Camera { fetch_image: true } = outcome {
            self.fetch_image().await;
        }
        Ok(outcome)
    }

    /// Bandwidth runs until continuous testing stops or `max_runs` is reached
    pub async fn run_bwtest<F>(&mut self, max_runs: Option<usize>, mut on_result: F) -> Result<usize>
    where
        F: FnMut(&UiState, &ParsedResult),
    {
        let mut completed = 0;
        loop {
            let next = match self.run_command().await? {
                Outcome::Bandwidth { result, next } => {
                    completed += 1;
                    on_result(&self.state, &result);
                    next
                }
                Outcome::Ignored => continue,
                other => {
                    debug!(outcome = ?other, "Not a bandwidth run");
                    break;
                }
            };

            match next {
                Finish::ScheduleNext(delay) if max_runs.map_or(true, |max| completed < max) => {
                    debug!(delay_ms = delay.as_millis() as u64, run = completed, "Waiting for next run");
                    self.idle_for(delay).await;
                    if !self.state.dispatcher().is_continuous() {
                        break;
                    }
                }
                Finish::ScheduleNext(_) => {
                    self.state.stop();
                    break;
                }
                Finish::Released | Finish::Stale => break,
            }
        }
        info!(runs = completed, "Bandwidth testing finished");
        Ok(completed)
    }

    async fn fetch_image(&mut self) {
        self.idle_for(Duration::from_millis(IMAGE_FETCH_DELAY_MS)).await;
        match self.latest_image().await {
            Ok(image) => {
                info!(text = %image.text.trim(), "Image retrieved");
                self.state.set_image(image);
            }
            Err(e) => {
                self.notify(e);
            }
        }
    }

    async fn latest_image(&self) -> Result<CameraImage> {
        let text = self.backend.txt_last().await?;
        let html = self.backend.img_last().await?;
        Ok(CameraImage { text, html })
    }

    /// Sleep while keeping the charts moving
    async fn idle_for(&mut self, delay: Duration) {
        let wake = sleep(delay);
        tokio::pin!(wake);
        let mut chart_ticks = interval(self.state.charts().granularity().tick_interval());
        chart_ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = &mut wake => break,
                _ = chart_ticks.tick() => self.state.tick(now_ms()),
            }
        }
    }

    fn notify(&mut self, error: ConsoleError) -> ConsoleError {
        warn!(error = %error, "Backend problem");
        self.state.notices_mut().show(error.to_string(), Instant::now());
        error
    }
}
