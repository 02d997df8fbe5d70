//! Serializes usage refreshes and owns the last good snapshot.
//!
//! A single task runs the coordinator loop. It selects over the command
//! channel, the one in-flight fetch and the periodic timer, so all refresh
//! state is owned by that task and needs no locking. Requests that arrive
//! while a fetch is outstanding overwrite a single queued slot; when the
//! fetch completes, the queued request (if any) starts next.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::core::error::UsageError;
use crate::core::fetch::{FetchFuture, UsageSource};
use crate::core::formatter::format_unavailable;
use crate::core::models::preferences::{
    resolve_percent_command, resolve_reset_command, DisplayPreferences,
};
use crate::core::models::usage::UsageSnapshot;
use crate::core::normalizer::normalize;
use crate::core::selector::{select_bucket, SelectionPolicy};

/// What caused a refresh. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Startup,
    ModelSelect,
    TurnEnd,
    Timer,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshRequest {
    pub model_id: String,
    pub trigger: Trigger,
}

/// What the status indicator should show.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Usage {
        label: String,
        snapshot: UsageSnapshot,
        prefs: DisplayPreferences,
    },
    /// Endpoint unreachable; carries the rendered "<label> unavailable" text.
    Unavailable(String),
    /// Render nothing at all.
    Hidden,
}

/// Receiver of status updates, e.g. a status bar or stdout.
pub trait StatusSink: Send {
    fn publish(&mut self, update: StatusUpdate);
}

impl StatusSink for mpsc::UnboundedSender<StatusUpdate> {
    fn publish(&mut self, update: StatusUpdate) {
        if self.send(update).is_err() {
            debug!("status receiver dropped");
        }
    }
}

/// Point-in-time view of the coordinator, for inspection and JSON output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinatorState {
    pub model_id: String,
    pub in_flight: Option<RefreshRequest>,
    pub queued: Option<RefreshRequest>,
    pub snapshot: Option<UsageSnapshot>,
    pub prefs: DisplayPreferences,
    pub timer_active: bool,
    pub stopped: bool,
    pub fetches_started: u64,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("refresh coordinator has shut down")]
pub struct CoordinatorClosed;

enum Command {
    Refresh {
        model_id: Option<String>,
        trigger: Trigger,
    },
    PercentMode {
        arg: Option<String>,
        reply: oneshot::Sender<Option<DisplayPreferences>>,
    },
    ResetWindow {
        arg: Option<String>,
        reply: oneshot::Sender<Option<DisplayPreferences>>,
    },
    StartTimer(Duration),
    StopTimer,
    State(oneshot::Sender<CoordinatorState>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DisplayState {
    Blank,
    Usage,
    Unavailable,
    Hidden,
}

/// Cloneable handle for talking to a running coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl CoordinatorHandle {
    fn send(&self, command: Command) -> Result<(), CoordinatorClosed> {
        self.tx.send(command).map_err(|_| CoordinatorClosed)
    }

    /// Refresh for `model_id`. Coalesces with any refresh already running.
    pub fn request_refresh(
        &self,
        model_id: impl Into<String>,
        trigger: Trigger,
    ) -> Result<(), CoordinatorClosed> {
        self.send(Command::Refresh {
            model_id: Some(model_id.into()),
            trigger,
        })
    }

    /// Refresh for the most recently requested model.
    pub fn refresh_active(&self, trigger: Trigger) -> Result<(), CoordinatorClosed> {
        self.send(Command::Refresh {
            model_id: None,
            trigger,
        })
    }

    /// Apply a `percent` command. Returns the new preferences, or `None`
    /// if the argument was not recognized and nothing changed.
    pub async fn set_percent_mode(
        &self,
        arg: Option<&str>,
    ) -> Result<Option<DisplayPreferences>, CoordinatorClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::PercentMode {
            arg: arg.map(str::to_string),
            reply,
        })?;
        rx.await.map_err(|_| CoordinatorClosed)
    }

    /// Apply a `reset` command, same contract as [`Self::set_percent_mode`].
    pub async fn set_reset_window(
        &self,
        arg: Option<&str>,
    ) -> Result<Option<DisplayPreferences>, CoordinatorClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ResetWindow {
            arg: arg.map(str::to_string),
            reply,
        })?;
        rx.await.map_err(|_| CoordinatorClosed)
    }

    /// Start the periodic refresh, replacing any running timer.
    pub fn start_timer(&self, period: Duration) -> Result<(), CoordinatorClosed> {
        self.send(Command::StartTimer(period))
    }

    /// Cancel the periodic refresh and clear the indicator.
    pub fn stop_timer(&self) -> Result<(), CoordinatorClosed> {
        self.send(Command::StopTimer)
    }

    pub async fn state(&self) -> Result<CoordinatorState, CoordinatorClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::State(reply))?;
        rx.await.map_err(|_| CoordinatorClosed)
    }

    pub fn shutdown(&self) -> Result<(), CoordinatorClosed> {
        self.send(Command::Shutdown)
    }
}

pub struct RefreshCoordinator {
    source: Arc<dyn UsageSource>,
    sink: Box<dyn StatusSink>,
    policy: SelectionPolicy,
    label: String,
    prefs: DisplayPreferences,
    active_model: String,
    current: Option<RefreshRequest>,
    fetch: Option<FetchFuture>,
    queued: Option<RefreshRequest>,
    snapshot: Option<UsageSnapshot>,
    display: DisplayState,
    timer: Option<Interval>,
    /// Set by `stop_timer`; results are discarded until the next refresh or start.
    stopped: bool,
    fetches_started: u64,
}

impl RefreshCoordinator {
    pub fn new(
        source: Arc<dyn UsageSource>,
        sink: Box<dyn StatusSink>,
        policy: SelectionPolicy,
        label: impl Into<String>,
        prefs: DisplayPreferences,
        initial_model: impl Into<String>,
    ) -> Self {
        Self {
            source,
            sink,
            policy,
            label: label.into(),
            prefs,
            active_model: initial_model.into(),
            current: None,
            fetch: None,
            queued: None,
            snapshot: None,
            display: DisplayState::Blank,
            timer: None,
            stopped: false,
            fetches_started: 0,
        }
    }

    /// Spawn the coordinator loop on the current runtime.
    pub fn spawn(self) -> (CoordinatorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx));
        (CoordinatorHandle { tx }, task)
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(Command::Shutdown) | None => break,
                        Some(command) => self.handle_command(command),
                    }
                }
                result = poll_fetch(&mut self.fetch), if self.fetch.is_some() => {
                    self.fetch = None;
                    self.complete_fetch(result);
                }
                _ = next_tick(&mut self.timer), if self.timer.is_some() => {
                    let request = RefreshRequest {
                        model_id: self.active_model.clone(),
                        trigger: Trigger::Timer,
                    };
                    self.request_refresh(request);
                }
            }
        }
        debug!("refresh coordinator stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Refresh { model_id, trigger } => {
                let model_id = model_id.unwrap_or_else(|| self.active_model.clone());
                self.request_refresh(RefreshRequest { model_id, trigger });
            }
            Command::PercentMode { arg, reply } => {
                let changed = resolve_percent_command(self.prefs.percent_mode, arg.as_deref())
                    .map(|mode| DisplayPreferences {
                        percent_mode: mode,
                        ..self.prefs
                    });
                self.apply_prefs(changed);
                let _ = reply.send(changed);
            }
            Command::ResetWindow { arg, reply } => {
                let changed = resolve_reset_command(self.prefs.reset_window, arg.as_deref())
                    .map(|window| DisplayPreferences {
                        reset_window: window,
                        ..self.prefs
                    });
                self.apply_prefs(changed);
                let _ = reply.send(changed);
            }
            Command::StartTimer(period) => self.start_timer(period),
            Command::StopTimer => self.stop_timer(),
            Command::State(reply) => {
                let _ = reply.send(self.state());
            }
            Command::Shutdown => {}
        }
    }

    fn request_refresh(&mut self, request: RefreshRequest) {
        self.active_model = request.model_id.clone();
        self.stopped = false;
        if self.fetch.is_some() {
            if let Some(dropped) = self.queued.replace(request) {
                debug!(
                    model = dropped.model_id.as_str(),
                    trigger = ?dropped.trigger,
                    "superseded queued refresh"
                );
            }
            return;
        }
        self.begin_fetch(request);
    }

    fn begin_fetch(&mut self, request: RefreshRequest) {
        debug!(
            model = request.model_id.as_str(),
            trigger = ?request.trigger,
            "starting usage fetch"
        );
        self.fetch = Some(self.source.fetch(&request.model_id));
        self.current = Some(request);
        self.fetches_started += 1;
    }

    fn complete_fetch(&mut self, result: Result<Value, UsageError>) {
        let model_id = self
            .current
            .take()
            .map(|r| r.model_id)
            .unwrap_or_else(|| self.active_model.clone());

        if self.stopped {
            debug!(model = %model_id, "discarding usage result after stop");
            return;
        }

        match result {
            Ok(response) => {
                let bucket = select_bucket(&response, &model_id, &self.policy);
                if bucket.is_none() {
                    debug!(model = %model_id, "no usable rate-limit bucket in response");
                }
                self.snapshot = Some(normalize(bucket.as_ref(), Utc::now()));
                self.display = DisplayState::Usage;
                self.publish_usage();
            }
            Err(e) if e.is_credentials_missing() => {
                debug!(error = %e, "hiding usage indicator");
                self.snapshot = None;
                self.display = DisplayState::Hidden;
                self.sink.publish(StatusUpdate::Hidden);
            }
            Err(e) => {
                warn!(error = %e, "usage refresh failed");
                self.display = DisplayState::Unavailable;
                self.sink
                    .publish(StatusUpdate::Unavailable(format_unavailable(&self.label)));
            }
        }

        if let Some(next) = self.queued.take() {
            self.begin_fetch(next);
        }
    }

    fn publish_usage(&mut self) {
        if let Some(snapshot) = &self.snapshot {
            self.sink.publish(StatusUpdate::Usage {
                label: self.label.clone(),
                snapshot: snapshot.clone(),
                prefs: self.prefs,
            });
        }
    }

    fn apply_prefs(&mut self, changed: Option<DisplayPreferences>) {
        let Some(prefs) = changed else {
            return;
        };
        self.prefs = prefs;
        if self.display == DisplayState::Usage {
            self.publish_usage();
        }
    }

    fn start_timer(&mut self, period: Duration) {
        // interval_at panics on a zero period
        let period = period.max(Duration::from_millis(1));
        self.stopped = false;
        if self.timer.is_some() {
            debug!("replacing running refresh timer");
        }
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.timer = Some(interval);
        info!(period_secs = period.as_secs_f64(), "refresh timer started");
    }

    fn stop_timer(&mut self) {
        if self.timer.take().is_some() {
            info!("refresh timer stopped");
        }
        if let Some(dropped) = self.queued.take() {
            debug!(model = %dropped.model_id, "dropped queued refresh on stop");
        }
        self.stopped = true;
        self.display = DisplayState::Hidden;
        self.sink.publish(StatusUpdate::Hidden);
    }

    fn state(&self) -> CoordinatorState {
        CoordinatorState {
            model_id: self.active_model.clone(),
            in_flight: self.current.clone(),
            queued: self.queued.clone(),
            snapshot: self.snapshot.clone(),
            prefs: self.prefs,
            timer_active: self.timer.is_some(),
            stopped: self.stopped,
            fetches_started: self.fetches_started,
        }
    }
}

async fn poll_fetch(fetch: &mut Option<FetchFuture>) -> Result<Value, UsageError> {
    match fetch {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
