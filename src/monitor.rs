//! Poll loop: repeats the mirror pipeline on an interval
//!
//! The loop state ([`MonitorStatus`]) lives behind one mutex; every control
//! operation takes it. A cycle runs in its own task so a panic inside the
//! pipeline is recorded as a failed cycle instead of killing the loop.
//!
//! # Example
//!
//! ```no_run
//! use catalog_mirror::{CatalogMirror, Config};
//! use catalog_mirror::monitor::MonitorSettings;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mirror = CatalogMirror::new(Config::default()).await?;
//! let status = mirror
//!     .monitor()
//!     .start(MonitorSettings {
//!         interval_seconds: 600,
//!         offline: false,
//!         crawl_on_update: true,
//!     })
//!     .await;
//! assert!(status.running);
//! mirror.monitor().stop().await;
//! # Ok(())
//! # }
//! ```

use crate::types::{Event, MonitorStatus, RunReport};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use utoipa::ToSchema;

/// Runs one pipeline cycle for the poll loop
#[async_trait]
pub trait CycleRunner: Send + Sync + 'static {
    /// Detect changes and, if requested, expand and materialize
    async fn run_cycle(&self, offline: bool, crawl_on_update: bool) -> RunReport;
}

/// Parameters of a monitor start request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MonitorSettings {
    /// Sleep between cycles, in seconds (values below 1 are raised to 1)
    pub interval_seconds: u64,
    /// Use the offline replay source
    pub offline: bool,
    /// Expand and materialize when the index changed
    pub crawl_on_update: bool,
}

struct MonitorState {
    status: MonitorStatus,
    /// Bumped on every start; a loop only clears `running` for its own generation
    generation: u64,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

struct MonitorShared {
    state: Mutex<MonitorState>,
    runner: Arc<dyn CycleRunner>,
    event_tx: broadcast::Sender<Event>,
}

/// Start/stop/status control over the poll loop
#[derive(Clone)]
pub struct MonitorService {
    shared: Arc<MonitorShared>,
}

impl MonitorService {
    /// Stopped monitor using `defaults` until the first start request
    pub fn new(
        runner: Arc<dyn CycleRunner>,
        defaults: MonitorSettings,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        let status = MonitorStatus {
            running: false,
            interval_seconds: defaults.interval_seconds.max(1),
            offline: defaults.offline,
            crawl_on_update: defaults.crawl_on_update,
            cycles: 0,
            last_run_started: None,
            last_run_finished: None,
            last_result: None,
        };
        Self {
            shared: Arc::new(MonitorShared {
                state: Mutex::new(MonitorState {
                    status,
                    generation: 0,
                    cancel: None,
                    task: None,
                }),
                runner,
                event_tx,
            }),
        }
    }

    /// Start the loop, or update its settings if it is already running
    pub async fn start(&self, settings: MonitorSettings) -> MonitorStatus {
        let mut state = self.shared.state.lock().await;
        state.status.interval_seconds = settings.interval_seconds.max(1);
        state.status.offline = settings.offline;
        state.status.crawl_on_update = settings.crawl_on_update;

        if state.status.running {
            debug!("Monitor already running, settings updated");
            return state.status.clone();
        }

        state.status.running = true;
        state.generation += 1;
        let token = CancellationToken::new();
        state.cancel = Some(token.clone());
        state.task = Some(tokio::spawn(run_loop(
            self.shared.clone(),
            token,
            state.generation,
        )));

        info!(
            interval_seconds = state.status.interval_seconds,
            offline = state.status.offline,
            crawl_on_update = state.status.crawl_on_update,
            "Monitor started"
        );
        self.shared
            .event_tx
            .send(Event::MonitorStarted {
                interval_seconds: state.status.interval_seconds,
                offline: state.status.offline,
            })
            .ok();
        state.status.clone()
    }

    /// Stop the loop; an in-flight cycle is abandoned
    pub async fn stop(&self) -> MonitorStatus {
        let task = {
            let mut state = self.shared.state.lock().await;
            if !state.status.running && state.task.is_none() {
                debug!("Monitor not running, nothing to stop");
                return state.status.clone();
            }
            state.status.running = false;
            if let Some(token) = state.cancel.take() {
                token.cancel();
            }
            state.task.take()
        };

        if let Some(task) = task
            && let Err(e) = task.await
        {
            error!(error = %e, "Monitor loop ended abnormally");
        }

        info!("Monitor stopped");
        self.shared.event_tx.send(Event::MonitorStopped).ok();
        self.status().await
    }

    /// Change the sleep interval; applies from the next sleep on
    pub async fn set_interval(&self, interval_seconds: u64) -> MonitorStatus {
        let mut state = self.shared.state.lock().await;
        state.status.interval_seconds = interval_seconds.max(1);
        info!(interval_seconds = state.status.interval_seconds, "Monitor interval updated");
        state.status.clone()
    }

    /// Current loop state
    pub async fn status(&self) -> MonitorStatus {
        self.shared.state.lock().await.status.clone()
    }
}

async fn run_loop(shared: Arc<MonitorShared>, token: CancellationToken, generation: u64) {
    loop {
        let (offline, crawl_on_update, cycle) = {
            let mut state = shared.state.lock().await;
            if !state.status.running || state.generation != generation {
                break;
            }
            state.status.last_run_started = Some(Utc::now());
            (
                state.status.offline,
                state.status.crawl_on_update,
                state.status.cycles + 1,
            )
        };

        debug!(cycle, offline, "Monitor cycle starting");
        shared.event_tx.send(Event::RunStarted { cycle: Some(cycle) }).ok();

        let runner = shared.runner.clone();
        let mut cycle_task =
            tokio::spawn(async move { runner.run_cycle(offline, crawl_on_update).await });

        let joined = tokio::select! {
            _ = token.cancelled() => {
                cycle_task.abort();
                None
            }
            joined = &mut cycle_task => Some(joined),
        };

        let interval = {
            let mut state = shared.state.lock().await;
            state.status.last_run_finished = Some(Utc::now());
            state.status.cycles += 1;
            match joined {
                Some(Ok(report)) => {
                    publish_report(&shared.event_tx, Some(cycle), &report);
                    state.status.last_result = Some(report);
                }
                Some(Err(e)) => {
                    error!(cycle, error = %e, "Monitor cycle crashed");
                    let message = format!("cycle task failed: {}", e);
                    shared
                        .event_tx
                        .send(Event::RunFailed {
                            cycle: Some(cycle),
                            stage: None,
                            error: message.clone(),
                        })
                        .ok();
                    state.status.last_result = Some(RunReport {
                        success: false,
                        error: Some(message),
                        ..Default::default()
                    });
                }
                None => {
                    debug!(cycle, "Monitor cycle abandoned");
                    break;
                }
            }
            state.status.interval_seconds
        };

        tokio::select! {
            _ = token.cancelled() => break,
            _ = sleep(Duration::from_secs(interval)) => {}
        }
    }

    let mut state = shared.state.lock().await;
    if state.generation == generation {
        state.status.running = false;
        state.cancel = None;
    }
    debug!(generation, "Monitor loop exited");
}

/// Translate a finished run into events
pub(crate) fn publish_report(tx: &broadcast::Sender<Event>, cycle: Option<u64>, report: &RunReport) {
    if let Some(change) = report.change.as_ref().filter(|c| c.changed) {
        tx.send(Event::IndexChanged {
            fingerprint: change.fingerprint.clone(),
            key_count: change.key_count,
        })
        .ok();
    }

    if let Some(content) = &report.content {
        for (key, outcome) in &content.results {
            if let crate::types::ItemOutcome::Failed { message, .. } = outcome {
                tx.send(Event::ItemFailed {
                    key: key.clone(),
                    message: message.clone(),
                })
                .ok();
            }
        }
    }

    let event = if report.success {
        let (materialized, skipped, failed) = report
            .content
            .as_ref()
            .map(|c| (c.success_count - c.skipped_count, c.skipped_count, c.failed_count))
            .unwrap_or_default();
        info!(
            cycle = ?cycle,
            materialized,
            skipped,
            failed,
            "Run completed"
        );
        Event::RunCompleted {
            cycle,
            changed: report.change.as_ref().is_some_and(|c| c.changed),
            materialized,
            skipped,
            failed,
        }
    } else {
        let error = report.error.clone().unwrap_or_default();
        error!(cycle = ?cycle, stage = ?report.failed_stage, error = %error, "Run failed");
        Event::RunFailed {
            cycle,
            stage: report.failed_stage,
            error,
        }
    };
    tx.send(event).ok();
}
