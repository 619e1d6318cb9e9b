//! Orchestration of one build at a time.
//!
//! The coordinator owns the pair of workers behind a build attempt (the
//! process runner and the log tailer), merges their output into a single
//! event stream, and reconciles the two shutdown paths so that a cancel
//! or application exit never races a genuine completion: once a stop has
//! been requested, late terminal events from the workers are dropped
//! instead of being surfaced as a finished build.

use crate::config::ConfigStore;
use crate::models::{BUILD_LOG_FILENAME, BuildTask, SharedBuildTask};
use crate::services::command::render_command;
use crate::services::runner::{ProcessRunner, RunnerEvent, RunnerHandle};
use crate::services::tailer::{LogTailer, TailerEvent, TailerHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// How often worker liveness is re-checked while stopping.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Overall budget for a cooperative cancel before force-abort.
const CANCEL_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-worker budget during application shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("a build is already running")]
    AlreadyRunning,

    #[error("no entry file selected")]
    MissingEntryFile,

    #[error("no output directory selected")]
    MissingOutputDir,
}

/// Merged event stream observed by the caller of `start_build`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// New log lines read from the build log file.
    LogBatch(Vec<String>),
    /// The tailer hit an unexpected read error but keeps polling.
    TailError(String),
    /// The build process exited successfully.
    Finished { exit_code: i32 },
    /// The build failed or was cancelled.
    Failed { message: String },
}

struct ActiveBuild {
    task: SharedBuildTask,
    runner_handle: RunnerHandle,
    tailer_handle: Arc<TailerHandle>,
    /// Set before any stop request; the forwarder then drops terminal
    /// events so a cancel can never surface as a completed build.
    suppress: Arc<AtomicBool>,
}

/// Starts, observes, cancels and shuts down build attempts.
pub struct BuildCoordinator {
    config: Arc<ConfigStore>,
    runner: ProcessRunner,
    tail_interval: Duration,
    active: Mutex<Option<ActiveBuild>>,
}

impl BuildCoordinator {
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self {
            config,
            runner: ProcessRunner::new(),
            tail_interval: crate::services::tailer::POLL_INTERVAL,
            active: Mutex::new(None),
        }
    }

    /// Same coordinator with a custom tail poll interval. Tests shorten it.
    pub fn with_tail_interval(config: Arc<ConfigStore>, tail_interval: Duration) -> Self {
        Self {
            config,
            runner: ProcessRunner::new(),
            tail_interval,
            active: Mutex::new(None),
        }
    }

    /// Render the command for the current configuration and launch it.
    ///
    /// Returns the shared task plus the merged event stream for this
    /// attempt. Fails if a build is still running or the session inputs
    /// are incomplete.
    pub fn start_build(
        &self,
    ) -> Result<(SharedBuildTask, mpsc::UnboundedReceiver<BuildEvent>), CoordinatorError> {
        let mut active = self.active.lock().unwrap();
        if let Some(previous) = active.as_ref() {
            if previous.runner_handle.is_running() {
                return Err(CoordinatorError::AlreadyRunning);
            }
            // Previous attempt is done; retire its tailer quietly.
            previous.tailer_handle.request_stop();
        }

        let (config, overrides) = self.config.snapshot();
        if overrides.entry_file.is_empty() {
            return Err(CoordinatorError::MissingEntryFile);
        }
        if overrides.output_dir.is_empty() {
            return Err(CoordinatorError::MissingOutputDir);
        }

        let command = render_command(&config, &overrides);
        tracing::info!("Starting build: {command}");

        let mut task = BuildTask::new(
            &overrides.entry_file,
            camino::Utf8Path::new(&overrides.output_dir),
            &overrides.output_filename,
            &command,
        );
        if !overrides.icon_path.is_empty() {
            task.icon_path = Some(camino::Utf8PathBuf::from(&overrides.icon_path));
        }
        let log_path = task.log_file_path.clone();
        let task = task.into_shared();

        // A stale log from the previous build would replay old output.
        if let Some(path) = &log_path {
            if path.exists() {
                let _ = std::fs::remove_file(path);
            }
        }

        let (runner_tx, runner_rx) = mpsc::unbounded_channel();
        let runner_handle = self.runner.start(task.clone(), runner_tx);

        let (tailer_tx, tailer_rx) = mpsc::unbounded_channel();
        let tailer = LogTailer::with_interval(self.tail_interval);
        let tailer_handle = Arc::new(tailer.start(
            log_path.as_deref().unwrap_or(camino::Utf8Path::new(BUILD_LOG_FILENAME)),
            tailer_tx,
        ));

        let suppress = Arc::new(AtomicBool::new(false));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(forward_events(
            runner_rx,
            tailer_rx,
            events_tx,
            suppress.clone(),
        ));

        *active = Some(ActiveBuild {
            task: task.clone(),
            runner_handle,
            tailer_handle,
            suppress,
        });

        Ok((task, events_rx))
    }

    /// The task of the most recent build attempt, if any.
    pub fn current_task(&self) -> Option<SharedBuildTask> {
        self.active.lock().unwrap().as_ref().map(|a| a.task.clone())
    }

    pub fn is_building(&self) -> bool {
        self.active
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|a| a.runner_handle.is_running())
    }

    /// Stop the running build and its tailer.
    ///
    /// Suppression is flipped before the stop requests go out, so an
    /// in-flight terminal event cannot slip through and masquerade as a
    /// normal completion. Returns `true` if both workers stopped within
    /// the budget; a stuck tailer is force-aborted either way.
    pub async fn cancel(&self) -> bool {
        let Some((runner_handle, tailer_handle, suppress)) = ({
            let active = self.active.lock().unwrap();
            active.as_ref().map(|a| {
                (
                    a.runner_handle.clone(),
                    a.tailer_handle.clone(),
                    a.suppress.clone(),
                )
            })
        }) else {
            return true;
        };

        suppress.store(true, Ordering::SeqCst);
        runner_handle.request_stop();
        tailer_handle.request_stop();

        let deadline = tokio::time::Instant::now() + CANCEL_TIMEOUT;
        while tokio::time::Instant::now() < deadline {
            if !runner_handle.is_running() && !tailer_handle.is_running() {
                tracing::info!("Build cancelled");
                return true;
            }
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }

        tracing::warn!("Workers did not stop within {CANCEL_TIMEOUT:?}");
        if tailer_handle.is_running() {
            tailer_handle.abort();
        }
        false
    }

    /// Bounded teardown for application exit.
    ///
    /// Waits for each worker in turn, then force-aborts whatever is left.
    pub async fn shutdown(&self) {
        let Some((runner_handle, tailer_handle, suppress)) = ({
            let active = self.active.lock().unwrap();
            active.as_ref().map(|a| {
                (
                    a.runner_handle.clone(),
                    a.tailer_handle.clone(),
                    a.suppress.clone(),
                )
            })
        }) else {
            return;
        };

        suppress.store(true, Ordering::SeqCst);
        runner_handle.request_stop();
        tailer_handle.request_stop();

        if !runner_handle.wait(SHUTDOWN_TIMEOUT).await {
            tracing::warn!("Build process did not stop within {SHUTDOWN_TIMEOUT:?}");
        }
        if !tailer_handle.wait(SHUTDOWN_TIMEOUT).await {
            tracing::warn!("Log tailer did not stop within {SHUTDOWN_TIMEOUT:?}");
            tailer_handle.abort();
        }
        tracing::info!("Build coordinator shut down");
    }
}

/// Merge both worker channels into the single stream handed to the caller.
///
/// Terminal runner events are dropped once suppression is set; log
/// batches keep flowing so the final lines of a cancelled build are still
/// visible.
async fn forward_events(
    mut runner_rx: mpsc::UnboundedReceiver<RunnerEvent>,
    mut tailer_rx: mpsc::UnboundedReceiver<TailerEvent>,
    events: mpsc::UnboundedSender<BuildEvent>,
    suppress: Arc<AtomicBool>,
) {
    let mut runner_open = true;
    let mut tailer_open = true;

    while runner_open || tailer_open {
        tokio::select! {
            ev = runner_rx.recv(), if runner_open => {
                match ev {
                    Some(ev) => {
                        if suppress.load(Ordering::SeqCst) {
                            tracing::debug!("Dropping late runner event after stop: {ev:?}");
                            continue;
                        }
                        let mapped = match ev {
                            RunnerEvent::Finished { exit_code } => {
                                BuildEvent::Finished { exit_code }
                            }
                            RunnerEvent::Failed { message } => BuildEvent::Failed { message },
                        };
                        if events.send(mapped).is_err() {
                            return;
                        }
                    }
                    None => runner_open = false,
                }
            }
            ev = tailer_rx.recv(), if tailer_open => {
                match ev {
                    Some(TailerEvent::Batch(lines)) => {
                        if events.send(BuildEvent::LogBatch(lines)).is_err() {
                            return;
                        }
                    }
                    Some(TailerEvent::Error(message)) => {
                        if events.send(BuildEvent::TailError(message)).is_err() {
                            return;
                        }
                    }
                    None => tailer_open = false,
                }
            }
        }
    }
}
