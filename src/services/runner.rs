//! Background execution of one rendered build command.
//!
//! The runner owns the build task and its log file for the lifetime of
//! the attempt: it spawns the compiler subprocess, folds merged
//! stdout/stderr into the log file line by line, keeps a coarse progress
//! estimate, and supports cancellation that takes the whole descendant
//! process tree down (the compiler spawns its own C compiler/linker
//! children).
//!
//! Per-line output is deliberately not forwarded anywhere; the UI sees
//! log growth only through the tailer's batched reads.

use crate::models::{LogEntry, SharedBuildTask, TaskStatus};
use crate::services::command::split_command;
use camino::Utf8Path;
use chrono::Local;
use regex::Regex;
use std::io::Write;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};

/// Terminal outcome reported by the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerEvent {
    Finished { exit_code: i32 },
    Failed { message: String },
}

/// Message recorded when a build is stopped by the user. Distinct from a
/// genuine failure message even though both land on `TaskStatus::Failed`.
pub const CANCELLED_MESSAGE: &str = "Build cancelled by user";

/// Ordered keyword → percentage table for the progress estimate.
/// First match wins.
const PROGRESS_KEYWORDS: &[(&str, u8)] = &[
    ("starting", 5),
    ("parsing", 10),
    ("importing", 15),
    ("compiling", 30),
    ("linking", 70),
    ("copying", 90),
    ("done", 100),
    ("completed", 100),
    ("finished", 100),
];

/// Handle to a running build, safe to share across threads.
///
/// `request_stop` is non-blocking and idempotent; `wait` blocks up to the
/// given timeout for the worker to finish.
#[derive(Clone)]
pub struct RunnerHandle {
    cancel_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

impl RunnerHandle {
    pub fn request_stop(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_running(&self) -> bool {
        !*self.done_rx.borrow()
    }

    /// Wait for the worker to finish. Returns `true` if it finished
    /// within the timeout.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut rx = self.done_rx.clone();
        let finished = async move {
            while !*rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        };
        tokio::time::timeout(timeout, finished).await.is_ok()
    }
}

/// Exclusive writer for the per-build log file.
///
/// Lines are flushed as they are written so the tailer's offset-based
/// reads only ever observe whole flushes.
struct BuildLogFile {
    file: std::fs::File,
}

impl BuildLogFile {
    fn create(path: &Utf8Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            file: std::fs::File::create(path)?,
        })
    }

    /// Append one `[timestamp] [INFO] message` line. Write failures are
    /// swallowed; a broken log file must not take the build down.
    fn write_line(&mut self, message: &str) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let _ = writeln!(self.file, "[{timestamp}] [INFO] {message}");
        let _ = self.file.flush();
    }
}

/// Executes rendered build commands as cancellable background tasks.
pub struct ProcessRunner {
    /// Fallback when no keyword matched: a trailing `NN%` on the line.
    percent_pattern: Regex,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            percent_pattern: Regex::new(r"(\d+)%\s*$").expect("invalid percent regex"),
        }
    }

    /// Start executing `task`'s command in the background.
    ///
    /// The runner transitions the task `Pending → Running` and finally to
    /// `Completed` or `Failed`; the terminal outcome is also sent on
    /// `events`. The returned handle controls cancellation.
    pub fn start(
        &self,
        task: SharedBuildTask,
        events: mpsc::UnboundedSender<RunnerEvent>,
    ) -> RunnerHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);
        let percent_pattern = self.percent_pattern.clone();

        tokio::spawn(async move {
            run_build(task, events, cancel_rx, percent_pattern).await;
            let _ = done_tx.send(true);
        });

        RunnerHandle { cancel_tx, done_rx }
    }

    /// Estimate overall progress from one output line.
    ///
    /// Keyword table first (first match wins), then the trailing-percent
    /// fallback. `None` leaves the estimate unchanged. The estimate is
    /// not clamped to be monotonic; a late "starting" line can lower it,
    /// exactly as the keyword table dictates.
    pub fn parse_progress(&self, line: &str) -> Option<u8> {
        estimate_progress(&self.percent_pattern, line)
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_build(
    task: SharedBuildTask,
    events: mpsc::UnboundedSender<RunnerEvent>,
    mut cancel_rx: watch::Receiver<bool>,
    percent_pattern: Regex,
) {
    let (command, log_path) = {
        let mut guard = task.write().unwrap();
        guard.status = TaskStatus::Running;
        guard.start_time = Some(Local::now());
        (guard.command.clone(), guard.log_file_path.clone())
    };

    let Some(log_path) = log_path else {
        fail(&task, &events, "no log file path configured for build task");
        return;
    };

    let mut log = match BuildLogFile::create(&log_path) {
        Ok(log) => log,
        Err(e) => {
            fail(&task, &events, format!("unable to create log file: {e}"));
            return;
        }
    };

    log.write_line(&format!(
        "Build started: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    log.write_line(&format!("Command: {command}"));
    log.write_line(&"=".repeat(80));

    let parts = split_command(&command);
    if parts.is_empty() {
        log.write_line("Error: empty command");
        fail(&task, &events, "empty command");
        return;
    }

    let mut cmd = Command::new(&parts[0]);
    cmd.args(&parts[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    // Own process group so cancellation can take the whole tree down.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            // Spawn failure: the task fails without ever having had a
            // live process behind it.
            let message = format!("failed to launch compiler: {e}");
            log.write_line(&format!("Error: {message}"));
            fail(&task, &events, message);
            return;
        }
    };

    tracing::info!("Spawned build process (pid {:?})", child.id());

    // Merge stdout and stderr into one line-oriented stream.
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(BufReader::new(stdout), line_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(BufReader::new(stderr), line_tx.clone()));
    }
    drop(line_tx);

    let mut cancelled = false;
    let mut cancel_armed = true;
    loop {
        tokio::select! {
            maybe_line = line_rx.recv() => {
                match maybe_line {
                    Some(line) => {
                        handle_output_line(&task, &mut log, &percent_pattern, &line);
                    }
                    // Both pipes closed: the process is exiting.
                    None => break,
                }
            }
            changed = cancel_rx.changed(), if cancel_armed && !cancelled => {
                match changed {
                    Ok(()) if *cancel_rx.borrow() => {
                        cancelled = true;
                        kill_process_tree(&mut child).await;
                    }
                    Ok(()) => {}
                    // Handle dropped without a stop request; nothing to watch.
                    Err(_) => cancel_armed = false,
                }
            }
        }
    }

    let exit = child.wait().await;

    if cancelled {
        log.write_line(CANCELLED_MESSAGE);
        let mut guard = task.write().unwrap();
        guard.exit_code = exit.as_ref().ok().and_then(|s| s.code());
        guard.finish(TaskStatus::Failed, None);
        drop(guard);
        let _ = events.send(RunnerEvent::Failed {
            message: CANCELLED_MESSAGE.to_string(),
        });
        return;
    }

    match exit {
        Ok(status) => {
            let exit_code = status.code().unwrap_or(-1);
            log.write_line(&"=".repeat(80));
            if exit_code == 0 {
                log.write_line(&format!("Build succeeded, exit code: {exit_code}"));
                log.write_line(&format!(
                    "Build finished: {}",
                    Local::now().format("%Y-%m-%d %H:%M:%S")
                ));
                task.write().unwrap().finish(TaskStatus::Completed, Some(exit_code));
                let _ = events.send(RunnerEvent::Finished { exit_code });
            } else {
                let message = format!("build failed with exit code {exit_code}");
                log.write_line(&message);
                log.write_line(&format!(
                    "Build finished: {}",
                    Local::now().format("%Y-%m-%d %H:%M:%S")
                ));
                task.write().unwrap().finish(TaskStatus::Failed, Some(exit_code));
                let _ = events.send(RunnerEvent::Failed { message });
            }
        }
        Err(e) => {
            let message = format!("failed to wait for build process: {e}");
            log.write_line(&format!("Error: {message}"));
            fail(&task, &events, message);
        }
    }
}

/// Record one line of compiler output: in-memory log, log file, progress.
fn handle_output_line(
    task: &SharedBuildTask,
    log: &mut BuildLogFile,
    percent_pattern: &Regex,
    line: &str,
) {
    log.write_line(line);

    let progress = estimate_progress(percent_pattern, line);
    let mut guard = task.write().unwrap();
    guard.logs.push(LogEntry::tool(line));
    if let Some(progress) = progress {
        guard.progress = progress;
    }
}

fn estimate_progress(percent_pattern: &Regex, line: &str) -> Option<u8> {
    let lower = line.to_lowercase();
    for (keyword, value) in PROGRESS_KEYWORDS {
        if lower.contains(keyword) {
            return Some(*value);
        }
    }
    percent_pattern
        .captures(line)
        .and_then(|c| c[1].parse::<u32>().ok())
        .map(|v| v.min(100) as u8)
}

async fn forward_lines<R: AsyncBufRead + Unpin>(
    reader: R,
    tx: mpsc::UnboundedSender<String>,
) {
    let mut lines = reader.lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).is_err() {
            break;
        }
    }
}

fn fail(
    task: &SharedBuildTask,
    events: &mpsc::UnboundedSender<RunnerEvent>,
    message: impl Into<String>,
) {
    let message = message.into();
    tracing::error!("Build failed: {message}");
    task.write().unwrap().finish(TaskStatus::Failed, None);
    let _ = events.send(RunnerEvent::Failed { message });
}

/// Forcefully terminate the child and all of its descendants.
///
/// Windows: `taskkill /F /T` on the child pid. Unix: signal the child's
/// process group (the child was spawned as a group leader). Either path
/// falls back to terminate-then-kill on the direct child if the tree
/// tooling is unavailable.
async fn kill_process_tree(child: &mut Child) {
    let Some(pid) = child.id() else {
        // Already reaped.
        return;
    };

    #[cfg(windows)]
    {
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            Command::new("taskkill")
                .args(["/F", "/T", "/PID", &pid.to_string()])
                .output(),
        )
        .await;
        match result {
            Ok(Ok(output)) if output.status.success() => return,
            Ok(Ok(output)) => {
                tracing::warn!("taskkill exited with {:?}, falling back", output.status.code());
            }
            Ok(Err(e)) => tracing::warn!("taskkill unavailable ({e}), falling back"),
            Err(_) => tracing::warn!("taskkill timed out, falling back"),
        }
    }

    #[cfg(unix)]
    {
        // Negative pid addresses the whole process group.
        let group = format!("-{pid}");
        match Command::new("kill").args(["-KILL", &group]).status().await {
            Ok(status) if status.success() => return,
            Ok(status) => {
                tracing::warn!("group kill exited with {:?}, falling back", status.code());
            }
            Err(e) => tracing::warn!("group kill unavailable ({e}), falling back"),
        }
    }

    terminate_child_fallback(child).await;
}

/// Last-resort termination of the direct child only: graceful signal,
/// bounded wait, then hard kill.
async fn terminate_child_fallback(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let _ = Command::new("kill").arg(pid.to_string()).status().await;
        if tokio::time::timeout(Duration::from_secs(3), child.wait())
            .await
            .is_ok()
        {
            return;
        }
    }

    let _ = child.start_kill();
    let _ = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;
}
