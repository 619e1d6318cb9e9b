use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Fixed name of the per-build tool log, created under the output directory.
pub const BUILD_LOG_FILENAME: &str = "nuitka_build.log";

/// Lifecycle of one build attempt.
///
/// `Pending → Running → {Completed | Failed}`; the terminal states are
/// never left. Cancellation lands on `Failed` with a distinct message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Where a log line came from: the compiler subprocess or this application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSource {
    Tool,
    App,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
    pub source: LogSource,
}

impl LogEntry {
    pub fn tool(message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level: LogLevel::Info,
            message: message.into(),
            source: LogSource::Tool,
        }
    }

    pub fn app(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            message: message.into(),
            source: LogSource::App,
        }
    }
}

/// One attempt to invoke the compiler with a rendered command.
///
/// Created when the user triggers a build. Only the owning process runner
/// mutates it; everyone else reads through the shared lock.
#[derive(Debug, Clone)]
pub struct BuildTask {
    pub task_id: String,
    pub entry_file: String,
    pub output_dir: Utf8PathBuf,
    pub output_filename: String,
    pub icon_path: Option<Utf8PathBuf>,
    pub command: String,
    pub log_file_path: Option<Utf8PathBuf>,
    pub status: TaskStatus,
    /// Best-effort estimate, 0-100.
    pub progress: u8,
    pub start_time: Option<DateTime<Local>>,
    pub end_time: Option<DateTime<Local>>,
    pub exit_code: Option<i32>,
    pub logs: Vec<LogEntry>,
}

/// A build task behind the lock its runner and observers share.
pub type SharedBuildTask = Arc<RwLock<BuildTask>>;

impl BuildTask {
    pub fn new(
        entry_file: impl Into<String>,
        output_dir: impl AsRef<Utf8Path>,
        output_filename: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        let output_dir = output_dir.as_ref().to_path_buf();
        let log_file_path = Some(output_dir.join(BUILD_LOG_FILENAME));

        Self {
            task_id: Uuid::new_v4().to_string(),
            entry_file: entry_file.into(),
            output_dir,
            output_filename: output_filename.into(),
            icon_path: None,
            command: command.into(),
            log_file_path,
            status: TaskStatus::Pending,
            progress: 0,
            start_time: None,
            end_time: None,
            exit_code: None,
            logs: Vec::new(),
        }
    }

    pub fn into_shared(self) -> SharedBuildTask {
        Arc::new(RwLock::new(self))
    }

    /// Move to a terminal state, recording the end timestamp once.
    ///
    /// A task already in a terminal state is left untouched.
    pub fn finish(&mut self, status: TaskStatus, exit_code: Option<i32>) {
        if self.status.is_terminal() {
            return;
        }
        debug_assert!(status.is_terminal());
        self.status = status;
        self.end_time = Some(Local::now());
        if exit_code.is_some() {
            self.exit_code = exit_code;
        }
    }
}
