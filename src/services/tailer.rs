//! Periodic tailing of a growing build log.
//!
//! The tailer re-opens the log file on every poll and reads from a
//! remembered byte offset, so it tolerates the file not existing yet,
//! being deleted mid-build, and being replaced by a fresh file for the
//! next build. New complete lines are delivered as one batch per poll.

use camino::{Utf8Path, Utf8PathBuf};
use std::io::{Read, Seek, SeekFrom};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// How often the log file is polled for growth.
pub const POLL_INTERVAL: Duration = Duration::from_millis(15_000);

/// Output of the tail worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailerEvent {
    /// New complete lines since the previous poll, in file order.
    Batch(Vec<String>),
    /// An unexpected read error; the worker keeps polling.
    Error(String),
}

/// Handle to a running tail worker.
pub struct TailerHandle {
    cancel_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl TailerHandle {
    /// Ask the worker to stop after its current poll. Idempotent.
    pub fn request_stop(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_running(&self) -> bool {
        !*self.done_rx.borrow()
    }

    /// Wait for the worker to exit. Returns `true` if it exited within
    /// the timeout.
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

    /// Tear the worker down even if it is stuck in a read. Only used as
    /// the last step of a bounded shutdown.
    pub fn abort(&self) {
        if let Some(join) = self.join.lock().unwrap().take() {
            join.abort();
        }
    }
}

/// Per-file tail state: byte offset plus whether the file was seen on the
/// previous poll. Deletion resets both so a recreated file is read from
/// the start.
struct TailState {
    offset: u64,
    file_exists: bool,
}

/// Polls one log file and emits batches of newly appended lines.
pub struct LogTailer {
    interval: Duration,
}

impl LogTailer {
    pub fn new() -> Self {
        Self {
            interval: POLL_INTERVAL,
        }
    }

    /// Override the poll interval. Tests use short intervals.
    pub fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }

    /// Start tailing `path` in the background.
    ///
    /// The first poll happens immediately, so lines already in the file
    /// are delivered without waiting out an interval; a stop request
    /// triggers one final poll before the worker exits.
    pub fn start(
        &self,
        path: impl AsRef<Utf8Path>,
        events: mpsc::UnboundedSender<TailerEvent>,
    ) -> TailerHandle {
        let path = path.as_ref().to_path_buf();
        let interval = self.interval;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            tail_loop(path, interval, events, cancel_rx).await;
            let _ = done_tx.send(true);
        });

        TailerHandle {
            cancel_tx,
            done_rx,
            join: Mutex::new(Some(join)),
        }
    }
}

impl Default for LogTailer {
    fn default() -> Self {
        Self::new()
    }
}

async fn tail_loop(
    path: Utf8PathBuf,
    interval: Duration,
    events: mpsc::UnboundedSender<TailerEvent>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let mut state = TailState {
        offset: 0,
        file_exists: false,
    };
    let mut cancel_armed = true;

    loop {
        match poll_once(&path, &mut state) {
            Ok(Some(lines)) => {
                if events.send(TailerEvent::Batch(lines)).is_err() {
                    // Receiver gone; nobody is watching anymore.
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Error reading log file {path}: {e}");
                if events.send(TailerEvent::Error(e.to_string())).is_err() {
                    break;
                }
            }
        }

        // Polling before this check means a stop request always gets one
        // last poll, so lines written while stopping still go out.
        if *cancel_rx.borrow() {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = cancel_rx.changed(), if cancel_armed => {
                if changed.is_err() {
                    // Handle dropped without a stop request.
                    cancel_armed = false;
                }
            }
        }
    }
}

/// One poll of the file: detect deletion/recreation, read any growth past
/// the remembered offset, and split it into complete lines.
///
/// `Ok(None)` means nothing new. Expected transient conditions (file not
/// there yet, briefly locked, interrupted read) are absorbed silently.
fn poll_once(path: &Utf8Path, state: &mut TailState) -> std::io::Result<Option<Vec<String>>> {
    if !path.exists() {
        if state.file_exists {
            // Deleted since the last poll; a recreated file starts over.
            tracing::debug!("Log file {path} disappeared, resetting offset");
            state.offset = 0;
            state.file_exists = false;
        }
        return Ok(None);
    }

    if !state.file_exists {
        state.file_exists = true;
        state.offset = 0;
    }

    let mut file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if is_transient(&e) => return Ok(None),
        Err(e) => return Err(e),
    };

    let size = file.metadata()?.len();
    if size <= state.offset {
        // No growth; truncation in place is not expected for this file.
        return Ok(None);
    }

    file.seek(SeekFrom::Start(state.offset))?;
    let mut buffer = String::new();
    match file.read_to_string(&mut buffer) {
        Ok(_) => {}
        Err(e) if is_transient(&e) => return Ok(None),
        Err(e) => return Err(e),
    }
    state.offset += buffer.len() as u64;

    let lines: Vec<String> = buffer
        .lines()
        .map(|l| l.trim_end().to_string())
        .filter(|l| !l.is_empty())
        .collect();

    if lines.is_empty() {
        Ok(None)
    } else {
        Ok(Some(lines))
    }
}

fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::NotFound
            | std::io::ErrorKind::PermissionDenied
            | std::io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_log() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp.path().to_path_buf())
            .unwrap()
            .join("build.log");
        (temp, path)
    }

    #[test]
    fn test_poll_missing_file_is_quiet() {
        let (_temp, path) = temp_log();
        let mut state = TailState {
            offset: 0,
            file_exists: false,
        };
        assert_eq!(poll_once(&path, &mut state).unwrap(), None);
        assert!(!state.file_exists);
    }

    #[test]
    fn test_poll_reads_new_file_from_start() {
        let (_temp, path) = temp_log();
        std::fs::write(&path, "line one\nline two\n").unwrap();

        let mut state = TailState {
            offset: 0,
            file_exists: false,
        };
        let lines = poll_once(&path, &mut state).unwrap().unwrap();
        assert_eq!(lines, vec!["line one", "line two"]);
        assert!(state.file_exists);

        // No growth, no batch.
        assert_eq!(poll_once(&path, &mut state).unwrap(), None);
    }

    #[test]
    fn test_poll_delivers_only_growth() {
        let (_temp, path) = temp_log();
        std::fs::write(&path, "first\n").unwrap();

        let mut state = TailState {
            offset: 0,
            file_exists: false,
        };
        assert_eq!(
            poll_once(&path, &mut state).unwrap().unwrap(),
            vec!["first"]
        );

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "second").unwrap();
        writeln!(file, "third").unwrap();

        assert_eq!(
            poll_once(&path, &mut state).unwrap().unwrap(),
            vec!["second", "third"]
        );
    }

    #[test]
    fn test_poll_skips_blank_lines() {
        let (_temp, path) = temp_log();
        std::fs::write(&path, "one\n\n   \ntwo\n").unwrap();

        let mut state = TailState {
            offset: 0,
            file_exists: false,
        };
        assert_eq!(
            poll_once(&path, &mut state).unwrap().unwrap(),
            vec!["one", "two"]
        );
    }

    #[test]
    fn test_deletion_resets_offset() {
        let (_temp, path) = temp_log();
        std::fs::write(&path, "old contents\n").unwrap();

        let mut state = TailState {
            offset: 0,
            file_exists: false,
        };
        poll_once(&path, &mut state).unwrap();
        assert!(state.offset > 0);

        std::fs::remove_file(&path).unwrap();
        assert_eq!(poll_once(&path, &mut state).unwrap(), None);
        assert_eq!(state.offset, 0);

        // A fresh file for the next build is read from the beginning.
        std::fs::write(&path, "new build\n").unwrap();
        assert_eq!(
            poll_once(&path, &mut state).unwrap().unwrap(),
            vec!["new build"]
        );
    }

    #[tokio::test]
    async fn test_worker_delivers_batches_and_stops() {
        let (_temp, path) = temp_log();
        std::fs::write(&path, "alpha\nbeta\n").unwrap();

        let tailer = LogTailer::with_interval(Duration::from_millis(20));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = tailer.start(&path, tx);

        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(TailerEvent::Batch(lines))) => assert_eq!(lines, vec!["alpha", "beta"]),
            other => panic!("unexpected event: {other:?}"),
        }

        handle.request_stop();
        assert!(handle.wait(Duration::from_secs(5)).await);
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_first_batch_arrives_before_first_interval() {
        let (_temp, path) = temp_log();
        std::fs::write(&path, "early line\n").unwrap();

        // An interval far longer than the test; existing lines must not
        // wait it out.
        let tailer = LogTailer::with_interval(Duration::from_secs(3600));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = tailer.start(&path, tx);

        match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Some(TailerEvent::Batch(lines))) => assert_eq!(lines, vec!["early line"]),
            other => panic!("unexpected event: {other:?}"),
        }

        handle.request_stop();
        assert!(handle.wait(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_stop_runs_one_final_poll() {
        let (_temp, path) = temp_log();
        std::fs::write(&path, "first\n").unwrap();

        let tailer = LogTailer::with_interval(Duration::from_secs(3600));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = tailer.start(&path, tx);

        match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Some(TailerEvent::Batch(lines))) => assert_eq!(lines, vec!["first"]),
            other => panic!("unexpected event: {other:?}"),
        }

        // Written while the worker sleeps; stopping must still deliver it.
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "last words").unwrap();
        drop(file);

        handle.request_stop();
        assert!(handle.wait(Duration::from_secs(2)).await);

        match rx.try_recv() {
            Ok(TailerEvent::Batch(lines)) => assert_eq!(lines, vec!["last words"]),
            other => panic!("final batch missing: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stop_interrupts_long_sleep() {
        let (_temp, path) = temp_log();

        // A poll interval far longer than the test; stop must not wait it out.
        let tailer = LogTailer::with_interval(Duration::from_secs(3600));
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = tailer.start(&path, tx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.request_stop();
        assert!(handle.wait(Duration::from_secs(2)).await);
    }
}
