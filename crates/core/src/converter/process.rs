//! Supervision of one external transcoding process.
//!
//! A [`ProcessHandle`] is the consumer side: diagnostic lines, a cloneable
//! [`Terminator`] and the exit outcome. A [`ProcessDriver`] is the producer
//! side, owned by whatever runs the process (the real supervisor below, or
//! a scripted one in tests).

use std::collections::VecDeque;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::error::ConverterError;
use crate::metrics;

/// Lines buffered between the stderr reader and the consumer.
const LINE_BUFFER: usize = 256;

/// How long to wait for stderr EOF once the child is reaped.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
    /// A stop was requested before the process was reaped.
    pub terminated: bool,
}

#[derive(Debug)]
struct DiagnosticTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl DiagnosticTail {
    fn push(&mut self, line: &str) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }
}

type SharedTail = Arc<Mutex<DiagnosticTail>>;

fn lock_tail(tail: &SharedTail) -> MutexGuard<'_, DiagnosticTail> {
    tail.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Stops the process behind a [`ProcessHandle`].
///
/// Dropping every clone (and the handle) counts as a stop request.
#[derive(Debug, Clone)]
pub struct Terminator {
    job_id: Arc<str>,
    request: Arc<watch::Sender<bool>>,
    exited: watch::Receiver<bool>,
}

impl Terminator {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Whether a stop has been requested.
    pub fn is_requested(&self) -> bool {
        *self.request.borrow()
    }

    /// Whether the process has been reaped.
    pub fn has_exited(&self) -> bool {
        *self.exited.borrow()
    }

    /// Requests a graceful stop and waits until the process is reaped.
    ///
    /// Safe to call repeatedly and after a natural exit.
    pub async fn terminate(&self) {
        if !self.request.send_replace(true) {
            debug!(job_id = %self.job_id, "Stop requested");
        }
        let mut exited = self.exited.clone();
        // Err means the supervisor is gone, which also means nothing is running
        let _ = exited.wait_for(|done| *done).await;
    }
}

/// Producer-side line sink. Never blocks: when the consumer lags, progress
/// lines are dropped but the diagnostic tail still records them.
#[derive(Debug, Clone)]
pub struct LineSink {
    lines: mpsc::Sender<String>,
    tail: SharedTail,
}

impl LineSink {
    pub fn emit(&self, line: impl Into<String>) {
        let line = line.into();
        lock_tail(&self.tail).push(&line);
        // Full or closed both mean nobody needs this line right now
        let _ = self.lines.try_send(line);
    }
}

/// Producer side of a [`ProcessHandle`].
#[derive(Debug)]
pub struct ProcessDriver {
    sink: LineSink,
    exit: oneshot::Sender<ProcessExit>,
    stop: watch::Receiver<bool>,
    exited: watch::Sender<bool>,
}

impl ProcessDriver {
    /// Sends one diagnostic line.
    pub fn emit(&self, line: impl Into<String>) {
        self.sink.emit(line);
    }

    /// A sink that can be moved into a reader task.
    pub fn sink(&self) -> LineSink {
        self.sink.clone()
    }

    /// Whether a stop has been requested (or every terminator dropped).
    pub fn stop_requested(&self) -> bool {
        *self.stop.borrow() || self.stop.has_changed().is_err()
    }

    /// Resolves once a stop is requested or every terminator is dropped.
    pub async fn stopped(&mut self) {
        let _ = self.stop.wait_for(|requested| *requested).await;
    }

    /// Publishes the exit outcome and wakes every waiting terminator.
    pub fn finish(self, exit: ProcessExit) {
        let Self {
            sink, exit: tx, exited, ..
        } = self;
        drop(sink);
        let _ = tx.send(exit);
        exited.send_replace(true);
    }
}

/// Live reference to one running transcoding process.
#[derive(Debug)]
pub struct ProcessHandle {
    lines: mpsc::Receiver<String>,
    exit: oneshot::Receiver<ProcessExit>,
    terminator: Terminator,
    tail: SharedTail,
}

impl ProcessHandle {
    /// Creates a connected handle/driver pair.
    pub fn channel(job_id: impl Into<String>, tail_lines: usize) -> (Self, ProcessDriver) {
        let (lines_tx, lines_rx) = mpsc::channel(LINE_BUFFER);
        let (exit_tx, exit_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (exited_tx, exited_rx) = watch::channel(false);
        let tail = Arc::new(Mutex::new(DiagnosticTail {
            lines: VecDeque::with_capacity(tail_lines),
            capacity: tail_lines,
        }));

        let job_id: String = job_id.into();
        let handle = Self {
            lines: lines_rx,
            exit: exit_rx,
            terminator: Terminator {
                job_id: Arc::from(job_id.as_str()),
                request: Arc::new(stop_tx),
                exited: exited_rx,
            },
            tail: tail.clone(),
        };
        let driver = ProcessDriver {
            sink: LineSink {
                lines: lines_tx,
                tail,
            },
            exit: exit_tx,
            stop: stop_rx,
            exited: exited_tx,
        };
        (handle, driver)
    }

    pub fn job_id(&self) -> &str {
        self.terminator.job_id()
    }

    /// A cloneable stop control for this process.
    pub fn terminator(&self) -> Terminator {
        self.terminator.clone()
    }

    /// Next diagnostic line; `None` once the stream is closed.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// The most recent diagnostic lines, newline-joined.
    pub fn diagnostic_tail(&self) -> String {
        let tail = lock_tail(&self.tail);
        tail.lines
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Drains the remaining lines and waits for the exit outcome.
    pub async fn wait(mut self) -> Result<(), ConverterError> {
        while self.lines.recv().await.is_some() {}

        let exit = (&mut self.exit)
            .await
            .map_err(|_| ConverterError::Io(io::Error::other("process supervisor went away")))?;

        if exit.terminated || self.terminator.is_requested() {
            return Err(ConverterError::Terminated);
        }

        match exit.code {
            Some(0) => Ok(()),
            code => Err(ConverterError::Encode {
                code,
                diagnostic_tail: self.diagnostic_tail(),
            }),
        }
    }
}

/// Spawns `command` with stderr captured and supervises it until exit.
pub fn spawn_supervised(
    mut command: Command,
    job_id: &str,
    grace: Duration,
    tail_lines: usize,
) -> Result<ProcessHandle, ConverterError> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();

    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| ConverterError::spawn(&program, e.to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ConverterError::spawn(&program, "stderr was not captured"))?;

    let (handle, driver) = ProcessHandle::channel(job_id, tail_lines);
    debug!(job_id, pid = ?child.id(), program = %program, "Process started");
    tokio::spawn(supervise(child, stderr, driver, grace));
    Ok(handle)
}

async fn supervise(mut child: Child, stderr: ChildStderr, mut driver: ProcessDriver, grace: Duration) {
    let pid = child.id();
    metrics::PROCESSES_ACTIVE.inc();
    let mut reader = tokio::spawn(drain_lines(stderr, driver.sink()));

    let natural = tokio::select! {
        status = child.wait() => Some(status),
        _ = driver.stopped() => None,
    };
    let (status, stopped) = match natural {
        Some(status) => (status, false),
        None => (stop_child(&mut child, grace).await, true),
    };
    metrics::PROCESSES_ACTIVE.dec();

    if timeout(READER_DRAIN_TIMEOUT, &mut reader).await.is_err() {
        // a grandchild may still hold the pipe open
        debug!(?pid, "stderr still open after exit, abandoning reader");
        reader.abort();
    }

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            warn!(?pid, error = %e, "Failed to reap process");
            None
        }
    };
    let terminated = stopped || driver.stop_requested();
    debug!(?pid, ?code, terminated, "Process exited");
    driver.finish(ProcessExit { code, terminated });
}

/// SIGTERM, then kill once the grace period runs out.
async fn stop_child(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) => match timeout(grace, child.wait()).await {
                    Ok(status) => return status,
                    Err(_) => warn!(pid, "Process ignored SIGTERM, killing"),
                },
                Err(e) => debug!(pid, error = %e, "SIGTERM failed, killing"),
            }
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    child.kill().await?;
    child.wait().await
}

async fn drain_lines(stderr: ChildStderr, sink: LineSink) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                sink.emit(line.trim_end_matches(['\r', '\n']));
            }
            Err(e) => {
                debug!(error = %e, "stderr read failed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_success() {
        let (mut handle, driver) = ProcessHandle::channel("job-1", 4);
        driver.emit("out_time_us=1000000");
        driver.emit("progress=end");
        driver.finish(ProcessExit {
            code: Some(0),
            terminated: false,
        });

        assert_eq!(handle.next_line().await.as_deref(), Some("out_time_us=1000000"));
        assert!(handle.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_channel_encode_error_carries_tail() {
        let (handle, driver) = ProcessHandle::channel("job-1", 2);
        driver.emit("line one");
        driver.emit("line two");
        driver.emit("Conversion failed!");
        driver.finish(ProcessExit {
            code: Some(1),
            terminated: false,
        });

        match handle.wait().await {
            Err(ConverterError::Encode {
                code,
                diagnostic_tail,
            }) => {
                assert_eq!(code, Some(1));
                assert_eq!(diagnostic_tail, "line two\nConversion failed!");
            }
            other => panic!("expected encode error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_terminator_waits_for_exit() {
        let (handle, mut driver) = ProcessHandle::channel("job-1", 4);
        let terminator = handle.terminator();

        let producer = tokio::spawn(async move {
            driver.stopped().await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            driver.finish(ProcessExit {
                code: None,
                terminated: true,
            });
        });

        terminator.terminate().await;
        assert!(terminator.has_exited());
        assert!(matches!(handle.wait().await, Err(ConverterError::Terminated)));
        producer.await.unwrap();

        // a second call returns immediately
        terminator.terminate().await;
    }

    #[tokio::test]
    async fn test_dropping_handle_requests_stop() {
        let (handle, mut driver) = ProcessHandle::channel("job-1", 4);
        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), driver.stopped())
            .await
            .expect("stop should be observed");
        assert!(driver.stop_requested());
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let command = Command::new("/nonexistent/avcnv-ffmpeg");
        let result = spawn_supervised(command, "job-1", Duration::from_millis(100), 4);
        assert!(matches!(result, Err(ConverterError::Spawn { .. })));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;

        fn sh(script: &str) -> Command {
            let mut command = Command::new("sh");
            command.arg("-c").arg(script);
            command
        }

        #[tokio::test]
        async fn test_real_process_success() {
            let mut handle = spawn_supervised(
                sh("echo out_time_us=500000 >&2; echo progress=end >&2"),
                "job-1",
                Duration::from_secs(1),
                8,
            )
            .unwrap();

            assert_eq!(handle.next_line().await.as_deref(), Some("out_time_us=500000"));
            assert!(handle.wait().await.is_ok());
        }

        #[tokio::test]
        async fn test_real_process_failure() {
            let handle = spawn_supervised(
                sh("echo 'Invalid data found when processing input' >&2; exit 3"),
                "job-1",
                Duration::from_secs(1),
                8,
            )
            .unwrap();

            match handle.wait().await {
                Err(ConverterError::Encode {
                    code,
                    diagnostic_tail,
                }) => {
                    assert_eq!(code, Some(3));
                    assert!(diagnostic_tail.contains("Invalid data"));
                }
                other => panic!("expected encode error, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_real_process_terminate() {
            let mut handle = spawn_supervised(
                sh("echo started >&2; exec sleep 30"),
                "job-1",
                Duration::from_secs(5),
                8,
            )
            .unwrap();
            assert_eq!(handle.next_line().await.as_deref(), Some("started"));

            let terminator = handle.terminator();
            tokio::time::timeout(Duration::from_secs(5), terminator.terminate())
                .await
                .expect("SIGTERM should stop sleep promptly");
            assert!(terminator.has_exited());
            assert!(matches!(handle.wait().await, Err(ConverterError::Terminated)));
        }

        #[tokio::test]
        async fn test_real_process_killed_after_grace() {
            let mut handle = spawn_supervised(
                sh("trap '' TERM; echo ready >&2; while true; do sleep 0.1; done"),
                "job-1",
                Duration::from_millis(200),
                8,
            )
            .unwrap();
            assert_eq!(handle.next_line().await.as_deref(), Some("ready"));

            let terminator = handle.terminator();
            tokio::time::timeout(Duration::from_secs(5), terminator.terminate())
                .await
                .expect("kill should follow the grace period");
            assert!(matches!(handle.wait().await, Err(ConverterError::Terminated)));
        }
    }
}
