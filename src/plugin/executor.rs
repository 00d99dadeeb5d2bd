//! Plugin process execution
//!
//! [`PluginExecutor`] spawns plugin binaries and [`PluginProcess`] drives one
//! running instance through the handshake and, later, the stop sequence.
//! [`ProcessExecutor`] is the stdio implementation used in production.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::protocol::{ControlRequest, HandshakeError, HandshakeRequest, HandshakeResponse};

/// Interval between liveness checks while waiting for a plugin to exit
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How a plugin process ended after a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process exited on its own within the timeout
    Graceful,

    /// The process ignored the stop request and was killed
    Forced,

    /// The process was already gone when stop was requested
    AlreadyExited,
}

/// Spawns plugin processes
pub trait PluginExecutor: Send + Sync {
    /// Starts the binary at `path`
    fn spawn(&self, path: &Path) -> std::io::Result<Box<dyn PluginProcess>>;
}

/// A running plugin instance
pub trait PluginProcess: Send {
    /// OS process id, if there is one
    fn id(&self) -> Option<u32>;

    /// Sends the handshake request and waits for the plugin's response
    fn handshake(
        &mut self,
        request: &HandshakeRequest,
        timeout: Duration,
    ) -> Result<HandshakeResponse, HandshakeError>;

    /// Asks the plugin to stop, killing it if it outlives `timeout`
    fn stop(&mut self, timeout: Duration) -> std::io::Result<StopOutcome>;

    /// Terminates the plugin immediately
    fn kill(&mut self) -> std::io::Result<()>;
}

/// Executor that runs plugins as child processes speaking JSON over stdio
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl PluginExecutor for ProcessExecutor {
    fn spawn(&self, path: &Path) -> std::io::Result<Box<dyn PluginProcess>> {
        Ok(Box::new(ProcessHandle::spawn(path)?))
    }
}

/// A child process and the pipes connected to it
///
/// Dropping a handle whose process is still running kills the process.
pub struct ProcessHandle {
    child: Child,
    stdin: Option<ChildStdin>,
    lines: Receiver<String>,
    label: String,
}

impl ProcessHandle {
    /// Starts the binary at `path` with all three stdio streams piped
    pub fn spawn(path: &Path) -> std::io::Result<Self> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let pid = child.id();
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        // Both pipes are drained on their own threads so a chatty plugin never
        // blocks on a full pipe. Each thread inherits the caller's dispatcher.
        let dispatch = tracing::dispatcher::get_default(|d| d.clone());

        let (tx, lines) = mpsc::sync_channel(1);
        if let Some(stdout) = child.stdout.take() {
            let dispatch = dispatch.clone();
            let label = label.clone();
            thread::spawn(move || {
                tracing::dispatcher::with_default(&dispatch, || {
                    let mut reader = BufReader::new(stdout).lines();

                    // Only the handshake line is handed over; the sender is
                    // dropped with it so nothing accumulates afterwards.
                    for line in reader.by_ref() {
                        match line {
                            Ok(line) if line.trim().is_empty() => continue,
                            Ok(line) => {
                                let _ = tx.send(line);
                                break;
                            }
                            Err(e) => {
                                debug!(plugin = %label, pid, error = %e, "plugin stdout closed");
                                return;
                            }
                        }
                    }
                    drop(tx);

                    for line in reader.map_while(Result::ok) {
                        debug!(plugin = %label, pid, stream = "stdout", "{}", line);
                    }
                });
            });
        }

        if let Some(stderr) = child.stderr.take() {
            let label = label.clone();
            thread::spawn(move || {
                tracing::dispatcher::with_default(&dispatch, || {
                    for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                        debug!(plugin = %label, pid, stream = "stderr", "{}", line);
                    }
                });
            });
        }

        let stdin = child.stdin.take();
        Ok(Self {
            child,
            stdin,
            lines,
            label,
        })
    }

    fn send<T: serde::Serialize>(&mut self, message: &T) -> std::io::Result<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "plugin stdin is closed")
        })?;
        let json = serde_json::to_string(message)?;
        writeln!(stdin, "{}", json)?;
        stdin.flush()
    }

    fn exit_status(&mut self) -> String {
        match self.child.try_wait() {
            Ok(Some(status)) => status.to_string(),
            Ok(None) => "stdout closed".to_string(),
            Err(e) => e.to_string(),
        }
    }
}

impl PluginProcess for ProcessHandle {
    fn id(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn handshake(
        &mut self,
        request: &HandshakeRequest,
        timeout: Duration,
    ) -> Result<HandshakeResponse, HandshakeError> {
        // A plugin that exits without reading stdin makes this write fail;
        // report that as an early exit rather than an I/O error.
        if let Err(e) = self.send(request) {
            if let Ok(Some(status)) = self.child.try_wait() {
                return Err(HandshakeError::Exited(status.to_string()));
            }
            return Err(HandshakeError::Io(e));
        }

        match self.lines.recv_timeout(timeout) {
            Ok(line) => HandshakeResponse::parse(&line),
            Err(RecvTimeoutError::Timeout) => Err(HandshakeError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                // Give the process a moment to be reaped so the status is accurate
                let _ = wait_for_exit(&mut self.child, Duration::from_millis(100));
                Err(HandshakeError::Exited(self.exit_status()))
            }
        }
    }

    fn stop(&mut self, timeout: Duration) -> std::io::Result<StopOutcome> {
        if self.child.try_wait()?.is_some() {
            return Ok(StopOutcome::AlreadyExited);
        }

        if let Err(e) = self.send(&ControlRequest::stop()) {
            debug!(plugin = %self.label, error = %e, "could not deliver stop request");
        }
        // Closing stdin doubles as a stop signal for plugins reading until EOF
        self.stdin.take();

        if wait_for_exit(&mut self.child, timeout)? {
            return Ok(StopOutcome::Graceful);
        }

        warn!(
            plugin = %self.label,
            pid = self.child.id(),
            timeout_ms = timeout.as_millis() as u64,
            "plugin ignored stop request, killing"
        );
        self.kill()?;
        Ok(StopOutcome::Forced)
    }

    fn kill(&mut self) -> std::io::Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        match self.child.kill() {
            Ok(()) => {}
            // Exited between the check and the kill
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e),
        }
        self.child.wait().map(|_| ())
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Polls until the child exits or `timeout` elapses; returns true if it exited
fn wait_for_exit(child: &mut Child, timeout: Duration) -> std::io::Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        if child.try_wait()?.is_some() {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::plugin::testing::write_script;
    use tempfile::TempDir;

    const GOOD_REPLY: &str =
        r#"{"protocol":1,"name":"script","version":2,"type":"processor","metrics":[]}"#;

    fn spawn(path: &Path) -> Box<dyn PluginProcess> {
        ProcessExecutor::new().spawn(path).unwrap()
    }

    #[test]
    fn handshake_and_graceful_stop() {
        let dir = TempDir::new().unwrap();
        let script = write_script(
            dir.path(),
            "pulse-processor-script",
            &format!("read req\necho '{}'\nread op\nexit 0", GOOD_REPLY),
        );

        let mut process = spawn(&script);
        let response = process
            .handshake(&HandshakeRequest::new(None), Duration::from_secs(5))
            .unwrap();

        assert_eq!(response.meta.name, "script");
        assert_eq!(response.meta.version, 2);
        assert_eq!(
            process.stop(Duration::from_secs(5)).unwrap(),
            StopOutcome::Graceful
        );
    }

    #[test]
    fn handshake_times_out() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "pulse-collector-mute", "exec sleep 30");

        let mut process = spawn(&script);
        let err = process
            .handshake(&HandshakeRequest::new(None), Duration::from_millis(200))
            .unwrap_err();

        assert!(matches!(err, HandshakeError::Timeout(_)));
        process.kill().unwrap();
    }

    #[test]
    fn handshake_reports_early_exit() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "pulse-collector-crash", "exit 3");

        let mut process = spawn(&script);
        let err = process
            .handshake(&HandshakeRequest::new(None), Duration::from_secs(5))
            .unwrap_err();

        assert!(matches!(err, HandshakeError::Exited(_) | HandshakeError::Io(_)));
    }

    #[test]
    fn output_after_handshake_is_not_buffered() {
        let dir = TempDir::new().unwrap();
        let script = write_script(
            dir.path(),
            "pulse-collector-chatty",
            &format!("read req\necho '{}'\nexec yes metric-line", GOOD_REPLY),
        );

        let mut handle = ProcessHandle::spawn(&script).unwrap();
        handle
            .handshake(&HandshakeRequest::new(None), Duration::from_secs(5))
            .unwrap();
        thread::sleep(Duration::from_millis(300));

        // The channel closes after the handshake line; later output is drained
        assert!(matches!(
            handle.lines.try_recv(),
            Err(mpsc::TryRecvError::Disconnected)
        ));
        assert_eq!(
            handle.stop(Duration::from_millis(200)).unwrap(),
            StopOutcome::Forced
        );
    }

    #[test]
    fn stubborn_plugin_is_killed() {
        let dir = TempDir::new().unwrap();
        let script = write_script(
            dir.path(),
            "pulse-collector-stubborn",
            &format!("read req\necho '{}'\nexec sleep 30", GOOD_REPLY),
        );

        let mut process = spawn(&script);
        process
            .handshake(&HandshakeRequest::new(None), Duration::from_secs(5))
            .unwrap();

        assert_eq!(
            process.stop(Duration::from_millis(200)).unwrap(),
            StopOutcome::Forced
        );
    }
}
