//! Managed process abstraction with output routing

use crate::config::OutputMode;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// Process status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Process is pending start
    Pending,
    /// Process is starting
    Starting,
    /// Process is running
    Running,
    /// Process has stopped with exit code
    Stopped(Option<i32>),
    /// Process failed to start
    Failed,
}

impl ProcessStatus {
    /// Check if process is running
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessStatus::Running | ProcessStatus::Starting)
    }

    /// Check if process has stopped
    pub fn is_stopped(&self) -> bool {
        matches!(self, ProcessStatus::Stopped(_) | ProcessStatus::Failed)
    }
}

/// Configuration for spawning a process
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Node instance name (for logging and the log file name)
    pub name: String,
    /// Resolved program path
    pub program: String,
    /// Command line arguments
    pub args: Vec<String>,
    /// Environment variables
    pub env: HashMap<String, String>,
    /// Working directory
    pub working_dir: Option<PathBuf>,
    /// Where stdout/stderr lines go
    pub output: OutputMode,
    /// Log file for OutputMode::Log
    pub log_path: Option<PathBuf>,
}

/// Event emitted by a managed process
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    /// Process started
    Started { pid: u32 },
    /// Process output line (stdout or stderr), screen mode only
    Output { line: String, is_stderr: bool },
    /// Process exited
    Exited { code: Option<i32> },
    /// Process failed to start
    Failed { error: String },
}

/// Where a reader task sends child output lines
enum OutputRoute {
    /// Through the event channel, to the launcher's own log
    Events(mpsc::UnboundedSender<(String, ProcessEvent)>),
    /// Appended to a per-node log file
    File(PathBuf),
}

/// A managed child process
pub struct ManagedProcess {
    /// Process configuration
    pub config: ProcessConfig,
    /// Current status
    pub status: ProcessStatus,
    /// Process ID (if running)
    pub pid: Option<u32>,
    /// Start time
    pub started_at: Option<Instant>,
    /// Child process handle
    child: Option<Child>,
    /// Event sender
    event_tx: Option<mpsc::UnboundedSender<(String, ProcessEvent)>>,
}

impl ManagedProcess {
    /// Create a new managed process
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            config,
            status: ProcessStatus::Pending,
            pid: None,
            started_at: None,
            child: None,
            event_tx: None,
        }
    }

    /// Set the event sender for this process
    pub fn with_event_sender(
        mut self,
        tx: mpsc::UnboundedSender<(String, ProcessEvent)>,
    ) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Pick the output route for a reader task
    fn output_route(&self) -> Option<OutputRoute> {
        match self.config.output {
            OutputMode::Log => {
                if let Some(path) = &self.config.log_path {
                    return Some(OutputRoute::File(path.clone()));
                }
                // no log file configured, fall back to the event channel
                self.event_tx.clone().map(OutputRoute::Events)
            }
            OutputMode::Screen => self.event_tx.clone().map(OutputRoute::Events),
        }
    }

    /// Start the process
    pub async fn start(&mut self) -> Result<(), ProcessError> {
        if self.status.is_running() {
            return Err(ProcessError::AlreadyRunning(self.config.name.clone()));
        }

        self.status = ProcessStatus::Starting;
        log::info!(
            "[{}] Starting: {} {}",
            self.config.name,
            self.config.program,
            self.config.args.join(" ")
        );

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .envs(&self.config.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.status = ProcessStatus::Failed;
                let error = format!("Failed to spawn process: {}", e);
                log::error!("[{}] {}", self.config.name, error);

                self.emit(ProcessEvent::Failed { error });

                return Err(ProcessError::SpawnFailed {
                    name: self.config.name.clone(),
                    source: e,
                });
            }
        };

        let pid = child.id().unwrap_or(0);
        self.pid = Some(pid);
        self.status = ProcessStatus::Running;
        self.started_at = Some(Instant::now());
        self.emit(ProcessEvent::Started { pid });

        if let Some(stdout) = child.stdout.take() {
            if let Some(route) = self.output_route() {
                route_lines(self.config.name.clone(), stdout, false, route);
            }
        }
        if let Some(stderr) = child.stderr.take() {
            if let Some(route) = self.output_route() {
                route_lines(self.config.name.clone(), stderr, true, route);
            }
        }

        self.child = Some(child);
        Ok(())
    }

    /// Stop the process gracefully (SIGTERM, then SIGKILL after timeout)
    pub async fn stop(&mut self, timeout: Duration) -> Result<(), ProcessError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        log::info!("[{}] Stopping process...", self.config.name);

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.pid {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = child.kill().await;
        }

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                let code = status.code();
                self.status = ProcessStatus::Stopped(code);
                log::info!("[{}] Process exited with code: {:?}", self.config.name, code);
                self.emit(ProcessEvent::Exited { code });
            }
            Ok(Err(e)) => {
                log::error!("[{}] Error waiting for process: {}", self.config.name, e);
                self.status = ProcessStatus::Stopped(None);
            }
            Err(_) => {
                log::warn!(
                    "[{}] Process did not exit within {:?}, forcing kill",
                    self.config.name,
                    timeout
                );

                #[cfg(unix)]
                {
                    use nix::sys::signal::{kill, Signal};
                    use nix::unistd::Pid;

                    if let Some(pid) = self.pid {
                        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
                    }
                }

                self.status = ProcessStatus::Stopped(None);
                self.emit(ProcessEvent::Exited { code: None });
            }
        }

        self.pid = None;
        Ok(())
    }

    /// Check if the process is still running, reaping it if it exited
    pub async fn check_status(&mut self) -> ProcessStatus {
        if let Some(child) = &mut self.child {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let code = status.code();
                    self.status = ProcessStatus::Stopped(code);
                    self.pid = None;
                    self.child = None;
                    self.emit(ProcessEvent::Exited { code });
                }
                Ok(None) => {
                    // still running
                }
                Err(e) => {
                    log::error!("[{}] Error checking process status: {}", self.config.name, e);
                }
            }
        }

        self.status
    }

    /// Get uptime duration
    pub fn uptime(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }

    fn emit(&self, event: ProcessEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send((self.config.name.clone(), event));
        }
    }
}

/// Spawn a reader task that forwards lines from a child stream
fn route_lines<R>(name: String, stream: R, is_stderr: bool, route: OutputRoute)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();

        match route {
            OutputRoute::Events(tx) => {
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = tx.send((name.clone(), ProcessEvent::Output { line, is_stderr }));
                }
            }
            OutputRoute::File(path) => {
                let file = match tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .await
                {
                    Ok(file) => file,
                    Err(e) => {
                        log::error!("[{}] Cannot open log file {}: {}", name, path.display(), e);
                        return;
                    }
                };

                let mut writer = BufWriter::new(file);
                while let Ok(Some(line)) = lines.next_line().await {
                    if writer.write_all(line.as_bytes()).await.is_err() {
                        break;
                    }
                    let _ = writer.write_all(b"\n").await;
                    let _ = writer.flush().await;
                }
            }
        }
    });
}

/// Errors that can occur with managed processes
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Process '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Failed to spawn process '{name}': {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
