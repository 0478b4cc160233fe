use crate::line_reader::LineReader;
use crate::{BridgeError, OutputLine};
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, watch};
use tokio::sync::mpsc::error::TryRecvError;

/// Lines buffered between the reader task and the consumer. The reader task
/// waits for capacity instead of dropping lines.
const OUTPUT_CHANNEL_CAPACITY: usize = 256;
const READ_CHUNK_SIZE: usize = 4096;
const TERMINATE_WAIT: Duration = Duration::from_secs(2);

/// Program, argument list, and environment for an engine launch.
///
/// Arguments are passed straight to the OS; nothing goes through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: Vec<(OsString, OsString)>,
    pub current_dir: Option<PathBuf>,
}

impl LaunchCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Human-readable command line for logs.
    pub fn display(&self) -> String {
        let mut out = self.program.display().to_string();
        for arg in &self.args {
            out.push(' ');
            out.push_str(&arg.to_string_lossy());
        }
        out
    }
}

/// Lifecycle of an [`EngineProcess`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Running,
    Terminated,
}

/// Result of a non-blocking poll on engine output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinePoll {
    Line(OutputLine),
    /// No complete line yet; the stream is still open.
    Pending,
    /// The engine closed its stdout and every line has been delivered.
    Closed,
}

/// Receiving side of an engine's stdout, fed by a background reader task.
#[derive(Debug)]
pub struct EngineOutput {
    rx: mpsc::Receiver<OutputLine>,
    closed: bool,
}

impl EngineOutput {
    /// Poll for the next line without blocking.
    pub fn poll_line(&mut self) -> LinePoll {
        if self.closed {
            return LinePoll::Closed;
        }
        match self.rx.try_recv() {
            Ok(line) => LinePoll::Line(line),
            Err(TryRecvError::Empty) => LinePoll::Pending,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                LinePoll::Closed
            }
        }
    }

    /// Next line if one is ready, `None` otherwise (including after EOF).
    pub fn read_line(&mut self) -> Option<OutputLine> {
        match self.poll_line() {
            LinePoll::Line(line) => Some(line),
            LinePoll::Pending | LinePoll::Closed => None,
        }
    }

    /// Wait for the next line. Returns `None` once the stream is closed.
    pub async fn next_line(&mut self) -> Option<OutputLine> {
        if self.closed {
            return None;
        }
        let line = self.rx.recv().await;
        if line.is_none() {
            self.closed = true;
        }
        line
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Asks the supervisor task of an [`EngineProcess`] to kill the engine.
///
/// Cloneable, so tasks that do not own the handle can still stop the engine.
#[derive(Debug, Clone)]
pub struct KillHandle {
    tx: mpsc::Sender<()>,
}

impl KillHandle {
    /// Request a kill without waiting for it. Repeated requests and requests
    /// after the engine exited are ignored.
    pub fn kill(&self) {
        if self.tx.try_send(()).is_ok() {
            tracing::debug!("Engine kill requested");
        }
    }
}

/// One spawned engine instance.
pub struct EngineProcess {
    command: LaunchCommand,
    state: ProcessState,
    /// Exit status published by the supervisor task once the child is reaped.
    exit: Option<watch::Receiver<Option<ExitStatus>>>,
    kill: Option<KillHandle>,
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    output: Option<EngineOutput>,
}

impl EngineProcess {
    /// Create a handle without spawning anything yet.
    pub fn new(command: LaunchCommand) -> Self {
        Self {
            command,
            state: ProcessState::NotStarted,
            exit: None,
            kill: None,
            pid: None,
            stdin: None,
            output: None,
        }
    }

    /// Create a handle and spawn the process.
    pub async fn start(command: LaunchCommand) -> Result<Self, BridgeError> {
        let mut process = Self::new(command);
        process.spawn().await?;
        Ok(process)
    }

    /// Spawn the process with piped stdin/stdout.
    ///
    /// A second call on a running handle is a no-op; a terminated handle
    /// cannot be restarted.
    #[tracing::instrument(level = "info", skip(self), fields(command = %self.command.display()))]
    pub async fn spawn(&mut self) -> Result<(), BridgeError> {
        match self.state {
            ProcessState::NotStarted => {}
            ProcessState::Running => {
                tracing::debug!("Engine process already running");
                return Ok(());
            }
            ProcessState::Terminated => return Err(BridgeError::NotRunning),
        }

        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .envs(self.command.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.command.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            tracing::error!("Failed to spawn engine: {}", e);
            BridgeError::spawn(self.command.program.display().to_string(), e)
        })?;

        // An early return drops `child`, and kill_on_drop reaps it.
        let stdin = child.stdin.take().ok_or(BridgeError::MissingPipe("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(BridgeError::MissingPipe("stdout"))?;
        let pid = child.id();
        tracing::info!(?pid, "Engine process spawned");

        let (tx, rx) = mpsc::channel::<OutputLine>(OUTPUT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut stdout = stdout;
            let mut reader = LineReader::new();
            let mut buf = vec![0u8; READ_CHUNK_SIZE];

            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => {
                        tracing::debug!(?pid, "Engine stdout EOF");
                        break;
                    }
                    Ok(n) => {
                        for line in reader.feed(&buf[..n]) {
                            tracing::trace!("UCI << {}", line);
                            if tx.send(line).await.is_err() {
                                tracing::debug!("Output receiver dropped, reader exiting");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("Error reading engine stdout: {}", e);
                        break;
                    }
                }
            }

            if let Some(line) = reader.finish() {
                tracing::trace!("UCI << {} (unterminated)", line);
                let _ = tx.send(line).await;
            }
            tracing::debug!("Output reader task exiting");
        });

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!("engine stderr: {}", line);
                }
            });
        }

        // The supervisor owns the child. Dropping every kill handle (this
        // process handle included) kills the engine, like kill_on_drop.
        let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);
        let (exit_tx, exit_rx) = watch::channel::<Option<ExitStatus>>(None);
        tokio::spawn(async move {
            let exited = tokio::select! {
                status = child.wait() => Some(status),
                _ = kill_rx.recv() => None,
            };
            let status = match exited {
                Some(status) => status,
                None => {
                    if let Err(e) = child.start_kill() {
                        tracing::debug!("Kill failed (process likely gone): {}", e);
                    }
                    child.wait().await
                }
            };
            match status {
                Ok(status) => {
                    tracing::info!(?pid, %status, "Engine process exited");
                    exit_tx.send_replace(Some(status));
                }
                Err(e) => tracing::warn!(?pid, "Failed to reap engine: {}", e),
            }
        });

        self.exit = Some(exit_rx);
        self.kill = Some(KillHandle { tx: kill_tx });
        self.pid = pid;
        self.stdin = Some(stdin);
        self.output = Some(EngineOutput { rx, closed: false });
        self.state = ProcessState::Running;
        Ok(())
    }

    pub fn command(&self) -> &LaunchCommand {
        &self.command
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Handle that kills this engine from another task.
    pub fn kill_handle(&self) -> Option<KillHandle> {
        self.kill.clone()
    }

    /// Current lifecycle state. A running child that has exited is observed
    /// here and moves the handle to `Terminated`.
    pub fn state(&mut self) -> ProcessState {
        if self.state == ProcessState::Running && self.has_exited() {
            self.mark_terminated();
        }
        self.state
    }

    fn has_exited(&self) -> bool {
        match &self.exit {
            // A closed channel means the supervisor is gone without a status.
            Some(exit) => exit.borrow().is_some() || exit.has_changed().is_err(),
            None => false,
        }
    }

    pub fn is_running(&mut self) -> bool {
        self.state() == ProcessState::Running
    }

    /// Write one line (newline appended) to the engine's stdin.
    pub async fn write_line(&mut self, text: &str) -> Result<(), BridgeError> {
        match self.state() {
            ProcessState::NotStarted => return Err(BridgeError::NotRunning),
            ProcessState::Terminated => {
                return Err(BridgeError::BrokenPipe(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "engine process has terminated",
                )))
            }
            ProcessState::Running => {}
        }

        let stdin = self.stdin.as_mut().ok_or_else(|| {
            BridgeError::BrokenPipe(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "engine stdin already closed",
            ))
        })?;

        tracing::trace!("UCI >> {}", text);
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(BridgeError::write)?;
        stdin.flush().await.map_err(BridgeError::write)?;
        Ok(())
    }

    /// Non-blocking poll on the engine's output.
    pub fn poll_line(&mut self) -> LinePoll {
        match self.output.as_mut() {
            Some(output) => output.poll_line(),
            None => LinePoll::Closed,
        }
    }

    /// Next complete output line, or `None` if none is ready.
    pub fn read_line(&mut self) -> Option<OutputLine> {
        self.output.as_mut().and_then(EngineOutput::read_line)
    }

    /// Hand the output stream to another task. Later reads on this handle
    /// return nothing.
    pub fn take_output(&mut self) -> Option<EngineOutput> {
        self.output.take()
    }

    /// Wait for the process to exit on its own.
    pub async fn wait(&mut self) -> Result<ExitStatus, BridgeError> {
        let exit = self.exit.as_mut().ok_or(BridgeError::NotRunning)?;
        let status = exit.wait_for(Option::is_some).await.map(|status| *status);
        self.mark_terminated();
        match status {
            Ok(Some(status)) => Ok(status),
            _ => Err(BridgeError::Io(io::Error::other(
                "engine exit status unavailable",
            ))),
        }
    }

    /// Ask the engine to quit, then kill it if it has not exited within
    /// `timeout`. The process is always terminated afterwards.
    #[tracing::instrument(level = "debug", skip(self), fields(pid = ?self.pid))]
    pub async fn quit(&mut self, timeout: Duration) -> Result<(), BridgeError> {
        let sent = self.write_line("quit").await;
        match &sent {
            Ok(()) => {
                // Closing stdin also unblocks engines waiting on a read.
                self.stdin.take();
                match tokio::time::timeout(timeout, self.wait()).await {
                    Ok(Ok(status)) => tracing::info!(%status, "Engine exited after quit"),
                    Ok(Err(e)) => tracing::warn!("Failed to wait for engine: {}", e),
                    Err(_) => tracing::warn!("Engine ignored quit for {:?}, killing", timeout),
                }
            }
            Err(e) => tracing::warn!("Failed to send quit: {}", e),
        }

        self.terminate().await;
        sent
    }

    /// Best-effort kill. Safe to call repeatedly.
    pub async fn terminate(&mut self) {
        self.stdin.take();
        if self.exit.is_some() && !self.has_exited() {
            if let Some(kill) = &self.kill {
                kill.kill();
            }
            match tokio::time::timeout(TERMINATE_WAIT, self.wait()).await {
                Ok(Ok(status)) => tracing::info!(%status, "Engine process killed"),
                Ok(Err(e)) => tracing::warn!("Failed to reap engine: {}", e),
                Err(_) => tracing::warn!("Engine did not exit after kill"),
            }
        }
        self.mark_terminated();
    }

    fn mark_terminated(&mut self) {
        self.stdin = None;
        self.state = ProcessState::Terminated;
    }
}

impl std::fmt::Debug for EngineProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineProcess")
            .field("command", &self.command.display())
            .field("state", &self.state)
            .field("pid", &self.pid)
            .finish()
    }
}
