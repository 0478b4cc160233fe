//! Connection lifecycle and the background output poller.
//!
//! The controller is driven from a single foreground task. Each connection
//! gets one poller task that owns the engine's output stream; the two share
//! a cancellation flag, a kill handle for the engine, and the published
//! [`ConnectionState`].

use crate::launch::{LaunchProfile, PrivilegeMode};
use crate::process::{EngineOutput, EngineProcess, KillHandle, LinePoll};
use crate::sink::OutputSink;
use crate::{BridgeError, ConnectionState};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Shown in the sink whenever no engine is connected.
pub const DEFAULT_PLACEHOLDER: &str = "No output yet";

/// Lines handed to the sink before the poller yields to other tasks.
const MAX_LINES_PER_POLL: usize = 64;

/// Tuning for the controller.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Sleep between polls that found no output.
    pub poll_interval: Duration,
    /// How long a graceful `quit` may take before the engine is killed.
    pub quit_timeout: Duration,
    pub placeholder: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
            quit_timeout: Duration::from_secs(1),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
        }
    }
}

/// Callback run on every connection state change, in order of occurrence.
///
/// Runs on whichever task made the change and must not block or call back
/// into the controller.
pub type StateObserver = Box<dyn Fn(ConnectionState) + Send + Sync>;

/// The published state plus its observers.
///
/// A `watch` receiver only sees the latest value, so short-lived states such
/// as `Connecting` reach observers through the callbacks instead.
struct StatePublisher {
    tx: watch::Sender<ConnectionState>,
    observers: Mutex<Vec<StateObserver>>,
}

impl StatePublisher {
    fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            tx,
            observers: Mutex::new(Vec::new()),
        }
    }

    fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    fn set(&self, next: ConnectionState) {
        self.transition(|_| true, next);
    }

    /// Move to `next` if the current state passes `from`. Observers run only
    /// when the value actually changes.
    fn transition(&self, from: impl Fn(ConnectionState) -> bool, next: ConnectionState) -> bool {
        // Held across the update so observers see changes in watch order.
        let observers = self.observers();
        let changed = self.tx.send_if_modified(|current| {
            if *current != next && from(*current) {
                *current = next;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::debug!(state = %next, "Connection state changed");
            for observer in observers.iter() {
                observer(next);
            }
        }
        changed
    }

    fn observers(&self) -> MutexGuard<'_, Vec<StateObserver>> {
        self.observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct Session {
    process: EngineProcess,
    mode: PrivilegeMode,
    cancel: Arc<AtomicBool>,
    poller: JoinHandle<()>,
}

pub struct BridgeController {
    profile: LaunchProfile,
    config: BridgeConfig,
    sink: Arc<dyn OutputSink>,
    state: Arc<StatePublisher>,
    session: Option<Session>,
}

impl BridgeController {
    pub fn new(profile: LaunchProfile, config: BridgeConfig, sink: Arc<dyn OutputSink>) -> Self {
        sink.set_placeholder(&config.placeholder);
        Self {
            profile,
            config,
            sink,
            state: Arc::new(StatePublisher::new()),
            session: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Receiver of the latest state. Rapid changes are merged; use
    /// [`observe`](Self::observe) to see every transition.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.tx.subscribe()
    }

    /// Register a callback for every state change from now on.
    pub fn observe(&self, observer: impl Fn(ConnectionState) + Send + Sync + 'static) {
        self.state.observers().push(Box::new(observer));
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn profile(&self) -> &LaunchProfile {
        &self.profile
    }

    /// Pid of the connected engine. `None` once the state is `Disconnected`,
    /// even before the dead handle is reaped.
    pub fn engine_pid(&self) -> Option<u32> {
        if self.state() == ConnectionState::Disconnected {
            return None;
        }
        self.session.as_ref().and_then(|s| s.process.pid())
    }

    /// Start the engine on `device` and begin streaming its output.
    ///
    /// On a spawn failure the state returns to `Disconnected` and the error's
    /// [`BridgeError::user_message`] is meant for the user.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn connect(&mut self, device: &str, mode: PrivilegeMode) -> Result<(), BridgeError> {
        self.reap_exited().await;
        if self.session.is_some() {
            tracing::warn!("Connect requested while an engine is connected");
            return Err(BridgeError::AlreadyConnected);
        }

        self.state.set(ConnectionState::Connecting);
        let command = self.profile.engine_command(device, mode);
        tracing::info!("Connecting engine: {}", command.display());

        let mut process = match EngineProcess::start(command).await {
            Ok(process) => process,
            Err(e) => {
                tracing::error!("Engine connect failed: {}", e);
                self.mark_disconnected();
                return Err(e);
            }
        };

        let (Some(output), Some(kill)) = (process.take_output(), process.kill_handle()) else {
            process.terminate().await;
            self.mark_disconnected();
            return Err(BridgeError::MissingPipe("stdout"));
        };

        let cancel = Arc::new(AtomicBool::new(false));
        self.state.set(ConnectionState::Connected);
        let poller = tokio::spawn(poll_output(
            output,
            kill,
            Arc::clone(&self.sink),
            Arc::clone(&self.state),
            Arc::clone(&cancel),
            self.config.poll_interval,
            self.config.placeholder.clone(),
        ));

        tracing::info!(pid = ?process.pid(), "Engine connected");
        self.session = Some(Session {
            process,
            mode,
            cancel,
            poller,
        });
        Ok(())
    }

    /// Stop the engine and the poller. Never fails; a missing engine is only
    /// logged.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn disconnect(&mut self) {
        match self.session.take() {
            Some(session) => self.shutdown(session).await,
            None => {
                tracing::warn!("Disconnect requested but no engine is running");
                self.mark_disconnected();
            }
        }
    }

    /// Disconnect when connected, connect otherwise. Returns the new state.
    pub async fn toggle(
        &mut self,
        device: &str,
        mode: PrivilegeMode,
    ) -> Result<ConnectionState, BridgeError> {
        self.reap_exited().await;
        if self.session.is_some() {
            self.disconnect().await;
        } else {
            self.connect(device, mode).await?;
        }
        Ok(self.state())
    }

    /// Forward one command line to the engine.
    pub async fn send(&mut self, text: &str) -> Result<(), BridgeError> {
        self.reap_exited().await;
        let session = self.session.as_mut().ok_or(BridgeError::NotConnected)?;

        match session.process.write_line(text).await {
            Err(BridgeError::BrokenPipe(e)) => {
                tracing::warn!("Engine stdin closed, disconnecting: {}", e);
                if let Some(session) = self.session.take() {
                    self.shutdown(session).await;
                }
                Err(BridgeError::BrokenPipe(e))
            }
            other => other,
        }
    }

    /// Clean up after an engine that exited on its own.
    ///
    /// When the output stream closes the poller kills the engine and flips
    /// the state to `Disconnected`; this releases the dead process handle.
    pub async fn reap_exited(&mut self) {
        let exited = self.session.as_ref().is_some_and(|session| {
            session.poller.is_finished() || self.state() == ConnectionState::Disconnected
        });
        if !exited {
            return;
        }
        if let Some(mut session) = self.session.take() {
            tracing::info!(pid = ?session.process.pid(), "Reaping exited engine");
            session.process.terminate().await;
            if let Err(e) = session.poller.await {
                tracing::warn!("Output poller failed: {}", e);
            }
            self.mark_disconnected();
        }
    }

    async fn shutdown(&mut self, mut session: Session) {
        session.cancel.store(true, Ordering::Release);

        match session.mode {
            PrivilegeMode::Direct => {
                if let Err(e) = session.process.quit(self.config.quit_timeout).await {
                    tracing::warn!("Engine was not running when quit was sent: {}", e);
                }
            }
            PrivilegeMode::Elevated => {
                self.kill_elevated().await;
                session.process.terminate().await;
            }
        }

        if let Err(e) = session.poller.await {
            tracing::warn!("Output poller failed: {}", e);
        }
        self.mark_disconnected();
        tracing::info!("Engine disconnected");
    }

    /// Kill the detached engine by name through the elevation wrapper.
    async fn kill_elevated(&self) {
        let command = self.profile.kill_command();
        tracing::info!("Stopping elevated engine: {}", command.display());

        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }

        match tokio::time::timeout(self.config.quit_timeout, cmd.status()).await {
            Ok(Ok(status)) if status.success() => tracing::debug!("Kill-by-name succeeded"),
            Ok(Ok(status)) => {
                tracing::warn!("Kill-by-name exited with {} (nothing was running?)", status)
            }
            Ok(Err(e)) => tracing::warn!("Failed to run kill-by-name: {}", e),
            Err(_) => tracing::warn!("Kill-by-name timed out"),
        }
    }

    fn mark_disconnected(&self) {
        self.state.set(ConnectionState::Disconnected);
        self.sink.set_placeholder(&self.config.placeholder);
    }
}

impl Drop for BridgeController {
    fn drop(&mut self) {
        // The child itself is killed when the process handle drops.
        if let Some(session) = &self.session {
            session.cancel.store(true, Ordering::Release);
        }
    }
}

/// Drain engine output into the sink until cancelled or the stream closes.
///
/// A closed stream means the engine is gone or no longer usable; it is killed
/// so an engine that closed stdout but kept running releases the device.
async fn poll_output(
    mut output: EngineOutput,
    kill: KillHandle,
    sink: Arc<dyn OutputSink>,
    state: Arc<StatePublisher>,
    cancel: Arc<AtomicBool>,
    poll_interval: Duration,
    placeholder: String,
) {
    tracing::debug!("Output poller started");
    let mut delivered = 0usize;
    let mut closed = false;

    loop {
        if cancel.load(Ordering::Acquire) {
            tracing::debug!("Output poller cancelled");
            break;
        }

        match output.poll_line() {
            LinePoll::Line(line) => {
                sink.append(line.as_str());
                delivered += 1;
                if delivered % MAX_LINES_PER_POLL == 0 {
                    tokio::task::yield_now().await;
                }
            }
            LinePoll::Pending => tokio::time::sleep(poll_interval).await,
            LinePoll::Closed => {
                tracing::warn!("Engine output closed, marking disconnected");
                kill.kill();
                closed = true;
                break;
            }
        }
    }

    // Placeholder first, so observers of the state change see it.
    sink.set_placeholder(&placeholder);
    if closed {
        state.transition(
            |current| current == ConnectionState::Connected,
            ConnectionState::Disconnected,
        );
    }
    tracing::debug!(delivered, "Output poller exiting");
}
