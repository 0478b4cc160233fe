use std::io;

/// Errors raised by the engine bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The engine executable could not be started (missing, not executable,
    /// or permission denied).
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The engine process has exited and its stdin is closed.
    #[error("engine stdin closed: {0}")]
    BrokenPipe(#[source] io::Error),

    /// The process handle was never started.
    #[error("engine process is not running")]
    NotRunning,

    #[error("engine has no {0} pipe")]
    MissingPipe(&'static str),

    #[error("an engine is already connected")]
    AlreadyConnected,

    #[error("no engine is connected")]
    NotConnected,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl BridgeError {
    /// Classify a spawn failure.
    pub(crate) fn spawn(program: impl Into<String>, source: io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Classify a write failure. Pipe errors mean the engine is gone.
    pub(crate) fn write(source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::UnexpectedEof => Self::BrokenPipe(source),
            _ => Self::Io(source),
        }
    }

    pub fn is_spawn(&self) -> bool {
        matches!(self, Self::Spawn { .. })
    }

    /// Short status text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Spawn { source, .. } => match source.kind() {
                io::ErrorKind::NotFound => "Cannot start engine: executable not found".to_string(),
                io::ErrorKind::PermissionDenied => {
                    "Cannot start engine: not rooted or permission denied".to_string()
                }
                _ => format!("Cannot start engine: {}", source),
            },
            Self::BrokenPipe(_) => "Engine stopped unexpectedly".to_string(),
            Self::AlreadyConnected => "Already connected".to_string(),
            Self::NotConnected | Self::NotRunning => "Not connected".to_string(),
            other => other.to_string(),
        }
    }
}
