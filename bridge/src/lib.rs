//! Bridge between a front-end and a UCI chess engine subprocess.
//!
//! [`BridgeController`] starts the engine, streams its stdout line by line into
//! an [`OutputSink`] from a background poller, and stops it again.

pub mod controller;
pub mod error;
pub mod launch;
pub mod line_reader;
pub mod process;
pub mod sink;

pub use controller::{BridgeConfig, BridgeController, StateObserver, DEFAULT_PLACEHOLDER};
pub use error::BridgeError;
pub use launch::{default_device, LaunchProfile, Platform, PrivilegeMode, DEFAULT_DEVICE};
pub use line_reader::LineReader;
pub use process::{
    EngineOutput, EngineProcess, KillHandle, LaunchCommand, LinePoll, ProcessState,
};
pub use sink::{OutputSink, Scrollback};

use std::fmt;

/// One line of engine output, terminator stripped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputLine(String);

impl OutputLine {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for OutputLine {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OutputLine {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for OutputLine {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection state published by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(label)
    }
}
