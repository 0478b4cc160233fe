//! Platform selection of the engine executable and its argument list.
//!
//! The engine is started in DGT mode: `<engine> dgt <device>`. In elevated
//! mode the same argument list is handed to the elevation wrapper, so the
//! device text is never interpreted by a shell.

use crate::process::LaunchCommand;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Serial device used when none is configured.
pub const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";

/// USB serial adapter name on macOS.
pub const MACOS_DEVICE: &str = "/dev/cu.usbserial";

/// Engine subcommand that reads moves from a DGT board.
const DGT_SUBCOMMAND: &str = "dgt";

const ANDROID_ENGINE_PATH: &str = "/data/data/org.picochess/files/stockfish";
const ANDROID_ELEVATED_ENGINE_PATH: &str = "/system/bin/stockfish";
const DESKTOP_ENGINE_NAME: &str = "stockfish";
const DESKTOP_ENGINE_CANDIDATES: &[&str] = &[
    "/usr/local/bin/stockfish",
    "/usr/bin/stockfish",
    "/opt/homebrew/bin/stockfish",
    "/usr/games/stockfish",
];

const ELEVATION_WRAPPER: &str = "su";
/// `su <uid> <command...>` runs the command with its arguments as given.
const ELEVATION_WRAPPER_ARGS: &[&str] = &["0"];
const KILL_BY_NAME: &str = "pkill";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Desktop,
    Android,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "android") {
            Platform::Android
        } else {
            Platform::Desktop
        }
    }
}

/// How the engine process is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrivilegeMode {
    /// Managed subprocess; stopped with a UCI `quit`.
    #[default]
    Direct,
    /// Started through the elevation wrapper; stopped by killing it by name.
    Elevated,
}

/// Default serial device for the build target.
pub fn default_device() -> &'static str {
    if cfg!(target_os = "macos") {
        MACOS_DEVICE
    } else {
        DEFAULT_DEVICE
    }
}

/// Everything needed to build engine launch and kill commands.
#[derive(Debug, Clone)]
pub struct LaunchProfile {
    pub platform: Platform,
    /// Overrides the platform engine path when set.
    pub engine_path: Option<PathBuf>,
    pub wrapper: PathBuf,
    pub wrapper_args: Vec<OsString>,
    pub env: Vec<(OsString, OsString)>,
    pub current_dir: Option<PathBuf>,
}

impl Default for LaunchProfile {
    fn default() -> Self {
        Self::for_platform(Platform::current())
    }
}

impl LaunchProfile {
    pub fn for_platform(platform: Platform) -> Self {
        Self {
            platform,
            engine_path: None,
            wrapper: PathBuf::from(ELEVATION_WRAPPER),
            wrapper_args: ELEVATION_WRAPPER_ARGS.iter().map(OsString::from).collect(),
            env: Vec::new(),
            current_dir: None,
        }
    }

    pub fn with_engine_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.engine_path = Some(path.into());
        self
    }

    pub fn with_wrapper<I, S>(mut self, wrapper: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.wrapper = wrapper.into();
        self.wrapper_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Engine executable for the platform and privilege mode.
    pub fn resolve_engine_path(&self, mode: PrivilegeMode) -> PathBuf {
        if let Some(path) = &self.engine_path {
            return path.clone();
        }
        match (self.platform, mode) {
            (Platform::Android, PrivilegeMode::Elevated) => {
                PathBuf::from(ANDROID_ELEVATED_ENGINE_PATH)
            }
            (Platform::Android, PrivilegeMode::Direct) => PathBuf::from(ANDROID_ENGINE_PATH),
            (Platform::Desktop, _) => find_desktop_engine(),
        }
    }

    /// Command that starts the engine in DGT mode on `device`.
    pub fn engine_command(&self, device: &str, mode: PrivilegeMode) -> LaunchCommand {
        let engine = self.resolve_engine_path(mode);
        let command = match mode {
            PrivilegeMode::Direct => LaunchCommand::new(engine),
            PrivilegeMode::Elevated => LaunchCommand::new(&self.wrapper)
                .args(self.wrapper_args.iter().cloned())
                .arg(engine),
        };
        self.apply_environment(command.args([DGT_SUBCOMMAND, device]))
    }

    /// Command that kills every engine started by [`engine_command`] in
    /// elevated mode, matched by executable name.
    ///
    /// [`engine_command`]: LaunchProfile::engine_command
    pub fn kill_command(&self) -> LaunchCommand {
        let engine = self.resolve_engine_path(PrivilegeMode::Elevated);
        let name = engine
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| engine.clone().into_os_string());

        let command = LaunchCommand::new(&self.wrapper)
            .args(self.wrapper_args.iter().cloned())
            .arg(KILL_BY_NAME)
            .arg("-x")
            .arg(name);
        self.apply_environment(command)
    }

    fn apply_environment(&self, mut command: LaunchCommand) -> LaunchCommand {
        command.env.extend(self.env.iter().cloned());
        if let Some(dir) = &self.current_dir {
            command = command.current_dir(dir);
        }
        command
    }
}

/// Find the engine in common install locations, falling back to a `PATH`
/// lookup at spawn time.
fn find_desktop_engine() -> PathBuf {
    DESKTOP_ENGINE_CANDIDATES
        .iter()
        .map(Path::new)
        .find(|path| path.exists())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DESKTOP_ENGINE_NAME))
}
