//! Configuration for the Picochess front-end.
//!
//! Every tunable has a compile-time default and can be overridden at runtime
//! via a dedicated environment variable. Command-line flags take precedence
//! over both.

use engine_bridge::BridgeConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default sleep between empty output polls (in milliseconds).
const DEFAULT_POLL_INTERVAL_MS: u64 = 20;

/// Default time the engine gets to honour `quit` (in milliseconds).
const DEFAULT_QUIT_TIMEOUT_MS: u64 = 1000;

/// Default PGN location, relative to `$HOME`.
const DEFAULT_PGN_PATH: &str = "git/Stockfish/src/game.pgn";

/// PGN location when `$HOME` is unset.
const FALLBACK_PGN_PATH: &str = "./game.pgn";

/// Engine executable override.
///
/// Priority:
/// 1. `PICOCHESS_ENGINE_PATH` env variable if set
/// 2. `None`, letting the launch profile pick the platform path
pub fn get_engine_path() -> Option<PathBuf> {
    std::env::var("PICOCHESS_ENGINE_PATH").ok().map(PathBuf::from)
}

/// Serial device of the DGT board.
///
/// Priority:
/// 1. `PICOCHESS_DEVICE` env variable if set
/// 2. The platform default (`/dev/ttyUSB0`, or the USB serial adapter on macOS)
pub fn get_device() -> String {
    std::env::var("PICOCHESS_DEVICE").unwrap_or_else(|_| engine_bridge::default_device().to_string())
}

/// Poll interval in milliseconds; falls back to the default on parse errors.
pub fn get_poll_interval_ms() -> u64 {
    parse_env_u64("PICOCHESS_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)
}

/// Quit timeout in milliseconds; falls back to the default on parse errors.
pub fn get_quit_timeout_ms() -> u64 {
    parse_env_u64("PICOCHESS_QUIT_TIMEOUT_MS", DEFAULT_QUIT_TIMEOUT_MS)
}

/// File served by the web collaborator.
///
/// Priority:
/// 1. `PICOCHESS_PGN_PATH` env variable if set
/// 2. `$HOME/git/Stockfish/src/game.pgn` if HOME is set
/// 3. `./game.pgn` as fallback
pub fn get_pgn_path() -> PathBuf {
    if let Ok(path) = std::env::var("PICOCHESS_PGN_PATH") {
        return PathBuf::from(path);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(DEFAULT_PGN_PATH);
    }

    PathBuf::from(FALLBACK_PGN_PATH)
}

/// Listen address for the web collaborator.
///
/// `PICOCHESS_WEB_ADDR` if set and parseable, `0.0.0.0:8888` otherwise.
pub fn get_web_addr() -> SocketAddr {
    std::env::var("PICOCHESS_WEB_ADDR")
        .ok()
        .and_then(|addr| addr.parse().ok())
        .unwrap_or_else(default_web_addr)
}

/// Directory for rolling log files. When unset, logs go to stderr.
pub fn get_log_dir() -> Option<PathBuf> {
    std::env::var("PICOCHESS_LOG_DIR").ok().map(PathBuf::from)
}

/// Controller tuning assembled from the environment.
pub fn bridge_config() -> BridgeConfig {
    BridgeConfig {
        poll_interval: Duration::from_millis(get_poll_interval_ms()),
        quit_timeout: Duration::from_millis(get_quit_timeout_ms()),
        ..BridgeConfig::default()
    }
}

fn default_web_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8888))
}

fn parse_env_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(value) => value.parse().unwrap_or(default),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_device() {
        let device = get_device();
        match std::env::var("PICOCHESS_DEVICE") {
            Ok(val) => assert_eq!(device, val),
            Err(_) => assert_eq!(device, engine_bridge::default_device()),
        }
    }

    #[test]
    fn test_get_poll_interval_ms_default() {
        assert_eq!(get_poll_interval_ms(), DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn test_get_quit_timeout_ms_default() {
        assert_eq!(get_quit_timeout_ms(), DEFAULT_QUIT_TIMEOUT_MS);
    }

    #[test]
    fn test_parse_env_u64_falls_back() {
        assert_eq!(parse_env_u64("PICOCHESS_TEST_UNSET_VARIABLE", 7), 7);
    }

    #[test]
    fn test_get_pgn_path() {
        let path = get_pgn_path();
        assert!(path.ends_with("game.pgn"));
    }

    #[test]
    fn test_default_web_addr() {
        assert_eq!(default_web_addr().to_string(), "0.0.0.0:8888");
        assert_eq!(default_web_addr().port(), 8888);
    }

    #[test]
    fn test_bridge_config_uses_defaults() {
        let config = bridge_config();
        assert_eq!(config.poll_interval, Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
        assert_eq!(config.quit_timeout, Duration::from_millis(DEFAULT_QUIT_TIMEOUT_MS));
    }
}
