#![allow(dead_code)]

use engine_bridge::{EngineProcess, LinePoll, OutputLine, OutputSink};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(10);

/// Engine stand-in: announces its arguments, echoes commands, exits on quit.
pub const FAKE_ENGINE: &str = r#"#!/bin/sh
echo "fake engine $1 $2"
while read -r line; do
  case "$line" in
    quit) echo "bye"; exit 0 ;;
    *) echo "echo: $line" ;;
  esac
done
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Append(String),
    Placeholder(String),
}

/// Sink that keeps every call, so tests can check order after the fact.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn appended(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Append(text) => Some(text),
                SinkEvent::Placeholder(_) => None,
            })
            .collect()
    }

    pub fn last(&self) -> Option<SinkEvent> {
        self.events.lock().unwrap().last().cloned()
    }

    /// Wait until at least `count` lines were appended.
    pub async fn wait_for_lines(&self, count: usize) -> Vec<String> {
        tokio::time::timeout(WAIT, async {
            loop {
                let lines = self.appended();
                if lines.len() >= count {
                    return lines;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for engine output")
    }
}

impl OutputSink for RecordingSink {
    fn append(&self, text: &str) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Append(text.to_string()));
    }

    fn set_placeholder(&self, text: &str) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Placeholder(text.to_string()));
    }
}

/// Write an executable shell script into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Poll until a line arrives or the stream closes.
pub async fn next_line(process: &mut EngineProcess) -> Option<OutputLine> {
    tokio::time::timeout(WAIT, async {
        loop {
            match process.poll_line() {
                LinePoll::Line(line) => return Some(line),
                LinePoll::Closed => return None,
                LinePoll::Pending => tokio::time::sleep(Duration::from_millis(5)).await,
            }
        }
    })
    .await
    .expect("timed out waiting for a line")
}

/// Whether `pid` still names a live (or unreaped) process.
pub fn is_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
