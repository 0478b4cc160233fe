//! Terminal front-end: engine output to stdout, typed commands to the engine.

use engine_bridge::{BridgeController, BridgeError, ConnectionState, OutputSink, PrivilegeMode};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Prints engine lines to stdout and the placeholder to stderr.
///
/// The placeholder is printed once per disconnect, not on every call.
#[derive(Debug, Default)]
pub struct TerminalSink {
    showing_placeholder: AtomicBool,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputSink for TerminalSink {
    fn append(&self, text: &str) {
        self.showing_placeholder.store(false, Ordering::Relaxed);
        if let Err(e) = write_line(&mut io::stdout().lock(), text) {
            tracing::debug!("Failed to print engine output: {}", e);
        }
    }

    fn set_placeholder(&self, text: &str) {
        if !self.showing_placeholder.swap(true, Ordering::Relaxed) {
            eprintln!("[{}]", text);
        }
    }
}

fn write_line(out: &mut impl Write, text: &str) -> io::Result<()> {
    writeln!(out, "{}", text)?;
    out.flush()
}

/// Connect, then forward stdin lines to the engine until stdin closes, the
/// engine exits, or Ctrl-C is pressed.
pub async fn run_session(
    controller: &mut BridgeController,
    device: &str,
    mode: PrivilegeMode,
) -> Result<(), BridgeError> {
    if let Err(e) = controller.connect(device, mode).await {
        eprintln!("{}", e.user_message());
        return Err(e);
    }
    eprintln!("Connected to engine on {} (type UCI commands, Ctrl-D to disconnect)", device);

    let mut states = controller.subscribe();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = stdin.next_line() => match line {
                Ok(Some(line)) => {
                    let command = line.trim();
                    if command.is_empty() {
                        continue;
                    }
                    if let Err(e) = controller.send(command).await {
                        eprintln!("{}", e.user_message());
                        if !controller.is_connected() {
                            break;
                        }
                    }
                }
                Ok(None) => {
                    tracing::info!("Stdin closed, disconnecting");
                    break;
                }
                Err(e) => {
                    tracing::error!("Failed to read stdin: {}", e);
                    break;
                }
            },
            changed = states.changed() => {
                if changed.is_err() || *states.borrow() == ConnectionState::Disconnected {
                    eprintln!("Engine stopped");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, disconnecting");
                break;
            }
        }
    }

    controller.disconnect().await;
    Ok(())
}
