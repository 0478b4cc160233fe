//! Output sinks consumed by the presentation layer.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Destination for engine output lines.
///
/// Called from the background poller, so implementations must be cheap and
/// must not block.
pub trait OutputSink: Send + Sync {
    /// Append one engine line. Replaces the placeholder if it is showing.
    fn append(&self, text: &str);

    /// Clear the scrollback and show `text` instead.
    fn set_placeholder(&self, text: &str);
}

/// In-memory scrollback buffer.
#[derive(Debug, Default)]
pub struct Scrollback {
    inner: Mutex<ScrollbackInner>,
}

#[derive(Debug, Default)]
struct ScrollbackInner {
    lines: VecDeque<String>,
    placeholder: Option<String>,
    limit: Option<usize>,
}

impl Scrollback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` lines, dropping the oldest from view.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            inner: Mutex::new(ScrollbackInner {
                limit: Some(limit.max(1)),
                ..Default::default()
            }),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lock().lines.iter().cloned().collect()
    }

    /// The placeholder text, if it is what the view currently shows.
    pub fn placeholder(&self) -> Option<String> {
        self.lock().placeholder.clone()
    }

    /// Everything the view should render, newline separated.
    pub fn text(&self) -> String {
        let inner = self.lock();
        match &inner.placeholder {
            Some(placeholder) => placeholder.clone(),
            None => inner.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n"),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScrollbackInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl OutputSink for Scrollback {
    fn append(&self, text: &str) {
        let mut inner = self.lock();
        inner.placeholder = None;
        inner.lines.push_back(text.to_string());
        if let Some(limit) = inner.limit {
            while inner.lines.len() > limit {
                inner.lines.pop_front();
            }
        }
    }

    fn set_placeholder(&self, text: &str) {
        let mut inner = self.lock();
        inner.lines.clear();
        inner.placeholder = Some(text.to_string());
    }
}
