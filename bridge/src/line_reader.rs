//! Byte stream to line splitting.
//!
//! Engine output arrives in arbitrary chunks. [`LineReader`] keeps the trailing
//! partial line between feeds so a line split across two reads comes out whole.

use crate::OutputLine;

#[derive(Debug, Default)]
pub struct LineReader {
    pending: Vec<u8>,
}

impl LineReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completes, in order.
    ///
    /// Bytes after the last newline stay buffered until the next feed or
    /// [`LineReader::finish`].
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<OutputLine> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.pending.extend_from_slice(&rest[..pos]);
            lines.push(self.take_pending());
            rest = &rest[pos + 1..];
        }
        self.pending.extend_from_slice(rest);

        lines
    }

    /// Flush the unterminated tail at end of stream.
    pub fn finish(&mut self) -> Option<OutputLine> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take_pending())
        }
    }

    /// Whether a partial line is buffered.
    pub fn has_partial(&self) -> bool {
        !self.pending.is_empty()
    }

    fn take_pending(&mut self) -> OutputLine {
        let mut bytes = std::mem::take(&mut self.pending);
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        OutputLine::from(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(lines: Vec<OutputLine>) -> Vec<String> {
        lines.into_iter().map(OutputLine::into_string).collect()
    }

    #[test]
    fn test_feed_complete_lines() {
        let mut reader = LineReader::new();
        assert_eq!(
            texts(reader.feed(b"uciok\nreadyok\n")),
            vec!["uciok", "readyok"]
        );
        assert!(!reader.has_partial());
    }

    #[test]
    fn test_partial_line_carried_to_next_feed() {
        let mut reader = LineReader::new();
        assert!(reader.feed(b"info dep").is_empty());
        assert!(reader.has_partial());
        assert_eq!(texts(reader.feed(b"th 12\nbest")), vec!["info depth 12"]);
        assert_eq!(texts(reader.feed(b"move e2e4\n")), vec!["bestmove e2e4"]);
    }

    #[test]
    fn test_crlf_stripped() {
        let mut reader = LineReader::new();
        assert_eq!(texts(reader.feed(b"id name X\r\n")), vec!["id name X"]);
    }

    #[test]
    fn test_crlf_split_across_feeds() {
        let mut reader = LineReader::new();
        assert!(reader.feed(b"readyok\r").is_empty());
        assert_eq!(texts(reader.feed(b"\n")), vec!["readyok"]);
    }

    #[test]
    fn test_empty_lines_preserved() {
        let mut reader = LineReader::new();
        assert_eq!(texts(reader.feed(b"a\n\nb\n")), vec!["a", "", "b"]);
    }

    #[test]
    fn test_finish_flushes_tail() {
        let mut reader = LineReader::new();
        reader.feed(b"last words");
        assert_eq!(reader.finish().map(OutputLine::into_string), Some("last words".into()));
        assert!(reader.finish().is_none());
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let mut reader = LineReader::new();
        let lines = texts(reader.feed(b"ok\xff\n"));
        assert_eq!(lines, vec!["ok\u{fffd}"]);
    }
}
