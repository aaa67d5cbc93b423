//! Converts raw byte chunks from a child process stream into complete lines.
//!
//! Contract: accepts arbitrary byte chunks, emits complete lines with the
//! terminator stripped, retains a trailing partial line across calls, and
//! suppresses blank (whitespace-only) lines. Used independently for
//! stdout and stderr.

#[derive(Debug, Default)]
pub struct LineFramer {
    partial: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self { partial: Vec::new() }
    }

    /// Feed a chunk of bytes, returning zero or more complete lines.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(rel_nl) = self.partial[start..].iter().position(|&b| b == b'\n') {
            let end = start + rel_nl;
            push_if_non_blank(&mut lines, &self.partial[start..end]);
            start = end + 1;
        }
        self.partial.drain(..start);
        lines
    }

    /// Called once the underlying stream has closed. Emits the trailing
    /// partial line if it is non-empty.
    pub fn finish(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let mut out = Vec::new();
        push_if_non_blank(&mut out, &self.partial);
        self.partial.clear();
        out.into_iter().next()
    }
}

fn push_if_non_blank(lines: &mut Vec<String>, raw: &[u8]) {
    let line = String::from_utf8_lossy(raw);
    let trimmed = line.trim_end_matches('\r');
    if !trimmed.trim().is_empty() {
        lines.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_with_trailing_newline_yields_one_line() {
        let mut f = LineFramer::new();
        assert_eq!(f.feed(b"hello\n"), vec!["hello".to_string()]);
        assert_eq!(f.finish(), None);
    }

    #[test]
    fn partial_line_is_buffered_across_calls() {
        let mut f = LineFramer::new();
        assert!(f.feed(b"hel").is_empty());
        assert_eq!(f.feed(b"lo\n"), vec!["hello".to_string()]);
    }

    #[test]
    fn split_exactly_at_newline_boundary() {
        let mut f = LineFramer::new();
        assert_eq!(f.feed(b"a\n"), vec!["a".to_string()]);
        assert_eq!(f.feed(b"b\n"), vec!["b".to_string()]);
    }

    #[test]
    fn split_mid_newline_sequence_crlf() {
        let mut f = LineFramer::new();
        assert!(f.feed(b"line\r").is_empty());
        assert_eq!(f.feed(b"\nnext\r\n"), vec!["line".to_string(), "next".to_string()]);
    }

    #[test]
    fn one_byte_at_a_time_still_reassembles_lines() {
        let mut f = LineFramer::new();
        let mut out = Vec::new();
        for b in b"abc\ndef\n" {
            out.extend(f.feed(&[*b]));
        }
        assert_eq!(out, vec!["abc".to_string(), "def".to_string()]);
    }

    #[test]
    fn blank_lines_are_suppressed() {
        let mut f = LineFramer::new();
        assert_eq!(f.feed(b"a\n\n   \nb\n"), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn finish_emits_nonempty_trailing_partial() {
        let mut f = LineFramer::new();
        assert!(f.feed(b"trailing").is_empty());
        assert_eq!(f.finish(), Some("trailing".to_string()));
    }

    #[test]
    fn finish_does_not_emit_blank_trailing_partial() {
        let mut f = LineFramer::new();
        f.feed(b"   ");
        assert_eq!(f.finish(), None);
    }

    #[test]
    fn finish_is_idempotent_after_drain() {
        let mut f = LineFramer::new();
        f.feed(b"x");
        assert_eq!(f.finish(), Some("x".to_string()));
        assert_eq!(f.finish(), None);
    }
}
