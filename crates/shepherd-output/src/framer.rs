//! Line framing for captured worker output.
//!
//! Worker stdout/stderr arrive as arbitrary chunks. The framer keeps one
//! rolling accumulator per stream: each chunk is appended, the accumulated
//! bytes are split on any run of newline/carriage-return characters, every
//! complete segment becomes a log line, and the trailing incomplete
//! segment is retained for the next chunk. Empty and whitespace-only
//! segments are suppressed.

/// Rolling accumulator that frames a byte stream into discrete lines.
///
/// The buffer holds raw bytes so a multi-byte UTF-8 character split across
/// chunks is only decoded once it is complete; conversion of finished
/// segments is lossy.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
}

fn is_line_break(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line completed by it.
    ///
    /// A run of `\n`/`\r` bytes counts as a single separator, so CRLF
    /// endings and blank lines never produce empty records. Content after
    /// the last separator stays buffered.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let Some(pos) = self.buf.iter().rposition(|&b| is_line_break(b)) else {
            return Vec::new();
        };

        let rest = self.buf.split_off(pos + 1);
        let complete = std::mem::replace(&mut self.buf, rest);

        complete
            .split(|&b| is_line_break(b))
            .filter(|segment| !segment.iter().all(u8::is_ascii_whitespace))
            .map(|segment| String::from_utf8_lossy(segment).into_owned())
            .collect()
    }

    /// Force out whatever partial content remains, trimmed.
    ///
    /// Called when the process terminates so a final line lacking a
    /// trailing newline is not lost. Idempotent: an empty buffer yields
    /// `None` and the buffer is always left empty.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        let text = String::from_utf8_lossy(&rest);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}
