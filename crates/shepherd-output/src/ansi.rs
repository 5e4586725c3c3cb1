//! ANSI escape sequence removal for captured lines.

use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;

lazy_static! {
    // CSI sequences, OSC sequences (BEL or ST terminated), and two-byte
    // escapes. Unterminated OSC content is dropped to the end of the line.
    static ref ANSI_ESCAPE: Regex =
        Regex::new(r"\x1b(?:\[[0-9;?]*[ -/]*[@-~]|\][^\x07\x1b]*(?:\x07|\x1b\\)?|[@-Z\\^_])")
            .expect("ANSI escape pattern is valid");
}

/// Remove ANSI escape sequences from a line.
///
/// Returns the input unchanged (borrowed) when it contains no escapes.
pub fn strip_ansi(line: &str) -> Cow<'_, str> {
    ANSI_ESCAPE.replace_all(line, "")
}
