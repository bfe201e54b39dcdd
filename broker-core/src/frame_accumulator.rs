use serde_json::Value;
use std::sync::LazyLock;

use regex::Regex;

static LOG_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}|^\d{2}:\d{2}:\d{2}\.\d+\s*\[").unwrap()
});

/// True if `line` should be discarded as non-protocol noise, per spec.md
/// §4.4 "Request framing": empty, a recognizable log-timestamp prefix, or
/// not starting with `{`.
pub fn is_noise_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return true;
    }
    if LOG_TIMESTAMP.is_match(trimmed) {
        return true;
    }
    !trimmed.starts_with('{')
}

/// Accumulates filtered lines from a child process's stdout until the
/// concatenation parses as JSON, matching a reply interleaved with log
/// output on the same pipe. Resets after every successful parse.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    buf: String,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without its trailing newline). Returns the parsed
    /// JSON value once the accumulated, filtered lines form valid JSON.
    pub fn push_line(&mut self, line: &str) -> Option<Value> {
        if is_noise_line(line) {
            return None;
        }
        if !self.buf.is_empty() {
            self.buf.push('\n');
        }
        self.buf.push_str(line.trim());
        match serde_json::from_str::<Value>(&self.buf) {
            Ok(value) => {
                self.buf.clear();
                Some(value)
            }
            Err(_) => None,
        }
    }

    /// Discard whatever has accumulated so far, e.g. on timeout (spec.md §4.4
    /// "on timeout the accumulated buffer is discarded").
    pub fn discard(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discards_empty_lines() {
        assert!(is_noise_line(""));
        assert!(is_noise_line("   "));
    }

    #[test]
    fn discards_log_timestamp_lines() {
        assert!(is_noise_line("2024-11-05 10:30:00 starting up"));
        assert!(is_noise_line("10:30:00.123 [INFO] starting up"));
    }

    #[test]
    fn discards_lines_not_starting_with_brace() {
        assert!(is_noise_line("hello there"));
    }

    #[test]
    fn keeps_json_looking_lines() {
        assert!(!is_noise_line(r#"{"jsonrpc":"2.0"}"#));
    }

    #[test]
    fn single_line_reply_parses_immediately() {
        let mut acc = FrameAccumulator::new();
        let result = acc.push_line(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#);
        assert!(result.is_some());
    }

    #[test]
    fn log_noise_interleaved_with_reply_is_skipped() {
        let mut acc = FrameAccumulator::new();
        assert!(acc.push_line("2024-11-05 10:30:00 [info] server ready").is_none());
        assert!(acc.push_line("").is_none());
        let result = acc.push_line(r#"{"jsonrpc":"2.0","id":2,"result":{"ok":true}}"#);
        assert_eq!(result.unwrap()["id"], 2);
    }

    #[test]
    fn multi_line_json_accumulates_across_lines() {
        let mut acc = FrameAccumulator::new();
        assert!(acc.push_line("{").is_none());
        assert!(acc.push_line(r#""jsonrpc": "2.0","#).is_none());
        let result = acc.push_line(r#""id": 3}"#);
        assert!(result.is_some());
    }

    #[test]
    fn buffer_resets_after_successful_parse() {
        let mut acc = FrameAccumulator::new();
        acc.push_line(r#"{"id":1}"#);
        let second = acc.push_line(r#"{"id":2}"#);
        assert_eq!(second.unwrap()["id"], 2);
    }
}
