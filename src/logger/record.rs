//! A single formatted log event.

use std::fmt::{self, Write as _};

use chrono::{DateTime, Local};

use super::level::LogLevel;

/// RFC 822 with a numeric zone, e.g. `02 Jan 06 15:04 -0700`.
pub const DEFAULT_TIME_LAYOUT: &str = "%d %b %y %H:%M %z";

/// A key/value pair attached to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub key: String,
    pub value: String,
}

impl Attr {
    pub fn new(key: impl Into<String>, value: impl fmt::Display) -> Self {
        Self {
            key: key.into(),
            value: value.to_string(),
        }
    }
}

/// Immutable log event, consumed once by the sink.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub prefix: Option<String>,
    pub message: String,
    pub attrs: Vec<Attr>,
}

impl LogRecord {
    pub fn new(
        level: LogLevel,
        prefix: Option<&str>,
        message: impl Into<String>,
        attrs: &[(&str, &dyn fmt::Display)],
    ) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            prefix: prefix.filter(|p| !p.is_empty()).map(str::to_string),
            message: message.into(),
            attrs: attrs.iter().map(|(k, v)| Attr::new(*k, v)).collect(),
        }
    }

    /// Render as `<TAG> <timestamp> [<prefix> ]<message>[ <k>: <v>]...\n`.
    pub fn format(&self, time_layout: &str, color: bool) -> String {
        let mut line = String::with_capacity(64 + self.message.len());
        line.push_str(&self.level.tag(color));
        // Writing into a String cannot fail.
        let _ = write!(line, " {} ", self.timestamp.format(time_layout));
        if let Some(prefix) = &self.prefix {
            push_escaped(&mut line, prefix);
            line.push(' ');
        }
        push_escaped(&mut line, &self.message);
        for attr in &self.attrs {
            line.push(' ');
            push_escaped(&mut line, &attr.key);
            line.push_str(": ");
            push_escaped(&mut line, &attr.value);
        }
        line.push('\n');
        line
    }
}

/// Append `s` with line breaks escaped, so a record is always one line.
fn push_escaped(line: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '\n' => line.push_str("\\n"),
            '\r' => line.push_str("\\r"),
            c => line.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_with_prefix_and_attrs() {
        let record = LogRecord::new(
            LogLevel::Info,
            Some("[test]"),
            "session created",
            &[("handle", &"bot.bsky.social"), ("attempt", &2)],
        );
        let line = record.format(DEFAULT_TIME_LAYOUT, false);

        assert!(line.starts_with(" INFO "));
        assert!(line.contains(" [test] session created handle: bot.bsky.social attempt: 2\n"));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn empty_prefix_is_omitted() {
        let record = LogRecord::new(LogLevel::Warn, Some(""), "careful", &[]);
        let line = record.format("%H:%M", false);
        // The padded tag is followed by its own separator space.
        let rest = line.strip_prefix(" WARN  ").unwrap();
        assert_eq!(rest.len(), "00:00 careful\n".len());
        assert!(rest.ends_with(" careful\n"));
    }

    #[test]
    fn line_breaks_are_escaped() {
        let record = LogRecord::new(
            LogLevel::Info,
            Some("api\r"),
            "session created\nINFO forged",
            &[("k\n", &"a\nb")],
        );
        let line = record.format(DEFAULT_TIME_LAYOUT, false);

        assert_eq!(line.matches('\n').count(), 1);
        assert!(!line.contains('\r'));
        assert!(line.ends_with(" api\\r session created\\nINFO forged k\\n: a\\nb\n"));
    }

    #[test]
    fn timestamp_uses_layout() {
        let record = LogRecord::new(LogLevel::Debug, None, "x", &[]);
        let expected = record.timestamp.format("%Y").to_string();
        let line = record.format("%Y", false);
        assert_eq!(line, format!(" DEBU  {expected} x\n"));
    }
}
