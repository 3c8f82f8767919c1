//! Log levels and their terminal tags.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// ANSI escape sequences used to color level tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnsiColor {
    Black,
    White,
    BoldWhite,
    BgRed,
    BgBlue,
    BgYellow,
    BgCyan,
    BgPurple,
    Reset,
}

impl AnsiColor {
    pub fn code(self) -> &'static str {
        match self {
            Self::Black => "\x1b[0;30m",
            Self::White => "\x1b[0;37m",
            Self::BoldWhite => "\x1b[1;37m",
            Self::BgRed => "\x1b[41m",
            Self::BgBlue => "\x1b[44m",
            Self::BgYellow => "\x1b[43m",
            Self::BgCyan => "\x1b[46m",
            Self::BgPurple => "\x1b[45m",
            Self::Reset => "\x1b[0m",
        }
    }
}

/// Wrap `s` in a foreground/background pair, resetting afterwards.
pub fn colorize(s: &str, fg: AnsiColor, bg: AnsiColor) -> String {
    format!("{}{}{}{}", fg.code(), bg.code(), s, AnsiColor::Reset.code())
}

/// Severity of a log record.
///
/// Ordering follows [`LogLevel::rank`]: `Debug < Info < Warn < Error < Critical < Fatal`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
    Fatal,
}

impl LogLevel {
    pub const ALL: [LogLevel; 6] = [
        Self::Debug,
        Self::Info,
        Self::Warn,
        Self::Error,
        Self::Critical,
        Self::Fatal,
    ];

    /// Numeric rank used for threshold filtering.
    pub fn rank(self) -> i32 {
        match self {
            Self::Debug => -4,
            Self::Info => 0,
            Self::Warn => 4,
            Self::Error => 8,
            Self::Critical => 12,
            Self::Fatal => 16,
        }
    }

    pub fn from_rank(rank: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.rank() == rank)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
            Self::Fatal => "FATAL",
        }
    }

    /// Foreground/background pair for the tag.
    pub fn tag_colors(self) -> (AnsiColor, AnsiColor) {
        match self {
            Self::Debug => (AnsiColor::BoldWhite, AnsiColor::BgBlue),
            Self::Info => (AnsiColor::White, AnsiColor::BgCyan),
            Self::Warn => (AnsiColor::Black, AnsiColor::BgYellow),
            Self::Error => (AnsiColor::White, AnsiColor::BgRed),
            Self::Critical => (AnsiColor::BoldWhite, AnsiColor::BgRed),
            Self::Fatal => (AnsiColor::BoldWhite, AnsiColor::BgPurple),
        }
    }

    /// Four-letter tag padded with one space each side, e.g. `" INFO "`.
    pub fn tag(self, color: bool) -> String {
        let text = format!(" {} ", &self.name()[..4]);
        if color {
            let (fg, bg) = self.tag_colors();
            colorize(&text, fg, bg)
        } else {
            text
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" | "err" => Ok(Self::Error),
            "critical" | "crit" => Ok(Self::Critical),
            "fatal" => Ok(Self::Fatal),
            _ => Err(ConfigError::UnknownLogLevel(s.to_string())),
        }
    }
}
