use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing::Dispatch;

/// Verbosity of an engine's own diagnostics sink.
///
/// The numeric form (`0`..=`4`) is accepted anywhere a level is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "LevelRepr")]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for LogLevel {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, String> {
        Ok(match level {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Debug,
            4 => LogLevel::Trace,
            other => return Err(format!("log level must be 0-4, got {other}")),
        })
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u8>() {
            return LogLevel::try_from(n);
        }
        Ok(match s.to_ascii_lowercase().as_str() {
            "off" | "none" => LogLevel::Off,
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "debug" | "info" => LogLevel::Debug,
            "trace" | "verbose" => LogLevel::Trace,
            _ => return Err(format!("unknown log level '{s}'")),
        })
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LevelRepr {
    Number(u8),
    Name(String),
}

impl TryFrom<LevelRepr> for LogLevel {
    type Error = String;

    fn try_from(repr: LevelRepr) -> Result<Self, String> {
        match repr {
            LevelRepr::Number(n) => LogLevel::try_from(n),
            LevelRepr::Name(name) => name.parse(),
        }
    }
}

/// A dispatch that writes formatted events at or above `level` to stderr.
#[must_use]
pub fn stderr_dispatch(level: LogLevel) -> Dispatch {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from(level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    Dispatch::new(subscriber)
}

/// Cut `text` to at most `max` bytes on a character boundary, noting how
/// much was dropped.
pub(crate) fn clip(text: &str, max: usize) -> Cow<'_, str> {
    if text.len() <= max {
        return Cow::Borrowed(text);
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    Cow::Owned(format!(
        "{}... ({} bytes omitted)",
        &text[..end],
        text.len() - end
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_named_levels() {
        assert_eq!("0".parse::<LogLevel>(), Ok(LogLevel::Off));
        assert_eq!("3".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!("WARNING".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("5".parse::<LogLevel>().is_err());
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn level_deserializes_from_number_or_name() {
        let level: LogLevel = serde_json::from_str("4").unwrap();
        assert_eq!(level, LogLevel::Trace);
        let level: LogLevel = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(level, LogLevel::Error);
        assert!(serde_json::from_str::<LogLevel>("9").is_err());
    }

    #[test]
    fn level_filters() {
        assert_eq!(LevelFilter::from(LogLevel::Off), LevelFilter::OFF);
        assert_eq!(LevelFilter::from(LogLevel::Warn), LevelFilter::WARN);
    }

    #[test]
    fn clip_respects_char_boundaries() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("abcdef", 3), "abc... (3 bytes omitted)");
        // 'é' is two bytes; cutting inside it backs off to the boundary
        assert_eq!(clip("aé", 2), "a... (2 bytes omitted)");
    }

    #[test]
    fn dispatch_is_local() {
        let dispatch = stderr_dispatch(LogLevel::Off);
        tracing::dispatcher::with_default(&dispatch, || {
            tracing::error!("suppressed");
        });
    }
}
