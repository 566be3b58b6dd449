//! Structured logging over the `log` facade, tagged per span/channel.
//!
//! Every span and channel carries a [`LogTag`] that prefixes messages the
//! way the source model's `span_log`/`zap_log` helpers tagged output with
//! the owning span or channel identity.

use std::fmt;

use bitflags::bitflags;

/// Log severity levels, kept distinct from `log::Level` so callers can
/// request the finer flow/debug granularity the core historically exposed;
/// each maps onto a `log::Level` for the actual facade call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum LogLevel {
    None = 0,
    Error = 1,
    Warning = 2,
    ProtocolError = 3,
    ProtocolWarning = 4,
    Flow = 5,
    Flow2 = 6,
    Flow3 = 7,
    Debug = 8,
    Debug2 = 9,
    Debug3 = 10,
}

impl LogLevel {
    fn as_log_level(self) -> Option<log::Level> {
        match self {
            LogLevel::None => None,
            LogLevel::Error => Some(log::Level::Error),
            LogLevel::Warning => Some(log::Level::Warn),
            LogLevel::ProtocolError | LogLevel::ProtocolWarning => Some(log::Level::Warn),
            LogLevel::Flow | LogLevel::Flow2 | LogLevel::Flow3 => Some(log::Level::Info),
            LogLevel::Debug | LogLevel::Debug2 | LogLevel::Debug3 => Some(log::Level::Debug),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::None => "none",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::ProtocolError => "protocol-error",
            LogLevel::ProtocolWarning => "protocol-warning",
            LogLevel::Flow => "flow",
            LogLevel::Flow2 => "flow-2",
            LogLevel::Flow3 => "flow-3",
            LogLevel::Debug => "debug",
            LogLevel::Debug2 => "debug-2",
            LogLevel::Debug3 => "debug-3",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Flags controlling what information is shown in a log line.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LogShowFlags: i32 {
        const DATE = 0x0100;
        const SAMPLE_TIME = 0x0200;
        const SEVERITY = 0x0400;
        const PROTOCOL = 0x0800;
        const VARIANT = 0x1000;
        const TAG = 0x2000;
        const SUPPRESS_LABELLING = 0x8000;
    }
}

impl fmt::Display for LogShowFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        bitflags::parser::to_writer(self, f)
    }
}

/// A logging identity attached to a span or channel: everything logged
/// through it is prefixed with `tag`, e.g. `"span1"` or `"s1c2"`.
#[derive(Debug, Clone)]
pub struct LogTag {
    tag: String,
    level: LogLevel,
}

impl LogTag {
    pub fn new(tag: impl Into<String>, level: LogLevel) -> Self {
        Self {
            tag: tag.into(),
            level,
        }
    }

    pub fn set_level(&mut self, level: LogLevel) {
        self.level = level;
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.tag = tag.into();
    }

    /// Emit a message at `level` through the `log` facade, filtered by this
    /// tag's configured level (messages above the configured level are
    /// dropped, mirroring the source model's per-object log level gate).
    pub fn log(&self, level: LogLevel, message: &str) {
        if level > self.level {
            return;
        }
        if let Some(log_level) = level.as_log_level() {
            log::log!(log_level, "{}: {}", self.tag, message);
        }
    }
}
