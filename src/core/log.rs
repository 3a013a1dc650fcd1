//! Engine log hub and per-client log taps.
//!
//! The engine writes human-readable messages through a single hub.
//! Each message is forwarded to the `log` facade (so embedders get
//! them through their normal logger) and copied into every open
//! client tap whose level admits it. Taps are bounded; when full, the
//! oldest entry is dropped. Clients poll their tap from
//! `wait_event`, which turns entries into LogMessage events.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

/// Message levels, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Fatal = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    /// Transient status lines (progress style).
    Status = 4,
    /// Verbose.
    V = 5,
    Debug = 6,
    Trace = 7,
}

/// Level names in severity order, as accepted by
/// `request_log_messages`. "no" is handled separately (tap off).
pub const LOG_LEVEL_NAMES: [&str; 8] =
    ["fatal", "error", "warn", "info", "status", "v", "debug", "trace"];

impl LogLevel {
    /// Parse a level name. Does not accept "no".
    pub fn from_name(name: &str) -> Option<LogLevel> {
        Some(match name {
            "fatal" => LogLevel::Fatal,
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "status" => LogLevel::Status,
            "v" => LogLevel::V,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => return None,
        })
    }

    /// Stable name of this level.
    pub fn name(self) -> &'static str {
        LOG_LEVEL_NAMES[self as usize]
    }

    /// Closest `log` facade level.
    fn facade_level(self) -> log::Level {
        match self {
            LogLevel::Fatal | LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info | LogLevel::Status => log::Level::Info,
            LogLevel::V | LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

/// One buffered log entry.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub prefix: String,
    pub level: LogLevel,
    pub text: String,
}

/// Bounded log tap held by one client.
#[derive(Debug)]
pub struct LogBuffer {
    level: LogLevel,
    capacity: usize,
    entries: Mutex<VecDeque<LogRecord>>,
}

impl LogBuffer {
    fn new(capacity: usize, level: LogLevel) -> LogBuffer {
        LogBuffer {
            level,
            capacity,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Minimum severity this tap records.
    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Pop the oldest buffered entry, non-blocking.
    pub fn try_read(&self) -> Option<LogRecord> {
        self.entries.lock().unwrap().pop_front()
    }

    fn push(&self, record: LogRecord) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(record);
    }
}

/// Engine-wide message sink feeding the `log` facade and all taps.
#[derive(Debug, Default)]
pub struct LogHub {
    sinks: Mutex<Vec<Weak<LogBuffer>>>,
}

impl LogHub {
    pub fn new() -> LogHub {
        LogHub::default()
    }

    /// Open a new tap recording messages at `level` or more severe.
    /// The tap stays attached for as long as the returned Arc lives.
    pub fn new_buffer(&self, capacity: usize, level: LogLevel) -> Arc<LogBuffer> {
        let buffer = Arc::new(LogBuffer::new(capacity, level));
        self.sinks.lock().unwrap().push(Arc::downgrade(&buffer));
        buffer
    }

    /// Record a message: forward to the `log` facade and copy into
    /// every live tap that admits `level`.
    pub fn log(&self, prefix: &str, level: LogLevel, text: &str) {
        log::log!(target: prefix, level.facade_level(), "{}", text);

        let mut sinks = self.sinks.lock().unwrap();
        sinks.retain(|weak| {
            let Some(sink) = weak.upgrade() else {
                return false;
            };
            if level <= sink.level {
                sink.push(LogRecord {
                    prefix: prefix.to_string(),
                    level,
                    text: text.to_string(),
                });
            }
            true
        });
    }
}
