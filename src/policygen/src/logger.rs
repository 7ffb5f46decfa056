// Copyright 2024 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Diagnostic logging for the generation tool.
//!
//! Log records go to stderr so that rendered output and status messages on
//! stdout stay machine-consumable.

use std::io::Write;
use std::str::FromStr;
use std::sync::Mutex;

use log::{Log, Metadata, Record};

/// The logger.
pub static LOGGER: Logger = Logger(Mutex::new(LogFormat {
    show_level: true,
    show_log_origin: false,
}));

/// Error type for [`Logger::init`].
pub type LoggerInitError = log::SetLoggerError;

#[derive(Debug)]
pub struct LogFormat {
    pub show_level: bool,
    pub show_log_origin: bool,
}

#[derive(Debug)]
pub struct Logger(Mutex<LogFormat>);

impl Logger {
    /// Initialize the logger with the given level filter.
    pub fn init(&'static self, level: log::LevelFilter) -> Result<(), LoggerInitError> {
        log::set_logger(self)?;
        log::set_max_level(level);
        Ok(())
    }

    /// Enables or disables the `file:line` origin decoration on records.
    pub fn set_include_origin(&self, show: bool) -> &Self {
        self.0.lock().unwrap().show_log_origin = show;
        self
    }
}

impl Log for Logger {
    // No additional filters to <https://docs.rs/log/latest/log/fn.max_level.html>.
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let guard = self.0.lock().unwrap();

        let level = match guard.show_level {
            true => format!(":{}", record.level()),
            false => String::new(),
        };

        let origin = match guard.show_log_origin {
            true => {
                let file = record.file().unwrap_or("?");
                let line = match record.line() {
                    Some(x) => x.to_string(),
                    None => String::from("?"),
                };
                format!(":{file}:{line}")
            }
            false => String::new(),
        };

        let message = format!("[policygen{level}{origin}] {}\n", record.args());
        drop(guard);

        // A failed log write must not abort generation.
        let _ = std::io::stderr().write_all(message.as_bytes());
    }

    fn flush(&self) {}
}

/// Level filter with the relaxed spelling rules the CLI accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LevelFilter {
    /// [`log::LevelFilter::Off`]
    Off,
    /// [`log::LevelFilter::Error`]
    Error,
    /// [`log::LevelFilter::Warn`]
    Warn,
    /// [`log::LevelFilter::Info`]
    Info,
    /// [`log::LevelFilter::Debug`]
    Debug,
    /// [`log::LevelFilter::Trace`]
    Trace,
}

impl From<LevelFilter> for log::LevelFilter {
    fn from(filter: LevelFilter) -> log::LevelFilter {
        match filter {
            LevelFilter::Off => log::LevelFilter::Off,
            LevelFilter::Error => log::LevelFilter::Error,
            LevelFilter::Warn => log::LevelFilter::Warn,
            LevelFilter::Info => log::LevelFilter::Info,
            LevelFilter::Debug => log::LevelFilter::Debug,
            LevelFilter::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Error type for [`<LevelFilter as FromStr>::from_str`].
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("Failed to parse string to level filter: {0}")]
pub struct LevelFilterFromStrError(String);

impl FromStr for LevelFilter {
    type Err = LevelFilterFromStrError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(LevelFilterFromStrError(String::from(s))),
        }
    }
}
