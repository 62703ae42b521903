use std::fmt::Display;
use std::io::Write;

use clap::ValueEnum;
use env_logger::{Builder, Target};
use log::{Level, LevelFilter};
use time::{OffsetDateTime, macros::format_description};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, ValueEnum)]
pub enum LogLevel {
    #[value(name = "DEBUG")]
    Debug,
    #[default]
    #[value(name = "INFO")]
    Info,
    #[value(name = "WARNING")]
    Warning,
    #[value(name = "ERROR")]
    Error,
    #[value(name = "CRITICAL")]
    Critical,
}

impl LogLevel {
    pub fn filter(self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warning => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
            // Nothing is logged above error severity.
            LogLevel::Critical => LevelFilter::Off,
        }
    }
}

/// Installs the process-wide logger. Call once, before any work is done.
pub fn init(level: LogLevel) {
    Builder::new()
        .filter_level(level.filter())
        .target(Target::Stderr)
        .format(|buf, record| {
            writeln!(buf, "{}", render(&timestamp(), record.level(), record.args()))
        })
        .init();
}

fn render(timestamp: &str, level: Level, message: impl Display) -> String {
    format!("{timestamp} - {} - {message}", level_name(level))
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARNING",
        Level::Info => "INFO",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second],[subsecond digits:3]"
        ))
        .unwrap_or_else(|_| "unknown".into())
}
