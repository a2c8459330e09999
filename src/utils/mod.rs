//! Utilities: logging (dynamic level) and environment lookups.
//!
//! Key items:
//!   init_logging / derive_level
//!   log_warn! / log_info! / log_debug! / log_trace!
//!   env_nonempty
//!
//! Warn is the default threshold: normal progress belongs to the status line,
//! `-v` adds the run's decisions (Info), `-vv` HTTP and fragment detail.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

/// Logging helpers. Everything goes to stderr; stdout belongs to the status
/// line and the launched script.
pub mod logging {
    use super::*;

    #[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
    pub enum LogLevel {
        Error = 0,
        Warn = 1,
        Info = 2,
        Debug = 3,
        Trace = 4,
    }

    impl LogLevel {
        pub fn as_str(&self) -> &'static str {
            match self {
                LogLevel::Error => "ERROR",
                LogLevel::Warn => "WARN",
                LogLevel::Info => "INFO",
                LogLevel::Debug => "DEBUG",
                LogLevel::Trace => "TRACE",
            }
        }

        fn from_u8(raw: u8) -> Self {
            match raw {
                0 => LogLevel::Error,
                1 => LogLevel::Warn,
                2 => LogLevel::Info,
                3 => LogLevel::Debug,
                _ => LogLevel::Trace,
            }
        }
    }

    static GLOBAL_LEVEL: OnceLock<AtomicU8> = OnceLock::new();
    static STARTED: OnceLock<Instant> = OnceLock::new();

    fn inner_cell() -> &'static AtomicU8 {
        GLOBAL_LEVEL.get_or_init(|| AtomicU8::new(LogLevel::Warn as u8))
    }

    /// Set the threshold and start the elapsed-time clock.
    pub fn init_logging(level: LogLevel) {
        STARTED.get_or_init(Instant::now);
        inner_cell().store(level as u8, Ordering::Relaxed);
    }

    pub fn current_log_level() -> LogLevel {
        LogLevel::from_u8(inner_cell().load(Ordering::Relaxed))
    }

    /// `-q` wins over any number of `-v`.
    pub fn derive_level(verbose: u8, quiet: bool) -> LogLevel {
        if quiet {
            return LogLevel::Error;
        }
        match verbose {
            0 => LogLevel::Warn,
            1 => LogLevel::Info,
            2 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    fn elapsed_ms() -> u128 {
        STARTED.get_or_init(Instant::now).elapsed().as_millis()
    }

    /// `diem[LEVEL] +<ms since start> message`
    pub fn format_line(level: LogLevel, elapsed_ms: u128, msg: &str) -> String {
        format!("diem[{}] +{}ms {}", level.as_str(), elapsed_ms, msg)
    }

    pub fn log(level: LogLevel, msg: impl AsRef<str>) {
        if level <= current_log_level() {
            eprintln!("{}", format_line(level, elapsed_ms(), msg.as_ref()));
        }
    }

    #[macro_export]
    macro_rules! log_warn {
        ($($t:tt)*) => { $crate::utils::logging::log($crate::utils::LogLevel::Warn, format!($($t)*)) };
    }
    #[macro_export]
    macro_rules! log_info {
        ($($t:tt)*) => { $crate::utils::logging::log($crate::utils::LogLevel::Info, format!($($t)*)) };
    }
    #[macro_export]
    macro_rules! log_debug {
        ($($t:tt)*) => { $crate::utils::logging::log($crate::utils::LogLevel::Debug, format!($($t)*)) };
    }
    #[macro_export]
    macro_rules! log_trace {
        ($($t:tt)*) => { $crate::utils::logging::log($crate::utils::LogLevel::Trace, format!($($t)*)) };
    }
}

pub use logging::{LogLevel, derive_level, init_logging};

/// Read an environment variable, ignoring unset and blank values.
pub fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}
