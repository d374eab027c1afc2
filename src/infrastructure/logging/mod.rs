//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty console output (stderr, so `--json` output stays clean)
//! - JSON log files with rotation
pub mod logger;

pub use logger::LoggerImpl;
