//! Structured logging for keyforge.
//!
//! Console progress goes to stdout through the reporter. Tracing output is a
//! separate, opt-in channel on stderr, enabled via `logging.enabled`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use keyforge::config::get_config;
//! use keyforge::logging::init_logging;
//!
//! let config = get_config()?;
//! init_logging(&config.logging);
//! ```

use tracing::level_filters::LevelFilter;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::config::LoggingConfig;

/// Audit events emitted during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    /// A session was established
    SessionEstablished,
    /// A session could not be established after all retries
    SessionFailed,
    /// A key came back valid
    KeyValid,
    /// A key came back invalid
    KeyInvalid,
    /// The service could not decide on a key
    KeyUnknown,
    /// The run report was written to disk
    ReportSaved,
    /// The run was cancelled before completing
    RunCancelled,
}

impl std::fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            KeyEvent::SessionEstablished => "session_established",
            KeyEvent::SessionFailed => "session_failed",
            KeyEvent::KeyValid => "key_valid",
            KeyEvent::KeyInvalid => "key_invalid",
            KeyEvent::KeyUnknown => "key_unknown",
            KeyEvent::ReportSaved => "report_saved",
            KeyEvent::RunCancelled => "run_cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Log an audit event about a session, key, or report.
///
/// Failures and cancellations log at warn, everything else at info.
pub fn log_key_event(event: KeyEvent, subject: &str, details: Option<&str>) {
    let span = info_span!("key_event", event = %event, subject = %subject);
    let _enter = span.enter();

    match event {
        KeyEvent::SessionFailed | KeyEvent::RunCancelled => {
            if let Some(d) = details {
                warn!(reason = %d, "Key event occurred");
            } else {
                warn!("Key event occurred");
            }
        }
        _ => {
            if let Some(d) = details {
                info!(details = %d, "Key event occurred");
            } else {
                info!("Key event occurred");
            }
        }
    }
}

/// Generate a new unique run id.
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Map a configured level name to a filter. Unknown names fall back to info.
pub fn level_filter(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    }
}

/// Install the global tracing subscriber if logging is enabled.
///
/// Returns `true` when a subscriber was installed by this call.
pub fn init_logging(config: &LoggingConfig) -> bool {
    if !config.enabled {
        return false;
    }

    tracing_subscriber::fmt()
        .with_max_level(level_filter(&config.level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}
