//! keyforge - a simulated license-key provisioning pipeline
//!
//! Fabricates authentication sessions, generates candidate keys, and reports
//! randomized validation outcomes with running statistics. Nothing touches the
//! network and nothing here is cryptographic.
//!
//! # Example
//!
//! ```rust,ignore
//! use keyforge::config::KeyforgeConfig;
//! use keyforge::pipeline::KeyPipeline;
//! use keyforge::report::{ConsoleReporter, FileReportSink};
//!
//! let config = KeyforgeConfig::default();
//! let sink = FileReportSink::from_config(&config.report)?;
//! let mut pipeline = KeyPipeline::from_config(&config, ConsoleReporter::stdout(), sink);
//! let report = pipeline.run("5", false).await?;
//! assert_eq!(report.records.len(), 5);
//! ```

pub mod config;
pub mod errors;
pub mod hash;
pub mod key_generation;
pub mod logging;
pub mod pipeline;
pub mod prompt;
pub mod report;
pub mod session;

pub use errors::{KeyforgeError, KeyforgeResult};
pub use pipeline::{KeyPipeline, KeyRecord, RunReport, RunStats};
pub use session::{Session, SessionClient, ValidationStatus};
