//! Progress reporting and saved reports.
//!
//! Two collaborators sit at the edge of a run:
//!
//! - a [`ProgressReporter`] receives every event as it happens (the console
//!   reporter prints them to stdout),
//! - a [`ReportSink`] receives the finished records once, when the user asked
//!   for them to be saved.

use std::fs;
use std::io::{self, Stdout, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Utc;
use serde::Serialize;

use crate::config::ReportConfig;
use crate::errors::{KeyforgeError, KeyforgeResult};
use crate::hash::pseudo_hash;
use crate::pipeline::{KeyRecord, RunStats};
use crate::session::{Session, ValidationStatus};

/// Title line of a saved text report.
pub const REPORT_TITLE: &str = "Sora 2 Key Generator Results";
/// Underline below the title.
pub const REPORT_RULE: &str = "==============================";

/// Receives pipeline events as they happen.
pub trait ProgressReporter {
    fn initializing(&mut self);
    fn invalid_amount(&mut self, default_amount: u64);
    fn sessions_started(&mut self, count: u64);
    fn session_established(&mut self, index: u64, session: &Session);
    fn session_failed(&mut self, index: u64, error: &KeyforgeError);
    fn keys_started(&mut self);
    fn key_validated(&mut self, index: u64, record: &KeyRecord, stats: &RunStats);
    fn cancelled(&mut self);
    fn summary(&mut self, stats: &RunStats);
    fn saved(&mut self, path: &Path);
    fn nothing_to_save(&mut self);
    fn terminating(&mut self);
}

/// Human-readable progress lines.
///
/// Writes to stdout by default; any `Write` works, which keeps it testable.
pub struct ConsoleReporter<W: Write = Stdout> {
    out: W,
}

impl ConsoleReporter<Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    // Results travel in the `RunReport` and the saved file; a closed stdout
    // (`keyforge | head`) must not fail the run, where `println!` would panic.
    fn line(&mut self, text: &str) {
        let _ = writeln!(self.out, "{}", text);
    }
}

impl<W: Write> ProgressReporter for ConsoleReporter<W> {
    fn initializing(&mut self) {
        self.line("1. Initializing Sora 2 Key Generator...");
        self.line("   Establishing secure connection to auth server...");
    }

    fn invalid_amount(&mut self, default_amount: u64) {
        self.line(&format!(
            "   [!] Invalid input. Defaulting to {} keys.",
            default_amount
        ));
    }

    fn sessions_started(&mut self, count: u64) {
        self.line(&format!(
            "2. Creating {} temporary authentication sessions...",
            count
        ));
    }

    fn session_established(&mut self, index: u64, session: &Session) {
        self.line(&format!(
            "   Session {}: Established -> {}",
            index, session.token
        ));
    }

    fn session_failed(&mut self, index: u64, error: &KeyforgeError) {
        self.line(&format!("   [!] {}", error));
        self.line(&format!("   Session {}: Failed to establish", index));
    }

    fn keys_started(&mut self) {
        self.line("\n3. Generating and validating Sora 2 keys...");
        self.line("   Querying license server with encrypted payloads...");
    }

    fn key_validated(&mut self, index: u64, record: &KeyRecord, stats: &RunStats) {
        self.line(&format!(
            "   Key {}: {} -> {}",
            index, record.key, record.status
        ));
        if record.status == ValidationStatus::Valid {
            self.line(&format!(
                "      [!] SUCCESS: Valid Sora 2 key - {} (Hash: {})",
                record.key,
                record.hash()
            ));
        }
        self.line(&format!(
            "      Stats: Invalid: {} | Valid: {} | Unknown: {} | Progress: {}%",
            stats.invalid,
            stats.valid,
            stats.unknown,
            stats.progress_label()
        ));
    }

    fn cancelled(&mut self) {
        self.line("   [!] Run cancelled. Summarizing what was produced so far.");
    }

    fn summary(&mut self, stats: &RunStats) {
        self.line("\n[+] Key generation complete!");
        self.line("    Final Stats:");
        self.line(&format!("    - Valid Keys: {}", stats.valid));
        self.line(&format!("    - Invalid Keys: {}", stats.invalid));
        self.line(&format!("    - Unknown: {}", stats.unknown));
        self.line(&format!("    - Total: {}", stats.total));
    }

    fn saved(&mut self, path: &Path) {
        self.line(&format!("    [+] Results saved to '{}'", path.display()));
    }

    fn nothing_to_save(&mut self) {
        self.line("    [!] No keys to save.");
    }

    fn terminating(&mut self) {
        self.line("\n[+] Terminating secure sessions...");
    }
}

/// Consumes a finished result set.
pub trait ReportSink {
    /// Persist `records` and `stats`, returning where they went.
    fn persist(&mut self, records: &[KeyRecord], stats: &RunStats) -> KeyforgeResult<PathBuf>;
}

/// On-disk report format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Json => "json",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = KeyforgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "txt" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            other => Err(KeyforgeError::ConfigError(format!(
                "unknown report format '{other}'"
            ))),
        }
    }
}

/// Render the plain-text report.
///
/// ```text
/// Sora 2 Key Generator Results
/// ==============================
///
/// Q7ZK2M: invalid (Hash: 0d69a052)
///
/// Summary: Valid=0 | Invalid=1 | Unknown=0
/// ```
pub fn render_text_report(records: &[KeyRecord], stats: &RunStats) -> String {
    let mut output = String::new();
    output.push_str(REPORT_TITLE);
    output.push('\n');
    output.push_str(REPORT_RULE);
    output.push_str("\n\n");
    for record in records {
        output.push_str(&format!(
            "{}: {} (Hash: {})\n",
            record.key,
            record.status,
            pseudo_hash(&record.key)
        ));
    }
    output.push_str(&format!(
        "\nSummary: Valid={} | Invalid={} | Unknown={}\n",
        stats.valid, stats.invalid, stats.unknown
    ));
    output
}

#[derive(Serialize)]
struct SavedRecord<'a> {
    key: &'a str,
    status: ValidationStatus,
    hash: String,
}

#[derive(Serialize)]
struct SavedReport<'a> {
    generated_at: String,
    records: Vec<SavedRecord<'a>>,
    stats: &'a RunStats,
}

/// Render the JSON report.
pub fn render_json_report(records: &[KeyRecord], stats: &RunStats) -> KeyforgeResult<String> {
    let report = SavedReport {
        generated_at: Utc::now().to_rfc3339(),
        records: records
            .iter()
            .map(|r| SavedRecord {
                key: &r.key,
                status: r.status,
                hash: r.hash(),
            })
            .collect(),
        stats,
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

/// Writes reports as `<dir>/<prefix>_<epoch-millis>.<ext>`.
#[derive(Debug, Clone)]
pub struct FileReportSink {
    dir: PathBuf,
    prefix: String,
    format: ReportFormat,
}

impl FileReportSink {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, format: ReportFormat) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            format,
        }
    }

    pub fn from_config(config: &ReportConfig) -> KeyforgeResult<Self> {
        Ok(Self::new(
            &config.output_dir,
            config.file_prefix.clone(),
            config.format.parse()?,
        ))
    }

    /// Path the next report would be written to.
    pub fn next_path(&self) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.{}",
            self.prefix,
            Utc::now().timestamp_millis(),
            self.format.extension()
        ))
    }
}

impl ReportSink for FileReportSink {
    fn persist(&mut self, records: &[KeyRecord], stats: &RunStats) -> KeyforgeResult<PathBuf> {
        let contents = match self.format {
            ReportFormat::Text => render_text_report(records, stats),
            ReportFormat::Json => render_json_report(records, stats)?,
        };

        fs::create_dir_all(&self.dir)?;
        let path = self.next_path();
        fs::write(&path, contents)?;
        Ok(path)
    }
}
