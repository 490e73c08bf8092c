//! End-to-end key run.
//!
//! A run is linear and never branches back:
//!
//! 1. normalize the requested amount (bad input falls back to a default),
//! 2. create that many sessions,
//! 3. generate and validate that many keys, tallying outcomes,
//! 4. report the summary,
//! 5. optionally hand the records to a [`ReportSink`],
//! 6. tear down.
//!
//! The session phase and the key phase are independent: no key is bound to
//! a particular session.

use std::path::PathBuf;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::config::{KeyforgeConfig, PipelineConfig};
use crate::errors::KeyforgeResult;
use crate::hash::pseudo_hash;
use crate::key_generation::generate_key;
use crate::logging::{generate_run_id, log_key_event, KeyEvent};
use crate::report::{ProgressReporter, ReportSink};
use crate::session::{SessionClient, ValidationStatus};

/// One generated key and its simulated status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyRecord {
    pub key: String,
    pub status: ValidationStatus,
}

impl KeyRecord {
    pub fn new(key: impl Into<String>, status: ValidationStatus) -> Self {
        Self {
            key: key.into(),
            status,
        }
    }

    /// Display fingerprint of the key.
    pub fn hash(&self) -> String {
        pseudo_hash(&self.key)
    }
}

/// Running tally for one run.
///
/// `valid + invalid + unknown` is always the number of records produced so
/// far; `total` is the normalized requested amount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub valid: u64,
    pub invalid: u64,
    pub unknown: u64,
    pub total: u64,
}

impl RunStats {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Count one validation outcome.
    pub fn record(&mut self, status: ValidationStatus) {
        match status {
            ValidationStatus::Valid => self.valid += 1,
            ValidationStatus::Invalid => self.invalid += 1,
            ValidationStatus::Unknown => self.unknown += 1,
        }
    }

    pub fn produced(&self) -> u64 {
        self.valid + self.invalid + self.unknown
    }

    /// Percentage of `total` produced so far.
    pub fn progress_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.produced() as f64 / self.total as f64 * 100.0
    }

    /// Progress with one decimal place, e.g. `"33.3"`.
    ///
    /// Exact ties round up (`6.25` prints `6.3`). A double sits exactly on a
    /// one-decimal tie only at quarter values, so those are handled in
    /// integer tenths and everything else is formatted directly.
    pub fn progress_label(&self) -> String {
        let percent = self.progress_percent();
        let quarters = percent * 4.0;
        if quarters.fract() == 0.0 && (quarters as u64) % 2 == 1 {
            let tenths = (5 * quarters as u64 + 1) / 2;
            return format!("{}.{}", tenths / 10, tenths % 10);
        }
        format!("{:.1}", percent)
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Records in generation order
    pub records: Vec<KeyRecord>,
    pub stats: RunStats,
    pub sessions_established: u64,
    pub sessions_failed: u64,
    /// Where the report was saved, if it was
    pub saved_to: Option<PathBuf>,
    /// The run stopped early on request
    pub cancelled: bool,
}

/// Result of normalizing the requested amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amount {
    pub count: u64,
    /// The input was unusable and `count` is the default
    pub defaulted: bool,
}

/// Parse a leading integer the way a lenient form field would.
///
/// Leading whitespace and a sign are accepted, parsing stops at the first
/// non-digit (`"12abc"` is 12, `"3.9"` is 3). Returns `None` when no digits
/// lead the input.
fn parse_leading_integer(input: &str) -> Option<i128> {
    let trimmed = input.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    // Absurdly long inputs saturate rather than fail.
    let value = digits.parse::<i128>().unwrap_or(i128::MAX);
    Some(if negative { -value } else { value })
}

/// Normalize a requested key count.
///
/// Unparseable, zero, negative, or out-of-range amounts yield `default`.
pub fn normalize_amount(requested: &str, default: u64) -> Amount {
    match parse_leading_integer(requested).map(u64::try_from) {
        Some(Ok(count)) if count > 0 => Amount {
            count,
            defaulted: false,
        },
        _ => Amount {
            count: default,
            defaulted: true,
        },
    }
}

async fn pause_ms(millis: u64) {
    if millis > 0 {
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}

/// Orchestrates one run over a session client, a reporter and a sink.
pub struct KeyPipeline<R: ProgressReporter, S: ReportSink> {
    client: SessionClient,
    reporter: R,
    sink: S,
    config: PipelineConfig,
    rng: StdRng,
}

impl<R: ProgressReporter, S: ReportSink> KeyPipeline<R, S> {
    pub fn new(client: SessionClient, reporter: R, sink: S, config: PipelineConfig) -> Self {
        // Key stream is independent of the client's RNG.
        let rng = match client.config().seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_os_rng(),
        };
        Self {
            client,
            reporter,
            sink,
            config,
            rng,
        }
    }

    /// Build a pipeline from a full configuration.
    pub fn from_config(config: &KeyforgeConfig, reporter: R, sink: S) -> Self {
        Self::new(
            SessionClient::new(config.client.clone()),
            reporter,
            sink,
            config.pipeline.clone(),
        )
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    pub fn into_parts(self) -> (SessionClient, R, S) {
        (self.client, self.reporter, self.sink)
    }

    /// Execute a run to completion.
    pub async fn run(&mut self, requested_amount: &str, persist: bool) -> KeyforgeResult<RunReport> {
        self.run_with_cancel(requested_amount, persist, &CancellationToken::new())
            .await
    }

    /// Execute a run, checking `cancel` between iterations.
    ///
    /// A cancelled run still reports its summary, saves what it has (when
    /// asked to) and tears down.
    pub async fn run_with_cancel(
        &mut self,
        requested_amount: &str,
        persist: bool,
        cancel: &CancellationToken,
    ) -> KeyforgeResult<RunReport> {
        let span = info_span!("run", run_id = %generate_run_id());
        self.execute(requested_amount, persist, cancel)
            .instrument(span)
            .await
    }

    async fn execute(
        &mut self,
        requested_amount: &str,
        persist: bool,
        cancel: &CancellationToken,
    ) -> KeyforgeResult<RunReport> {
        self.reporter.initializing();
        pause_ms(self.config.startup_delay_ms).await;

        let amount = normalize_amount(requested_amount, self.config.default_amount);
        if amount.defaulted {
            warn!(input = %requested_amount, fallback = amount.count, "Invalid amount, using default");
            self.reporter.invalid_amount(amount.count);
        }
        let count = amount.count;
        info!(count, persist, "Starting run");

        let mut report = RunReport {
            stats: RunStats::new(count),
            ..RunReport::default()
        };

        let tokens = self.establish_sessions(count, &mut report, cancel).await?;
        info!(
            established = tokens.len(),
            failed = report.sessions_failed,
            "Session phase finished"
        );

        self.validate_keys(count, &mut report, cancel).await;

        if cancel.is_cancelled() {
            report.cancelled = true;
            log_key_event(
                KeyEvent::RunCancelled,
                "run",
                Some(&format!("{} of {} keys produced", report.stats.produced(), count)),
            );
            self.reporter.cancelled();
        }

        self.reporter.summary(&report.stats);

        if persist {
            if report.records.is_empty() {
                self.reporter.nothing_to_save();
            } else {
                let path = self.sink.persist(&report.records, &report.stats)?;
                log_key_event(
                    KeyEvent::ReportSaved,
                    &path.display().to_string(),
                    Some(&format!("{} records", report.records.len())),
                );
                self.reporter.saved(&path);
                report.saved_to = Some(path);
            }
        }

        self.reporter.terminating();
        pause_ms(self.config.teardown_delay_ms).await;

        Ok(report)
    }

    /// Create `count` sessions, one at a time.
    ///
    /// Recoverable failures are reported and skipped; anything else ends the run.
    async fn establish_sessions(
        &mut self,
        count: u64,
        report: &mut RunReport,
        cancel: &CancellationToken,
    ) -> KeyforgeResult<Vec<String>> {
        self.reporter.sessions_started(count);
        pause_ms(self.config.session_phase_delay_ms).await;

        let mut tokens = Vec::new();
        for index in 1..=count {
            if cancel.is_cancelled() {
                break;
            }

            match self.client.create_session().await {
                Ok(session) => {
                    log_key_event(KeyEvent::SessionEstablished, &session.session_id, None);
                    self.reporter.session_established(index, &session);
                    tokens.push(session.token);
                    report.sessions_established += 1;
                }
                Err(err) if err.is_recoverable() => {
                    self.reporter.session_failed(index, &err);
                    report.sessions_failed += 1;
                }
                Err(err) => return Err(err),
            }

            pause_ms(self.config.session_pause_ms).await;
        }
        Ok(tokens)
    }

    /// Generate and validate `count` keys, tallying each outcome.
    async fn validate_keys(&mut self, count: u64, report: &mut RunReport, cancel: &CancellationToken) {
        self.reporter.keys_started();

        for index in 1..=count {
            if cancel.is_cancelled() {
                break;
            }

            let key = generate_key(&mut self.rng);
            let status = self.client.validate_key(&key).await;
            let record = KeyRecord::new(key, status);
            report.stats.record(status);

            let event = match status {
                ValidationStatus::Valid => KeyEvent::KeyValid,
                ValidationStatus::Invalid => KeyEvent::KeyInvalid,
                ValidationStatus::Unknown => KeyEvent::KeyUnknown,
            };
            log_key_event(event, &record.key, Some(&record.hash()));
            self.reporter.key_validated(index, &record, &report.stats);
            report.records.push(record);

            pause_ms(self.config.key_pause_ms).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_accepts_positive_integers() {
        assert_eq!(
            normalize_amount("3", 10),
            Amount {
                count: 3,
                defaulted: false
            }
        );
        assert_eq!(normalize_amount("  25 ", 10).count, 25);
        assert_eq!(normalize_amount("+7", 10).count, 7);
    }

    #[test]
    fn normalize_reads_leading_digits() {
        assert_eq!(normalize_amount("12abc", 10).count, 12);
        assert_eq!(normalize_amount("3.9", 10).count, 3);
        assert!(!normalize_amount("3.9", 10).defaulted);
    }

    #[test]
    fn normalize_defaults_on_bad_input() {
        for input in ["abc", "-5", "0", "", "   ", "-", "x12", "-0"] {
            let amount = normalize_amount(input, 10);
            assert!(amount.defaulted, "input {:?} should default", input);
            assert_eq!(amount.count, 10);
        }
    }

    #[test]
    fn normalize_defaults_on_overflow() {
        let amount = normalize_amount("999999999999999999999999999999999999999999", 10);
        assert!(amount.defaulted);
        assert_eq!(amount.count, 10);
    }

    #[test]
    fn stats_tally_and_progress() {
        let mut stats = RunStats::new(3);
        assert_eq!(stats.progress_label(), "0.0");
        stats.record(ValidationStatus::Valid);
        assert_eq!(stats.progress_label(), "33.3");
        stats.record(ValidationStatus::Unknown);
        assert_eq!(stats.progress_label(), "66.7");
        stats.record(ValidationStatus::Invalid);
        assert_eq!(stats.progress_label(), "100.0");
        assert_eq!(stats.produced(), 3);
        assert_eq!((stats.valid, stats.invalid, stats.unknown), (1, 1, 1));
    }

    fn stats_at(produced: u64, total: u64) -> RunStats {
        RunStats {
            valid: produced,
            ..RunStats::new(total)
        }
    }

    #[test]
    fn progress_ties_round_up() {
        assert_eq!(stats_at(1, 16).progress_label(), "6.3");
        assert_eq!(stats_at(5, 16).progress_label(), "31.3");
        assert_eq!(stats_at(1, 80).progress_label(), "1.3");
        assert_eq!(stats_at(1, 40).progress_label(), "2.5");
        assert_eq!(stats_at(3, 8).progress_label(), "37.5");
        assert_eq!(stats_at(1, 4).progress_label(), "25.0");
    }

    #[test]
    fn progress_just_below_a_tie_rounds_down() {
        // 23 / 80 * 100 lands slightly under 28.75 in binary.
        assert_eq!(stats_at(23, 80).progress_label(), "28.7");
        assert_eq!(stats_at(41, 80).progress_label(), "51.2");
    }

    #[test]
    fn empty_stats_have_zero_progress() {
        assert_eq!(RunStats::new(0).progress_percent(), 0.0);
    }

    #[test]
    fn record_hash_matches_pseudo_hash() {
        let record = KeyRecord::new("ABC123", ValidationStatus::Valid);
        assert_eq!(record.hash(), pseudo_hash("ABC123"));
    }
}
