//! Simulated session client.
//!
//! `SessionClient` stands in for a remote auth service. It sleeps to emulate
//! network latency, retries session creation with linear backoff, and rolls
//! a tri-state outcome for every key it is asked to validate. Nothing leaves
//! the process.

use std::fmt;
use std::ops::Range;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::errors::{KeyforgeError, KeyforgeResult};
use crate::hash::{obfuscate_token, pseudo_hash};
use crate::key_generation::{random_string, BASE36_CHARSET, TOKEN_CHARSET};
use crate::logging::{log_key_event, KeyEvent};

/// Upper bound (exclusive) of the roll that yields `Valid`.
pub const VALID_THRESHOLD: f64 = 0.30;
/// Upper bound (exclusive) of the roll that yields `Invalid`.
pub const INVALID_THRESHOLD: f64 = 0.80;

/// User agent attached to simulated requests.
pub const USER_AGENT: &str = concat!("keyforge/", env!("CARGO_PKG_VERSION"));

/// Reason recorded when the simulated transport drops a session call.
const SIMULATED_FAILURE: &str = "Network error";

/// A simulated credential bundle. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Obfuscated session identifier
    pub session_id: String,
    /// Display token, e.g. `sess_k3j9x0a1bq.....`
    pub token: String,
}

/// Outcome of a simulated key validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Valid,
    Invalid,
    Unknown,
}

impl ValidationStatus {
    /// Map a uniform roll in `[0, 1)` to a status.
    ///
    /// `r < 0.30` is valid, `r < 0.80` is invalid, anything else unknown.
    pub fn from_roll(roll: f64) -> Self {
        if roll < VALID_THRESHOLD {
            ValidationStatus::Valid
        } else if roll < INVALID_THRESHOLD {
            ValidationStatus::Invalid
        } else {
            ValidationStatus::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Valid => "valid",
            ValidationStatus::Invalid => "invalid",
            ValidationStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick a duration uniformly from `range`, in milliseconds.
///
/// An empty range collapses to its start.
fn jitter(rng: &mut StdRng, range: Range<u64>) -> Duration {
    if range.is_empty() {
        Duration::from_millis(range.start)
    } else {
        Duration::from_millis(rng.random_range(range))
    }
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

/// Simulated client for the auth service.
///
/// Owns its RNG so a seeded client replays the same run.
#[derive(Debug)]
pub struct SessionClient {
    config: ClientConfig,
    session_token: String,
    rng: StdRng,
}

impl SessionClient {
    /// Create a client. Uses `config.seed` when set, OS entropy otherwise.
    pub fn new(config: ClientConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::with_rng(config, rng)
    }

    /// Create a client around a caller-supplied RNG.
    pub fn with_rng(config: ClientConfig, mut rng: StdRng) -> Self {
        let session_token = mint_session_token(&mut rng);
        Self {
            config,
            session_token,
            rng,
        }
    }

    /// Token minted at construction and attached to every request.
    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Tag for one simulated request: `req_<epoch-millis>_<6 base36>`.
    fn request_id(&mut self) -> String {
        format!(
            "req_{}_{}",
            Utc::now().timestamp_millis(),
            random_string(&mut self.rng, BASE36_CHARSET, 6)
        )
    }

    /// Create a session using the simulated transport.
    ///
    /// Each attempt fails with probability `session_failure_rate`; with the
    /// default rate of zero the first attempt always succeeds.
    pub async fn create_session(&mut self) -> KeyforgeResult<Session> {
        let failure_rate = self.config.session_failure_rate;
        self.run_attempts(|_, rng| {
            if failure_rate > 0.0 && rng.random::<f64>() < failure_rate {
                Err(SIMULATED_FAILURE.to_string())
            } else {
                Ok(())
            }
        })
        .await
    }

    /// Create a session, asking `call` whether each attempt reached the server.
    ///
    /// `call` receives the 1-based attempt number. Latency and backoff are
    /// simulated exactly as for [`SessionClient::create_session`].
    pub async fn create_session_with<F>(&mut self, mut call: F) -> KeyforgeResult<Session>
    where
        F: FnMut(u32) -> Result<(), String>,
    {
        self.run_attempts(|attempt, _| call(attempt)).await
    }

    async fn run_attempts<F>(&mut self, mut call: F) -> KeyforgeResult<Session>
    where
        F: FnMut(u32, &mut StdRng) -> Result<(), String>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let request_id = self.request_id();
        debug!(
            request_id = %request_id,
            auth = %pseudo_hash(&self.session_token),
            user_agent = USER_AGENT,
            "Creating session"
        );

        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            let latency = jitter(&mut self.rng, self.config.session_latency());
            pause(latency).await;

            match call(attempt, &mut self.rng) {
                Ok(()) => {
                    let session = Session {
                        session_id: mint_session_token(&mut self.rng),
                        token: format!(
                            "sess_{}.....",
                            random_string(&mut self.rng, BASE36_CHARSET, 10)
                        ),
                    };
                    debug!(request_id = %request_id, attempt, "Session established");
                    return Ok(session);
                }
                Err(reason) => {
                    last_error = reason;
                    if attempt == max_attempts {
                        break;
                    }
                    let backoff = self.config.backoff_base() * attempt;
                    debug!(
                        request_id = %request_id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %last_error,
                        "Session attempt failed, backing off"
                    );
                    pause(backoff).await;
                }
            }
        }

        warn!(
            request_id = %request_id,
            attempts = max_attempts,
            error = %last_error,
            "Session creation failed"
        );
        log_key_event(KeyEvent::SessionFailed, &request_id, Some(&last_error));
        Err(KeyforgeError::SessionFailed {
            attempts: max_attempts,
            reason: last_error,
        })
    }

    /// Validate a key against the simulated service. Never fails.
    pub async fn validate_key(&mut self, key: &str) -> ValidationStatus {
        let latency = jitter(&mut self.rng, self.config.validation_latency());
        pause(latency).await;

        debug!(
            key_hash = %pseudo_hash(key),
            session = %self.session_token,
            "Validating key"
        );

        let roll: f64 = self.rng.random();
        ValidationStatus::from_roll(roll)
    }
}

/// `s2_` plus 16 alphanumerics, obfuscated for display.
fn mint_session_token(rng: &mut StdRng) -> String {
    let raw = format!("s2_{}", random_string(rng, TOKEN_CHARSET, 16));
    obfuscate_token(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn instant_config() -> ClientConfig {
        ClientConfig {
            backoff_base_ms: 0,
            session_latency_min_ms: 0,
            session_latency_max_ms: 0,
            validation_latency_min_ms: 0,
            validation_latency_max_ms: 0,
            seed: Some(11),
            ..ClientConfig::default()
        }
    }

    #[test]
    fn roll_thresholds_are_exact() {
        assert_eq!(ValidationStatus::from_roll(0.0), ValidationStatus::Valid);
        assert_eq!(ValidationStatus::from_roll(0.2999), ValidationStatus::Valid);
        assert_eq!(ValidationStatus::from_roll(0.30), ValidationStatus::Invalid);
        assert_eq!(ValidationStatus::from_roll(0.7999), ValidationStatus::Invalid);
        assert_eq!(ValidationStatus::from_roll(0.80), ValidationStatus::Unknown);
        assert_eq!(ValidationStatus::from_roll(0.9999), ValidationStatus::Unknown);
    }

    #[test]
    fn status_display_is_lowercase() {
        assert_eq!(ValidationStatus::Valid.to_string(), "valid");
        assert_eq!(ValidationStatus::Invalid.to_string(), "invalid");
        assert_eq!(ValidationStatus::Unknown.to_string(), "unknown");
        let json = serde_json::to_string(&ValidationStatus::Unknown).unwrap();
        assert_eq!(json, "\"unknown\"");
    }

    #[test]
    fn session_token_is_obfuscated() {
        let client = SessionClient::new(instant_config());
        // base64 of 19 bytes is 28 chars; two dropped, two dots added.
        assert_eq!(client.session_token().len(), 28);
        assert!(client.session_token().ends_with(".."));
        assert!(client.session_token().starts_with("czJf"));
    }

    #[tokio::test]
    async fn default_client_always_establishes() {
        let mut client = SessionClient::new(instant_config());
        for _ in 0..20 {
            let session = client.create_session().await.unwrap();
            assert!(session.token.starts_with("sess_"));
            assert!(session.token.ends_with("....."));
            assert_eq!(session.token.len(), "sess_".len() + 10 + 5);
            assert!(session.session_id.ends_with(".."));
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let mut client = SessionClient::new(instant_config());
        let mut calls = Vec::new();
        let session = client
            .create_session_with(|attempt| {
                calls.push(attempt);
                if attempt < 3 {
                    Err("timeout".to_string())
                } else {
                    Ok(())
                }
            })
            .await;
        assert!(session.is_ok());
        assert_eq!(calls, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let mut client = SessionClient::new(instant_config());
        let mut calls = 0;
        let err = client
            .create_session_with(|_| {
                calls += 1;
                Err("refused".to_string())
            })
            .await
            .unwrap_err();
        assert_eq!(calls, 3);
        match err {
            KeyforgeError::SessionFailed { attempts, reason } => {
                assert_eq!(attempts, 3);
                assert_eq!(reason, "refused");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn backoff_grows_linearly() {
        let mut config = instant_config();
        config.backoff_base_ms = 20;
        let mut client = SessionClient::new(config);

        let start = Instant::now();
        let _ = client
            .create_session_with(|_| Err("down".to_string()))
            .await;
        // 20ms after attempt 1, 40ms after attempt 2, none after the last.
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn certain_failure_rate_always_fails() {
        let mut config = instant_config();
        config.session_failure_rate = 1.0;
        let mut client = SessionClient::new(config);
        assert!(matches!(
            client.create_session().await,
            Err(KeyforgeError::SessionFailed { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn validation_distribution_converges() {
        let mut client = SessionClient::new(instant_config());
        let trials = 20_000;
        let (mut valid, mut invalid, mut unknown) = (0u32, 0u32, 0u32);
        for _ in 0..trials {
            match client.validate_key("ABC123").await {
                ValidationStatus::Valid => valid += 1,
                ValidationStatus::Invalid => invalid += 1,
                ValidationStatus::Unknown => unknown += 1,
            }
        }
        let share = |n: u32| n as f64 / trials as f64;
        assert!((share(valid) - 0.30).abs() < 0.02, "valid {}", share(valid));
        assert!((share(invalid) - 0.50).abs() < 0.02, "invalid {}", share(invalid));
        assert!((share(unknown) - 0.20).abs() < 0.02, "unknown {}", share(unknown));
    }

    #[test]
    fn jitter_handles_empty_range() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(jitter(&mut rng, 0..0), Duration::ZERO);
        assert_eq!(jitter(&mut rng, 5..5), Duration::from_millis(5));
        let d = jitter(&mut rng, 100..300);
        assert!(d >= Duration::from_millis(100) && d < Duration::from_millis(300));
    }
}
