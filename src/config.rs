//! Configuration system for keyforge.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `keyforge.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `KEYFORGE_MAX_ATTEMPTS` - Session creation attempts before giving up
//! - `KEYFORGE_BACKOFF_BASE_MS` - Linear backoff base between attempts
//! - `KEYFORGE_SESSION_FAILURE_RATE` - Probability that a simulated session call fails
//! - `KEYFORGE_SEED` - Seed for the simulation RNG (unset = random)
//! - `KEYFORGE_DEFAULT_AMOUNT` - Key count used when the requested amount is invalid
//! - `KEYFORGE_FAST` - Skip all simulated delays
//! - `KEYFORGE_REPORT_DIR` - Directory for saved reports
//! - `KEYFORGE_REPORT_PREFIX` - File name prefix for saved reports
//! - `KEYFORGE_REPORT_FORMAT` - `text` or `json`
//! - `KEYFORGE_LOGGING_ENABLED` - Enable tracing output on stderr
//! - `KEYFORGE_LOG_LEVEL` - Log level (trace, debug, info, warn, error)

use config::{Config, ConfigBuilder, File};
use config::builder::DefaultState;
use serde::Deserialize;
use std::env;
use std::ops::Range;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crate::errors::{KeyforgeError, KeyforgeResult};

/// Global configuration singleton.
static CONFIG: OnceLock<KeyforgeConfig> = OnceLock::new();

/// Base name of the optional configuration file.
pub const CONFIG_FILE_NAME: &str = "keyforge";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KeyforgeConfig {
    /// Simulated session client
    pub client: ClientConfig,
    /// Pipeline pacing and defaults
    pub pipeline: PipelineConfig,
    /// Saved report settings
    pub report: ReportConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Session client configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Attempts per session before reporting failure
    pub max_attempts: u32,
    /// Backoff before retry `n` is `backoff_base_ms * n`
    pub backoff_base_ms: u64,
    /// Lower bound of simulated session latency (inclusive)
    pub session_latency_min_ms: u64,
    /// Upper bound of simulated session latency (exclusive)
    pub session_latency_max_ms: u64,
    /// Lower bound of simulated validation latency (inclusive)
    pub validation_latency_min_ms: u64,
    /// Upper bound of simulated validation latency (exclusive)
    pub validation_latency_max_ms: u64,
    /// Probability in `[0, 1]` that one simulated session call fails
    pub session_failure_rate: f64,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 500,
            session_latency_min_ms: 100,
            session_latency_max_ms: 300,
            validation_latency_min_ms: 50,
            validation_latency_max_ms: 150,
            session_failure_rate: 0.0,
            seed: None,
        }
    }
}

impl ClientConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn session_latency(&self) -> Range<u64> {
        self.session_latency_min_ms..self.session_latency_max_ms
    }

    pub fn validation_latency(&self) -> Range<u64> {
        self.validation_latency_min_ms..self.validation_latency_max_ms
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Key count used when the requested amount is malformed or not positive
    pub default_amount: u64,
    /// Pause before the run starts
    pub startup_delay_ms: u64,
    /// Pause before the first session is created
    pub session_phase_delay_ms: u64,
    /// Pause after each session
    pub session_pause_ms: u64,
    /// Pause after each key
    pub key_pause_ms: u64,
    /// Simulated session teardown
    pub teardown_delay_ms: u64,
    /// Skip every simulated delay
    pub fast: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_amount: 10,
            startup_delay_ms: 1500,
            session_phase_delay_ms: 2000,
            session_pause_ms: 800,
            key_pause_ms: 300,
            teardown_delay_ms: 1000,
            fast: false,
        }
    }
}

/// Saved report configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Directory reports are written into
    pub output_dir: String,
    /// File name prefix; the epoch-millis timestamp and extension are appended
    pub file_prefix: String,
    /// Report format: "text" or "json"
    pub format: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: ".".to_string(),
            file_prefix: "sora2_keys".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "info".to_string(),
        }
    }
}

fn config_err(e: config::ConfigError) -> KeyforgeError {
    KeyforgeError::ConfigError(e.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl KeyforgeConfig {
    /// Defaults with every simulated delay set to zero.
    ///
    /// Handy for tests and scripted runs.
    pub fn instant() -> Self {
        Self::default().into_fast_mode()
    }

    /// Zero every simulated delay, keeping all other settings.
    pub fn into_fast_mode(mut self) -> Self {
        self.client.backoff_base_ms = 0;
        self.client.session_latency_min_ms = 0;
        self.client.session_latency_max_ms = 0;
        self.client.validation_latency_min_ms = 0;
        self.client.validation_latency_max_ms = 0;
        self.pipeline.startup_delay_ms = 0;
        self.pipeline.session_phase_delay_ms = 0;
        self.pipeline.session_pause_ms = 0;
        self.pipeline.key_pause_ms = 0;
        self.pipeline.teardown_delay_ms = 0;
        self.pipeline.fast = true;
        self
    }

    fn defaults() -> KeyforgeResult<ConfigBuilder<DefaultState>> {
        let builder = Config::builder()
            .set_default("client.max_attempts", 3)
            .map_err(config_err)?
            .set_default("client.backoff_base_ms", 500)
            .map_err(config_err)?
            .set_default("client.session_latency_min_ms", 100)
            .map_err(config_err)?
            .set_default("client.session_latency_max_ms", 300)
            .map_err(config_err)?
            .set_default("client.validation_latency_min_ms", 50)
            .map_err(config_err)?
            .set_default("client.validation_latency_max_ms", 150)
            .map_err(config_err)?
            .set_default("client.session_failure_rate", 0.0)
            .map_err(config_err)?
            .set_default("pipeline.default_amount", 10)
            .map_err(config_err)?
            .set_default("pipeline.startup_delay_ms", 1500)
            .map_err(config_err)?
            .set_default("pipeline.session_phase_delay_ms", 2000)
            .map_err(config_err)?
            .set_default("pipeline.session_pause_ms", 800)
            .map_err(config_err)?
            .set_default("pipeline.key_pause_ms", 300)
            .map_err(config_err)?
            .set_default("pipeline.teardown_delay_ms", 1000)
            .map_err(config_err)?
            .set_default("pipeline.fast", false)
            .map_err(config_err)?
            .set_default("report.output_dir", ".")
            .map_err(config_err)?
            .set_default("report.file_prefix", "sora2_keys")
            .map_err(config_err)?
            .set_default("report.format", "text")
            .map_err(config_err)?
            .set_default("logging.enabled", false)
            .map_err(config_err)?
            .set_default("logging.level", "info")
            .map_err(config_err)?;
        Ok(builder)
    }

    fn with_env_overrides(
        builder: ConfigBuilder<DefaultState>,
    ) -> KeyforgeResult<ConfigBuilder<DefaultState>> {
        let builder = builder
            .set_override_option(
                "client.max_attempts",
                env_parsed::<i64>("KEYFORGE_MAX_ATTEMPTS"),
            )
            .map_err(config_err)?
            .set_override_option(
                "client.backoff_base_ms",
                env_parsed::<i64>("KEYFORGE_BACKOFF_BASE_MS"),
            )
            .map_err(config_err)?
            .set_override_option(
                "client.session_failure_rate",
                env_parsed::<f64>("KEYFORGE_SESSION_FAILURE_RATE"),
            )
            .map_err(config_err)?
            .set_override_option("client.seed", env_parsed::<i64>("KEYFORGE_SEED"))
            .map_err(config_err)?
            .set_override_option(
                "pipeline.default_amount",
                env_parsed::<i64>("KEYFORGE_DEFAULT_AMOUNT"),
            )
            .map_err(config_err)?
            .set_override_option("pipeline.fast", env_parsed::<bool>("KEYFORGE_FAST"))
            .map_err(config_err)?
            .set_override_option("report.output_dir", env::var("KEYFORGE_REPORT_DIR").ok())
            .map_err(config_err)?
            .set_override_option(
                "report.file_prefix",
                env::var("KEYFORGE_REPORT_PREFIX").ok(),
            )
            .map_err(config_err)?
            .set_override_option("report.format", env::var("KEYFORGE_REPORT_FORMAT").ok())
            .map_err(config_err)?
            .set_override_option(
                "logging.enabled",
                env_parsed::<bool>("KEYFORGE_LOGGING_ENABLED"),
            )
            .map_err(config_err)?
            .set_override_option("logging.level", env::var("KEYFORGE_LOG_LEVEL").ok())
            .map_err(config_err)?;
        Ok(builder)
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> KeyforgeResult<Self> {
        let settings = builder
            .build()
            .map_err(|e| KeyforgeError::ConfigError(format!("failed to build config: {e}")))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| KeyforgeError::ConfigError(format!("failed to deserialize config: {e}")))?;

        if config.pipeline.fast {
            Ok(config.into_fast_mode())
        } else {
            Ok(config)
        }
    }

    /// Load configuration from `keyforge.toml` (if present) and the environment.
    pub fn load() -> KeyforgeResult<Self> {
        let builder = Self::defaults()?
            .add_source(File::with_name(CONFIG_FILE_NAME).required(false));
        Self::finish(Self::with_env_overrides(builder)?)
    }

    /// Load configuration from an explicit file, then apply the environment.
    pub fn load_from_file(path: &Path) -> KeyforgeResult<Self> {
        let builder = Self::defaults()?.add_source(File::from(path).required(true));
        Self::finish(Self::with_env_overrides(builder)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> KeyforgeResult<()> {
        if self.client.max_attempts == 0 {
            return Err(KeyforgeError::ConfigError(
                "client.max_attempts must be greater than 0".to_string(),
            ));
        }

        let rate = self.client.session_failure_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(KeyforgeError::ConfigError(format!(
                "client.session_failure_rate must be within [0, 1], got {rate}"
            )));
        }

        if self.client.session_latency_min_ms > self.client.session_latency_max_ms {
            return Err(KeyforgeError::ConfigError(
                "client.session_latency_min_ms must not exceed client.session_latency_max_ms"
                    .to_string(),
            ));
        }
        if self.client.validation_latency_min_ms > self.client.validation_latency_max_ms {
            return Err(KeyforgeError::ConfigError(
                "client.validation_latency_min_ms must not exceed client.validation_latency_max_ms"
                    .to_string(),
            ));
        }

        if self.pipeline.default_amount == 0 {
            return Err(KeyforgeError::ConfigError(
                "pipeline.default_amount must be greater than 0".to_string(),
            ));
        }

        if self.report.file_prefix.trim().is_empty() {
            return Err(KeyforgeError::ConfigError(
                "report.file_prefix cannot be empty".to_string(),
            ));
        }
        match self.report.format.to_lowercase().as_str() {
            "text" | "json" => {}
            other => {
                return Err(KeyforgeError::ConfigError(format!(
                    "report.format must be 'text' or 'json', got '{other}'"
                )));
            }
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(KeyforgeError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> KeyforgeResult<&'static KeyforgeConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = KeyforgeConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is fine.
    let _ = CONFIG.set(config);

    CONFIG
        .get()
        .ok_or_else(|| KeyforgeError::ConfigError("configuration was not stored".to_string()))
}
