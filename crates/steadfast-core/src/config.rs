//! Retry configuration.
//!
//! [`BackoffConfig`] is the validated, immutable configuration a session runs
//! with. It is produced either by [`BackoffConfigBuilder`] or from the
//! serde-friendly [`BackoffSettings`], and both paths apply the same checks, so
//! a malformed configuration is rejected before any session starts.
//!
//! # Examples
//!
//! ```rust
//! use steadfast_core::config::BackoffConfig;
//! use std::time::Duration;
//!
//! let config = BackoffConfig::builder()
//!     .min_delay(Duration::from_millis(100))
//!     .max_delay(Duration::from_secs(10))
//!     .max_attempts(5)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.max_attempts(), 5);
//! assert!(!config.use_jitter());
//! ```

use crate::error::{ConfigError, ErrorKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Validated retry configuration, fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    min_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    max_duration: Option<Duration>,
    use_jitter: bool,
    non_retryable: Vec<ErrorKind>,
}

impl BackoffConfig {
    /// Create a new builder.
    pub fn builder() -> BackoffConfigBuilder {
        BackoffConfigBuilder::default()
    }

    /// Lower bound of the first retry delay.
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Ceiling on any computed delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Total attempts allowed, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Overall wall-clock budget measured from session start.
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration
    }

    /// Whether delays are scaled by a random factor in `[1, 2)`.
    pub fn use_jitter(&self) -> bool {
        self.use_jitter
    }

    /// Kinds that stop retrying immediately.
    pub fn non_retryable(&self) -> &[ErrorKind] {
        &self.non_retryable
    }
}

/// Builder for [`BackoffConfig`].
///
/// `min_delay`, `max_delay` and `max_attempts` are required.
#[derive(Debug, Clone, Default)]
pub struct BackoffConfigBuilder {
    min_delay: Option<Duration>,
    max_delay: Option<Duration>,
    max_attempts: Option<u32>,
    max_duration: Option<Duration>,
    use_jitter: Option<bool>,
    non_retryable: Option<Vec<ErrorKind>>,
}

impl BackoffConfigBuilder {
    /// Set the delay before the first retry.
    pub fn min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = Some(delay);
        self
    }

    /// Set the ceiling on any delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set the total number of attempts, including the first.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Stop retrying once the next attempt would start after
    /// `start + duration`.
    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }

    /// Enable or disable randomized delay scaling.
    ///
    /// Default: `false`
    pub fn use_jitter(mut self, enabled: bool) -> Self {
        self.use_jitter = Some(enabled);
        self
    }

    /// Add a non-retryable kind to the list.
    ///
    /// The first call starts from the default list, which holds
    /// [`ErrorKind::NON_RETRYABLE`].
    pub fn non_retryable_kind(mut self, kind: ErrorKind) -> Self {
        self.non_retryable
            .get_or_insert_with(default_non_retryable)
            .push(kind);
        self
    }

    /// Replace the list of non-retryable kinds. An empty list makes every
    /// failure retryable.
    pub fn non_retryable_kinds(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.non_retryable = Some(kinds.into_iter().collect());
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<BackoffConfig, ConfigError> {
        let min_delay = self.min_delay.ok_or(ConfigError::Missing("min_delay"))?;
        let max_delay = self.max_delay.ok_or(ConfigError::Missing("max_delay"))?;
        let max_attempts = self
            .max_attempts
            .ok_or(ConfigError::Missing("max_attempts"))?;

        if max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if max_delay < min_delay {
            return Err(ConfigError::InvalidDelayRange {
                min: min_delay,
                max: max_delay,
            });
        }

        let mut non_retryable = Vec::new();
        for kind in self.non_retryable.unwrap_or_else(default_non_retryable) {
            if !non_retryable.contains(&kind) {
                non_retryable.push(kind);
            }
        }

        Ok(BackoffConfig {
            min_delay,
            max_delay,
            max_attempts,
            max_duration: self.max_duration,
            use_jitter: self.use_jitter.unwrap_or(false),
            non_retryable,
        })
    }
}

fn default_non_retryable() -> Vec<ErrorKind> {
    vec![ErrorKind::NON_RETRYABLE]
}

/// Plain-data form of [`BackoffConfig`] for configuration files.
///
/// Durations are whole milliseconds. Convert with `BackoffConfig::try_from`.
///
/// ```toml
/// min_delay_ms = 100
/// max_delay_ms = 10000
/// max_attempts = 5
/// max_duration_ms = 30000
/// use_jitter = true
/// non_retryable = ["non_retryable", "auth"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffSettings {
    /// Delay before the first retry, in milliseconds.
    pub min_delay_ms: u64,
    /// Ceiling on any delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Total attempts allowed, including the first.
    pub max_attempts: u32,
    /// Overall budget from session start, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_ms: Option<u64>,
    /// Randomize delays.
    #[serde(default)]
    pub use_jitter: bool,
    /// Kind names that stop retrying. When absent the built-in
    /// `non_retryable` kind is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_retryable: Option<Vec<String>>,
}

impl TryFrom<BackoffSettings> for BackoffConfig {
    type Error = ConfigError;

    fn try_from(settings: BackoffSettings) -> Result<Self, Self::Error> {
        let mut builder = BackoffConfig::builder()
            .min_delay(Duration::from_millis(settings.min_delay_ms))
            .max_delay(Duration::from_millis(settings.max_delay_ms))
            .max_attempts(settings.max_attempts)
            .use_jitter(settings.use_jitter);

        if let Some(ms) = settings.max_duration_ms {
            builder = builder.max_duration(Duration::from_millis(ms));
        }
        if let Some(kinds) = settings.non_retryable {
            builder = builder.non_retryable_kinds(kinds.into_iter().map(ErrorKind::from_name));
        }

        builder.build()
    }
}

/// Durations are rounded to the nearest millisecond, so sub-millisecond
/// precision does not survive the conversion.
impl From<&BackoffConfig> for BackoffSettings {
    fn from(config: &BackoffConfig) -> Self {
        Self {
            min_delay_ms: round_millis(config.min_delay),
            max_delay_ms: round_millis(config.max_delay),
            max_attempts: config.max_attempts,
            max_duration_ms: config.max_duration.map(round_millis),
            use_jitter: config.use_jitter,
            non_retryable: Some(
                config
                    .non_retryable
                    .iter()
                    .map(|kind| kind.name().to_string())
                    .collect(),
            ),
        }
    }
}

fn round_millis(duration: Duration) -> u64 {
    let millis = (duration.as_nanos() + 500_000) / 1_000_000;
    u64::try_from(millis).unwrap_or(u64::MAX)
}
