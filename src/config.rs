//! Configuration types.
//!
//! Everything is read from environment variables. Each `from_env()` has a
//! `from_lookup()` twin taking an arbitrary key lookup so parsing can be
//! exercised without touching the process environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Backoff and pacing parameters for the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first call when the endpoint keeps rate limiting.
    pub max_retries: u32,
    /// First backoff delay; doubled on each further rate-limit signal.
    pub backoff_base: Duration,
    /// Upper bound for the doubled delay (jitter is added on top).
    pub backoff_cap: Duration,
    /// Maximum uniform jitter added to each backoff.
    pub backoff_jitter: Duration,
    /// Fixed delay before every classification call.
    pub pacing_base: Duration,
    /// Maximum uniform jitter added to the pacing delay.
    pub pacing_jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            backoff_base: Duration::from_secs(5),
            backoff_cap: Duration::from_secs(300),
            backoff_jitter: Duration::from_secs(5),
            pacing_base: Duration::from_secs(3),
            pacing_jitter: Duration::from_secs(2),
        }
    }
}

impl RetryConfig {
    /// No pacing and no backoff delays; only the retry bound is kept.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_base: Duration::ZERO,
            backoff_cap: Duration::ZERO,
            backoff_jitter: Duration::ZERO,
            pacing_base: Duration::ZERO,
            pacing_jitter: Duration::ZERO,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            max_retries: parse_or(&lookup, "JOBMAIL_MAX_RETRIES", defaults.max_retries)?,
            backoff_base: secs_or(&lookup, "JOBMAIL_BACKOFF_BASE_SECS", defaults.backoff_base)?,
            backoff_cap: secs_or(&lookup, "JOBMAIL_BACKOFF_CAP_SECS", defaults.backoff_cap)?,
            backoff_jitter: secs_or(
                &lookup,
                "JOBMAIL_BACKOFF_JITTER_SECS",
                defaults.backoff_jitter,
            )?,
            pacing_base: secs_or(&lookup, "JOBMAIL_PACING_BASE_SECS", defaults.pacing_base)?,
            pacing_jitter: secs_or(
                &lookup,
                "JOBMAIL_PACING_JITTER_SECS",
                defaults.pacing_jitter,
            )?,
        })
    }
}

/// Classification call parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    /// Sampling temperature (kept low so the category choice is stable).
    pub temperature: f32,
    /// Output token ceiling.
    pub max_tokens: u32,
    /// Body characters embedded in the prompt.
    pub body_char_limit: usize,
    pub retry: RetryConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 200,
            body_char_limit: 1000,
            retry: RetryConfig::default(),
        }
    }
}

impl ClassifierConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            retry: RetryConfig::from_lookup(&lookup)?,
            ..Self::default()
        })
    }
}

/// Batch service parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// How far back to look for unlabeled mail.
    pub lookback_days: u32,
    /// Candidate messages fetched per run.
    pub max_messages: usize,
    /// Pause between runs.
    pub check_interval: Duration,
    /// Run a single batch and exit.
    pub run_once: bool,
    /// Directory for the rolling log file, if any.
    pub log_dir: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            lookback_days: 1,
            max_messages: 50,
            check_interval: Duration::from_secs(15 * 60),
            run_once: false,
            log_dir: None,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let interval_minutes: u64 = parse_or(
            &lookup,
            "CHECK_INTERVAL_MINUTES",
            defaults.check_interval.as_secs() / 60,
        )?;
        if interval_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CHECK_INTERVAL_MINUTES".into(),
                message: "must be at least 1".into(),
            });
        }

        Ok(Self {
            lookback_days: parse_or(&lookup, "DAYS_TO_CHECK", defaults.lookback_days)?,
            max_messages: parse_or(&lookup, "MAX_EMAILS", defaults.max_messages)?,
            check_interval: Duration::from_secs(interval_minutes * 60),
            run_once: lookup("JOBMAIL_RUN_ONCE").is_some_and(|v| is_truthy(&v)),
            log_dir: lookup("JOBMAIL_LOG_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

/// Parse `key` if set, otherwise return `default`.
pub(crate) fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("cannot parse '{raw}'"),
                })
        }
        _ => Ok(default),
    }
}

fn secs_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    parse_or(lookup, key, default.as_secs()).map(Duration::from_secs)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
