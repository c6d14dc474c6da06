use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::relay::RelayConfig;
use crate::strategy::Strategy;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Drape/0.1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// How `max_retries` is applied.
///
/// `SinglePass` tries each strategy exactly once and ignores `max_retries`.
/// `PerStrategy` re-runs a strategy whose error is retryable up to
/// `max_retries` extra times, with backoff, before moving on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryMode {
    #[default]
    SinglePass,
    PerStrategy,
}

impl FromStr for RetryMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single_pass" | "single-pass" => Ok(RetryMode::SinglePass),
            "per_strategy" | "per-strategy" => Ok(RetryMode::PerStrategy),
            other => Err(AppError::ConfigError(format!(
                "Invalid retry mode '{other}': expected 'single_pass' or 'per_strategy'"
            ))),
        }
    }
}

/// Linear backoff with a ceiling: `min(base + step * n, cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub base: Duration,
    pub step: Duration,
    pub cap: Duration,
}

impl BackoffConfig {
    /// No waiting at all.
    pub fn none() -> Self {
        Self {
            base: Duration::ZERO,
            step: Duration::ZERO,
            cap: Duration::ZERO,
        }
    }

    pub fn delay(&self, n: usize) -> Duration {
        let n = u32::try_from(n).unwrap_or(u32::MAX);
        self.base
            .saturating_add(self.step.saturating_mul(n))
            .min(self.cap)
    }
}

impl Default for BackoffConfig {
    /// 500 ms, growing by 200 ms per strategy, capped at 1.5 s.
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            step: Duration::from_millis(200),
            cap: Duration::from_millis(1500),
        }
    }
}

/// Settings for [`ImagePipeline`](crate::pipeline::ImagePipeline).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_retries: u32,
    /// Deadline for one run of one strategy, relay hops included.
    pub timeout: Duration,
    pub validate_content: bool,
    pub user_agent: String,
    pub retry_mode: RetryMode,
    pub backoff: BackoffConfig,
    /// Strategies in the order they are tried.
    pub strategies: Vec<Strategy>,
    pub relays: RelayConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            validate_content: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            retry_mode: RetryMode::default(),
            backoff: BackoffConfig::default(),
            strategies: Strategy::DEFAULT_ORDER.to_vec(),
            relays: RelayConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_mode(mut self, mode: RetryMode) -> Self {
        self.retry_mode = mode;
        self
    }

    pub fn with_validate_content(mut self, validate: bool) -> Self {
        self.validate_content = validate;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_strategies(mut self, strategies: Vec<Strategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn with_relays(mut self, relays: RelayConfig) -> Self {
        self.relays = relays;
        self
    }

    /// Read overrides from environment variables.
    ///
    /// - `DRAPE_TIMEOUT_MS` (defaults to 10000)
    /// - `DRAPE_MAX_RETRIES` (defaults to 2)
    /// - `DRAPE_RETRY_MODE` (`single_pass` | `per_strategy`)
    /// - `DRAPE_VALIDATE_CONTENT` (`true` | `false`)
    /// - `DRAPE_USER_AGENT`
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Some(raw) = lookup("DRAPE_TIMEOUT_MS") {
            let ms: u64 = raw.trim().parse().map_err(|_| {
                AppError::ConfigError(format!(
                    "Invalid DRAPE_TIMEOUT_MS '{raw}': must be a positive integer"
                ))
            })?;
            if ms == 0 {
                return Err(AppError::ConfigError(
                    "DRAPE_TIMEOUT_MS must be at least 1".into(),
                ));
            }
            config.timeout = Duration::from_millis(ms);
        }

        if let Some(raw) = lookup("DRAPE_MAX_RETRIES") {
            config.max_retries = raw.trim().parse().map_err(|_| {
                AppError::ConfigError(format!(
                    "Invalid DRAPE_MAX_RETRIES '{raw}': must be a non-negative integer"
                ))
            })?;
        }

        if let Some(raw) = lookup("DRAPE_RETRY_MODE") {
            config.retry_mode = raw.parse()?;
        }

        if let Some(raw) = lookup("DRAPE_VALIDATE_CONTENT") {
            config.validate_content = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(AppError::ConfigError(format!(
                        "Invalid DRAPE_VALIDATE_CONTENT '{raw}': expected true or false"
                    )));
                }
            };
        }

        if let Some(raw) = lookup("DRAPE_USER_AGENT") {
            if !raw.trim().is_empty() {
                config.user_agent = raw.trim().to_string();
            }
        }

        Ok(config)
    }
}
