//! Shutdown configuration loaded from the environment.
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `APP_SHUTDOWN_TIMEOUT` | `10s` | Time budget for the whole shutdown |
//!
//! Durations use the `<number><unit>` form, optionally chained: `500ms`, `10s`, `1m30s`.
//! Numbers may carry a decimal fraction (`1.5s`, `0.5m`). Units: `ns`, `us`, `ms`, `s`,
//! `m`, `h`.

use std::env;
use std::future::Future;
use std::pin::pin;
use std::time::Duration;

use futures::future::{self, Either};
use tokio_util::sync::CancellationToken;
#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// Environment variable holding the shutdown timeout.
pub const SHUTDOWN_TIMEOUT_ENV: &str = "APP_SHUTDOWN_TIMEOUT";

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while loading configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A variable is set but does not hold a valid duration
    InvalidDuration { key: String, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidDuration { key, value } => write!(
                f,
                "failed to parse environment variable '{}': invalid duration {:?}",
                key, value
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Shutdown configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloserConfig {
    /// Time budget for the whole shutdown, after which the shutdown token is cancelled.
    pub shutdown_timeout: Duration,
}

impl Default for CloserConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl CloserConfig {
    /// Load the configuration from environment variables, falling back to defaults for
    /// unset ones.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDuration`] if `APP_SHUTDOWN_TIMEOUT` is set to
    /// something that is not a duration.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(value) = env::var(SHUTDOWN_TIMEOUT_ENV) {
            config.shutdown_timeout =
                parse_duration(&value).ok_or_else(|| ConfigError::InvalidDuration {
                    key: SHUTDOWN_TIMEOUT_ENV.to_string(),
                    value,
                })?;
        }

        #[cfg(feature = "tracing")]
        debug!(
            shutdown_timeout_ms = millis(config.shutdown_timeout),
            "loaded closer configuration"
        );
        Ok(config)
    }

    /// Cancel `token` once the shutdown timeout has elapsed.
    ///
    /// `sleep` produces the runtime's timer future for a duration, e.g.
    /// `tokio::time::sleep`. The returned future completes early if `token` is
    /// cancelled by someone else; spawn it next to [`Closer::close`](crate::Closer::close).
    ///
    /// # Examples
    ///
    /// ```
    /// use closer::CloserConfig;
    /// use std::time::Duration;
    /// use tokio_util::sync::CancellationToken;
    ///
    /// # #[tokio::main] async fn main() {
    /// let config = CloserConfig { shutdown_timeout: Duration::from_millis(10) };
    /// let token = CancellationToken::new();
    ///
    /// config.deadline(token.clone(), tokio::time::sleep).await;
    /// assert!(token.is_cancelled());
    /// # }
    /// ```
    pub fn deadline<F, Fut>(&self, token: CancellationToken, sleep: F) -> impl Future<Output = ()>
    where
        F: FnOnce(Duration) -> Fut,
        Fut: Future<Output = ()>,
    {
        let timeout = self.shutdown_timeout;
        let timer = sleep(timeout);
        async move {
            let timer = pin!(timer);
            let cancelled = pin!(token.cancelled());
            let outcome = future::select(timer, cancelled).await;
            if let Either::Left(_) = outcome {
                #[cfg(feature = "tracing")]
                warn!(timeout_ms = millis(timeout), "shutdown deadline expired");
                token.cancel();
            }
        }
    }
}

// Whole milliseconds, saturating at u64::MAX
#[cfg(any(feature = "tracing", test))]
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Parse a duration such as `10s`, `250ms`, `1.5h` or `1h30m`.
///
/// Fraction digits below nanosecond precision are truncated. Returns `None` when the
/// total does not fit in `u64` nanoseconds.
fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if input == "0" {
        return Some(Duration::ZERO);
    }

    let mut total: u64 = 0;
    let mut rest = input;
    while !rest.is_empty() {
        let (whole, tail) = split_digits(rest);
        let (fraction, tail) = match tail.strip_prefix('.') {
            Some(tail) => split_digits(tail),
            None => ("", tail),
        };
        if whole.is_empty() && fraction.is_empty() {
            return None;
        }

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let unit: u64 = match &tail[..unit_len] {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            _ => return None,
        };
        rest = &tail[unit_len..];

        let mut nanos = if whole.is_empty() {
            0
        } else {
            whole.parse::<u64>().ok()?.checked_mul(unit)?
        };
        if !fraction.is_empty() {
            let digits = &fraction[..fraction.len().min(18)];
            let scale = 10u128.pow(digits.len() as u32);
            let part = digits.parse::<u128>().ok()? * u128::from(unit) / scale;
            nanos = nanos.checked_add(u64::try_from(part).ok()?)?;
        }
        total = total.checked_add(nanos)?;
    }

    Some(Duration::from_nanos(total))
}

fn split_digits(input: &str) -> (&str, &str) {
    let len = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    input.split_at(len)
}
