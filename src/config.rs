use std::time::Duration;

const MAX_ATTEMPTS_VAR: &str = "RETRYING_HTTP_MAX_ATTEMPTS";
const BASE_DELAY_MS_VAR: &str = "RETRYING_HTTP_BASE_DELAY_MS";

/// Configures retry behavior of a [`RetryingClient`](crate::RetryingClient).
///
/// Values are validated once at construction and cannot change afterwards.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ClientConfig {
    max_attempts: usize,
    base_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }
}

impl ClientConfig {
    /// Creates a config with `max_attempts` total attempts and `base_delay`
    /// as the unit of the backoff schedule.
    ///
    /// # Panics
    ///
    /// Panics if `max_attempts` is zero.
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        assert!(
            max_attempts >= 1,
            "invalid max_attempts: {max_attempts}, must be >= 1"
        );
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Creates a config from signed values, as read from untyped sources.
    ///
    /// # Panics
    ///
    /// Panics if `max_attempts < 1` or `base_delay_ms < 0`.
    pub fn from_millis(max_attempts: i64, base_delay_ms: i64) -> Self {
        assert!(
            max_attempts >= 1,
            "invalid max_attempts: {max_attempts}, must be >= 1"
        );
        assert!(
            base_delay_ms >= 0,
            "invalid base delay: {base_delay_ms}ms, must be >= 0"
        );
        Self::new(
            usize::try_from(max_attempts).unwrap_or(usize::MAX),
            Duration::from_millis(base_delay_ms.unsigned_abs()),
        )
    }

    /// Creates a config from environment variables.
    ///
    /// Reads:
    /// - `RETRYING_HTTP_MAX_ATTEMPTS` — total attempts per request (>= 1)
    /// - `RETRYING_HTTP_BASE_DELAY_MS` — backoff unit in milliseconds (>= 0)
    ///
    /// Unset variables keep their [`Default`] value. Malformed or
    /// out-of-range values are reported as an error instead of panicking.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_attempts = match lookup(MAX_ATTEMPTS_VAR) {
            Some(raw) => {
                let value = raw
                    .trim()
                    .parse::<i64>()
                    .map_err(|err| format!("{MAX_ATTEMPTS_VAR} is not an integer: {err}"))?;
                if value < 1 {
                    return Err(format!("{MAX_ATTEMPTS_VAR} must be >= 1, got {value}"));
                }
                usize::try_from(value)
                    .map_err(|_| format!("{MAX_ATTEMPTS_VAR} is out of range: {value}"))?
            }
            None => defaults.max_attempts,
        };

        let base_delay = match lookup(BASE_DELAY_MS_VAR) {
            Some(raw) => {
                let value = raw
                    .trim()
                    .parse::<i64>()
                    .map_err(|err| format!("{BASE_DELAY_MS_VAR} is not an integer: {err}"))?;
                if value < 0 {
                    return Err(format!("{BASE_DELAY_MS_VAR} must be >= 0, got {value}"));
                }
                Duration::from_millis(value.unsigned_abs())
            }
            None => defaults.base_delay,
        };

        Ok(Self::new(max_attempts, base_delay))
    }

    /// Total number of attempts per request, including the first one.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Unit of the backoff schedule.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Wait before the attempt following the 0-indexed `attempt`.
    ///
    /// Grows linearly in odd multiples of the base: 1x, 3x, 5x, 7x...
    pub fn delay_after(&self, attempt: usize) -> Duration {
        let factor = attempt
            .saturating_mul(2)
            .saturating_add(1)
            .min(u32::MAX as usize) as u32;
        self.base_delay.saturating_mul(factor)
    }
}
