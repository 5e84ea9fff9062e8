use std::fmt;
use std::sync::Arc;

use reqwest::{Request, Response};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    escape::escape_url_query, transport::BoxError, ClientConfig, FailureContext, HttpError,
    Result, Transport,
};

#[derive(Clone)]
/// HTTP client that retries transport failures with a growing delay.
///
/// Only transport-level failures (connect errors, timeouts, broken streams)
/// are retried. A response with any status code, 5xx included, is returned
/// to the caller as-is.
pub struct RetryingClient {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
}

impl fmt::Debug for RetryingClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RetryingClient {
    /// Creates a client backed by a default `reqwest::Client`.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, reqwest::Client::new())
    }

    /// Creates a client that sends every attempt through `transport`.
    pub fn with_transport(config: ClientConfig, transport: impl Transport + 'static) -> Self {
        Self::with_shared_transport(config, Arc::new(transport))
    }

    /// Creates a client on top of a transport shared with other clients.
    pub fn with_shared_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self { transport, config }
    }

    /// Creates a client from an attempt count and a base delay in
    /// milliseconds.
    ///
    /// # Panics
    ///
    /// Panics if `max_attempts < 1` or `base_delay_ms < 0`, see
    /// [`ClientConfig::from_millis`].
    ///
    /// # Example
    ///
    /// ```no_run
    /// use retrying_http::RetryingClient;
    ///
    /// // 3 attempts, waiting 100ms then 300ms between them.
    /// let client = RetryingClient::create(3, 100);
    /// ```
    pub fn create(max_attempts: i64, base_delay_ms: i64) -> Self {
        Self::new(ClientConfig::from_millis(max_attempts, base_delay_ms))
    }

    /// Creates a client configured from environment variables.
    ///
    /// See [`ClientConfig::from_env`] for the variables read.
    pub fn from_env() -> std::result::Result<Self, String> {
        Ok(Self::new(ClientConfig::from_env()?))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sends `request`, retrying transport failures up to
    /// [`ClientConfig::max_attempts`] times in total.
    ///
    /// The query string is normalized with [`escape_query`](crate::escape_query)
    /// before the first attempt. After failed attempt `i` (0-indexed) the
    /// client waits `base_delay * (2i + 1)`.
    ///
    /// `cancel` aborts both an in-flight attempt and the wait between
    /// attempts; the call then fails with [`HttpError::Cancelled`].
    ///
    /// Requests with a streaming body cannot be cloned and are sent once.
    pub async fn request(
        &self,
        mut request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        escape_url_query(request.url_mut());
        let identity = FailureContext::for_request(&request);
        let max_attempts = self.config.max_attempts();
        let mut failures: Vec<String> = Vec::new();

        if cancel.is_cancelled() {
            return Err(Self::cancelled(identity, 0, &failures));
        }

        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let retry_copy = if attempt < max_attempts {
                request.try_clone()
            } else {
                None
            };

            if attempt < max_attempts && retry_copy.is_none() {
                #[cfg(feature = "tracing")]
                tracing::debug!("request body is not cloneable, sending it once");
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(Self::cancelled(identity, attempt, &failures));
                }
                result = self.transport.execute(request) => result,
            };

            let err = match result {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            let Some(next) = retry_copy else {
                return Err(Self::exhausted(identity, attempt, err, &failures));
            };

            failures.push(err.to_string());
            if !self.wait_before_retry(attempt - 1, &err, cancel).await {
                return Err(Self::cancelled(identity, attempt, &failures));
            }
            request = next;
        }
    }

    /// Waits before the next attempt. Returns `false` if `cancel` fired
    /// first.
    async fn wait_before_retry(
        &self,
        attempt: usize,
        err: &BoxError,
        cancel: &CancellationToken,
    ) -> bool {
        let delay = self.config.delay_after(attempt);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "attempt {} failed ({}), retrying after {} ms",
            attempt + 1,
            err,
            delay.as_millis()
        );
        #[cfg(not(feature = "tracing"))]
        let _ = err;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = sleep(delay) => true,
        }
    }

    fn exhausted(
        identity: FailureContext,
        attempts: usize,
        source: BoxError,
        failures: &[String],
    ) -> HttpError {
        #[cfg(feature = "tracing")]
        tracing::warn!("request failed after {} attempt(s): {}", attempts, source);

        HttpError::Request {
            source,
            attempts,
            context: with_failures(identity, failures),
        }
    }

    fn cancelled(identity: FailureContext, attempts: usize, failures: &[String]) -> HttpError {
        #[cfg(feature = "tracing")]
        tracing::debug!("request cancelled after {} attempt(s)", attempts);

        HttpError::Cancelled {
            attempts,
            context: with_failures(identity, failures),
        }
    }
}

fn with_failures(identity: FailureContext, failures: &[String]) -> FailureContext {
    failures
        .iter()
        .enumerate()
        .fold(identity, |context, (index, message)| {
            context.with_attempt_error(index + 1, message.as_str())
        })
}
