use crate::{transport::BoxError, FailureContext};

/// Error type returned by this crate.
///
/// Every variant carries a [`FailureContext`] describing the endpoint
/// involved; the underlying cause, where there is one, is exposed through
/// [`std::error::Error::source`].
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// Every attempt failed at the transport level.
    #[error("request failed after {attempts} attempt(s): {source}; context: {context}")]
    Request {
        /// Error of the last attempt.
        source: BoxError,
        attempts: usize,
        /// Endpoint identity plus `attempt {k} err` for each earlier attempt.
        context: FailureContext,
    },
    /// The cancellation token fired before a response arrived.
    #[error("request cancelled after {attempts} attempt(s); context: {context}")]
    Cancelled {
        /// Attempts that were started, including an aborted in-flight one.
        attempts: usize,
        context: FailureContext,
    },
    /// The response body could not be read to the end.
    #[error("failed to read response body: {source}; context: {context}")]
    BodyRead {
        source: reqwest::Error,
        /// Endpoint identity plus the partially read body.
        context: FailureContext,
    },
    /// The body was read but is not valid JSON for the requested type.
    #[error("failed to decode response body: {source}; context: {context}")]
    Decode {
        source: serde_json::Error,
        /// Endpoint identity plus the raw body.
        context: FailureContext,
    },
}

impl HttpError {
    /// Diagnostic context attached to this error.
    pub fn context(&self) -> &FailureContext {
        match self {
            Self::Request { context, .. }
            | Self::Cancelled { context, .. }
            | Self::BodyRead { context, .. }
            | Self::Decode { context, .. } => context,
        }
    }

    /// Number of transport attempts made, for request-level errors.
    pub fn attempts(&self) -> Option<usize> {
        match self {
            Self::Request { attempts, .. } | Self::Cancelled { attempts, .. } => Some(*attempts),
            Self::BodyRead { .. } | Self::Decode { .. } => None,
        }
    }
}
