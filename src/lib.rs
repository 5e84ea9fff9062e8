//! `retrying-http` wraps an HTTP transport with retry backoff, failure
//! context and body decoding.
//!
//! - [`RetryingClient::request`] sends a request, retrying transport
//!   failures with a growing delay.
//! - [`read_text`] and [`read_json`] read a response body exactly once.
//! - Every [`HttpError`] carries a [`FailureContext`] naming the endpoint
//!   and, for retries, the errors of earlier attempts.

mod client;
mod config;
mod context;
mod error;
mod escape;
mod reader;
mod transport;

pub use client::RetryingClient;
pub use config::ClientConfig;
pub use context::FailureContext;
pub use error::HttpError;
pub use escape::escape_query;
pub use reader::{read_bytes, read_json, read_text};
pub use tokio_util::sync::CancellationToken;
pub use transport::{BoxError, Transport};

pub type Result<T> = std::result::Result<T, HttpError>;
