//! One-shot body readers for responses returned by
//! [`RetryingClient::request`](crate::RetryingClient::request).
//!
//! Each reader takes the response by value: the body is read once and the
//! connection is released when the reader returns, on success and on error.

use bytes::{Bytes, BytesMut};
use reqwest::Response;
use serde::de::DeserializeOwned;

use crate::{FailureContext, HttpError, Result};

/// Reads the whole body.
///
/// On failure the error context carries whatever was read before the
/// stream broke, possibly nothing.
pub async fn read_bytes(mut response: Response) -> Result<Bytes> {
    let endpoint = FailureContext::for_response(&response);
    let mut body = BytesMut::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => body.extend_from_slice(&chunk),
            Ok(None) => return Ok(body.freeze()),
            Err(source) => {
                return Err(HttpError::BodyRead {
                    source,
                    context: endpoint.with_body(&body),
                })
            }
        }
    }
}

/// Reads the whole body as text. Invalid UTF-8 is replaced, not rejected.
pub async fn read_text(response: Response) -> Result<String> {
    let body = read_bytes(response).await?;
    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Reads the whole body and decodes it as JSON into `T`.
///
/// # Example
///
/// ```no_run
/// # async fn run() -> retrying_http::Result<()> {
/// use retrying_http::{read_json, CancellationToken, RetryingClient};
///
/// #[derive(serde::Deserialize)]
/// struct Status {
///     healthy: bool,
/// }
///
/// let client = RetryingClient::create(3, 100);
/// let request = reqwest::Request::new(
///     reqwest::Method::GET,
///     "https://example.com/status".parse().expect("valid url"),
/// );
/// let response = client.request(request, &CancellationToken::new()).await?;
/// let status: Status = read_json(response).await?;
/// println!("healthy: {}", status.healthy);
/// # Ok(())
/// # }
/// ```
pub async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let endpoint = FailureContext::for_response(&response);
    let body = read_bytes(response).await?;
    serde_json::from_slice(&body).map_err(|source| HttpError::Decode {
        source,
        context: endpoint.with_body(&body),
    })
}
