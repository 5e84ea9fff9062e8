use async_trait::async_trait;
use reqwest::{Request, Response};

/// Boxed error returned by a [`Transport`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Performs a single HTTP exchange.
///
/// Implementations must be safe to share across tasks; the retrying client
/// calls [`Transport::execute`] once per attempt and adds no locking of its
/// own. Any `Err` is treated as a transport failure and retried. HTTP status
/// codes are never inspected, so a 5xx response must be returned as `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: Request) -> Result<Response, BoxError>;
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn execute(&self, request: Request) -> Result<Response, BoxError> {
        reqwest::Client::execute(self, request)
            .await
            .map_err(BoxError::from)
    }
}
