use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    extract::{RawQuery, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use reqwest::{Method, Request, Url};
use retrying_http::{
    read_json, read_text, CancellationToken, ClientConfig, HttpError, RetryingClient,
};
use serde::Deserialize;

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    body: String,
    delay: Duration,
}

impl MockResponse {
    fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: Duration::from_millis(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    queries: Arc<Mutex<Vec<Option<String>>>>,
    hits: Arc<AtomicUsize>,
}

async fn items_handler(
    State(state): State<MockState>,
    RawQuery(query): RawQuery,
) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state
        .queries
        .lock()
        .expect("query log mutex must not be poisoned")
        .push(query);

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_else(|| {
            MockResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "no mock response available")
        })
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    (response.status, response.body)
}

struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    queries: Arc<Mutex<Vec<Option<String>>>>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn get(&self, path_and_query: &str) -> Request {
        let url = Url::parse(&format!("{}{path_and_query}", self.base_url)).expect("valid url");
        Request::new(Method::GET, url)
    }
}

async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        queries: Arc::new(Mutex::new(Vec::new())),
        hits: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new()
        .route("/items", get(items_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        hits: state.hits,
        queries: state.queries,
        task,
    }
}

#[derive(Debug, Deserialize)]
struct Item {
    id: i64,
    name: String,
}

fn client(attempts: usize, delay_ms: u64) -> RetryingClient {
    RetryingClient::new(ClientConfig::new(attempts, Duration::from_millis(delay_ms)))
}

#[tokio::test]
async fn request_and_decode_json() {
    let server = spawn_server(vec![MockResponse::new(
        StatusCode::OK,
        r#"{"id":7,"name":"kit"}"#,
    )])
    .await;

    let response = client(3, 1)
        .request(server.get("/items"), &CancellationToken::new())
        .await
        .expect("request must succeed");
    let item: Item = read_json(response).await.expect("body must decode");

    assert_eq!(item.id, 7);
    assert_eq!(item.name, "kit");
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn server_error_status_is_returned_not_retried() {
    let server = spawn_server(vec![
        MockResponse::new(StatusCode::SERVICE_UNAVAILABLE, "maintenance"),
        MockResponse::new(StatusCode::OK, "unused"),
    ])
    .await;

    let response = client(3, 1)
        .request(server.get("/items"), &CancellationToken::new())
        .await
        .expect("a 503 response is not a transport failure");

    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(read_text(response).await.expect("must read"), "maintenance");
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn timed_out_attempt_is_retried() -> anyhow::Result<()> {
    let server = spawn_server(vec![
        MockResponse::new(StatusCode::OK, "slow").with_delay(Duration::from_millis(500)),
        MockResponse::new(StatusCode::OK, "fast"),
    ])
    .await;

    let transport = reqwest::Client::builder()
        .timeout(Duration::from_millis(50))
        .build()?;
    let client =
        RetryingClient::with_transport(ClientConfig::new(2, Duration::from_millis(1)), transport);

    let response = client
        .request(server.get("/items"), &CancellationToken::new())
        .await?;

    assert_eq!(read_text(response).await?, "fast");
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn refused_connection_exhausts_attempts_with_endpoint_context() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind");
    let port = listener.local_addr().expect("must have local addr").port();
    drop(listener);

    let url = Url::parse(&format!("http://127.0.0.1:{port}/items?page=2")).expect("valid url");
    let err = client(3, 1)
        .request(Request::new(Method::GET, url), &CancellationToken::new())
        .await
        .expect_err("nothing listens on the port");

    match &err {
        HttpError::Request {
            attempts, context, ..
        } => {
            assert_eq!(*attempts, 3);
            assert_eq!(context.host(), Some("127.0.0.1"));
            assert_eq!(context.port(), Some(port.to_string().as_str()));
            assert_eq!(context.request_url(), Some("/items?page=2"));
            assert_eq!(context.attempt_errors().len(), 2);
        }
        other => panic!("expected request error, got {other:?}"),
    }
}

#[tokio::test]
async fn decode_failure_names_the_server() {
    let server = spawn_server(vec![MockResponse::new(StatusCode::OK, r#"{"id":"#)]).await;

    let response = client(1, 0)
        .request(server.get("/items"), &CancellationToken::new())
        .await
        .expect("request must succeed");
    let err = read_json::<Item>(response)
        .await
        .expect_err("truncated JSON must fail");

    match err {
        HttpError::Decode { context, .. } => {
            assert_eq!(context.host(), Some("127.0.0.1"));
            assert_eq!(context.request_url(), Some("/items"));
            assert_eq!(context.response_body(), Some(r#"{"id":"#));
        }
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[tokio::test]
async fn query_reaches_server_escaped_once() {
    let server = spawn_server(vec![MockResponse::new(StatusCode::OK, "ok")]).await;

    client(1, 0)
        .request(
            server.get("/items?discount=100%&name=a%20b"),
            &CancellationToken::new(),
        )
        .await
        .expect("request must succeed");

    let queries = server
        .queries
        .lock()
        .expect("query log mutex must not be poisoned")
        .clone();
    assert_eq!(
        queries,
        vec![Some("discount=100%25&name=a%20b".to_owned())]
    );
}
