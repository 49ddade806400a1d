//! Test helpers and utilities

use std::sync::Arc;
use std::time::Duration;

use kumi::server::{serve_with_signals, ServeError, Server, ShutdownSignal};
use kumi::{handler_fn, ApiResponse, Chain, Engine};
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// An engine served on an ephemeral local port.
pub struct TestServer {
    pub base_url: String,
    pub client: Client,
    signals: mpsc::UnboundedSender<ShutdownSignal>,
    handle: JoinHandle<Result<(), ServeError>>,
}

#[allow(dead_code)]
impl TestServer {
    /// Serve `engine` with a 5s drain bound.
    pub async fn start(engine: Engine) -> Self {
        Self::start_with(engine, CancellationToken::new(), Duration::from_secs(5)).await
    }

    pub async fn start_with(engine: Engine, root: CancellationToken, grace: Duration) -> Self {
        let server = Server::bind("127.0.0.1:0".parse().unwrap(), Arc::new(engine))
            .await
            .expect("Failed to bind test server");
        let base_url = format!("http://{}", server.local_addr());

        let (signals, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(serve_with_signals(vec![server], root, grace, rx));

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url,
            client,
            signals,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Make a GET request to the server
    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    /// Make a request with any method and custom headers
    pub async fn request(&self, method: Method, path: &str, headers: &[(&str, &str)]) -> Response {
        let mut req = self.client.request(method, self.url(path));
        for (name, value) in headers {
            req = req.header(*name, *value);
        }
        req.send().await.expect("request failed")
    }

    /// Make a POST request with JSON body
    pub async fn post_json<T: serde::Serialize + ?Sized>(&self, path: &str, json: &T) -> Response {
        self.client
            .post(self.url(path))
            .json(json)
            .send()
            .await
            .expect("POST request failed")
    }

    /// Make a POST request with a raw body
    pub async fn post_raw(&self, path: &str, body: impl Into<reqwest::Body>) -> Response {
        self.client
            .post(self.url(path))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .expect("POST request failed")
    }

    pub fn signal(&self, signal: ShutdownSignal) {
        self.signals.send(signal).expect("serve loop has exited");
    }

    /// Wait for the serve loop to return.
    pub async fn wait(self) -> Result<(), ServeError> {
        self.handle.await.expect("serve task panicked")
    }

    /// Interrupt and wait.
    pub async fn stop(self) -> Result<(), ServeError> {
        self.signal(ShutdownSignal::Interrupt);
        self.wait().await
    }
}

/// Endpoint answering with a success envelope carrying `result`.
pub fn respond_with(result: Value) -> Chain {
    Chain::from(handler_fn(move |ctx| {
        let result = result.clone();
        Box::pin(async move {
            ctx.respond(&ApiResponse::success(result));
        })
    }))
}

/// Endpoint that sleeps before answering.
#[allow(dead_code)]
pub fn slow(delay: Duration) -> Chain {
    Chain::from(handler_fn(move |ctx| {
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            ctx.respond(&ApiResponse::success(Value::String("done".into())));
        })
    }))
}

/// Assert that response has expected status
pub fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(
        response.status(),
        expected,
        "Expected status {}, got {}",
        expected,
        response.status()
    );
}

/// Assert that response contains header
pub fn assert_header(response: &Response, name: &str, expected: &str) {
    let value = response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("Header '{}' not found", name))
        .to_str()
        .unwrap();
    assert_eq!(value, expected, "Header '{}' mismatch", name);
}

/// Assert that response does not carry header
#[allow(dead_code)]
pub fn assert_no_header(response: &Response, name: &str) {
    assert!(
        !response.headers().contains_key(name),
        "Header '{}' unexpectedly present: {:?}",
        name,
        response.headers().get(name)
    );
}

/// Decode a JSON envelope body
pub async fn envelope(response: Response) -> Value {
    response.json().await.expect("Body is not JSON")
}
