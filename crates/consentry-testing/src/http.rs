//! HTTP mocking utilities for webhook testing.

use std::collections::HashMap;

use wiremock::{
    matchers::{method, path},
    Mock, MockServer as WiremockServer, ResponseTemplate,
};

/// Request captured by the mock server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Request path.
    pub path: String,
    /// Headers with lower-case names.
    pub headers: HashMap<String, String>,
    /// Body as text.
    pub body: String,
}

impl RecordedRequest {
    /// Header value by lower-case name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// HTTP mock server standing in for webhook receivers.
pub struct MockServer {
    server: WiremockServer,
}

impl MockServer {
    /// Starts a new mock server on a random port.
    pub async fn start() -> Self {
        Self { server: WiremockServer::start().await }
    }

    /// Base URL of the server.
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Full URL of a path on the server.
    pub fn endpoint(&self, endpoint_path: &str) -> String {
        format!("{}{endpoint_path}", self.server.uri())
    }

    /// Answers POSTs to `endpoint_path` with `status`.
    pub async fn respond(&self, endpoint_path: &str, status: u16) {
        Mock::given(method("POST"))
            .and(path(endpoint_path))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Every request received so far.
    pub async fn received_requests(&self) -> Vec<RecordedRequest> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|request| RecordedRequest {
                path: request.url.path().to_string(),
                headers: request
                    .headers
                    .iter()
                    .filter_map(|(name, value)| {
                        value.to_str().ok().map(|v| (name.as_str().to_lowercase(), v.to_string()))
                    })
                    .collect(),
                body: String::from_utf8_lossy(&request.body).into_owned(),
            })
            .collect()
    }

    /// Asserts that exactly `expected` requests were received.
    pub async fn assert_request_count(&self, expected: usize) {
        let received = self.received_requests().await.len();
        assert_eq!(received, expected, "expected {expected} requests, received {received}");
    }
}
