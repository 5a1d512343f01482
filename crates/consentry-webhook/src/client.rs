//! HTTP client for webhook delivery with a bounded request timeout.
//!
//! Two `reqwest` clients are kept: one verifying TLS certificates, used by
//! default, and one accepting any certificate for webhooks configured with
//! `skip_ssl_verification`. The second is built on first use.

use std::{collections::HashMap, time::Duration};

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{info_span, Instrument};

use crate::{
    error::{Result, WebhookError},
    signing::DEFAULT_SIGNATURE_HEADER,
};

/// Response bytes kept for the delivery audit log. The rest is never read.
const MAX_RESPONSE_BODY_SIZE: usize = 64 * 1024;
const TRUNCATION_SUFFIX: &str = "... (truncated)";

/// Configuration for the webhook HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Timeout for each outbound request.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Name of the HMAC signature header.
    pub signature_header: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECONDS),
            user_agent: "Consentry-Webhooks/1.0".to_string(),
            signature_header: DEFAULT_SIGNATURE_HEADER.to_string(),
        }
    }
}

/// One outbound POST.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// Destination URL.
    pub url: String,
    /// Headers to send, as recorded in the delivery audit log.
    pub headers: HashMap<String, String>,
    /// Encoded request body.
    pub body: String,
    /// Accept any TLS certificate.
    pub skip_ssl_verification: bool,
}

/// Response to an outbound POST.
#[derive(Debug, Clone)]
pub struct OutboundResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Status line, e.g. `200 OK`.
    pub status_str: String,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body, truncated when oversized.
    pub body: String,
    /// Total duration of the request.
    pub duration: Duration,
}

/// HTTP client for webhook delivery.
#[derive(Debug)]
pub struct WebhookClient {
    verified: reqwest::Client,
    insecure: OnceCell<reqwest::Client>,
    config: ClientConfig,
}

impl WebhookClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Configuration` if the HTTP client cannot be
    /// built from the provided settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let verified = build_client(&config, false)?;
        Ok(Self { verified, insecure: OnceCell::new(), config })
    }

    /// Creates a new client with default configuration.
    ///
    /// # Errors
    ///
    /// See [`WebhookClient::new`].
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// POSTs a request and captures the response.
    ///
    /// Any HTTP status is a response, not an error.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` when the configured timeout elapses, `Network` for
    /// connection and transport failures, and `Configuration` if the
    /// insecure client cannot be built.
    pub async fn post(&self, request: &OutboundRequest) -> Result<OutboundResponse> {
        let client = self.client_for(request.skip_ssl_verification).await?;
        let start_time = std::time::Instant::now();

        let span = info_span!(
            "webhook_request",
            url = %request.url,
            skip_ssl_verification = request.skip_ssl_verification,
        );

        async move {
            let mut http_request = client.post(&request.url).body(request.body.clone());
            for (key, value) in &request.headers {
                http_request = http_request.header(key, value);
            }

            let response = match http_request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let duration = start_time.elapsed();
                    tracing::warn!(duration_ms = duration.as_millis(), "request failed: {}", e);

                    if e.is_timeout() {
                        return Err(WebhookError::timeout(self.config.timeout.as_secs()));
                    }
                    if e.is_connect() {
                        return Err(WebhookError::network(format!("connection failed: {e}")));
                    }
                    return Err(WebhookError::network(e.to_string()));
                },
            };

            let status = response.status();
            let status_code = status.as_u16();
            let status_str = match status.canonical_reason() {
                Some(reason) => format!("{status_code} {reason}"),
                None => status_code.to_string(),
            };
            let headers = extract_headers(response.headers());

            let body = match read_capped_body(response, MAX_RESPONSE_BODY_SIZE).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!("failed to read response body: {}", e);
                    format!("[failed to read response body: {e}]")
                },
            };

            let duration = start_time.elapsed();
            tracing::debug!(status = status_code, duration_ms = duration.as_millis(), "received response");

            Ok(OutboundResponse { status_code, status_str, headers, body, duration })
        }
        .instrument(span)
        .await
    }

    async fn client_for(&self, skip_ssl_verification: bool) -> Result<&reqwest::Client> {
        if !skip_ssl_verification {
            return Ok(&self.verified);
        }
        self.insecure.get_or_try_init(|| async { build_client(&self.config, true) }).await
    }
}

fn build_client(config: &ClientConfig, accept_invalid_certs: bool) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.timeout)
        .user_agent(&config.user_agent)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(|e| WebhookError::configuration(format!("failed to build HTTP client: {e}")))
}

/// Reads at most `cap` bytes of the body chunk by chunk.
///
/// Bodies longer than `cap` are cut at `cap` bytes and marked with
/// [`TRUNCATION_SUFFIX`].
async fn read_capped_body(mut response: reqwest::Response, cap: usize) -> reqwest::Result<String> {
    let mut buffer: Vec<u8> = Vec::new();
    let mut truncated = false;

    while let Some(chunk) = response.chunk().await? {
        let remaining = cap - buffer.len();
        if chunk.len() > remaining {
            buffer.extend_from_slice(&chunk[..remaining]);
            truncated = true;
            break;
        }
        buffer.extend_from_slice(&chunk);
    }

    let mut body = String::from_utf8_lossy(&buffer).into_owned();
    if truncated {
        body.push_str(TRUNCATION_SUFFIX);
    }
    Ok(body)
}

/// Extracts headers from a reqwest `HeaderMap` into a `HashMap`.
pub(crate) fn extract_headers(header_map: &HeaderMap) -> HashMap<String, String> {
    let mut headers = HashMap::new();

    for (key, value) in header_map {
        if let Ok(value_str) = value.to_str() {
            headers.insert(key.to_string(), value_str.to_string());
        }
    }

    headers
}

#[cfg(test)]
mod tests {
    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn request(url: String, body: &str) -> OutboundRequest {
        OutboundRequest {
            url,
            headers: HashMap::from([("Content-Type".to_string(), "application/json".to_string())]),
            body: body.to_string(),
            skip_ssl_verification: false,
        }
    }

    #[tokio::test]
    async fn captures_status_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json"))
            .and(header("user-agent", "Consentry-Webhooks/1.0"))
            .respond_with(ResponseTemplate::new(202).insert_header("x-trace", "abc").set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = WebhookClient::with_defaults().unwrap();
        let response = client.post(&request(format!("{}/hook", server.uri()), "{}")).await.unwrap();

        assert_eq!(response.status_code, 202);
        assert_eq!(response.status_str, "202 Accepted");
        assert_eq!(response.headers.get("x-trace").map(String::as_str), Some("abc"));
        assert_eq!(response.body, "ok");
    }

    #[tokio::test]
    async fn server_errors_are_responses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = WebhookClient::with_defaults().unwrap();
        let response = client.post(&request(server.uri(), "{}")).await.unwrap();
        assert_eq!(response.status_code, 503);
    }

    #[tokio::test]
    async fn slow_endpoints_time_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let config = ClientConfig { timeout: Duration::from_millis(50), ..ClientConfig::default() };
        let client = WebhookClient::new(config).unwrap();

        let err = client.post(&request(server.uri(), "{}")).await.unwrap_err();
        assert!(matches!(err, WebhookError::Timeout { .. }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        let client = WebhookClient::with_defaults().unwrap();
        let err = client.post(&request("http://127.0.0.1:1/hook".to_string(), "{}")).await.unwrap_err();
        assert!(matches!(err, WebhookError::Network { .. }));
    }

    #[tokio::test]
    async fn oversized_bodies_are_cut_at_the_cap() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/big"))
            .respond_with(ResponseTemplate::new(200).set_body_string("a".repeat(MAX_RESPONSE_BODY_SIZE * 4)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/exact"))
            .respond_with(ResponseTemplate::new(200).set_body_string("b".repeat(MAX_RESPONSE_BODY_SIZE)))
            .mount(&server)
            .await;

        let client = WebhookClient::with_defaults().unwrap();

        let big = client.post(&request(format!("{}/big", server.uri()), "{}")).await.unwrap();
        assert_eq!(big.body.len(), MAX_RESPONSE_BODY_SIZE + TRUNCATION_SUFFIX.len());
        assert!(big.body.starts_with("aaaa"));
        assert!(big.body.ends_with(TRUNCATION_SUFFIX));

        let exact = client.post(&request(format!("{}/exact", server.uri()), "{}")).await.unwrap();
        assert_eq!(exact.body.len(), MAX_RESPONSE_BODY_SIZE);
        assert!(!exact.body.ends_with(TRUNCATION_SUFFIX));
    }
}
