//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{redact_url, HttpClient, HttpMethod, HttpRequest, StreamingResponse},
};
use futures_util::TryStreamExt;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Connection settings for [`ReqwestHttpClient`].
#[derive(Debug, Clone)]
pub struct HttpClientOptions {
    pub connect_timeout: Duration,
    pub user_agent: String,
    pub max_redirects: usize,
}

impl Default for HttpClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("feed-prefetch/{}", env!("CARGO_PKG_VERSION")),
            max_redirects: 10,
        }
    }
}

/// Reqwest-based HTTP client implementation
///
/// Provides:
/// - Connection pooling via reqwest
/// - Redirects across http/https
/// - Header timeout per request, body left streaming for the caller
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client
    pub fn new(options: HttpClientOptions) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(options.connect_timeout)
            .pool_max_idle_per_host(10)
            .redirect(reqwest::redirect::Policy::limited(options.max_redirects))
            .user_agent(options.user_agent)
            .build()
            .map_err(|e| {
                BridgeError::NotAvailable(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    /// Wrap a preconfigured reqwest client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    fn build_request(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let method = Self::convert_method(request.method);
        let mut req = self.client.request(method, &request.url);
        for (key, value) in &request.headers {
            req = req.header(key, value);
        }
        req
    }

    fn map_send_error(url: &str, e: reqwest::Error) -> BridgeError {
        let e = e.without_url();
        if e.is_timeout() {
            BridgeError::Timeout(format!("{}: {}", redact_url(url), e))
        } else if e.is_connect() {
            BridgeError::OperationFailed(format!("Connection failed: {}", e))
        } else {
            BridgeError::OperationFailed(e.to_string())
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute_streaming(&self, request: HttpRequest) -> Result<StreamingResponse> {
        debug!(
            url = %redact_url(&request.url),
            range = request.headers.get("Range").map(String::as_str).unwrap_or("-"),
            "Executing HTTP request"
        );

        let send = self.build_request(&request).send();
        let response = match request.timeout {
            Some(limit) => core_async::time::timeout(limit, send).await.map_err(|_| {
                BridgeError::Timeout(format!(
                    "{}: no response within {}ms",
                    redact_url(&request.url),
                    limit.as_millis()
                ))
            })?,
            None => send.await,
        }
        .map_err(|e| {
            let err = Self::map_send_error(&request.url, e);
            warn!(error = %err, url = %redact_url(&request.url), "HTTP request failed");
            err
        })?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|s| (k.as_str().to_ascii_lowercase(), s.to_string()))
            })
            .collect();

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let reader = tokio_util::io::StreamReader::new(stream);

        Ok(StreamingResponse {
            status,
            headers,
            content_length,
            body: Box::new(reader),
        })
    }
}
