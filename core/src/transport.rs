//! HTTP transport for the contents API
//!
//! The gateway speaks to the provider only through [`ContentTransport`], which
//! returns the raw status and body. Status interpretation lives in the
//! gateway. [`ReqwestTransport`] is the real client; tests use
//! [`crate::fake::MemoryContentHost`].

use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;
use tracing::debug;

/// Default timeout for content operations
pub const CONTENT_TIMEOUT_SECS: u64 = 30;

/// HTTP method subset used against the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// Outbound request, path relative to the API base
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Unencoded path such as `/repos/octo/demo/contents/src/lib.rs`;
    /// each `/`-separated segment is percent-encoded when the URL is built
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    /// Provider access token, sent as `Authorization: token ...`
    pub token: String,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>, token: &str) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
            token: token.to_string(),
        }
    }

    pub fn put(path: impl Into<String>, token: &str, body: serde_json::Value) -> Self {
        Self::get(path, token).with_body(Method::Put, body)
    }

    pub fn delete(path: impl Into<String>, token: &str, body: serde_json::Value) -> Self {
        Self::get(path, token).with_body(Method::Delete, body)
    }

    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, method: Method, body: serde_json::Value) -> Self {
        self.method = method;
        self.body = Some(body);
        self
    }

    /// Value of a query parameter, if present
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Raw response from the provider
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport-level failures (no HTTP status available)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// Asynchronous HTTP transport
///
/// Abstraction over the HTTP client to enable testing with an in-memory host.
#[async_trait]
pub trait ContentTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// Join `path` onto `base`, percent-encoding every segment
///
/// File names may contain `#`, `?`, `%` or spaces; pasted into a URL verbatim
/// they would cut the path short or address a different file.
pub fn request_url(base: &Url, path: &str) -> Result<Url, TransportError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| TransportError::Network(format!("base URL {} cannot carry a path", base)))?
        .pop_if_empty()
        .extend(path.split('/').filter(|segment| !segment.is_empty()));
    Ok(url)
}

/// Real HTTP transport using reqwest
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl ReqwestTransport {
    /// Create new transport with the default content timeout (30s)
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        Self::with_timeout(base_url, Duration::from_secs(CONTENT_TIMEOUT_SECS))
    }

    /// Create transport with custom timeout
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("CodeAtEase")
            .build()?;
        let base_url = base_url.into();
        let base_url = Url::parse(&base_url)
            .map_err(|e| TransportError::Network(format!("invalid base URL {}: {}", base_url, e)))?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl ContentTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = request_url(&self.base_url, &request.path)?;
        debug!(method = request.method.as_str(), %url, "Contents API request");

        let builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Put => self.client.put(url),
            Method::Delete => self.client.delete(url),
        };

        let mut builder = builder
            .header("Authorization", format!("token {}", request.token))
            .header("Accept", "application/vnd.github.v3+json")
            .query(&request.query);

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status, "Contents API response");

        Ok(ApiResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder_collects_query() {
        let req = ApiRequest::get("/user/repos", "tok")
            .with_query("per_page", 100)
            .with_query("page", 2);
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.query_param("per_page"), Some("100"));
        assert_eq!(req.query_param("page"), Some("2"));
        assert_eq!(req.query_param("sort"), None);
    }

    #[test]
    fn test_response_success_range() {
        assert!(ApiResponse::new(201, "").is_success());
        assert!(!ApiResponse::new(409, "").is_success());
    }

    #[test]
    fn test_request_url_encodes_segments() {
        let base = Url::parse("https://api.github.com/").unwrap();
        let url = request_url(&base, "/repos/o/r/contents/docs/issue#12 draft?.md").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/o/r/contents/docs/issue%2312%20draft%3F.md"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);

        let url = request_url(&base, "/repos/o/r/contents/100%.txt").unwrap();
        assert_eq!(url.path(), "/repos/o/r/contents/100%25.txt");
    }

    #[test]
    fn test_request_url_keeps_base_path() {
        let base = Url::parse("https://ghe.example.com/api/v3").unwrap();
        let url = request_url(&base, "/user/repos").unwrap();
        assert_eq!(url.as_str(), "https://ghe.example.com/api/v3/user/repos");

        let base = Url::parse("https://ghe.example.com/api/v3/").unwrap();
        let url = request_url(&base, "/user/repos").unwrap();
        assert_eq!(url.as_str(), "https://ghe.example.com/api/v3/user/repos");
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(ReqwestTransport::new("not a url").is_err());
        assert!(ReqwestTransport::new("https://api.github.com/").is_ok());
    }

    #[tokio::test]
    async fn test_reqwest_transport_sends_encoded_path() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let head = String::from_utf8_lossy(&buf[..n]).to_string();
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{}")
                .await
                .unwrap();
            head.lines().next().unwrap_or_default().to_string()
        });

        let transport = ReqwestTransport::new(format!("http://{}", addr)).unwrap();
        let request = ApiRequest::get("/repos/o/r/contents/docs/issue#12 v?.md", "tok");
        let response = transport.send(request).await.unwrap();
        assert_eq!(response.status, 200);

        let request_line = server.await.unwrap();
        assert_eq!(
            request_line,
            "GET /repos/o/r/contents/docs/issue%2312%20v%3F.md HTTP/1.1"
        );
    }
}
