//! HTTP capability
//!
//! The cache never talks to the network directly. It goes through an
//! [`HttpClient`], so tests can script responses with
//! [`MockHttpClient`](crate::mock::MockHttpClient) and production builds use
//! [`UreqClient`].

#[cfg(feature = "http-ureq")]
mod ureq_client;

#[cfg(feature = "http-ureq")]
pub use ureq_client::UreqClient;

/// Default User-Agent header.
pub const DEFAULT_USER_AGENT: &str = concat!("jscache/", env!("CARGO_PKG_VERSION"));

/// Default response size cap (16 MiB).
pub const DEFAULT_MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;

/// A GET request for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    /// Extra request headers, in send order
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value of a header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A complete response, body included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    pub fn not_modified() -> Self {
        Self::new(304, Vec::new())
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value of a header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }

    pub fn etag(&self) -> Option<&str> {
        self.header("etag")
    }

    pub fn last_modified(&self) -> Option<&str> {
        self.header("last-modified")
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Transport-level failure. No response was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("DNS lookup failed: {0}")]
    Dns(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Network error: {0}")]
    Other(String),
}

/// Performs HTTP requests.
pub trait HttpClient: Send + Sync {
    fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, NetworkError>;
}

impl<T: HttpClient + ?Sized> HttpClient for std::sync::Arc<T> {
    fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, NetworkError> {
        (**self).fetch(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_case_insensitive() {
        let response = HttpResponse::ok("x")
            .with_header("ETag", "\"abc\"")
            .with_header("Content-Type", "text/javascript");

        assert_eq!(response.etag(), Some("\"abc\""));
        assert_eq!(response.header("content-type"), Some("text/javascript"));
        assert_eq!(response.last_modified(), None);
    }

    #[test]
    fn test_status_classes() {
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(404, "").is_success());
        assert!(!HttpResponse::not_modified().is_success());
        assert!(HttpResponse::not_modified().is_not_modified());
    }

    #[test]
    fn test_request_headers() {
        let request = HttpRequest::get("http://x/a.js").with_header("If-None-Match", "\"v1\"");
        assert_eq!(request.header("if-none-match"), Some("\"v1\""));
    }
}
