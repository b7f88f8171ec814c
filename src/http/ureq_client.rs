//! `ureq`-backed HTTP client.

use std::time::Duration;

use log::debug;

use super::{
    HttpClient, HttpRequest, HttpResponse, NetworkError, DEFAULT_MAX_BODY_BYTES, DEFAULT_USER_AGENT,
};

/// Blocking HTTP client over a shared `ureq` agent.
///
/// Non-2xx statuses come back as responses, not errors; redirects are
/// followed by the agent.
#[derive(Clone)]
pub struct UreqClient {
    agent: ureq::Agent,
    timeout: Duration,
    user_agent: String,
    max_body_bytes: u64,
}

impl UreqClient {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: config.into(),
            timeout,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: u64) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    fn map_error(&self, err: ureq::Error) -> NetworkError {
        match err {
            ureq::Error::Timeout(_) => NetworkError::Timeout(self.timeout),
            ureq::Error::HostNotFound => NetworkError::Dns("host not found".to_string()),
            ureq::Error::ConnectionFailed => {
                NetworkError::Connect("connection failed".to_string())
            }
            ureq::Error::Io(e) => NetworkError::Io(e.to_string()),
            other => NetworkError::Other(other.to_string()),
        }
    }
}

impl Default for UreqClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl HttpClient for UreqClient {
    fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, NetworkError> {
        let mut call = self
            .agent
            .get(&request.url)
            .header("User-Agent", &self.user_agent);
        for (name, value) in &request.headers {
            call = call.header(name.as_str(), value.as_str());
        }

        let mut response = call.call().map_err(|e| self.map_error(e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .body_mut()
            .with_config()
            .limit(self.max_body_bytes)
            .read_to_vec()
            .map_err(|e| self.map_error(e))?;

        debug!("[http] GET {} -> {} ({} bytes)", request.url, status, body.len());
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
