//! Scriptable in-process HTTP client.

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::failure::{FailureConfig, FailureInjector};
use crate::http::{HttpClient, HttpRequest, HttpResponse, NetworkError};

#[derive(Debug, Default)]
struct MockHttpState {
    routes: HashMap<String, HttpResponse>,
    calls: HashMap<String, usize>,
    requests: Vec<HttpRequest>,
    delay: Option<Duration>,
    failures: FailureInjector,
}

/// Serves canned responses by exact URL.
///
/// Unrouted URLs fail with [`NetworkError::Connect`]. Every request is
/// recorded, headers included.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    state: Mutex<MockHttpState>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `response` for `url`, replacing any previous route.
    pub fn respond(&self, url: impl Into<String>, response: HttpResponse) {
        self.state.lock().routes.insert(url.into(), response);
    }

    /// Delay every response.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    /// Inject a failure for one URL.
    pub fn inject(&self, url: impl Into<String>, config: FailureConfig) {
        self.state.lock().failures.inject(url, config);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Requests received for `url`.
    pub fn call_count(&self, url: &str) -> usize {
        self.state.lock().calls.get(url).copied().unwrap_or(0)
    }

    /// Requests received for any URL.
    pub fn total_calls(&self) -> usize {
        self.state.lock().requests.len()
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.lock().requests.clone()
    }
}

impl HttpClient for MockHttpClient {
    fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, NetworkError> {
        let (delay, failure, route) = {
            let mut state = self.state.lock();
            *state.calls.entry(request.url.clone()).or_insert(0) += 1;
            state.requests.push(request.clone());

            let failure = state.failures.check(&request.url).cloned();
            let delay = failure
                .as_ref()
                .and_then(|f| f.delay)
                .or(state.delay);
            (delay, failure, state.routes.get(&request.url).cloned())
        };

        // Sleep outside the lock so concurrent callers are observable.
        if let Some(delay) = delay {
            thread::sleep(delay);
        }

        if let Some(error) = failure.and_then(|f| f.error) {
            return Err(error);
        }
        route.ok_or_else(|| NetworkError::Connect(format!("no route for {}", request.url)))
    }
}
