//! Conditional-request coordinator
//!
//! Decides, per lookup, whether a cached entry can be served as-is or the
//! origin must be asked again. The three states map as follows:
//!
//! | Index state | Decision |
//! |---|---|
//! | fresh entry | [`Decision::Fresh`] |
//! | absent | [`Decision::FetchUnconditional`] |
//! | expired | [`Decision::FetchUnconditional`], or [`Decision::Revalidate`] when enabled and a validator exists |

use std::sync::Arc;

use crate::entry::{CacheEntry, Validator};
use crate::http::HttpRequest;
use crate::index::CacheIndex;

/// What to do for one lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Serve the cached entry.
    Fresh(CacheEntry),
    /// Ask the origin with the stored validator.
    Revalidate(Validator),
    /// Plain GET.
    FetchUnconditional,
}

impl Decision {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }
}

/// Read-only policy over a [`CacheIndex`].
#[derive(Debug, Clone)]
pub struct Coordinator {
    index: Arc<CacheIndex>,
    revalidate_with_validators: bool,
}

impl Coordinator {
    pub fn new(index: Arc<CacheIndex>) -> Self {
        Self {
            index,
            revalidate_with_validators: false,
        }
    }

    /// Send conditional requests for expired entries that carry validators.
    pub fn with_revalidation(mut self, enabled: bool) -> Self {
        self.revalidate_with_validators = enabled;
        self
    }

    pub fn decide(&self, url: &str) -> Decision {
        self.decide_with(url, false)
    }

    /// `force_refresh` skips the fresh path even for a valid entry.
    pub fn decide_with(&self, url: &str, force_refresh: bool) -> Decision {
        if !force_refresh {
            if let Some(entry) = self.index.get(url) {
                return Decision::Fresh(entry);
            }
        }

        if self.revalidate_with_validators {
            if let Some(validator) = self.index.stale_validator(url) {
                return Decision::Revalidate(validator);
            }
        }

        Decision::FetchUnconditional
    }

    /// GET request for `decision`.
    pub fn request_for(url: &str, decision: &Decision) -> HttpRequest {
        let request = HttpRequest::get(url);
        match decision {
            Decision::Revalidate(validator) => conditional_headers(request, validator),
            _ => request,
        }
    }
}

fn conditional_headers(mut request: HttpRequest, validator: &Validator) -> HttpRequest {
    if let Some(etag) = &validator.etag {
        request = request.with_header("If-None-Match", etag.as_str());
    }
    if let Some(last_modified) = &validator.last_modified {
        request = request.with_header("If-Modified-Since", last_modified.as_str());
    }
    request
}
