//! Mock capabilities
//!
//! In-process stand-ins for the network and the JavaScript engine, used by
//! unit and integration tests.
//!
//! - [`MockHttpClient`]: canned responses by URL, call counting, request
//!   recording, delays and per-URL failure injection
//! - [`MockEngine`]: deterministic "bytecode" and compile counting

mod engine;
mod failure;
mod http;

pub use engine::MockEngine;
pub use failure::{FailureConfig, FailureInjector};
pub use http::MockHttpClient;
