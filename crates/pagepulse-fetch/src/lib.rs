//! Fetch layer: executes shaped requests against the PSI and CrUX APIs.

pub mod http;

pub use http::{FetchError, HttpFetcher, RetryPolicy};
