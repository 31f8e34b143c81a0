//! Citation-count lookups against an external bibliographic service.
//!
//! This crate provides:
//! - [`CitationFetcher`]: HTTP client with the bounded retry/backoff policy
//! - [`FetchOutcome`]: the classified result of a single request
//! - [`FetchReport`]: the final outcome of a lookup plus the attempts it took

pub mod fetcher;

pub use fetcher::{CitationFetcher, FetchOutcome, FetchReport, lookup_url};
