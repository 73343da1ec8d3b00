//! HTTP middleware and request extractors.

/// Bearer token authentication middleware
pub mod auth;
/// Client address and user agent extractor
pub mod client;
