//! # Marketplace Probe
//!
//! HTTP implementation of the region probe. Each check fetches the public
//! search page with a fresh session and classifies the returned HTML.

/// Reading search result pages
mod page_classifier;
pub use page_classifier::*;

/// HTTP client issuing one session per check
mod http_probe;
pub use http_probe::*;
