//! Utility functions for common operations.
//!
//! - **Feed URL validation**: refuse non-web and internal addresses before a
//!   feed is registered (SSRF protection)

mod feed_url;

pub use feed_url::{normalize_feed_url, validate_feed_url, UrlValidationError};
