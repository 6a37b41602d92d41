//! RSS retrieval and decoding.
//!
//! - `parser` - RSS 2.0 decoding with quick-xml's serde support
//! - `fetcher` - single-attempt HTTP retrieval with a body size limit
//! - `timestamp` - best-effort `pubDate` normalization

mod fetcher;
mod parser;
mod timestamp;

pub use fetcher::{FeedFetcher, FetchError};
pub use parser::{parse_feed, FeedDocument, FeedEntry, ParseError};
pub use timestamp::normalize_published;
