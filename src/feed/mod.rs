//! Feed retrieval for RSS 2.0 sources.
//!
//! - [`fetcher`] - one bounded HTTP GET per feed, no retries
//! - [`parser`] - RSS XML into a [`ParsedFeed`], HTML entities decoded
//! - [`pubdate`] - `<pubDate>` strings into UTC timestamps

mod fetcher;
mod parser;
mod pubdate;

pub use fetcher::{build_client, fetch_feed, FetchError};
pub use parser::{parse_feed, ParsedFeed, ParsedItem};
pub use pubdate::{parse_pub_date, PubDateError};
