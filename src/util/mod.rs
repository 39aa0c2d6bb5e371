//! Input validation shared by the CLI commands.

mod url_validator;

pub use url_validator::{validate_feed_url, FeedUrlError};
