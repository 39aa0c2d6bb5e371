use thiserror::Error;
use url::Url;

/// Reasons a string cannot be registered as a feed URL.
#[derive(Error, Debug)]
pub enum FeedUrlError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    /// Credentials would be stored and listed in plain text by `feeds`.
    #[error("URL must not contain a username or password")]
    EmbeddedCredentials,
}

/// Validate a feed URL given on the command line.
///
/// Surrounding whitespace is ignored. The returned [`Url`] is normalized
/// (lowercase scheme and host), which is the form stored in the database.
///
/// # Examples
///
/// ```
/// use gator::util::validate_feed_url;
///
/// let url = validate_feed_url("https://blog.boot.dev/index.xml").unwrap();
/// assert_eq!(url.host_str(), Some("blog.boot.dev"));
///
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, FeedUrlError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(FeedUrlError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(FeedUrlError::MissingHost);
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(FeedUrlError::EmbeddedCredentials);
    }

    Ok(url)
}
