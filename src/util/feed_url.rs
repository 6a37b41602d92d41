use std::net::{Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use url::{Host, Url};

/// Why a URL was refused as a feed source.
///
/// Registration refuses anything that would make the aggregator request a
/// non-web or internal address on the operator's behalf.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Feed URL is empty")]
    Empty,
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("Feed URL has no host")]
    MissingHost,
    #[error("Feed URL must not embed credentials")]
    Credentials,
    #[error("Localhost not allowed")]
    Localhost,
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
}

/// Check a URL given to `addfeed` and return it in normalized form.
///
/// Rejected:
/// - schemes other than `http` and `https`
/// - `user:password@` credentials
/// - `localhost` (and `*.localhost`) and loopback addresses
/// - private, link-local, unique-local and unspecified IPs
///
/// The fragment is dropped since it is never sent to the server.
///
/// ```
/// use gator::util::validate_feed_url;
///
/// let url = validate_feed_url("https://blog.boot.dev/index.xml#top").unwrap();
/// assert_eq!(url.as_str(), "https://blog.boot.dev/index.xml");
///
/// assert!(validate_feed_url("http://192.168.1.1/rss").is_err());
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_url(input: &str) -> Result<Url, UrlValidationError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(UrlValidationError::Empty);
    }

    let mut url = Url::parse(input)?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlValidationError::UnsupportedScheme(url.scheme().to_owned()));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(UrlValidationError::Credentials);
    }

    match url.host() {
        None => return Err(UrlValidationError::MissingHost),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") {
                return Err(UrlValidationError::Localhost);
            }
        }
        Some(Host::Ipv4(ip)) => check_ipv4(ip)?,
        Some(Host::Ipv6(ip)) => match ip.to_ipv4_mapped() {
            Some(mapped) => check_ipv4(mapped)?,
            None => check_ipv6(ip)?,
        },
    }

    url.set_fragment(None);
    Ok(url)
}

/// The form `addfeed` stores a URL under, for looking registered feeds up
/// by what a user typed. Text that does not parse as a URL is only trimmed.
///
/// ```
/// use gator::util::normalize_feed_url;
///
/// assert_eq!(normalize_feed_url(" HTTPS://Blog.Boot.dev#top "), "https://blog.boot.dev/");
/// assert_eq!(normalize_feed_url("not a url"), "not a url");
/// ```
pub fn normalize_feed_url(input: &str) -> String {
    let input = input.trim();
    match Url::parse(input) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.into()
        }
        Err(_) => input.to_string(),
    }
}

fn check_ipv4(ip: Ipv4Addr) -> Result<(), UrlValidationError> {
    if ip.is_loopback() {
        return Err(UrlValidationError::Localhost);
    }
    if ip.is_private() || ip.is_link_local() || ip.is_unspecified() {
        return Err(UrlValidationError::PrivateIp(ip.to_string()));
    }
    Ok(())
}

fn check_ipv6(ip: Ipv6Addr) -> Result<(), UrlValidationError> {
    if ip.is_loopback() {
        return Err(UrlValidationError::Localhost);
    }
    let first = ip.segments()[0];
    let unique_local = (first & 0xfe00) == 0xfc00; // fc00::/7
    let link_local = (first & 0xffc0) == 0xfe80; // fe80::/10
    if ip.is_unspecified() || unique_local || link_local {
        return Err(UrlValidationError::PrivateIp(ip.to_string()));
    }
    Ok(())
}
