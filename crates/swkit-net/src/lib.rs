//! # swkit Net
//!
//! Request/response model and the network fetcher used by the swkit offline agent.
//!
//! ## Design Goals
//!
//! 1. **Host-neutral requests**: method, URL, and destination hint are all the agent sees
//! 2. **Whole responses**: bodies are read completely before a response is handed out
//! 3. **Pluggable network**: the [`Fetcher`] trait is the only way the agent reaches the network

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub mod fetch;

pub use fetch::{Fetcher, FetcherConfig, HttpFetcher};

/// Errors that can occur while fetching.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Network unreachable: {0}")]
    Offline(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

// ==================== Requests ====================

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// The declared destination of a request (`Request.destination` in a page).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestDestination {
    /// Empty string: fetch(), XHR, beacons.
    #[default]
    Empty,
    Document,
    Image,
    Script,
    Style,
    Font,
    Manifest,
    Audio,
    Video,
    Worker,
    /// Anything this crate does not name.
    Unknown,
}

impl RequestDestination {
    /// Parse a destination hint. Unrecognised hints map to [`RequestDestination::Unknown`].
    pub fn from_hint(hint: &str) -> Self {
        match hint.trim().to_ascii_lowercase().as_str() {
            "" => Self::Empty,
            "document" => Self::Document,
            "image" => Self::Image,
            "script" => Self::Script,
            "style" => Self::Style,
            "font" => Self::Font,
            "manifest" => Self::Manifest,
            "audio" => Self::Audio,
            "video" => Self::Video,
            "worker" => Self::Worker,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "",
            Self::Document => "document",
            Self::Image => "image",
            Self::Script => "script",
            Self::Style => "style",
            Self::Font => "font",
            Self::Manifest => "manifest",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Worker => "worker",
            Self::Unknown => "unknown",
        }
    }
}

impl FromStr for RequestDestination {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_hint(s))
    }
}

impl fmt::Display for RequestDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    Navigate,
    SameOrigin,
    NoCors,
    #[default]
    Cors,
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub destination: RequestDestination,
    pub mode: RequestMode,
}

impl Request {
    /// Create a GET request with no destination hint.
    pub fn get(url: Url) -> Self {
        Self {
            id: RequestId::new(),
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            destination: RequestDestination::Empty,
            mode: RequestMode::Cors,
        }
    }

    /// Create a top-level navigation request.
    pub fn navigate(url: Url) -> Self {
        Self {
            destination: RequestDestination::Document,
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    /// Create an image request.
    pub fn image(url: Url) -> Self {
        Self {
            destination: RequestDestination::Image,
            mode: RequestMode::NoCors,
            ..Self::get(url)
        }
    }

    /// Create a POST request.
    pub fn post(url: Url, body: Bytes) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::get(url)
        }
    }

    /// Set the method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the destination hint.
    pub fn with_destination(mut self, destination: RequestDestination) -> Self {
        self.destination = destination;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Target hostname, if the URL has one.
    pub fn hostname(&self) -> Option<&str> {
        self.url.host_str()
    }
}

// ==================== Responses ====================

/// Response type as exposed to a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    Basic,
    Cors,
    Default,
    Error,
    Opaque,
    OpaqueRedirect,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Basic => "basic",
            ResponseType::Cors => "cors",
            ResponseType::Default => "default",
            ResponseType::Error => "error",
            ResponseType::Opaque => "opaque",
            ResponseType::OpaqueRedirect => "opaqueredirect",
        }
    }

    /// Inverse of [`ResponseType::as_str`].
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "basic" => Some(ResponseType::Basic),
            "cors" => Some(ResponseType::Cors),
            "default" => Some(ResponseType::Default),
            "error" => Some(ResponseType::Error),
            "opaque" => Some(ResponseType::Opaque),
            "opaqueredirect" => Some(ResponseType::OpaqueRedirect),
            _ => None,
        }
    }
}

/// A complete response. The body is always fully buffered.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Final URL (empty for error responses).
    pub url: String,
    /// Status code; 0 for error and opaque responses.
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
    pub response_type: ResponseType,
    /// Whether this response was served from a partition.
    pub from_cache: bool,
}

impl Response {
    /// Create a basic response.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            url: String::new(),
            status,
            status_text: status_text(status).to_string(),
            headers: HashMap::new(),
            body: body.into(),
            response_type: ResponseType::Basic,
            from_cache: false,
        }
    }

    /// A network error response (`Response.error()`).
    pub fn network_error() -> Self {
        Self {
            status_text: String::new(),
            response_type: ResponseType::Error,
            ..Self::new(0, Bytes::new())
        }
    }

    /// An opaque response to a no-cors cross-origin request.
    pub fn opaque(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status_text: String::new(),
            response_type: ResponseType::Opaque,
            ..Self::new(0, Bytes::new())
        }
    }

    /// Set the final URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Add a header. Names are stored lowercase.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Check if the status is 2xx.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Only a plain 200 that is neither an error nor opaque may be persisted.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200
            && !matches!(
                self.response_type,
                ResponseType::Error | ResponseType::Opaque | ResponseType::OpaqueRedirect
            )
    }

    /// Body as UTF-8 text (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Header lookup, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name.to_ascii_lowercase().as_str())
            .map(String::as_str)
    }
}

/// Get status text for common status codes.
pub fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_request_constructors() {
        let nav = Request::navigate(url("https://campus.example/"));
        assert_eq!(nav.method, Method::GET);
        assert_eq!(nav.destination, RequestDestination::Document);
        assert_eq!(nav.mode, RequestMode::Navigate);

        let img = Request::image(url("https://campus.example/a.png"));
        assert_eq!(img.destination, RequestDestination::Image);

        let post = Request::post(url("https://campus.example/api"), Bytes::from_static(b"{}"));
        assert_eq!(post.method, Method::POST);
        assert!(post.body.is_some());
    }

    #[test]
    fn test_request_hostname() {
        let req = Request::get(url("https://abc.supabase.co/rest/v1/x"));
        assert_eq!(req.hostname(), Some("abc.supabase.co"));
    }

    #[test]
    fn test_request_id_uniqueness() {
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[test]
    fn test_destination_hints() {
        assert_eq!(RequestDestination::from_hint("image"), RequestDestination::Image);
        assert_eq!(RequestDestination::from_hint("Document"), RequestDestination::Document);
        assert_eq!(RequestDestination::from_hint(""), RequestDestination::Empty);
        assert_eq!(RequestDestination::from_hint("paintworklet"), RequestDestination::Unknown);
        assert_eq!("style".parse::<RequestDestination>(), Ok(RequestDestination::Style));
    }

    #[test]
    fn test_cacheable_responses() {
        assert!(Response::new(200, "ok").is_cacheable());
        assert!(!Response::new(404, "missing").is_cacheable());
        assert!(!Response::new(206, "partial").is_cacheable());
        assert!(!Response::network_error().is_cacheable());
        assert!(!Response::opaque("https://cdn.example/x.png").is_cacheable());

        let mut odd = Response::new(200, "");
        odd.response_type = ResponseType::Error;
        assert!(!odd.is_cacheable());
    }

    #[test]
    fn test_response_type_names() {
        for ty in [ResponseType::Basic, ResponseType::Cors, ResponseType::OpaqueRedirect] {
            assert_eq!(ResponseType::from_name(ty.as_str()), Some(ty));
        }
        assert_eq!(ResponseType::from_name("bogus"), None);
    }

    #[test]
    fn test_response_headers_case_insensitive() {
        let response = Response::new(200, "body").with_header("Content-Type", "text/css");
        assert_eq!(response.header("content-type"), Some("text/css"));
        assert_eq!(response.header("CONTENT-TYPE"), Some("text/css"));
        assert_eq!(response.text(), "body");
        assert_eq!(response.status_text, "OK");
    }
}
