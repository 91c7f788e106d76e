//! Network fetcher.

use async_trait::async_trait;
use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::{status_text, NetError, Request, Response, ResponseType};

/// Issues a request against the network.
///
/// `Ok` carries any HTTP response, including 4xx/5xx. `Err` means no response was obtained
/// at all (offline, DNS failure, connection reset, aborted).
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError>;
}

/// Fetcher configuration.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// User agent string.
    pub user_agent: String,
    /// Accept-Language header.
    pub accept_language: String,
    /// Maximum redirects.
    pub max_redirects: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("swkit/{}", env!("CARGO_PKG_VERSION")),
            accept_language: "fr-FR,fr;q=0.9,en;q=0.8".to_string(),
            max_redirects: 10,
        }
    }
}

/// [`Fetcher`] backed by a reqwest client.
///
/// No request timeout is configured; slow responses are bounded only by the transport.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetcherConfig,
}

impl HttpFetcher {
    /// Create a new fetcher.
    pub fn new(config: FetcherConfig) -> Result<Self, NetError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        debug!(user_agent = %config.user_agent, "HttpFetcher initialized");

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, "Fetching resource");

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        builder = builder.header("Accept-Language", &self.config.accept_language);

        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(classify_error)?;

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        // Buffer the whole body so callers never see a truncated response.
        let body = response.bytes().await.map_err(classify_error)?;

        trace!(url = %url, status, body_len = body.len(), "Response received");

        Ok(Response {
            url,
            status,
            status_text: status_text(status).to_string(),
            headers,
            body,
            response_type: ResponseType::Basic,
            from_cache: false,
        })
    }
}

fn classify_error(err: reqwest::Error) -> NetError {
    if err.is_connect() {
        NetError::Offline(err.to_string())
    } else {
        NetError::HttpError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_fetcher_config_default() {
        let config = FetcherConfig::default();
        assert!(config.user_agent.starts_with("swkit/"));
        assert_eq!(config.max_redirects, 10);
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.html"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<h1>CampusGuide</h1>"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(FetcherConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/index.html", server.uri())).unwrap();
        let response = fetcher.fetch(&Request::navigate(url)).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.header("content-type"), Some("text/html"));
        assert_eq!(response.text(), "<h1>CampusGuide</h1>");
        assert!(response.is_cacheable());
        assert!(!response.from_cache);
    }

    #[tokio::test]
    async fn test_fetch_http_error_is_a_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.css"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(FetcherConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/missing.css", server.uri())).unwrap();
        let response = fetcher.fetch(&Request::get(url)).await.unwrap();

        assert_eq!(response.status, 404);
        assert!(!response.is_cacheable());
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_an_error() {
        // Reserve a port, then release it so nothing is listening there.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = HttpFetcher::new(FetcherConfig::default()).unwrap();
        let url = Url::parse(&format!("http://{}/index.html", addr)).unwrap();
        let result = fetcher.fetch(&Request::get(url)).await;

        assert!(result.is_err());
    }
}
