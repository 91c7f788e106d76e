//! Request classification.

use http::Method;
use swkit_net::{Request, RequestDestination};
use tracing::trace;

/// How an intercepted request is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not intercepted; the host applies its default network handling.
    Bypass,
    /// Cache-first against the image partition.
    Image,
    /// Network-first, falling back to any partition.
    Document,
    /// Cache-first against every partition, populating the runtime partition.
    Generic,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Bypass => "bypass",
            Route::Image => "image",
            Route::Document => "document",
            Route::Generic => "generic",
        }
    }
}

/// Maps requests to routes. First matching rule wins:
///
/// 1. non-GET method → bypass
/// 2. hostname contains a bypass substring → bypass
/// 3. destination `image` → image
/// 4. destination `document` → document
/// 5. anything else → generic
#[derive(Debug, Clone, Default)]
pub struct RequestClassifier {
    bypass_hosts: Vec<String>,
}

impl RequestClassifier {
    /// Create a classifier that never intercepts hosts containing any of `bypass_hosts`.
    pub fn new<I, S>(bypass_hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bypass_hosts: bypass_hosts
                .into_iter()
                .map(|h| h.into().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Check whether `host` contains any bypass substring.
    pub fn is_bypassed_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.bypass_hosts.iter().any(|pattern| host.contains(pattern.as_str()))
    }

    /// Classify a request.
    pub fn classify(&self, request: &Request) -> Route {
        let route = if request.method != Method::GET {
            Route::Bypass
        } else if request
            .hostname()
            .is_some_and(|host| self.is_bypassed_host(host))
        {
            Route::Bypass
        } else {
            match request.destination {
                RequestDestination::Image => Route::Image,
                RequestDestination::Document => Route::Document,
                _ => Route::Generic,
            }
        };

        trace!(
            url = %request.url,
            method = %request.method,
            destination = %request.destination,
            route = route.as_str(),
            "Classified request"
        );
        route
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn classifier() -> RequestClassifier {
        RequestClassifier::new(["supabase.co", "cloudinary.com", "googleapis.com", "google.com"])
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_non_get_is_bypassed() {
        let c = classifier();
        for method in [Method::POST, Method::PUT, Method::DELETE, Method::HEAD, Method::PATCH] {
            let request = Request::navigate(url("https://campusguide.app/")).with_method(method);
            assert_eq!(c.classify(&request), Route::Bypass);
        }
    }

    #[test]
    fn test_method_checked_before_destination() {
        let request = Request::image(url("https://campusguide.app/a.png")).with_method(Method::POST);
        assert_eq!(classifier().classify(&request), Route::Bypass);
    }

    #[test]
    fn test_bypass_hosts_match_substrings() {
        let c = classifier();
        let bypassed = [
            "https://xyzcompany.supabase.co/rest/v1/buildings",
            "https://res.cloudinary.com/campus/image/upload/map.png",
            "https://fonts.googleapis.com/css2?family=Inter",
            "https://www.google.com/maps",
            "https://maps.google.com.evil.example/",
        ];
        for u in bypassed {
            assert_eq!(c.classify(&Request::image(url(u))), Route::Bypass, "{}", u);
        }

        // Path and query do not count, only the hostname.
        let request = Request::get(url("https://campusguide.app/google.com/supabase.co"));
        assert_eq!(c.classify(&request), Route::Generic);
    }

    #[test]
    fn test_host_match_is_case_insensitive() {
        let c = RequestClassifier::new(["Supabase.CO"]);
        assert!(c.is_bypassed_host("abc.supabase.co"));
        assert!(c.is_bypassed_host("ABC.SUPABASE.CO"));
        assert!(!c.is_bypassed_host("campusguide.app"));
    }

    #[test]
    fn test_destination_routes() {
        let c = classifier();
        assert_eq!(
            c.classify(&Request::image(url("https://campusguide.app/icon-192.png"))),
            Route::Image
        );
        assert_eq!(
            c.classify(&Request::navigate(url("https://campusguide.app/"))),
            Route::Document
        );
        let script = Request::get(url("https://campusguide.app/app.js"))
            .with_destination(RequestDestination::Script);
        assert_eq!(c.classify(&script), Route::Generic);
    }

    #[test]
    fn test_empty_or_unknown_destination_is_generic() {
        let c = classifier();
        let empty = Request::get(url("https://campusguide.app/data.json"));
        assert_eq!(c.classify(&empty), Route::Generic);

        let unknown = Request::get(url("https://campusguide.app/x"))
            .with_destination(RequestDestination::from_hint("paintworklet"));
        assert_eq!(c.classify(&unknown), Route::Generic);
    }

    #[test]
    fn test_no_bypass_hosts_configured() {
        let c = RequestClassifier::default();
        assert_eq!(
            c.classify(&Request::get(url("https://www.google.com/"))),
            Route::Generic
        );
    }
}
