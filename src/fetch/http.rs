use super::registry::Endpoints;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Status, headers and text body of a GET
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Header names are stored lowercased.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// `Retry-After` given in whole seconds; HTTP-date values are ignored.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.header("retry-after")?
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }

    /// Turns non-2xx statuses into errors, 429 into `RateLimited`.
    ///
    /// # Errors
    ///
    /// Returns `RateLimited` for 429 and `Transport` for any other non-2xx status.
    pub fn error_for_status(self, url: &str) -> Result<Self> {
        match self.status {
            429 => Err(Error::RateLimited {
                retry_after: self.retry_after(),
            }),
            _ if self.is_success() => Ok(self),
            status => Err(Error::Transport {
                status,
                url: url.to_string(),
            }),
        }
    }
}

/// Minimal GET transport the fetchers depend on
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str, headers: &BTreeMap<String, String>) -> Result<HttpResponse>;
}

/// `reqwest`-backed transport; relative URLs are resolved against the
/// current base URL of the shared endpoints
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    inner: reqwest::Client,
    endpoints: Option<Arc<Endpoints>>,
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ReqwestHttpClient {
    #[must_use]
    pub fn new(endpoints: Option<Arc<Endpoints>>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoints)
    }

    #[must_use]
    pub fn with_client(inner: reqwest::Client, endpoints: Option<Arc<Endpoints>>) -> Self {
        Self { inner, endpoints }
    }

    fn resolve(&self, url: &str) -> Result<String> {
        if url.starts_with('/') {
            let endpoints = self.endpoints.as_ref().ok_or_else(|| {
                Error::Custom(format!("relative URL {url} needs a configured base URL"))
            })?;
            Ok(format!("{}{url}", endpoints.base_url()))
        } else {
            Ok(url.to_string())
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str, headers: &BTreeMap<String, String>) -> Result<HttpResponse> {
        let url = self.resolve(url)?;
        debug!("GET {}", url);

        let mut request = self.inner.get(&url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let mut result = HttpResponse::new(status, String::new());
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                result = result.with_header(name.as_str(), value);
            }
        }
        result.body = response.text().await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let limited = HttpResponse::new(429, "").with_header("Retry-After", "2");
        assert!(matches!(
            limited.error_for_status("/x"),
            Err(Error::RateLimited { retry_after: Some(d) }) if d == Duration::from_secs(2)
        ));

        let failed = HttpResponse::new(503, "down");
        assert!(matches!(
            failed.error_for_status("/x"),
            Err(Error::Transport { status: 503, .. })
        ));

        assert!(HttpResponse::new(204, "").error_for_status("/x").is_ok());
    }

    #[test]
    fn test_resolve_relative_urls() {
        let endpoints = Arc::new(Endpoints::new("http://localhost:3000/", "/api/data"));
        let client = ReqwestHttpClient::new(Some(Arc::clone(&endpoints)));
        assert_eq!(
            client.resolve("/api/data?component=A").unwrap(),
            "http://localhost:3000/api/data?component=A"
        );
        assert_eq!(client.resolve("https://x.test/a").unwrap(), "https://x.test/a");
        assert!(ReqwestHttpClient::default().resolve("/api").is_err());
    }

    #[test]
    fn test_resolve_follows_base_url_changes() {
        let endpoints = Arc::new(Endpoints::new("http://localhost:3000", "/api/data"));
        let client = ReqwestHttpClient::new(Some(Arc::clone(&endpoints)));

        endpoints.set_base_url("https://data.example.test/");
        assert_eq!(
            client.resolve("/api/data?component=A").unwrap(),
            "https://data.example.test/api/data?component=A"
        );
    }
}
