//! Outbound HTTP.
//!
//! Every component talks to the network through [`HttpFetch`], so tests can
//! swap the transport for a stub. Failures are returned immediately; nothing
//! here retries.

use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use shared::config::HttpConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A single outbound request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: Url, body: String) -> Self {
        Self {
            method: Method::Post,
            url,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Some(body),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn headers<'a>(mut self, headers: impl IntoIterator<Item = (&'a str, String)>) -> Self {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.to_string(), v)));
        self
    }

    /// Look up a header value, case-insensitively
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Transport capability: send a request, get the body of a 200 response
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<String>;
}

/// [`HttpFetch`] over a shared reqwest client
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .gzip(true)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn send(&self, request: HttpRequest) -> Result<String> {
        let url = request.url.to_string();
        let mut builder = match request.method {
            Method::Get => self.client.get(request.url),
            Method::Post => self.client.post(request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        debug!(url = %url, "Making request");

        let response = builder.send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Request error");
            Error::fetch(&url, e)
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(url = %url, status = %status, "Request failed");
            return Err(Error::fetch(&url, format!("status {status}")));
        }

        response.text().await.map_err(|e| Error::fetch(&url, e))
    }
}

/// Convenience wrapper shared by every client
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<dyn HttpFetch>,
}

impl HttpClient {
    pub fn new(inner: Arc<dyn HttpFetch>) -> Self {
        Self { inner }
    }

    pub async fn send(&self, request: HttpRequest) -> Result<String> {
        self.inner.send(request).await
    }

    pub async fn get_text(&self, request: HttpRequest) -> Result<String> {
        self.send(request).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T> {
        let url = request.url.to_string();
        let body = self.send(request).await?;
        decode(&url, &body)
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(&self, url: Url, body: &B) -> Result<T> {
        let payload = serde_json::to_string(body)
            .map_err(|e| Error::parse(format!("failed to encode request body: {e}")))?;
        let display = url.to_string();
        let body = self.send(HttpRequest::post(url, payload)).await?;
        decode(&display, &body)
    }
}

fn decode<T: DeserializeOwned>(url: &str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| {
        warn!(url = %url, error = %e, "Failed to parse response");
        Error::parse(format!("failed to parse response from {url}: {e}"))
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory transport for tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Canned responses keyed by full URL, with a log of every request
    #[derive(Default)]
    pub struct StubFetcher {
        routes: Mutex<HashMap<String, std::result::Result<String, u16>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl StubFetcher {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn respond(&self, url: &str, body: impl Into<String>) {
            self.routes
                .lock()
                .unwrap()
                .insert(url.to_string(), Ok(body.into()));
        }

        pub fn fail(&self, url: &str, status: u16) {
            self.routes
                .lock()
                .unwrap()
                .insert(url.to_string(), Err(status));
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn hits(&self, url: &str) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.url.as_str() == url)
                .count()
        }

        pub fn client(self: &Arc<Self>) -> HttpClient {
            HttpClient::new(self.clone())
        }
    }

    #[async_trait]
    impl HttpFetch for StubFetcher {
        async fn send(&self, request: HttpRequest) -> Result<String> {
            let url = request.url.to_string();
            self.requests.lock().unwrap().push(request);
            match self.routes.lock().unwrap().get(&url) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(Error::fetch(&url, format!("status {status}"))),
                None => Err(Error::fetch(&url, "status 404 Not Found")),
            }
        }
    }
}
