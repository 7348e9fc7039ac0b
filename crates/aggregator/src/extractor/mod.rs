//! Stream link extraction from packed embed pages.

pub mod sandbox;

pub use sandbox::{Sandbox, SandboxLimits, ScriptEval};

use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpRequest};
use once_cell::sync::Lazy;
use regex::Regex;
use shared::config::ExtractorConfig;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// The packer call, up to the end of its script tag
static PACKED_PAYLOAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)eval(\(f.*?)\s*</script>").unwrap());

static STREAM_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https.*?m3u8").unwrap());

/// Resolves an embed page to its HLS playlist URL
#[derive(Clone)]
pub struct StreamExtractor {
    http: HttpClient,
    referer: String,
    sandbox: Arc<dyn ScriptEval>,
}

impl StreamExtractor {
    pub fn new(http: HttpClient, config: &ExtractorConfig) -> Self {
        Self::with_sandbox(
            http,
            config.referer.clone(),
            Arc::new(Sandbox::from_config(config)),
        )
    }

    pub fn with_sandbox(http: HttpClient, referer: String, sandbox: Arc<dyn ScriptEval>) -> Self {
        Self {
            http,
            referer,
            sandbox,
        }
    }

    pub async fn extract(&self, embed_url: &str) -> Result<String> {
        let url = Url::parse(embed_url.trim())
            .map_err(|e| Error::parse(format!("invalid embed url {embed_url}: {e}")))?;

        debug!(url = %url, "Fetching embed page");
        let html = self
            .http
            .get_text(HttpRequest::get(url.clone()).header("referer", self.referer.as_str()))
            .await?;

        let payload = find_payload(&html).ok_or_else(|| {
            warn!(url = %url, "No packed payload on embed page");
            Error::parse(format!("no packed payload found on {url}"))
        })?;

        let unpacked = self.sandbox.eval(payload.to_string()).await?;

        find_stream_url(&unpacked)
            .map(str::to_string)
            .ok_or_else(|| Error::parse(format!("no stream url in payload from {url}")))
    }
}

fn find_payload(html: &str) -> Option<&str> {
    PACKED_PAYLOAD
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn find_stream_url(text: &str) -> Option<&str> {
    STREAM_URL.find(text).map(|m| m.as_str())
}
