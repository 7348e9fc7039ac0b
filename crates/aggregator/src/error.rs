use thiserror::Error;

/// Errors surfaced by the aggregator core.
///
/// Cache failures never show up here; the cache swallows them.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure or a non-200 response. Never retried.
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Expected structure missing from a response
    #[error("parse error: {0}")]
    Parse(String),

    /// The lookup ran but nothing matched
    #[error("not found: {0}")]
    NotFound(String),

    /// None of the page's external links mapped to a canonical id
    #[error("failed to map ids: none of {links} external links resolved")]
    IdentityUnresolved { links: usize },

    /// The untrusted script failed, crashed or ran out of budget
    #[error("script evaluation failed: {0}")]
    Sandbox(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Error::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Error::Parse(message.into())
    }

    /// HTTP status class a caller should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::IdentityUnresolved { .. } => 503,
            Error::Fetch { .. } | Error::Parse(_) | Error::Sandbox(_) => 502,
            Error::Config(_) => 500,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::Config(format!("invalid url: {e}"))
    }
}
