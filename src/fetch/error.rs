use thiserror::Error;

/// Typed fetch errors enabling retry classification.
///
/// `is_retryable()` separates transient failures (timeouts, refused
/// connections, server errors, truncated bodies) from terminal ones (client
/// errors, unsupported schemes, disk failures) so the retry loop can abort
/// early instead of hammering an endpoint that will never succeed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("source is not an absolute http(s) URL: {0}")]
    InvalidScheme(String),

    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("connection failed for {url}: {source}")]
    Connect {
        url: String,
        source: reqwest::Error,
    },

    #[error("HTTP {status} fetching {url}")]
    HttpClient { status: u16, url: String },

    #[error("HTTP {status} fetching {url}")]
    HttpServer { status: u16, url: String },

    #[error("empty body fetching {url}")]
    EmptyBody { url: String },

    #[error("local file not found: {0}")]
    LocalNotFound(String),

    #[error("disk error: {0}")]
    Disk(#[from] std::io::Error),

    #[error("transport error fetching {url}: {source}")]
    Transport {
        url: String,
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Whether this error is transient and worth another attempt.
    ///
    /// An empty body is retryable because it usually means a truncated
    /// transfer, not a genuinely empty asset.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. }
            | FetchError::Connect { .. }
            | FetchError::HttpServer { .. }
            | FetchError::EmptyBody { .. }
            | FetchError::Transport { .. } => true,
            FetchError::InvalidScheme(_)
            | FetchError::HttpClient { .. }
            | FetchError::LocalNotFound(_)
            | FetchError::Disk(_) => false,
        }
    }
}
