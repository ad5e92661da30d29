use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // ── Configuration ──
    #[error("credential not configured: {0}")]
    MissingCredential(String),

    #[error("collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // ── Transport ──
    #[error("HTTP {status} from {url}: {body}")]
    Http {
        status: reqwest::StatusCode,
        url: String,
        body: String,
    },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    // ── Data shape ──
    #[error("malformed row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// Turn a non-2xx response into `Error::Http`, keeping the body for context.
pub async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(Error::Http { status, url, body })
}
