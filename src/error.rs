use thiserror::Error;

/// Failure of a single HTTP GET. The fetcher never retries; callers decide.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("empty body from {url}")]
    EmptyBody { url: String },
    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// No useful work can proceed; abort the process.
    Fatal,
    /// Log, count, move on.
    Recoverable,
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Transport(#[from] FetchError),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl ScrapeError {
    pub fn severity(&self) -> Severity {
        match self {
            ScrapeError::Configuration(_) => Severity::Fatal,
            ScrapeError::Persistence(e) if is_schema_error(&e.to_string()) => Severity::Fatal,
            _ => Severity::Recoverable,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

/// Missing tables or columns mean the schema is not what we were promised.
fn is_schema_error(message: &str) -> bool {
    message.contains("no such table")
        || message.contains("no such column")
        || message.contains("has no column named")
}
