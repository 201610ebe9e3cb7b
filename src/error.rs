use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("usage: {0}")]
    Usage(String),

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("storage error: {0}")]
    Storage(#[from] tokio_rusqlite::Error),

    #[error("invalid publication date {value:?}: {source}")]
    DateParse {
        value: String,
        source: chrono::ParseError,
    },

    #[error("user already exists: {0}")]
    UserExists(String),

    #[error("feed already registered: {0}")]
    FeedExists(String),

    #[error("no feed registered with url {0}")]
    FeedNotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failures resolving the current user for auth-gated commands.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no current user, run `login <username>` first")]
    NoCurrentUser,

    #[error("user not found: {0}")]
    UserNotFound(String),
}

/// Failures retrieving or decoding a remote feed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to fetch {url}: HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("malformed feed: {0}")]
    Parse(#[from] rss::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
