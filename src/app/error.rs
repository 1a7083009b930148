use thiserror::Error;

#[derive(Error, Debug)]
pub enum GleanerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Page error: {0}")]
    Page(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("A collection run is already in progress")]
    AlreadyCollecting,

    #[error("No collection run is active")]
    NotCollecting,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, GleanerError>;
