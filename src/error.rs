use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Introspection error: {0}")]
    Introspection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for AdvisorError {
    fn from(err: rusqlite::Error) -> Self {
        AdvisorError::Catalog(err.to_string())
    }
}

impl From<sqlx::Error> for AdvisorError {
    fn from(err: sqlx::Error) -> Self {
        AdvisorError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AdvisorError>;
