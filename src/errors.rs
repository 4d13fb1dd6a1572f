use crate::catalog::ValidationError;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    /// Network request failed
    NetworkError(String),
    /// Failed to parse XML content or catalog metadata
    ParseError(String),
    /// Invalid URL format
    UrlError(String),
    /// Catalog response did not pass DTD validation
    ValidationError(ValidationError),
    /// Invalid input or configuration
    InvalidInput(String),
    /// IO operation failed
    IoError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NetworkError(msg) => write!(f, "Network error: {msg}"),
            AppError::ParseError(msg) => write!(f, "Parse error: {msg}"),
            AppError::UrlError(msg) => write!(f, "Invalid URL: {msg}"),
            AppError::ValidationError(err) => write!(f, "Validation error: {err}"),
            AppError::InvalidInput(msg) => write!(f, "Invalid input: {msg}"),
            AppError::IoError(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

// Conversion implementations for common errors
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::NetworkError(err.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        AppError::UrlError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::InvalidInput(format!("Failed to parse config: {err}"))
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::ValidationError(err)
    }
}

// Custom type alias for Results in this application
pub type AppResult<T> = Result<T, AppError>;
