use thiserror::Error;

pub type Result<T> = std::result::Result<T, GcpError>;

#[derive(Debug, Error)]
pub enum GcpError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for GcpError {
    fn from(err: reqwest::Error) -> Self {
        GcpError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for GcpError {
    fn from(err: serde_json::Error) -> Self {
        GcpError::Parse(err.to_string())
    }
}

impl From<url::ParseError> for GcpError {
    fn from(err: url::ParseError) -> Self {
        GcpError::Parse(err.to_string())
    }
}
