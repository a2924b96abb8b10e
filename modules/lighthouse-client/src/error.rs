use thiserror::Error;

pub type Result<T> = std::result::Result<T, LighthouseError>;

#[derive(Debug, Error)]
pub enum LighthouseError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Browser exited before exposing a DevTools endpoint")]
    NoDevToolsEndpoint,

    #[error("Lighthouse exited with {status}: {stderr}")]
    Audit { status: String, stderr: String },

    #[error("Lighthouse produced no {0} report")]
    MissingReport(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for LighthouseError {
    fn from(err: serde_json::Error) -> Self {
        LighthouseError::Parse(err.to_string())
    }
}
