use thiserror::Error;

#[derive(Debug, Error)]
pub enum NexusApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid value: {0}")]
    InvalidValue(String),
}

impl NexusApiError {
    /// True when the backend answered with 404 for the addressed entity.
    pub fn is_not_found(&self) -> bool {
        matches!(self, NexusApiError::Status { status: 404, .. })
    }
}

pub type Result<T> = std::result::Result<T, NexusApiError>;
