use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Too many requests: {0}")]
    TooManyRequests(String),
}

impl ApiError {
    /// Whether repeating the same call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::TooManyRequests(_) => true,
            ApiError::Api { status, .. } => *status >= 500,
            ApiError::Serialization(_)
            | ApiError::NotFound(_)
            | ApiError::Unauthorized(_)
            | ApiError::BadRequest(_) => false,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
