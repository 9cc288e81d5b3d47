use thiserror::Error;

#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{service} service error: {message}")]
    Service { service: String, message: String },

    #[error("Pagination protocol violation: {0}")]
    Pagination(String),

    #[error("Rate limiter '{limiter}' could not admit the request")]
    RateLimit { limiter: String },

    #[error("Consumer disconnected")]
    ConsumerDisconnected,
}

impl AggregatorError {
    pub fn service(service: impl Into<String>, message: impl Into<String>) -> Self {
        AggregatorError::Service {
            service: service.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
