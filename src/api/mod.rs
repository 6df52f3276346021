pub mod completion;
pub mod images;
pub mod stream;

use reqwest::Client;
use std::time::Duration;

pub use completion::{
    CompletionClient, CompletionOptions, RequestKind, DEFAULT_COMPLETION_ENDPOINT, DEFAULT_MODEL,
};
pub use images::{ImageSearchClient, Photo, DEFAULT_IMAGE_ENDPOINT};

/// Errors from the HTTP API clients
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Non-success HTTP status with the upstream error message
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("stream error: {0}")]
    Stream(String),
}

/// Shared HTTP client configuration for all API clients. A hung upstream
/// surfaces when the 60s timeout fires.
pub(crate) fn http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(60))
        .user_agent(concat!("glimpse/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("Failed to create HTTP client")
}
