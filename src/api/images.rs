//! Stock photo search client
//!
//! One HTTPS GET per call against a Pexels-compatible search endpoint.
//! Returns a single page of photo records; no internal retry or pagination.

use crate::api::ApiError;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_IMAGE_ENDPOINT: &str = "https://api.pexels.com/v1/search";

/// Result count bounds accepted by the search contract
pub const MIN_RESULTS: u8 = 1;
pub const MAX_RESULTS: u8 = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Photo {
    pub id: u64,
    pub width: u32,
    pub height: u32,
    /// Photo page on the provider's site
    pub url: String,
    pub photographer: String,
    pub photographer_url: String,
    pub src: PhotoSrc,
    #[serde(default)]
    pub alt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoSrc {
    pub original: String,
    pub large2x: String,
    pub large: String,
    pub medium: String,
    pub small: String,
    pub portrait: String,
    pub landscape: String,
    pub tiny: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Debug, Clone)]
pub struct ImageSearchClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl ImageSearchClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: crate::api::http_client(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    /// Fetch one page of photos for `query`. `per_page` is clamped to the
    /// [1,6] contract; a non-success status propagates with its code.
    pub async fn search(&self, query: &str, per_page: u8, page: u32) -> Result<Vec<Photo>, ApiError> {
        let per_page = per_page.clamp(MIN_RESULTS, MAX_RESULTS).to_string();
        let page = page.to_string();

        let response = self
            .client
            .get(&self.endpoint)
            .header("Authorization", &self.api_key)
            .query(&[
                ("query", query),
                ("per_page", per_page.as_str()),
                ("page", page.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: format!("image search error {}", status.as_u16()),
            });
        }

        let body: SearchResponse = response.json().await?;
        Ok(body.photos)
    }
}
