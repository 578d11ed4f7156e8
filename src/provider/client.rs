//! HTTP client for a bibliographic provider service.

use super::{BookProvider, ProviderBook, ProviderError, SearchHit};
use std::time::Duration;

/// Blocking HTTP implementation of [`BookProvider`].
pub struct HttpBookProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    search_enabled: bool,
}

impl HttpBookProvider {
    /// Create a new provider client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the provider service
    /// * `timeout_sec` - Per-request timeout in seconds
    /// * `search_enabled` - Whether this provider exposes free-text search
    pub fn new(base_url: String, timeout_sec: u64, search_enabled: bool) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .expect("Failed to create HTTP client");

        // Ensure base_url doesn't have trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        Self {
            client,
            base_url,
            search_enabled,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl BookProvider for HttpBookProvider {
    fn name(&self) -> &str {
        &self.base_url
    }

    fn fetch_by_id(&self, id: &str) -> Result<Option<ProviderBook>, ProviderError> {
        let url = format!("{}/books/{}", self.base_url, id);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }

        response
            .json::<ProviderBook>()
            .map(Some)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    fn supports_search(&self) -> bool {
        self.search_enabled
    }

    fn search(&self, query: &str) -> Result<Vec<SearchHit>, ProviderError> {
        if !self.search_enabled {
            return Err(ProviderError::SearchUnsupported);
        }

        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("q", query)])
            .send()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }

        response
            .json::<Vec<SearchHit>>()
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_removal() {
        let provider = HttpBookProvider::new("http://localhost:8080/".to_string(), 30, true);
        assert_eq!(provider.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_search_unsupported() {
        let provider = HttpBookProvider::new("http://localhost:8080".to_string(), 30, false);
        assert!(!provider.supports_search());
        assert!(matches!(
            provider.search("anything"),
            Err(ProviderError::SearchUnsupported)
        ));
    }
}
