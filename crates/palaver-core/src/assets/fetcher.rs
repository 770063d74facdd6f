//! Retrieval of asset payloads on cache misses

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, error};

use crate::CoreError;

/// Retrieves the raw JSON payload stored at a locator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetch the payload at `locator`. Nothing stored at the locator is
    /// [`CoreError::AssetNotFound`], every other failure is a
    /// [`CoreError::CacheFetchError`].
    async fn fetch(&self, locator: &str) -> Result<serde_json::Value, CoreError>;
}

/// Fetches assets from an asset server over HTTP
#[derive(Debug, Clone)]
pub struct HttpAssetFetcher {
    client: Client,
    auth_token: Option<String>,
}

impl HttpAssetFetcher {
    /// Create a fetcher whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, CoreError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            CoreError::ConfigurationError(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            auth_token: None,
        })
    }

    /// Send a bearer token with every request
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, locator: &str) -> Result<serde_json::Value, CoreError> {
        let fetch_error = |reason: String| CoreError::CacheFetchError {
            locator: locator.to_string(),
            reason,
        };

        debug!(locator, "Fetching asset");

        let mut request = self.client.get(locator);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            error!(locator, error = %e, "Asset request failed");
            fetch_error(e.to_string())
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(locator, "Asset not found");
            return Err(CoreError::AssetNotFound(locator.to_string()));
        }
        if !status.is_success() {
            error!(locator, status = status.as_u16(), "Asset server returned error");
            return Err(fetch_error(format!("status {}", status.as_u16())));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| fetch_error(format!("invalid JSON: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpAssetFetcher {
        HttpAssetFetcher::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_returns_json_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/assets/group"))
            .and(header("authorization", "Bearer sesame"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"uuid": "g1", "name": "Testers"}])),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let locator = format!("{}/assets/group", mock_server.uri());
        let body = fetcher()
            .with_auth_token("sesame")
            .fetch(&locator)
            .await
            .unwrap();

        assert_eq!(body[0]["name"], "Testers");
    }

    #[tokio::test]
    async fn test_fetch_maps_status_to_fetch_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/assets/group"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&mock_server)
            .await;

        let locator = format!("{}/assets/group", mock_server.uri());
        match fetcher().fetch(&locator).await {
            Err(CoreError::CacheFetchError { locator: l, reason }) => {
                assert_eq!(l, locator);
                assert_eq!(reason, "status 502");
            }
            other => panic!("Expected CacheFetchError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_maps_404_to_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/assets/flow/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let locator = format!("{}/assets/flow/missing", mock_server.uri());
        assert_eq!(
            fetcher().fetch(&locator).await.unwrap_err(),
            CoreError::AssetNotFound(locator)
        );
    }

    #[tokio::test]
    async fn test_fetch_rejects_invalid_json() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&mock_server)
            .await;

        let result = fetcher().fetch(&mock_server.uri()).await;
        assert!(matches!(result, Err(CoreError::CacheFetchError { .. })));
    }
}
