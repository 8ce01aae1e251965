use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use super::ports::*;

/// Tavily search API client
pub struct TavilyProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct TavilySearchRequest<'a> {
    query: &'a str,
    search_depth: SearchDepth,
    include_answer: bool,
    include_images: bool,
    include_raw_content: bool,
    max_results: u32,
}

#[derive(Debug, Deserialize)]
struct TavilySearchResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<WebSearchResult>,
}

impl TavilyProvider {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, WebSearchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WebSearchError::RequestFailed(format!("Failed to build client: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// `None` when no API key is configured
    pub fn from_config(config: &config::WebSearchConfig) -> Result<Option<Self>, WebSearchError> {
        config
            .api_key
            .as_ref()
            .map(|key| {
                Self::new(
                    key.clone(),
                    config.base_url.clone(),
                    Duration::from_secs(config.timeout_seconds),
                )
            })
            .transpose()
    }
}

#[async_trait::async_trait]
impl WebSearchProviderTrait for TavilyProvider {
    async fn search(&self, params: WebSearchParams) -> Result<WebSearchResponse, WebSearchError> {
        tracing::debug!("Searching for query: {}", params.query);
        let body = TavilySearchRequest {
            query: &params.query,
            search_depth: params.search_depth,
            include_answer: params.include_answer,
            include_images: false,
            include_raw_content: false,
            max_results: params.max_results,
        };

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| WebSearchError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            tracing::error!("Tavily API error (status {}): {}", status, error_body);
            return Err(WebSearchError::RequestFailed(format!(
                "Tavily API error: {} - {}",
                status.as_u16(),
                error_body
            )));
        }

        let parsed: TavilySearchResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse Tavily response: {}", e);
            WebSearchError::ResponseParsingFailed(format!("JSON parsing error: {e}"))
        })?;

        tracing::info!(
            "Web search completed with {} results",
            parsed.results.len()
        );
        Ok(WebSearchResponse {
            answer: parsed.answer.filter(|a| !a.is_empty()),
            results: parsed.results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn provider(server: &MockServer) -> TavilyProvider {
        TavilyProvider::new("tvly-test", server.base_url(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_search_sends_expected_body_and_parses_results() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/search")
                    .header("authorization", "Bearer tvly-test")
                    .json_body(serde_json::json!({
                        "query": "rust release",
                        "search_depth": "advanced",
                        "include_answer": true,
                        "include_images": false,
                        "include_raw_content": false,
                        "max_results": 3
                    }));
                then.status(200).json_body(serde_json::json!({
                    "answer": "Rust 1.90 is out.",
                    "results": [{
                        "title": "Rust Blog",
                        "url": "https://blog.rust-lang.org",
                        "content": "Announcing Rust 1.90",
                        "score": 0.93,
                        "published_date": "2025-09-18"
                    }]
                }));
            })
            .await;

        let response = provider(&server)
            .search(WebSearchParams {
                query: "rust release".to_string(),
                search_depth: SearchDepth::Advanced,
                max_results: 3,
                include_answer: true,
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.answer.as_deref(), Some("Rust 1.90 is out."));
        assert_eq!(response.results.len(), 1);
        assert_eq!(
            response.results[0].published_date.as_deref(),
            Some("2025-09-18")
        );
    }

    #[tokio::test]
    async fn test_error_status_becomes_request_failed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/search");
                then.status(432).body("quota exceeded");
            })
            .await;

        let err = provider(&server)
            .search(WebSearchParams::new("anything"))
            .await
            .unwrap_err();

        match err {
            WebSearchError::RequestFailed(msg) => {
                assert!(msg.contains("432"));
                assert!(msg.contains("quota exceeded"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_from_config_without_key_is_none() {
        let config = config::WebSearchConfig {
            api_key: None,
            base_url: "https://api.tavily.com".to_string(),
            timeout_seconds: 30,
        };
        assert!(TavilyProvider::from_config(&config).unwrap().is_none());
    }
}
