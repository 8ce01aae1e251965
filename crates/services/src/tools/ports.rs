use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "test-mocks"))]
use mockall::automock;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    #[default]
    Basic,
    Advanced,
}

/// Parameters for web search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchParams {
    pub query: String,
    pub search_depth: SearchDepth,
    pub max_results: u32,
    /// Ask the provider for a short synthesized answer
    pub include_answer: bool,
}

impl WebSearchParams {
    /// Create a new WebSearchParams with just a query
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            search_depth: SearchDepth::Basic,
            max_results: 5,
            include_answer: true,
        }
    }
}

/// Result from a web search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebSearchResponse {
    pub answer: Option<String>,
    pub results: Vec<WebSearchResult>,
}

#[derive(Debug, thiserror::Error)]
pub enum WebSearchError {
    #[error("Web search failed: {0}")]
    RequestFailed(String),
    #[error("Web search response parsing failed: {0}")]
    ResponseParsingFailed(String),
}

/// Web search provider trait
#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait WebSearchProviderTrait: Send + Sync {
    /// Perform a web search with the given parameters
    async fn search(&self, params: WebSearchParams) -> Result<WebSearchResponse, WebSearchError>;
}
