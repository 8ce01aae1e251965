use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ports::{DocumentChunkMatch, DocumentSearch, DocumentSearchQuery, RagError};

/// HTTP document search: embeds the query with an OpenAI-compatible embeddings
/// endpoint, then asks the vector search service for the owner's nearest chunks.
pub struct HttpDocumentSearch {
    client: reqwest::Client,
    embedding_base_url: String,
    embedding_api_key: String,
    embedding_model: String,
    vector_search_url: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct VectorSearchRequest<'a> {
    vector: &'a [f32],
    owner_id: String,
    limit: usize,
    score_threshold: f32,
}

#[derive(Deserialize)]
struct VectorSearchResponse {
    #[serde(default)]
    results: Vec<DocumentChunkMatch>,
}

impl HttpDocumentSearch {
    pub fn new(config: &config::RagConfig) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| RagError::RequestFailed(format!("Failed to build HTTP client: {e}")))?;

        tracing::info!(
            vector_search_url = %config.vector_search_url,
            embedding_model = %config.embedding_model,
            "Document search client initialized"
        );

        Ok(Self {
            client,
            embedding_base_url: config.embedding_base_url.trim_end_matches('/').to_string(),
            embedding_api_key: config.embedding_api_key.clone(),
            embedding_model: config.embedding_model.clone(),
            vector_search_url: config.vector_search_url.trim_end_matches('/').to_string(),
        })
    }

    /// Check response status and extract error body if needed
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, RagError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            Err(RagError::ApiError {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.embedding_base_url))
            .bearer_auth(&self.embedding_api_key)
            .json(&EmbeddingRequest {
                model: &self.embedding_model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| RagError::RequestFailed(e.to_string()))?;

        let response = Self::check_response(response).await?;
        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagError::ParseError(e.to_string()))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| RagError::ParseError("Embedding response contained no data".to_string()))
    }
}

#[async_trait]
impl DocumentSearch for HttpDocumentSearch {
    async fn search(&self, query: DocumentSearchQuery) -> Result<Vec<DocumentChunkMatch>, RagError> {
        let vector = self.embed(&query.text).await?;

        let response = self
            .client
            .post(format!("{}/search", self.vector_search_url))
            .json(&VectorSearchRequest {
                vector: &vector,
                owner_id: query.owner.to_string(),
                limit: query.limit,
                score_threshold: query.score_threshold,
            })
            .send()
            .await
            .map_err(|e| RagError::RequestFailed(e.to_string()))?;

        let response = Self::check_response(response).await?;
        let parsed: VectorSearchResponse = response
            .json()
            .await
            .map_err(|e| RagError::ParseError(e.to_string()))?;

        tracing::debug!("Document search returned {} chunks", parsed.results.len());
        Ok(parsed.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::models::UserId;
    use httpmock::prelude::*;
    use uuid::Uuid;

    fn rag_config(server: &MockServer) -> config::RagConfig {
        config::RagConfig {
            embedding_api_key: "sk-test".to_string(),
            embedding_base_url: server.url("/v1"),
            embedding_model: "text-embedding-3-small".to_string(),
            vector_search_url: server.base_url(),
            max_results: 5,
            score_threshold: 0.3,
            timeout_seconds: 5,
        }
    }

    #[tokio::test]
    async fn test_search_embeds_then_queries_scoped_to_owner() {
        let server = MockServer::start_async().await;
        let owner = UserId(Uuid::new_v4());

        let embed = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/embeddings")
                    .header("authorization", "Bearer sk-test")
                    .json_body(serde_json::json!({
                        "model": "text-embedding-3-small",
                        "input": "quarterly revenue"
                    }));
                then.status(200)
                    .json_body(serde_json::json!({"data": [{"embedding": [0.1, 0.2]}]}));
            })
            .await;
        let owner_id = owner.to_string();
        let search = server
            .mock_async(move |when, then| {
                when.method(POST).path("/search").json_body_partial(format!(
                    r#"{{"owner_id": "{owner_id}", "limit": 5}}"#
                ));
                then.status(200).json_body(serde_json::json!({
                    "results": [{
                        "file_id": "file_1",
                        "filename": "report.pdf",
                        "chunk_text": "Revenue grew 12%",
                        "score": 0.82
                    }]
                }));
            })
            .await;

        let client = HttpDocumentSearch::new(&rag_config(&server)).unwrap();
        let results = client
            .search(DocumentSearchQuery {
                text: "quarterly revenue".to_string(),
                owner,
                limit: 5,
                score_threshold: 0.3,
            })
            .await
            .unwrap();

        embed.assert_async().await;
        search.assert_async().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].filename.as_deref(), Some("report.pdf"));
    }

    #[tokio::test]
    async fn test_embedding_error_is_api_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(401).body("bad key");
            })
            .await;

        let client = HttpDocumentSearch::new(&rag_config(&server)).unwrap();
        let err = client
            .search(DocumentSearchQuery {
                text: "q".to_string(),
                owner: UserId(Uuid::new_v4()),
                limit: 5,
                score_threshold: 0.3,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RagError::ApiError { status: 401, .. }));
    }
}
