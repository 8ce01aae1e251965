use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "test-mocks"))]
use mockall::automock;

use crate::conversations::models::UserId;

/// Error type for document retrieval
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("Document search request failed: {0}")]
    RequestFailed(String),
    #[error("Document search returned an error: {status} {body}")]
    ApiError { status: u16, body: String },
    #[error("Document search response parsing failed: {0}")]
    ParseError(String),
}

/// Semantic search over one user's uploaded documents.
/// `owner` is part of the query itself so an unscoped search cannot be expressed.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSearchQuery {
    pub text: String,
    pub owner: UserId,
    pub limit: usize,
    pub score_threshold: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunkMatch {
    pub file_id: String,
    #[serde(default)]
    pub filename: Option<String>,
    pub chunk_text: String,
    pub score: f32,
}

/// Embedding + vector search collaborator
#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait DocumentSearch: Send + Sync {
    /// Matches ordered by descending score
    async fn search(&self, query: DocumentSearchQuery) -> Result<Vec<DocumentChunkMatch>, RagError>;
}
