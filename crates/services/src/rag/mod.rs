pub mod client;
pub mod ports;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::conversations::models::UserId;
pub use client::HttpDocumentSearch;
pub use ports::{DocumentChunkMatch, DocumentSearch, DocumentSearchQuery, RagError};

const UNKNOWN_FILENAME: &str = "Unknown file";

/// Document a retrieved chunk came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSource {
    pub file_id: String,
    pub filename: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Augmentation {
    /// Numbered `[Source N]` excerpts, empty when nothing matched
    pub context_text: String,
    /// Same order as the excerpts
    pub sources: Vec<RetrievalSource>,
}

impl Augmentation {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Retrieves excerpts from a user's own uploaded documents
#[derive(Clone)]
pub struct ContextAugmentor {
    search: Option<Arc<dyn DocumentSearch>>,
    max_results: usize,
    score_threshold: f32,
}

impl ContextAugmentor {
    pub fn new(search: Arc<dyn DocumentSearch>, max_results: usize, score_threshold: f32) -> Self {
        Self {
            search: Some(search),
            max_results,
            score_threshold,
        }
    }

    /// Augmentor used when no embedding provider is configured
    pub fn disabled() -> Self {
        Self {
            search: None,
            max_results: 0,
            score_threshold: 0.0,
        }
    }

    pub fn from_config(config: Option<&config::RagConfig>) -> Result<Self, RagError> {
        match config {
            Some(config) => Ok(Self::new(
                Arc::new(HttpDocumentSearch::new(config)?),
                config.max_results,
                config.score_threshold,
            )),
            None => {
                tracing::info!("No embedding provider configured, document retrieval disabled");
                Ok(Self::disabled())
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.search.is_some()
    }

    pub async fn augment(&self, query: &str, owner: &UserId) -> Result<Augmentation, RagError> {
        let Some(search) = &self.search else {
            return Ok(Augmentation::default());
        };

        let matches = search
            .search(DocumentSearchQuery {
                text: query.to_string(),
                owner: *owner,
                limit: self.max_results,
                score_threshold: self.score_threshold,
            })
            .await?;

        let kept: Vec<DocumentChunkMatch> = matches
            .into_iter()
            .filter(|m| m.score >= self.score_threshold)
            .take(self.max_results)
            .collect();

        let context_text = kept
            .iter()
            .enumerate()
            .map(|(idx, m)| {
                format!(
                    "[Source {}] {}:\n{}\n",
                    idx + 1,
                    m.filename.as_deref().unwrap_or(UNKNOWN_FILENAME),
                    m.chunk_text
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let sources = kept
            .into_iter()
            .map(|m| RetrievalSource {
                file_id: m.file_id,
                filename: m.filename.unwrap_or_else(|| UNKNOWN_FILENAME.to_string()),
                score: m.score,
            })
            .collect();

        Ok(Augmentation {
            context_text,
            sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ports::MockDocumentSearch;
    use uuid::Uuid;

    fn chunk(file_id: &str, filename: Option<&str>, text: &str, score: f32) -> DocumentChunkMatch {
        DocumentChunkMatch {
            file_id: file_id.to_string(),
            filename: filename.map(str::to_string),
            chunk_text: text.to_string(),
            score,
        }
    }

    #[tokio::test]
    async fn test_augment_formats_numbered_sources() {
        let owner = UserId(Uuid::new_v4());
        let mut search = MockDocumentSearch::new();
        search
            .expect_search()
            .withf(move |q| q.owner == owner && q.limit == 3 && q.text == "revenue")
            .times(1)
            .returning(|_| {
                Ok(vec![
                    chunk("f1", Some("report.pdf"), "Revenue grew", 0.9),
                    chunk("f2", None, "Costs fell", 0.6),
                ])
            });

        let augmentor = ContextAugmentor::new(Arc::new(search), 3, 0.3);
        let result = augmentor.augment("revenue", &owner).await.unwrap();

        assert_eq!(
            result.context_text,
            "[Source 1] report.pdf:\nRevenue grew\n\n[Source 2] Unknown file:\nCosts fell\n"
        );
        assert_eq!(result.sources.len(), 2);
        assert_eq!(result.sources[1].filename, "Unknown file");
    }

    #[tokio::test]
    async fn test_results_below_threshold_are_dropped() {
        let mut search = MockDocumentSearch::new();
        search
            .expect_search()
            .returning(|_| Ok(vec![chunk("f1", Some("notes.txt"), "meh", 0.1)]));

        let augmentor = ContextAugmentor::new(Arc::new(search), 5, 0.3);
        let result = augmentor
            .augment("anything", &UserId(Uuid::new_v4()))
            .await
            .unwrap();

        assert!(result.is_empty());
        assert!(result.context_text.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_augmentor_does_no_io() {
        let augmentor = ContextAugmentor::disabled();
        assert!(!augmentor.is_enabled());
        let result = augmentor
            .augment("anything", &UserId(Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(result, Augmentation::default());
    }

    #[tokio::test]
    async fn test_search_errors_propagate() {
        let mut search = MockDocumentSearch::new();
        search
            .expect_search()
            .returning(|_| Err(RagError::RequestFailed("timeout".to_string())));

        let augmentor = ContextAugmentor::new(Arc::new(search), 5, 0.3);
        assert!(augmentor
            .augment("q", &UserId(Uuid::new_v4()))
            .await
            .is_err());
    }
}
