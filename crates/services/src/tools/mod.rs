pub mod ports;
pub mod tavily;
pub mod web_search;

use std::sync::Arc;

use crate::completions::ToolSchema;
pub use ports::*;
pub use tavily::TavilyProvider;
pub use web_search::{Citation, WebSearchArgs, WEB_SEARCH_SYSTEM_PROMPT, WEB_SEARCH_TOOL_NAME};

/// Result of running a tool. Never an error: provider failures become `Failure`.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success {
        result_text: String,
        citations: Vec<Citation>,
    },
    Failure {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolCallError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("{0}")]
    InvalidArguments(String),
}

/// A validated tool call, ready to run
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedToolCall {
    pub name: String,
    /// Arguments re-serialized with sorted keys, so equal calls compare equal
    pub canonical_arguments: String,
    /// Human-readable subject of the call, shown in status text
    pub query: String,
    params: WebSearchParams,
}

/// Runs model-requested tools. Web search is the only tool.
#[derive(Clone)]
pub struct ToolExecutor {
    web_search: Arc<dyn WebSearchProviderTrait>,
}

impl ToolExecutor {
    pub fn new(web_search: Arc<dyn WebSearchProviderTrait>) -> Self {
        Self { web_search }
    }

    /// Schemas advertised to the model
    pub fn tool_schemas(&self) -> Vec<ToolSchema> {
        vec![web_search::web_search_tool_schema()]
    }

    pub fn prepare(&self, name: &str, arguments: &str) -> Result<PreparedToolCall, ToolCallError> {
        if name != WEB_SEARCH_TOOL_NAME {
            return Err(ToolCallError::UnknownTool(name.to_string()));
        }

        let value: serde_json::Value = serde_json::from_str(arguments).map_err(|e| {
            ToolCallError::InvalidArguments(format!("Invalid {name} arguments: {e}"))
        })?;
        let canonical_arguments = value.to_string();
        let args = WebSearchArgs::parse(&canonical_arguments)
            .map_err(ToolCallError::InvalidArguments)?;

        Ok(PreparedToolCall {
            name: name.to_string(),
            canonical_arguments,
            query: args.query.clone(),
            params: args.into_params(),
        })
    }

    pub async fn run(&self, call: &PreparedToolCall) -> ToolOutcome {
        tracing::info!("Executing web search: {}", call.query);
        match self.web_search.search(call.params.clone()).await {
            Ok(response) => ToolOutcome::Success {
                result_text: web_search::format_search_results(&call.query, &response),
                citations: web_search::citations(&response),
            },
            Err(e) => {
                tracing::warn!("Web search failed: {}", e);
                ToolOutcome::Failure {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Validate and run in one step
    pub async fn execute(&self, name: &str, arguments: &str) -> ToolOutcome {
        match self.prepare(name, arguments) {
            Ok(call) => self.run(&call).await,
            Err(e) => ToolOutcome::Failure {
                error: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor_with(mock: MockWebSearchProviderTrait) -> ToolExecutor {
        ToolExecutor::new(Arc::new(mock))
    }

    #[test]
    fn test_prepare_canonicalizes_argument_order() {
        let executor = executor_with(MockWebSearchProviderTrait::new());

        let a = executor
            .prepare("web_search", r#"{"query":"rust","max_results":3}"#)
            .unwrap();
        let b = executor
            .prepare("web_search", r#"{ "max_results": 3, "query": "rust" }"#)
            .unwrap();

        assert_eq!(a.canonical_arguments, b.canonical_arguments);
        assert_eq!(a.query, "rust");
    }

    #[test]
    fn test_prepare_rejects_unknown_tool_and_bad_arguments() {
        let executor = executor_with(MockWebSearchProviderTrait::new());

        assert_eq!(
            executor.prepare("calculator", "{}"),
            Err(ToolCallError::UnknownTool("calculator".to_string()))
        );
        assert!(matches!(
            executor.prepare("web_search", r#"{"query":"#),
            Err(ToolCallError::InvalidArguments(_))
        ));
    }

    #[tokio::test]
    async fn test_execute_success_formats_results() {
        let mut mock = MockWebSearchProviderTrait::new();
        mock.expect_search()
            .withf(|params| params.query == "rust" && params.max_results == 5)
            .times(1)
            .returning(|_| {
                Ok(WebSearchResponse {
                    answer: None,
                    results: vec![WebSearchResult {
                        title: "Rust".to_string(),
                        url: "https://rust-lang.org".to_string(),
                        content: "A language".to_string(),
                        score: 1.0,
                        published_date: None,
                    }],
                })
            });

        match executor_with(mock).execute("web_search", r#"{"query":"rust"}"#).await {
            ToolOutcome::Success {
                result_text,
                citations,
            } => {
                assert!(result_text.contains("SOURCE 1: Rust"));
                assert_eq!(citations.len(), 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_never_errors() {
        let mut mock = MockWebSearchProviderTrait::new();
        mock.expect_search()
            .returning(|_| Err(WebSearchError::RequestFailed("timeout".to_string())));
        let executor = executor_with(mock);

        let outcome = executor.execute("web_search", r#"{"query":"rust"}"#).await;
        assert_eq!(
            outcome,
            ToolOutcome::Failure {
                error: "Web search failed: timeout".to_string()
            }
        );

        let outcome = executor.execute("image_gen", "{}").await;
        assert!(matches!(outcome, ToolOutcome::Failure { .. }));
    }
}
