//! OpenAI-compatible streaming backend
//!
//! Works with any provider that implements OpenAI's `/chat/completions` streaming
//! format, including Groq, OpenAI, Together AI and Fireworks AI.

use crate::{
    extract_error_message, sse_parser::SSEParser, ChatCompletionParams, CompletionError,
    InferenceProvider, StreamingResult,
};
use async_trait::async_trait;
use reqwest::{header::HeaderValue, Client};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_seconds: u64,
}

pub struct OpenAiCompatibleProvider {
    client: Client,
    config: OpenAiCompatibleConfig,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: OpenAiCompatibleConfig) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| {
                CompletionError::CompletionError(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    fn build_headers(&self) -> Result<reqwest::header::HeaderMap, CompletionError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        let header_value = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|e| CompletionError::CompletionError(format!("Invalid API key format: {e}")))?;
        headers.insert("Authorization", header_value);

        Ok(headers)
    }
}

#[async_trait]
impl InferenceProvider for OpenAiCompatibleProvider {
    async fn chat_completion_stream(
        &self,
        params: ChatCompletionParams,
    ) -> Result<StreamingResult, CompletionError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let mut streaming_params = params;
        streaming_params.stream = Some(true);

        debug!(
            model = %streaming_params.model,
            messages = streaming_params.messages.len(),
            tools = streaming_params.tools.as_ref().map_or(0, Vec::len),
            "Starting streaming chat completion"
        );

        let response = self
            .client
            .post(&url)
            .headers(self.build_headers()?)
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .json(&streaming_params)
            .send()
            .await
            .map_err(|e| CompletionError::CompletionError(e.to_string()))?;

        if !response.status().is_success() {
            let status_code = response.status().as_u16();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|e| format!("Failed to read error response body: {e}"));
            return Err(CompletionError::HttpError {
                status_code,
                message: extract_error_message(&error_text),
            });
        }

        Ok(Box::pin(SSEParser::new(Box::pin(response.bytes_stream()))))
    }
}
