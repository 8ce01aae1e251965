use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::errors::GenerationError;
use super::models::*;
use super::tool_calls::ToolCallAccumulator;
use crate::completions::{
    CompletionDelta, CompletionRequest, CompletionTransport, ToolInvocation, TranscriptTurn,
};
use crate::conversations::ports::{
    ConversationId, ConversationRepository, GenerationSettings, HistoryStore, Message, MessageId,
    MessageRole, NewMessage, Owner,
};
use crate::id_prefixes::PREFIX_CALL;
use crate::rag::{ContextAugmentor, RetrievalSource};
use crate::tools::{ToolExecutor, ToolOutcome, WEB_SEARCH_SYSTEM_PROMPT};

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_MAX_TOKENS_WITH_TOOLS: u32 = 2048;
pub const MAX_TOOL_ROUNDS: usize = 3;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

const RAG_CONTEXT_PREAMBLE: &str = "Use the following excerpts from the user's uploaded documents when they are relevant. Refer to them as [Source N].";
const SEARCH_FOUND_STATUS: &str = "Found current information. Here's a comprehensive summary:\n\n";
const SEARCH_ISSUE_STATUS: &str =
    "\n\nThere was an issue with the web search. I'll answer based on my existing knowledge:\n\n";

fn searching_status(query: &str) -> String {
    format!("\n\nSearching for: \"{query}\"...\n\n")
}

fn search_failed_status(error: &str) -> String {
    format!("Search failed: {error}\n\nI'll answer based on my existing knowledge:\n\n")
}

/// Citation block appended after the answer, one line per source in the given order
pub fn format_sources_block(sources: &[RetrievalSource]) -> String {
    let mut block = String::from("\n\n**Sources:**\n");
    for (idx, source) in sources.iter().enumerate() {
        block.push_str(&format!(
            "{}. {} ({}% relevance)\n",
            idx + 1,
            source.filename,
            (source.score * 100.0).round() as i64
        ));
    }
    block
}

/// Everything the producer needs, resolved before streaming starts
struct PreparedGeneration {
    owner: Owner,
    conversation_id: ConversationId,
    model: String,
    settings: GenerationSettings,
    history: Vec<Message>,
    retry_target: Option<MessageId>,
    message_id: MessageId,
    web_search: bool,
    rag: bool,
}

/// Forwards fragments to the consumer and keeps the full text for persistence
struct FragmentSink {
    tx: mpsc::Sender<Result<GenerationEvent, GenerationError>>,
    accumulated: String,
    open: bool,
}

impl FragmentSink {
    fn new(tx: mpsc::Sender<Result<GenerationEvent, GenerationError>>) -> Self {
        Self {
            tx,
            accumulated: String::new(),
            open: true,
        }
    }

    async fn emit(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        self.accumulated.push_str(&text);
        if self.open && self.tx.send(Ok(GenerationEvent::Fragment(text))).await.is_err() {
            tracing::debug!("Generation consumer went away, finishing without it");
            self.open = false;
        }
    }

    fn consumer_gone(&self) -> bool {
        !self.open || self.tx.is_closed()
    }

    async fn finish(self, result: Result<GenerationEvent, GenerationError>) {
        if self.open {
            // The consumer may have left; nothing else to report to
            let _ = self.tx.send(result).await;
        }
    }
}

/// Drives one assistant turn: history assembly, optional retrieval, the
/// streaming/tool-call loop and the single persistence write.
#[derive(Clone)]
pub struct GenerationServiceImpl {
    conversations: Arc<dyn ConversationRepository>,
    history: Arc<dyn HistoryStore>,
    transport: Arc<dyn CompletionTransport>,
    tools: Option<ToolExecutor>,
    augmentor: ContextAugmentor,
    channel_capacity: usize,
}

impl GenerationServiceImpl {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        history: Arc<dyn HistoryStore>,
        transport: Arc<dyn CompletionTransport>,
    ) -> Self {
        Self {
            conversations,
            history,
            transport,
            tools: None,
            augmentor: ContextAugmentor::disabled(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_tools(mut self, tools: ToolExecutor) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_augmentor(mut self, augmentor: ContextAugmentor) -> Self {
        self.augmentor = augmentor;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Whether `enable_web_search` can actually reach a search provider
    pub fn web_search_available(&self) -> bool {
        self.tools.is_some()
    }

    pub fn document_retrieval_available(&self) -> bool {
        self.augmentor.is_enabled()
    }

    /// Check preconditions, assemble history and start the producer task.
    ///
    /// Precondition failures are returned here, before anything is streamed. For a
    /// new turn the user message is persisted before this returns.
    pub async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationStream, GenerationError> {
        let prepared = self.prepare(request).await?;
        let message_id = prepared.message_id;

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let service = self.clone();
        let producer = tokio::spawn(async move {
            service.produce(prepared, FragmentSink::new(tx)).await;
        });

        Ok(GenerationStream::new(message_id, rx, producer))
    }

    async fn prepare(
        &self,
        request: GenerationRequest,
    ) -> Result<PreparedGeneration, GenerationError> {
        let conversation = self
            .conversations
            .get_by_id(request.conversation_id)
            .await
            .map_err(|e| {
                GenerationError::HistoryUnavailable(format!("Failed to load conversation: {e}"))
            })?
            .ok_or(GenerationError::ConversationNotFound)?;

        if conversation.owner != request.owner {
            tracing::warn!(
                "Generation for conversation {} requested by non-owner {}",
                conversation.id,
                request.owner
            );
            return Err(GenerationError::OwnerMismatch);
        }

        let model = if request.model.trim().is_empty() {
            conversation.model.clone()
        } else {
            request.model.clone()
        };
        if model.trim().is_empty() {
            return Err(GenerationError::InvalidParams(
                "model must not be empty".to_string(),
            ));
        }
        let settings = conversation.settings.merged_with(&request.settings);
        settings.validate()?;

        let (history, retry_target, message_id) = match request.input {
            GenerationInput::NewTurn { text, attachments } => {
                if text.trim().is_empty() {
                    return Err(GenerationError::InvalidParams(
                        "message content must not be empty".to_string(),
                    ));
                }
                self.history
                    .append(NewMessage {
                        id: MessageId::new(),
                        conversation_id: conversation.id,
                        role: MessageRole::User,
                        content: text,
                        model: None,
                        attachments,
                    })
                    .await
                    .map_err(|e| {
                        GenerationError::PersistenceFailure(format!(
                            "Failed to store user message: {e}"
                        ))
                    })?;

                let history = self
                    .history
                    .list_ordered(conversation.id)
                    .await
                    .map_err(|e| GenerationError::HistoryUnavailable(e.to_string()))?;
                (history, None, MessageId::new())
            }
            GenerationInput::Retry { target } => {
                let history = self.retry_history(conversation.id, target).await?;
                (history, Some(target), target)
            }
        };

        let web_search = request.enable_web_search && self.tools.is_some();
        if request.enable_web_search && !web_search {
            tracing::debug!("Web search requested but no search provider is configured");
        }

        tracing::info!(
            "Starting generation for conversation {}: model={}, retry={}, web_search={}, rag={}",
            conversation.id,
            model,
            retry_target.is_some(),
            web_search,
            request.enable_rag
        );

        Ok(PreparedGeneration {
            owner: request.owner,
            conversation_id: conversation.id,
            model,
            settings,
            history,
            retry_target,
            message_id,
            web_search,
            rag: request.enable_rag,
        })
    }

    /// History strictly before the retry target. Only the latest message of the
    /// conversation may be retried, and only if the assistant wrote it.
    async fn retry_history(
        &self,
        conversation_id: ConversationId,
        target: MessageId,
    ) -> Result<Vec<Message>, GenerationError> {
        let message = self
            .history
            .find_by_id(target)
            .await
            .map_err(|e| GenerationError::HistoryUnavailable(e.to_string()))?
            .filter(|m| m.conversation_id == conversation_id)
            .ok_or_else(|| {
                GenerationError::InvalidRetryTarget(format!("message {target} not found"))
            })?;

        if message.role != MessageRole::Assistant {
            return Err(GenerationError::InvalidRetryTarget(format!(
                "message {target} was not written by the assistant"
            )));
        }

        let latest = self
            .history
            .find_latest(conversation_id)
            .await
            .map_err(|e| GenerationError::HistoryUnavailable(e.to_string()))?;
        if latest.map(|m| m.id) != Some(target) {
            return Err(GenerationError::InvalidRetryTarget(format!(
                "message {target} is not the latest message in the conversation"
            )));
        }

        self.history
            .list_before(conversation_id, target)
            .await
            .map_err(|e| GenerationError::HistoryUnavailable(e.to_string()))
    }

    fn build_transcript(prepared: &PreparedGeneration) -> Vec<TranscriptTurn> {
        let mut turns = Vec::with_capacity(prepared.history.len() + 2);
        if prepared.web_search {
            turns.push(TranscriptTurn::system(WEB_SEARCH_SYSTEM_PROMPT));
        }
        if let Some(prompt) = prepared
            .settings
            .system_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
        {
            turns.push(TranscriptTurn::system(prompt));
        }
        turns.extend(prepared.history.iter().map(|message| match message.role {
            MessageRole::User => TranscriptTurn::user(message.content.clone()),
            MessageRole::Assistant => TranscriptTurn::assistant(message.content.clone()),
        }));
        turns
    }

    /// Splice retrieved context in front of the last user turn. Failures are logged and ignored.
    async fn augment(
        &self,
        prepared: &PreparedGeneration,
        turns: &mut Vec<TranscriptTurn>,
    ) -> Vec<RetrievalSource> {
        if !prepared.rag || !self.augmentor.is_enabled() {
            return Vec::new();
        }
        let Some(user) = prepared.owner.user_id() else {
            tracing::debug!("Document retrieval skipped for guest session");
            return Vec::new();
        };
        let last_user = turns
            .iter()
            .enumerate()
            .rev()
            .find_map(|(idx, turn)| match turn {
                TranscriptTurn::User { content } => Some((idx, content.clone())),
                _ => None,
            });
        let Some((position, query)) = last_user else {
            return Vec::new();
        };

        match self.augmentor.augment(&query, user).await {
            Ok(augmentation) if !augmentation.is_empty() => {
                tracing::info!(
                    "Adding {} document excerpts to conversation {}",
                    augmentation.sources.len(),
                    prepared.conversation_id
                );
                turns.insert(
                    position,
                    TranscriptTurn::system(format!(
                        "{RAG_CONTEXT_PREAMBLE}\n\n{}",
                        augmentation.context_text
                    )),
                );
                augmentation.sources
            }
            Ok(_) => Vec::new(),
            Err(e) => {
                tracing::warn!(
                    "Document retrieval failed for conversation {}, continuing without context: {}",
                    prepared.conversation_id,
                    e
                );
                Vec::new()
            }
        }
    }

    async fn produce(&self, prepared: PreparedGeneration, mut sink: FragmentSink) {
        let mut turns = Self::build_transcript(&prepared);
        let sources = self.augment(&prepared, &mut turns).await;

        let tool_schemas = match (&self.tools, prepared.web_search) {
            (Some(tools), true) => tools.tool_schemas(),
            _ => Vec::new(),
        };
        let temperature = prepared.settings.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        let max_tokens = prepared.settings.max_tokens.unwrap_or(if tool_schemas.is_empty() {
            DEFAULT_MAX_TOKENS
        } else {
            DEFAULT_MAX_TOKENS_WITH_TOOLS
        });

        let mut offer_tools = !tool_schemas.is_empty();
        let mut executed: HashSet<(String, String)> = HashSet::new();
        let mut tool_rounds = 0;
        let mut model_output = false;

        'passes: loop {
            let request = CompletionRequest {
                model: prepared.model.clone(),
                turns: turns.clone(),
                temperature,
                max_tokens,
                tools: if offer_tools {
                    tool_schemas.clone()
                } else {
                    Vec::new()
                },
            };

            let mut stream = match self.transport.stream(request).await {
                Ok(stream) => stream,
                Err(e) if !model_output => {
                    tracing::error!(
                        "Completion failed for conversation {}: {}",
                        prepared.conversation_id,
                        e
                    );
                    sink.finish(Err(GenerationError::TransportFailure(e.to_string())))
                        .await;
                    return;
                }
                Err(e) => {
                    tracing::warn!("Completion pass failed after content was produced: {}", e);
                    break;
                }
            };

            let mut pass_content = String::new();
            let mut calls = ToolCallAccumulator::default();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(CompletionDelta::Content(text)) => {
                        model_output = true;
                        pass_content.push_str(&text);
                        sink.emit(text).await;
                        if sink.consumer_gone() {
                            break 'passes;
                        }
                    }
                    Ok(CompletionDelta::ToolCall(delta)) => calls.push(delta),
                    Err(e) if !model_output => {
                        tracing::error!(
                            "Completion stream failed for conversation {}: {}",
                            prepared.conversation_id,
                            e
                        );
                        sink.finish(Err(GenerationError::TransportFailure(e.to_string())))
                            .await;
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Completion stream for conversation {} ended early: {}",
                            prepared.conversation_id,
                            e
                        );
                        break 'passes;
                    }
                }
            }

            if !offer_tools || !pass_content.trim().is_empty() {
                break;
            }
            let Some(call) = calls.first_complete().cloned() else {
                break;
            };
            let Some(tools) = &self.tools else {
                break;
            };

            let prepared_call = match tools.prepare(&call.name, &call.arguments) {
                Ok(prepared_call) => prepared_call,
                Err(e) => {
                    tracing::warn!("Rejected tool call {}: {}", call.name, e);
                    sink.emit(SEARCH_ISSUE_STATUS).await;
                    offer_tools = false;
                    continue;
                }
            };

            let key = (
                prepared_call.name.clone(),
                prepared_call.canonical_arguments.clone(),
            );
            if executed.contains(&key) {
                tracing::warn!("Preventing duplicate {} call in the same turn", call.name);
                offer_tools = false;
                continue;
            }
            if tool_rounds >= MAX_TOOL_ROUNDS {
                tracing::warn!("Tool round limit reached, answering without tools");
                offer_tools = false;
                continue;
            }
            executed.insert(key);
            tool_rounds += 1;

            sink.emit(searching_status(&prepared_call.query)).await;
            match tools.run(&prepared_call).await {
                ToolOutcome::Success { result_text, .. } => {
                    let call_id = call
                        .id
                        .clone()
                        .unwrap_or_else(|| format!("{PREFIX_CALL}{}", Uuid::new_v4().simple()));
                    turns.push(TranscriptTurn::Assistant {
                        content: None,
                        tool_calls: vec![ToolInvocation {
                            id: call_id.clone(),
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        }],
                    });
                    turns.push(TranscriptTurn::Tool {
                        call_id,
                        content: result_text,
                    });
                    sink.emit(SEARCH_FOUND_STATUS).await;
                }
                ToolOutcome::Failure { error } => {
                    tracing::warn!("Tool {} failed: {}", call.name, error);
                    sink.emit(search_failed_status(&error)).await;
                    offer_tools = false;
                }
            }
            if sink.consumer_gone() {
                break;
            }
        }

        // Status fragments alone are not an answer
        if sink.consumer_gone() && !model_output {
            tracing::info!(
                "Generation for conversation {} abandoned before any model output, nothing to persist",
                prepared.conversation_id
            );
            return;
        }

        if !sources.is_empty() {
            sink.emit(format_sources_block(&sources)).await;
        }

        let result = self.persist(&prepared, sink.accumulated.clone()).await;
        sink.finish(result.map(|message_id| GenerationEvent::Completed { message_id }))
            .await;
    }

    /// The single write of a generation: overwrite on retry, insert otherwise
    async fn persist(
        &self,
        prepared: &PreparedGeneration,
        content: String,
    ) -> Result<MessageId, GenerationError> {
        let stored = match prepared.retry_target {
            Some(target) => self
                .history
                .overwrite(target, content, prepared.model.clone())
                .await
                .and_then(|updated| {
                    updated.ok_or_else(|| anyhow::anyhow!("retry target {target} disappeared"))
                }),
            None => {
                self.history
                    .append(NewMessage {
                        id: prepared.message_id,
                        conversation_id: prepared.conversation_id,
                        role: MessageRole::Assistant,
                        content,
                        model: Some(prepared.model.clone()),
                        attachments: Vec::new(),
                    })
                    .await
            }
        };

        match stored {
            Ok(message) => {
                tracing::info!(
                    "Persisted assistant message {} for conversation {}",
                    message.id,
                    prepared.conversation_id
                );
                Ok(message.id)
            }
            Err(e) => {
                tracing::error!(
                    "Failed to persist assistant message {} for conversation {}: {}",
                    prepared.message_id,
                    prepared.conversation_id,
                    e
                );
                Err(GenerationError::PersistenceFailure(e.to_string()))
            }
        }
    }
}
