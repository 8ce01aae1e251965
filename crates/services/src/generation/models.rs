use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::errors::GenerationError;
use crate::conversations::models::{
    AttachmentRef, ConversationId, GenerationSettings, MessageId, Owner,
};

/// What the generation answers
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationInput {
    /// Persist a new user turn and answer it
    NewTurn {
        text: String,
        attachments: Vec<AttachmentRef>,
    },
    /// Regenerate an existing assistant message in place
    Retry { target: MessageId },
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub conversation_id: ConversationId,
    pub owner: Owner,
    pub input: GenerationInput,
    /// Empty falls back to the conversation's model
    pub model: String,
    /// Overrides on top of the conversation's stored settings
    pub settings: GenerationSettings,
    pub enable_web_search: bool,
    pub enable_rag: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    Fragment(String),
    /// Terminal event after the assistant message was persisted
    Completed { message_id: MessageId },
}

/// Receiving end of one generation.
///
/// Yields fragments in order, then exactly one terminal item: `Completed` or an error.
/// Dropping it stops generation early; whatever was already produced is still persisted.
pub struct GenerationStream {
    message_id: MessageId,
    receiver: mpsc::Receiver<Result<GenerationEvent, GenerationError>>,
    producer: Option<JoinHandle<()>>,
}

impl GenerationStream {
    pub(crate) fn new(
        message_id: MessageId,
        receiver: mpsc::Receiver<Result<GenerationEvent, GenerationError>>,
        producer: JoinHandle<()>,
    ) -> Self {
        Self {
            message_id,
            receiver,
            producer: Some(producer),
        }
    }

    /// Id the assistant message is (or will be) stored under
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// Handle that resolves once the producer has finished, persistence included
    pub fn take_producer_handle(&mut self) -> Option<JoinHandle<()>> {
        self.producer.take()
    }
}

impl Stream for GenerationStream {
    type Item = Result<GenerationEvent, GenerationError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
