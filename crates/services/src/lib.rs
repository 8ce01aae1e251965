pub mod common;
pub mod completions;
pub mod conversations;
pub mod generation;
pub mod id_prefixes;
pub mod rag;
pub mod tools;

#[cfg(any(test, feature = "test-mocks"))]
pub mod testing;

pub use completions::ProviderCompletionTransport;
pub use conversations::models::{GuestSessionId, Owner, UserId};
pub use conversations::service::ConversationServiceImpl as ConversationService;
pub use generation::service::GenerationServiceImpl as GenerationService;
pub use rag::ContextAugmentor;
pub use tools::ToolExecutor;
