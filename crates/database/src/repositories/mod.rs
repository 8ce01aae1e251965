pub mod conversation;
pub mod message;
pub mod retry;
pub mod utils;

pub use conversation::PgConversationRepository;
pub use message::PgMessageRepository;
