pub mod errors;
pub mod models;
pub mod service;
pub mod tool_calls;


pub use errors::GenerationError;
pub use models::{GenerationEvent, GenerationInput, GenerationRequest, GenerationStream};
pub use service::{format_sources_block, GenerationServiceImpl};
