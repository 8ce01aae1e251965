//! ID prefix constants for resource identifiers.
//!
//! These prefixes are used to create human-readable IDs in API payloads.
//! Parsing accepts both the prefixed and the bare UUID form.

/// Prefix for conversation (thread) IDs
pub const PREFIX_THREAD: &str = "thread_";

/// Prefix for message IDs
pub const PREFIX_MSG: &str = "msg_";

/// Prefix for synthetic tool call IDs
pub const PREFIX_CALL: &str = "call_";

/// Prefix for share links
pub const PREFIX_SHARE: &str = "share_";
