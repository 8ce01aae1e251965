// API Middleware
//
// Request owner resolution and the per-thread generation guard.

pub mod inflight;
pub mod owner;

pub use inflight::{InFlightGenerations, InFlightGuard};
pub use owner::{owner_middleware, RequestOwner, GUEST_COOKIE, USER_ID_HEADER};
