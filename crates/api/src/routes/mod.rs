pub mod chat;
pub mod common;
pub mod guest;
pub mod health;
pub mod share;
pub mod threads;
