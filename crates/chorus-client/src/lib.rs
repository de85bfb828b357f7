#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod client;
pub mod conversation;

pub use client::{connect, EntryConnection};
pub use conversation::Conversation;
