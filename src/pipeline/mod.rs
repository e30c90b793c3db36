//! Pipeline message types and the conversation coordinator (C15).

pub mod coordinator;
pub mod messages;
