//! Model Context Protocol surface: the chat layer's view of the index.

pub mod server;
pub mod tools;
