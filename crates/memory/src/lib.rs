//! Memory provider implementations for conduit.

pub mod file_backend;
pub mod in_memory;
pub mod store;

pub use file_backend::FileBackend;
pub use in_memory::InMemoryBackend;
pub use store::ConversationStore;
