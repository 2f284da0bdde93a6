//! Agent execution for stagecoach: the completion backend boundary and
//! the executor that records every call against the store.

pub mod backend;
pub mod executor;
pub mod ollama;

pub use backend::{Completion, CompletionBackend, CompletionRequest};
pub use executor::AgentExecutor;
pub use ollama::OllamaBackend;
