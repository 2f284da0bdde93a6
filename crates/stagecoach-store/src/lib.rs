//! Persistence traits for the Stagecoach pipeline and an in-memory
//! reference implementation.
//!
//! The orchestrator only ever talks to the four traits defined in
//! [`store`]; [`MemoryStore`] implements all of them behind one shared
//! handle and backs the CLI and the test suites. A database-backed store
//! plugs in by implementing the same traits.

/// The default agent roster, one to four agents per stage.
pub mod catalog;
/// In-memory implementation of all four store traits.
pub mod memory;
/// Store trait definitions and aggregate types.
pub mod store;

pub use catalog::default_agents;
pub use memory::MemoryStore;
pub use store::{AgentStore, ExecutionStats, ExecutionStore, ProjectStore, TaskStore};
