//! Storage backends for thinkloop.
//!
//! - [`LocalWorkspace`]: a directory on disk, optionally sandboxed
//! - [`InMemoryWorkspace`]: a map of files, for tests and dry runs
//! - [`FileStateStore`]: one JSON state file per agent, for resume
//! - [`InMemoryStateStore`]: state kept in memory, for tests

pub mod local;
pub mod memory;
pub mod path;
pub mod state_store;

pub use local::LocalWorkspace;
pub use memory::{InMemoryStateStore, InMemoryWorkspace};
pub use path::{PathValidationError, resolve_in_root};
pub use state_store::{FileStateStore, generate_agent_id};
