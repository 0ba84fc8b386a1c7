//! Uniform POSIX-like file operations over heterogeneous remote storage
//! backends, plus an in-memory virtual file tree whose mutations are
//! recorded as change events and compacted into a minimal replay log for
//! one-directional synchronization.

pub mod base;
pub mod execution;
pub mod fs;
pub mod ops;
mod prelude;
pub mod settings;

// Flat re-exports forming the public API surface.
pub use base::error::{Error, Result};
pub use base::path::{FilePath, PathSyntax};
pub use execution::synced_tree::{SyncStatus, SyncedTree};
pub use fs::event::{ChangeEvent, ChangeKind, EventTag};
pub use fs::queue::ChangeQueue;
pub use fs::tree::{FileTree, NodeId};
pub use ops::auth::{AccessTokenProvider, StaticAccessToken};
pub use ops::hosts::drive::{DriveHost, DriveHostOptions};
pub use ops::hosts::memory::MemoryHost;
pub use ops::hosts::paste::PasteHost;
pub use ops::sdk::StorageHost;
