//! One-directional synchronization of a virtual tree against a storage
//! host.
//!
//! Local mutations accumulate in the change queue; `push` drains it and
//! replays each event as host operations. Status gates the state machine:
//! a push is only actionable from idle, and concurrent pushes on the same
//! tree are serialized by that gate rather than by a lock.

use crate::fs::event::{ChangeEvent, ChangeKind};
use crate::fs::queue::ChangeQueue;
use crate::fs::tree::{FileTree, NodeId};
use crate::ops::sdk::StorageHost;
use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Pulling,
    PullFailed,
    Pushing,
    PushFailed,
}

pub struct SyncedTree {
    tree: FileTree,
    queue: ChangeQueue,
    host: Arc<dyn StorageHost>,
    status: SyncStatus,
}

impl SyncedTree {
    /// Creates an empty synced tree whose root renders as the absolute
    /// root path of the host.
    pub fn new(host: Arc<dyn StorageHost>) -> Self {
        let mut tree = FileTree::new("");
        let root = tree.root();
        let queue = ChangeQueue::attach(&mut tree, root);
        Self {
            tree,
            queue,
            host,
            status: SyncStatus::Idle,
        }
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    pub fn tree(&self) -> &FileTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut FileTree {
        &mut self.tree
    }

    pub fn queue(&self) -> &ChangeQueue {
        &self.queue
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    /// Replays every queued change against the host, in causal order.
    ///
    /// Only actionable from [`SyncStatus::Idle`]; otherwise this does
    /// nothing. The first failing replay stops the drain, leaves the
    /// remaining events queued, and parks the status at
    /// [`SyncStatus::PushFailed`].
    pub async fn push(&mut self) -> Result<()> {
        if self.status != SyncStatus::Idle {
            return Ok(());
        }
        self.status = SyncStatus::Pushing;

        while let Some(event) = self.queue.pop() {
            if let Err(err) = self.replay(&event).await {
                self.status = SyncStatus::PushFailed;
                return Err(err);
            }
        }
        self.status = SyncStatus::Idle;
        Ok(())
    }

    /// Remote-to-local reconciliation. Unresolved: no merge policy or
    /// conflict handling has been settled, so this fails rather than
    /// guessing. The state machine keeps its slot for it.
    pub async fn pull(&mut self) -> Result<()> {
        Err(Error::protocol("pull synchronization is not implemented"))
    }

    async fn replay(&self, event: &ChangeEvent) -> Result<()> {
        match event.kind() {
            ChangeKind::Created { is_directory } => {
                debug!("pushing create of {}", event.path());
                if *is_directory {
                    self.host.make_directory(event.path()).await
                } else {
                    self.host.make_file(event.path()).await
                }
            }
            ChangeKind::Deleted { previous_path, .. } => {
                debug!("pushing delete of {previous_path}");
                self.host.delete(previous_path).await
            }
            ChangeKind::Moved { previous_path, .. } => {
                debug!("pushing move of {previous_path} to {}", event.path());
                self.host.rename(previous_path, event.path()).await
            }
            ChangeKind::Written { content } => {
                debug!("pushing write of {}", event.path());
                self.host.write_file(event.path(), content).await
            }
            ChangeKind::Touched => Ok(()),
        }
    }
}
