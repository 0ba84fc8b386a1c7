//! Change events and their algebra.
//!
//! Events are immutable snapshots taken at dispatch time. Two causally
//! adjacent events on the same target can sometimes be combined into one
//! equivalent event, and any event can be re-expressed relative to an
//! arbitrary subtree boundary, so a single global event stream can be
//! reinterpreted for any watched root without re-walking the tree.

use crate::fs::tree::{FileTree, NodeId};
use crate::prelude::*;

/// Dispatch tag used for listener registration. [`EventTag::Any`] matches
/// every event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTag {
    Any,
    Touched,
    Moved,
    Created,
    Deleted,
    Written,
}

/// Variant payloads of a [`ChangeEvent`].
///
/// Structural mutations dispatch `Moved` (creation is a move out of
/// nowhere); `Created` and `Deleted` arise when a move is projected across
/// a subtree boundary that the target entered or left. `Touched` is the
/// payload-free notification a move degrades to when both endpoints are
/// outside the observed subtree.
#[derive(Debug, Clone)]
pub enum ChangeKind {
    Touched,
    Moved {
        name: String,
        parent: Option<NodeId>,
        previous_name: String,
        previous_parent: Option<NodeId>,
        previous_path: FilePath,
    },
    Created {
        is_directory: bool,
    },
    Deleted {
        previous_name: String,
        previous_parent: Option<NodeId>,
        previous_path: FilePath,
    },
    Written {
        content: String,
    },
}

impl ChangeKind {
    pub fn tag(&self) -> EventTag {
        match self {
            ChangeKind::Touched => EventTag::Touched,
            ChangeKind::Moved { .. } => EventTag::Moved,
            ChangeKind::Created { .. } => EventTag::Created,
            ChangeKind::Deleted { .. } => EventTag::Deleted,
            ChangeKind::Written { .. } => EventTag::Written,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChangeEvent {
    target: NodeId,
    path: FilePath,
    bubbles: bool,
    kind: ChangeKind,
}

impl ChangeEvent {
    pub(crate) fn touched(target: NodeId, path: FilePath) -> Self {
        Self {
            target,
            path,
            bubbles: true,
            kind: ChangeKind::Touched,
        }
    }

    pub(crate) fn moved(
        target: NodeId,
        path: FilePath,
        name: String,
        parent: Option<NodeId>,
        previous_name: String,
        previous_parent: Option<NodeId>,
        previous_path: FilePath,
    ) -> Self {
        Self {
            target,
            path,
            bubbles: true,
            kind: ChangeKind::Moved {
                name,
                parent,
                previous_name,
                previous_parent,
                previous_path,
            },
        }
    }

    pub(crate) fn created(target: NodeId, path: FilePath, is_directory: bool) -> Self {
        Self {
            target,
            path,
            bubbles: true,
            kind: ChangeKind::Created { is_directory },
        }
    }

    pub(crate) fn deleted(
        target: NodeId,
        previous_name: String,
        previous_parent: Option<NodeId>,
        previous_path: FilePath,
    ) -> Self {
        Self {
            target,
            path: previous_path.clone(),
            bubbles: true,
            kind: ChangeKind::Deleted {
                previous_name,
                previous_parent,
                previous_path,
            },
        }
    }

    pub(crate) fn written(target: NodeId, path: FilePath, content: String) -> Self {
        Self {
            target,
            path,
            bubbles: true,
            kind: ChangeKind::Written { content },
        }
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    /// Path of the target at dispatch time. For a delete this is the path
    /// the entry had before it disappeared.
    pub fn path(&self) -> &FilePath {
        &self.path
    }

    pub fn bubbles(&self) -> bool {
        self.bubbles
    }

    pub fn kind(&self) -> &ChangeKind {
        &self.kind
    }

    /// A move whose previous and current state coincide records nothing;
    /// such events only arise from combining a round trip and are filtered
    /// out by the queue.
    pub fn is_noop(&self) -> bool {
        match &self.kind {
            ChangeKind::Moved {
                name,
                parent,
                previous_name,
                previous_parent,
                ..
            } => name == previous_name && parent == previous_parent,
            _ => false,
        }
    }

    /// Merges `newer`, the event dispatched immediately after this one,
    /// into a single equivalent event, or returns `None` when the two
    /// cannot be combined.
    ///
    /// Touched and Written events combine with another event of the same
    /// kind on the same target by keeping the newer snapshot. Two moves of
    /// the same target combine only when they chain: the newer move must
    /// start from exactly the state this one ended in. Combining a chain
    /// that returns to its starting point yields a no-op move (see
    /// [`ChangeEvent::is_noop`]).
    pub fn combine(&self, newer: &ChangeEvent) -> Option<ChangeEvent> {
        if self.target != newer.target {
            return None;
        }
        match (&self.kind, &newer.kind) {
            (ChangeKind::Touched, ChangeKind::Touched)
            | (ChangeKind::Written { .. }, ChangeKind::Written { .. }) => Some(newer.clone()),
            (
                ChangeKind::Moved {
                    name,
                    parent,
                    previous_name,
                    previous_parent,
                    previous_path,
                },
                ChangeKind::Moved {
                    name: newer_name,
                    parent: newer_parent,
                    previous_name: newer_previous_name,
                    previous_parent: newer_previous_parent,
                    ..
                },
            ) if parent == newer_previous_parent && name == newer_previous_name => {
                Some(ChangeEvent::moved(
                    newer.target,
                    newer.path.clone(),
                    newer_name.clone(),
                    *newer_parent,
                    previous_name.clone(),
                    *previous_parent,
                    previous_path.clone(),
                ))
            }
            _ => None,
        }
    }

    /// Re-expresses this event as seen from the subtree rooted at `root`.
    ///
    /// A move whose endpoints are both inside the subtree passes through
    /// unchanged. Entering the subtree becomes a synthetic create, leaving
    /// it a synthetic delete. When both endpoints are outside, the event
    /// degrades to a payload-free notification, unless the boundary node
    /// itself was renamed, in which case the move is preserved.
    pub fn relative_to(&self, tree: &FileTree, root: NodeId) -> ChangeEvent {
        let ChangeKind::Moved {
            name,
            previous_name,
            previous_parent,
            previous_path,
            ..
        } = &self.kind
        else {
            return self.clone();
        };

        let previously_contained = previous_parent
            .is_some_and(|parent| parent == root || tree.contains(root, parent));

        if tree.contains(root, self.target) {
            if previously_contained {
                self.clone()
            } else {
                ChangeEvent::created(
                    self.target,
                    self.path.clone(),
                    tree.is_directory(self.target),
                )
            }
        } else if previously_contained {
            ChangeEvent::deleted(
                self.target,
                previous_name.clone(),
                *previous_parent,
                previous_path.clone(),
            )
        } else if self.target == root && name != previous_name {
            self.clone()
        } else {
            ChangeEvent::touched(self.target, self.path.clone())
        }
    }
}
