//! In-memory virtual file tree.
//!
//! Nodes live in an arena and are addressed by stable [`NodeId`] handles.
//! A directory owns the mapping from child name to child id; the child
//! keeps a non-owning id back-reference to its parent. Every structural
//! mutation dispatches a [`ChangeEvent`] that bubbles from the affected
//! node up its ancestor chain, and directories keep their child maps
//! consistent by reacting to the same event stream that external
//! listeners observe.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::fs::event::{ChangeEvent, ChangeKind, EventTag};
use crate::prelude::*;

/// Stable handle of a node in a [`FileTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Identifies a registered listener so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

/// Callback invoked for every event delivered to the node it is registered
/// on. A failing listener is logged and does not interrupt delivery to the
/// remaining listeners or to ancestors.
pub type Listener = Box<dyn FnMut(&FileTree, &ChangeEvent) -> Result<()> + Send>;

enum NodeKind {
    File { content: String },
    Directory { children: IndexMap<String, NodeId> },
}

struct NodeSlot {
    name: String,
    parent: Option<NodeId>,
    kind: NodeKind,
    listeners: HashMap<EventTag, Vec<(ListenerId, Listener)>>,
}

pub struct FileTree {
    slots: Vec<NodeSlot>,
    next_listener_id: u64,
}

impl FileTree {
    /// Creates a tree holding a single root directory. An empty root name
    /// makes node paths render as absolute paths.
    pub fn new(root_name: &str) -> Self {
        Self {
            slots: vec![NodeSlot {
                name: root_name.to_string(),
                parent: None,
                kind: NodeKind::Directory {
                    children: IndexMap::new(),
                },
                listeners: HashMap::new(),
            }],
            next_listener_id: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn name(&self, node: NodeId) -> &str {
        &self.slots[node.0].name
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.slots[node.0].parent
    }

    pub fn is_directory(&self, node: NodeId) -> bool {
        matches!(self.slots[node.0].kind, NodeKind::Directory { .. })
    }

    /// Path derived by walking ancestor links, leaf to root.
    pub fn path(&self, node: NodeId) -> FilePath {
        let mut names = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            let slot = &self.slots[id.0];
            names.push(slot.name.as_str());
            current = slot.parent;
        }
        names.reverse();

        if names.first().is_some_and(|name| name.is_empty()) {
            FilePath::parse(&format!("/{}", names[1..].join("/")))
        } else {
            FilePath::parse(&names.join("/"))
        }
    }

    /// True when `node` is a strict descendant of `ancestor`.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.slots[node.0].parent;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.slots[id.0].parent;
        }
        false
    }

    /// Child of a directory by name.
    pub fn get(&self, dir: NodeId, name: &str) -> Result<Option<NodeId>> {
        match &self.slots[dir.0].kind {
            NodeKind::Directory { children } => Ok(children.get(name).copied()),
            NodeKind::File { .. } => Err(Error::NotADirectory(self.path(dir))),
        }
    }

    /// Child names of a directory. Unsorted at this layer; storage hosts
    /// sort listings at read time.
    pub fn list(&self, dir: NodeId) -> Result<Vec<String>> {
        match &self.slots[dir.0].kind {
            NodeKind::Directory { children } => Ok(children.keys().cloned().collect()),
            NodeKind::File { .. } => Err(Error::NotADirectory(self.path(dir))),
        }
    }

    /// Content of a file node.
    pub fn read(&self, node: NodeId) -> Result<&str> {
        match &self.slots[node.0].kind {
            NodeKind::File { content } => Ok(content),
            NodeKind::Directory { .. } => Err(Error::NotAFile(self.path(node))),
        }
    }

    pub fn create_directory(&mut self, parent: NodeId, name: &str, force: bool) -> Result<NodeId> {
        self.create_node(
            parent,
            name,
            NodeKind::Directory {
                children: IndexMap::new(),
            },
            force,
        )
    }

    /// Creates a file and writes its initial content, dispatching the
    /// creation move event followed by a write event.
    pub fn create_file(
        &mut self,
        parent: NodeId,
        name: &str,
        content: &str,
        force: bool,
    ) -> Result<NodeId> {
        let node = self.create_node(
            parent,
            name,
            NodeKind::File {
                content: String::new(),
            },
            force,
        )?;
        self.write(node, content)?;
        Ok(node)
    }

    /// Moves a node to a new parent and name.
    ///
    /// No-op if neither changes. Fails with [`Error::Cycle`] when the
    /// destination is the node itself or one of its descendants. A name
    /// collision in the destination fails with [`Error::AlreadyExists`]
    /// unless `force` is set, in which case the colliding node is removed
    /// first (dispatching its own event chain). The move event is delivered
    /// to the old parent chain before the node's own chain.
    pub fn move_to(
        &mut self,
        node: NodeId,
        new_parent: Option<NodeId>,
        new_name: &str,
        force: bool,
    ) -> Result<()> {
        let current_parent = self.slots[node.0].parent;
        if current_parent == new_parent && self.slots[node.0].name == new_name {
            return Ok(());
        }

        if let Some(parent) = new_parent {
            if !self.is_directory(parent) {
                return Err(Error::NotADirectory(self.path(parent)));
            }
            if parent == node || self.contains(node, parent) {
                return Err(Error::Cycle {
                    path: self.path(node),
                    destination: self.path(parent),
                });
            }
            if let Some(existing) = self.get(parent, new_name)? {
                if force {
                    self.remove(existing)?;
                } else {
                    return Err(Error::AlreadyExists {
                        path: self.path(node),
                        name: new_name.to_string(),
                    });
                }
            }
        }

        let previous_path = self.path(node);
        let previous_name = {
            let slot = &mut self.slots[node.0];
            let previous = std::mem::replace(&mut slot.name, new_name.to_string());
            slot.parent = new_parent;
            previous
        };

        let event = ChangeEvent::moved(
            node,
            self.path(node),
            new_name.to_string(),
            new_parent,
            previous_name,
            current_parent,
            previous_path,
        );
        let mut visited = Vec::new();
        if let Some(parent) = current_parent {
            self.dispatch_chain(parent, &event, &mut visited);
        }
        self.dispatch_chain(node, &event, &mut visited);
        Ok(())
    }

    pub fn rename(&mut self, node: NodeId, name: &str, force: bool) -> Result<()> {
        self.move_to(node, self.slots[node.0].parent, name, force)
    }

    /// Detaches a node from its parent. The subtree stays in the arena but
    /// is no longer reachable from the root.
    pub fn remove(&mut self, node: NodeId) -> Result<()> {
        let name = self.slots[node.0].name.clone();
        self.move_to(node, None, &name, false)
    }

    /// Replaces a file's content and dispatches a write event carrying a
    /// snapshot of the new content.
    pub fn write(&mut self, node: NodeId, content: &str) -> Result<()> {
        let path = self.path(node);
        match &mut self.slots[node.0].kind {
            NodeKind::File { content: current } => {
                current.clear();
                current.push_str(content);
            }
            NodeKind::Directory { .. } => return Err(Error::NotAFile(path)),
        }
        let event = ChangeEvent::written(node, path, content.to_string());
        self.dispatch_chain(node, &event, &mut Vec::new());
        Ok(())
    }

    /// Registers a listener for events of `tag` delivered to `node`.
    /// [`EventTag::Any`] receives every event regardless of kind.
    pub fn add_listener(&mut self, node: NodeId, tag: EventTag, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.slots[node.0]
            .listeners
            .entry(tag)
            .or_default()
            .push((id, listener));
        id
    }

    pub fn remove_listener(&mut self, node: NodeId, tag: EventTag, id: ListenerId) -> bool {
        let Some(listeners) = self.slots[node.0].listeners.get_mut(&tag) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    fn create_node(
        &mut self,
        parent: NodeId,
        name: &str,
        kind: NodeKind,
        force: bool,
    ) -> Result<NodeId> {
        let node = NodeId(self.slots.len());
        self.slots.push(NodeSlot {
            name: name.to_string(),
            parent: None,
            kind,
            listeners: HashMap::new(),
        });
        match self.move_to(node, Some(parent), name, force) {
            Ok(()) => Ok(node),
            Err(err) => {
                self.slots.pop();
                Err(err)
            }
        }
    }

    /// Delivers an event to `start` and bubbles it up the ancestor chain.
    /// Chains that converge on an already-visited node stop there, so a
    /// common ancestor of the old and new location sees a move exactly once.
    fn dispatch_chain(&mut self, start: NodeId, event: &ChangeEvent, visited: &mut Vec<NodeId>) {
        let mut current = Some(start);
        while let Some(node) = current {
            if visited.contains(&node) {
                break;
            }
            visited.push(node);
            self.deliver(node, event);
            if !event.bubbles() {
                break;
            }
            current = self.slots[node.0].parent;
        }
    }

    fn deliver(&mut self, node: NodeId, event: &ChangeEvent) {
        self.repair_child_map(node, event);

        for tag in [event.kind().tag(), EventTag::Any] {
            let Some(mut listeners) = self.slots[node.0].listeners.remove(&tag) else {
                continue;
            };
            for (_, listener) in listeners.iter_mut() {
                if let Err(err) = listener(self, event) {
                    error!(
                        "listener on {} failed handling a {:?} event: {err}",
                        self.path(node),
                        tag
                    );
                }
            }
            self.slots[node.0].listeners.insert(tag, listeners);
        }
    }

    /// Structural self-maintenance: a directory on the bubble path drops a
    /// child key that no longer points back at it and keys the moved node
    /// under its new name when it arrived here.
    fn repair_child_map(&mut self, node: NodeId, event: &ChangeEvent) {
        let ChangeKind::Moved {
            previous_name,
            previous_parent,
            ..
        } = event.kind()
        else {
            return;
        };

        let mut remove_stale_key = false;
        if *previous_parent == Some(node) {
            if let NodeKind::Directory { children } = &self.slots[node.0].kind {
                if let Some(&previous_child) = children.get(previous_name.as_str()) {
                    let slot = &self.slots[previous_child.0];
                    remove_stale_key =
                        slot.parent != Some(node) || slot.name != *previous_name;
                }
            }
        }

        let target = event.target();
        let arrived = (self.slots[target.0].parent == Some(node))
            .then(|| self.slots[target.0].name.clone());

        if let NodeKind::Directory { children } = &mut self.slots[node.0].kind {
            if remove_stale_key {
                children.swap_remove(previous_name.as_str());
            }
            if let Some(name) = arrived {
                children.insert(name, target);
            }
        }
    }
}
