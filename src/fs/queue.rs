//! Eagerly-compacted FIFO log of change events.
//!
//! The queue subscribes to a tree node and records every event that
//! bubbles through it, first re-expressing the event relative to that
//! node, then trying to merge it with the most recently queued event.
//! Combination is always attempted on insert, so adjacent entries are
//! never combinable and bursts of rapid mutations compact in O(1)
//! amortized time.
//!
//! Entries live in a slot arena linked by explicit `prev`/`next` indices
//! with a free list for reuse.

use crate::fs::event::{ChangeEvent, EventTag};
use crate::fs::tree::{FileTree, NodeId};
use crate::prelude::*;

struct Entry {
    event: ChangeEvent,
    prev: Option<usize>,
    next: Option<usize>,
}

struct QueueInner {
    root: NodeId,
    slots: Vec<Option<Entry>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl QueueInner {
    fn push(&mut self, tree: &FileTree, event: &ChangeEvent) {
        let relative = event.relative_to(tree, self.root);

        if let Some(tail) = self.tail {
            let combined = self.slots[tail]
                .as_ref()
                .and_then(|entry| entry.event.combine(&relative));
            if let Some(combined) = combined {
                if combined.is_noop() {
                    self.unlink(tail);
                } else if let Some(entry) = self.slots[tail].as_mut() {
                    entry.event = combined;
                }
                return;
            }
        }

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        self.slots[index] = Some(Entry {
            event: relative,
            prev: self.tail,
            next: None,
        });
        if let Some(tail) = self.tail {
            if let Some(entry) = self.slots[tail].as_mut() {
                entry.next = Some(index);
            }
        }
        self.tail = Some(index);
        self.head = self.head.or(Some(index));
    }

    fn unlink(&mut self, index: usize) -> Option<ChangeEvent> {
        let entry = self.slots[index].take()?;
        match entry.prev {
            Some(prev) => {
                if let Some(slot) = self.slots[prev].as_mut() {
                    slot.next = entry.next;
                }
            }
            None => self.head = entry.next,
        }
        match entry.next {
            Some(next) => {
                if let Some(slot) = self.slots[next].as_mut() {
                    slot.prev = entry.prev;
                }
            }
            None => self.tail = entry.prev,
        }
        self.free.push(index);
        Some(entry.event)
    }

    fn pop(&mut self) -> Option<ChangeEvent> {
        self.unlink(self.head?)
    }

    fn peek(&self, index: usize) -> Option<&ChangeEvent> {
        let mut current = self.head;
        for _ in 0..index {
            current = self.slots[current?].as_ref()?.next;
        }
        self.slots[current?].as_ref().map(|entry| &entry.event)
    }

    fn len(&self) -> usize {
        let mut count = 0;
        let mut current = self.head;
        while let Some(index) = current {
            count += 1;
            current = self.slots[index].as_ref().and_then(|entry| entry.next);
        }
        count
    }
}

/// A change queue attached to a tree node, recording events in causal
/// (insertion) order.
pub struct ChangeQueue {
    inner: Arc<Mutex<QueueInner>>,
}

impl ChangeQueue {
    /// Subscribes a new queue to every event bubbling through `root`.
    pub fn attach(tree: &mut FileTree, root: NodeId) -> Self {
        let inner = Arc::new(Mutex::new(QueueInner {
            root,
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
        }));
        let sink = inner.clone();
        tree.add_listener(
            root,
            EventTag::Any,
            Box::new(move |tree, event| {
                sink.lock().unwrap().push(tree, event);
                Ok(())
            }),
        );
        Self { inner }
    }

    /// Removes and returns the oldest queued event.
    pub fn pop(&self) -> Option<ChangeEvent> {
        self.inner.lock().unwrap().pop()
    }

    /// The event at FIFO position `index` without removing it.
    pub fn peek(&self, index: usize) -> Option<ChangeEvent> {
        self.inner.lock().unwrap().peek(index).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().head.is_none()
    }

    /// Number of queued events, by list traversal.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// Drains the queue, returning the events in FIFO order.
    pub fn clear(&self) -> Vec<ChangeEvent> {
        let mut inner = self.inner.lock().unwrap();
        let mut drained = Vec::new();
        while let Some(event) = inner.pop() {
            drained.push(event);
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::event::ChangeKind;

    #[test]
    fn new_queue_is_empty() {
        let mut tree = FileTree::new("root");
        let root = tree.root();
        let queue = ChangeQueue::attach(&mut tree, root);

        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn renaming_the_root_enqueues_a_move() {
        let mut tree = FileTree::new("root_before");
        let root = tree.root();
        let queue = ChangeQueue::attach(&mut tree, root);

        tree.rename(tree.root(), "root_after", false).unwrap();

        assert!(!queue.is_empty());
        let event = queue.pop().unwrap();
        assert!(matches!(event.kind(), ChangeKind::Moved { .. }));
        assert!(queue.is_empty());
    }

    #[test]
    fn creating_a_descendant_enqueues_a_create() {
        let mut tree = FileTree::new("root");
        let root = tree.root();
        let queue = ChangeQueue::attach(&mut tree, root);

        tree.create_directory(root, "child", false).unwrap();

        let event = queue.pop().unwrap();
        match event.kind() {
            ChangeKind::Created { is_directory } => assert!(*is_directory),
            other => panic!("expected a create, got {other:?}"),
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn renaming_a_descendant_enqueues_a_move() {
        let mut tree = FileTree::new("root");
        let root = tree.root();
        let child = tree.create_directory(root, "before", false).unwrap();
        let queue = ChangeQueue::attach(&mut tree, root);

        tree.rename(child, "after", false).unwrap();

        assert!(matches!(
            queue.pop().unwrap().kind(),
            ChangeKind::Moved { .. }
        ));
        assert!(queue.is_empty());
    }

    #[test]
    fn moving_a_descendant_between_parents_enqueues_one_move() {
        let mut tree = FileTree::new("root");
        let root = tree.root();
        let first = tree.create_directory(root, "first", false).unwrap();
        let second = tree.create_directory(root, "second", false).unwrap();
        let child = tree.create_directory(first, "child", false).unwrap();
        let queue = ChangeQueue::attach(&mut tree, root);

        tree.move_to(child, Some(second), "child", false).unwrap();

        assert!(matches!(
            queue.pop().unwrap().kind(),
            ChangeKind::Moved { .. }
        ));
        assert!(queue.is_empty());
    }

    #[test]
    fn removing_a_descendant_enqueues_a_delete() {
        let mut tree = FileTree::new("root");
        let root = tree.root();
        let parent = tree.create_directory(root, "parent", false).unwrap();
        let child = tree.create_directory(parent, "child", false).unwrap();
        let queue = ChangeQueue::attach(&mut tree, root);

        tree.remove(child).unwrap();

        let event = queue.pop().unwrap();
        match event.kind() {
            ChangeKind::Deleted { previous_path, .. } => {
                assert_eq!(*previous_path, "root/parent/child");
            }
            other => panic!("expected a delete, got {other:?}"),
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn two_renames_collapse_into_one_queued_move() {
        let mut tree = FileTree::new("root");
        let root = tree.root();
        let child = tree.create_directory(root, "original", false).unwrap();
        let queue = ChangeQueue::attach(&mut tree, root);

        tree.rename(child, "intermediate", false).unwrap();
        tree.rename(child, "final", false).unwrap();

        assert_eq!(queue.len(), 1);
        let event = queue.pop().unwrap();
        match event.kind() {
            ChangeKind::Moved {
                name,
                previous_name,
                ..
            } => {
                assert_eq!(name, "final");
                assert_eq!(previous_name, "original");
            }
            other => panic!("expected a move, got {other:?}"),
        }
    }

    #[test]
    fn a_rename_round_trip_leaves_the_queue_empty() {
        let mut tree = FileTree::new("root");
        let root = tree.root();
        let child = tree.create_directory(root, "name", false).unwrap();
        let queue = ChangeQueue::attach(&mut tree, root);

        tree.rename(child, "other", false).unwrap();
        tree.rename(child, "name", false).unwrap();

        assert!(queue.is_empty());
    }

    #[test]
    fn events_on_siblings_stay_in_push_order() {
        let mut tree = FileTree::new("root");
        let root = tree.root();
        let first = tree.create_directory(root, "before1", false).unwrap();
        let second = tree.create_directory(root, "before2", false).unwrap();
        let queue = ChangeQueue::attach(&mut tree, root);

        tree.rename(first, "after1", false).unwrap();
        tree.rename(second, "after2", false).unwrap();

        assert_eq!(queue.pop().unwrap().target(), first);
        assert_eq!(queue.pop().unwrap().target(), second);
        assert!(queue.is_empty());
    }

    #[test]
    fn peek_reads_fifo_positions_without_removing() {
        let mut tree = FileTree::new("root");
        let root = tree.root();
        let first = tree.create_directory(root, "a", false).unwrap();
        let second = tree.create_directory(root, "b", false).unwrap();
        let queue = ChangeQueue::attach(&mut tree, root);

        tree.rename(first, "a2", false).unwrap();
        tree.rename(second, "b2", false).unwrap();

        assert_eq!(queue.peek(0).unwrap().target(), first);
        assert_eq!(queue.peek(1).unwrap().target(), second);
        assert!(queue.peek(2).is_none());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn clear_drains_in_order() {
        let mut tree = FileTree::new("root");
        let root = tree.root();
        let first = tree.create_directory(root, "a", false).unwrap();
        let second = tree.create_directory(root, "b", false).unwrap();
        let queue = ChangeQueue::attach(&mut tree, root);

        tree.rename(first, "a2", false).unwrap();
        tree.rename(second, "b2", false).unwrap();

        let drained = queue.clear();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].target(), first);
        assert!(queue.is_empty());
    }

    #[test]
    fn entry_slots_are_reused_after_draining() {
        let mut tree = FileTree::new("root");
        let root = tree.root();
        let child = tree.create_directory(root, "a", false).unwrap();
        let queue = ChangeQueue::attach(&mut tree, root);

        for cycle in 0..4 {
            tree.rename(child, &format!("name{cycle}"), false).unwrap();
            queue.pop().unwrap();
        }

        assert!(queue.inner.lock().unwrap().slots.len() <= 2);
    }
}
