// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Write-buffered, read-through MVCC overlay (C3).
//!
//! An [`Overlay`] owns anything implementing [`OverlaySource`] — either a
//! real [`crate::storage::Storage`] backend or another `Overlay` — and sits
//! between the engine and it. Reads consult the overlay's own buffers first
//! and fall through to the source on a miss; writes/creates/deletes only
//! ever touch the buffers until [`Overlay::commit`] flushes them. Because
//! the source is itself anything implementing [`OverlaySource`], nesting
//! one overlay inside another (a transaction scope inside a root scope)
//! falls out for free: build an `Overlay<K, V, D, Overlay<K, V, D, S>>`,
//! work the nested scope, then [`Overlay::into_source`] to recover the
//! outer overlay once the nested scope's own commit has flushed into it —
//! the outer scope's later commit is what finally reaches the backend.

use crate::error::IxResult;
use crate::metrics::MetricsCollector;
use crate::node::{Head, Node, NodeId};
use crate::storage::Storage;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

/// Anything an [`Overlay`] can read through to and flush into: either a
/// real storage backend or another `Overlay`.
pub trait OverlaySource<K, V, D> {
    fn read(&self, id: &NodeId) -> IxResult<Option<Node<K, V>>>;
    fn write(&self, id: &NodeId, node: &Node<K, V>) -> IxResult<()>;
    fn delete(&self, id: &NodeId) -> IxResult<()>;
    fn id(&self, leaf: bool) -> IxResult<NodeId>;
    fn read_head(&self) -> IxResult<Option<Head<D>>>;
    fn write_head(&self, head: &Head<D>) -> IxResult<()>;
    fn auto_increment(&self, counter: &str, step: u64) -> IxResult<u64>;
}

impl<K, V, D, S> OverlaySource<K, V, D> for S
where
    S: Storage<K, V, D>,
{
    fn read(&self, id: &NodeId) -> IxResult<Option<Node<K, V>>> {
        Storage::read(self, id)
    }
    fn write(&self, id: &NodeId, node: &Node<K, V>) -> IxResult<()> {
        Storage::write(self, id, node)
    }
    fn delete(&self, id: &NodeId) -> IxResult<()> {
        Storage::delete(self, id)
    }
    fn id(&self, leaf: bool) -> IxResult<NodeId> {
        Storage::id(self, leaf)
    }
    fn read_head(&self) -> IxResult<Option<Head<D>>> {
        Storage::read_head(self)
    }
    fn write_head(&self, head: &Head<D>) -> IxResult<()> {
        Storage::write_head(self, head)
    }
    fn auto_increment(&self, counter: &str, step: u64) -> IxResult<u64> {
        Storage::auto_increment(self, counter, step)
    }
}

/// Per-id effect lists returned by [`Overlay::commit`] / [`Overlay::rollback`].
#[derive(Debug, Clone, Default)]
pub struct CommitReport {
    pub label: Option<String>,
    pub created: Vec<NodeId>,
    pub updated: Vec<NodeId>,
    pub deleted: Vec<NodeId>,
}

impl CommitReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// A write-buffered overlay owning `Src`.
pub struct Overlay<K, V, D, Src> {
    source: Src,
    created: RefCell<HashMap<NodeId, Node<K, V>>>,
    updated: RefCell<HashMap<NodeId, Node<K, V>>>,
    deleted: RefCell<HashSet<NodeId>>,
    head: RefCell<Option<Head<D>>>,
}

impl<K, V, D, Src> Overlay<K, V, D, Src>
where
    K: Clone,
    V: Clone,
    D: Clone,
    Src: OverlaySource<K, V, D>,
{
    pub fn new(source: Src) -> Self {
        Self {
            source,
            created: RefCell::new(HashMap::new()),
            updated: RefCell::new(HashMap::new()),
            deleted: RefCell::new(HashSet::new()),
            head: RefCell::new(None),
        }
    }

    /// Borrows the wrapped source, e.g. to inspect a backend directly in
    /// tests or to read through a not-yet-committed nesting level.
    pub fn source(&self) -> &Src {
        &self.source
    }

    /// Unwraps the overlay, discarding any uncommitted buffers and
    /// returning the source. Used to recover an outer overlay after a
    /// nested transaction scope has committed or rolled back into it.
    pub fn into_source(self) -> Src {
        self.source
    }

    /// Serves from the write buffers if present, else delegates to `Src`.
    pub fn read(&self, id: &NodeId) -> IxResult<Option<Node<K, V>>> {
        if self.deleted.borrow().contains(id) {
            return Ok(None);
        }
        if let Some(node) = self.created.borrow().get(id) {
            MetricsCollector::global().record_cache_hit();
            return Ok(Some(node.clone()));
        }
        if let Some(node) = self.updated.borrow().get(id) {
            MetricsCollector::global().record_cache_hit();
            return Ok(Some(node.clone()));
        }
        MetricsCollector::global().record_node_read();
        self.source.read(id)
    }

    /// Buffers a brand-new node. If `id` was previously deleted within this
    /// overlay (uncommitted), the delete is cancelled.
    pub fn create(&self, id: NodeId, node: Node<K, V>) {
        self.deleted.borrow_mut().remove(&id);
        self.created.borrow_mut().insert(id, node);
    }

    /// Buffers an update to an existing node.
    pub fn write(&self, id: NodeId, node: Node<K, V>) {
        if self.created.borrow_mut().contains_key(&id) {
            self.created.borrow_mut().insert(id, node);
        } else {
            self.updated.borrow_mut().insert(id, node);
        }
    }

    /// Buffers a delete. A delete of an as-yet-uncommitted `created` entry
    /// simply cancels the create rather than round-tripping through the
    /// source.
    pub fn delete(&self, id: NodeId) {
        if self.created.borrow_mut().remove(&id).is_some() {
            return;
        }
        self.updated.borrow_mut().remove(&id);
        self.deleted.borrow_mut().insert(id);
    }

    /// Honors the buffered view of existence.
    pub fn exists(&self, id: &NodeId) -> IxResult<bool> {
        Ok(self.read(id)?.is_some())
    }

    pub fn id(&self, leaf: bool) -> IxResult<NodeId> {
        self.source.id(leaf)
    }

    pub fn auto_increment(&self, counter: &str, step: u64) -> IxResult<u64> {
        self.source.auto_increment(counter, step)
    }

    /// Reads the head record: from the buffer if set this transaction,
    /// else from `Src`.
    pub fn read_head(&self) -> IxResult<Option<Head<D>>> {
        if let Some(head) = self.head.borrow().as_ref() {
            return Ok(Some(head.clone()));
        }
        self.source.read_head()
    }

    /// Buffers a head write.
    pub fn write_head(&self, head: Head<D>) {
        *self.head.borrow_mut() = Some(head);
    }

    /// Number of buffered creates/updates/deletes, for
    /// [`crate::tree::Tree::result_entries`]-style introspection.
    pub fn pending_counts(&self) -> (usize, usize, usize) {
        (
            self.created.borrow().len(),
            self.updated.borrow().len(),
            self.deleted.borrow().len(),
        )
    }

    /// Atomically flushes all buffers to `Src`. On the first failing call,
    /// stops and returns the error with buffers left intact so the caller
    /// may retry or roll back; no partial commit is observable from the
    /// caller's perspective on success.
    pub fn commit(&self, label: Option<&str>) -> IxResult<CommitReport> {
        if let Some(head) = self.head.borrow().as_ref() {
            self.source.write_head(head)?;
        }
        for (id, node) in self.created.borrow().iter() {
            self.source.write(id, node)?;
            MetricsCollector::global().record_node_write();
        }
        for (id, node) in self.updated.borrow().iter() {
            self.source.write(id, node)?;
            MetricsCollector::global().record_node_write();
        }
        for id in self.deleted.borrow().iter() {
            self.source.delete(id)?;
        }

        let report = CommitReport {
            label: label.map(str::to_string),
            created: self.created.borrow().keys().cloned().collect(),
            updated: self.updated.borrow().keys().cloned().collect(),
            deleted: self.deleted.borrow().iter().cloned().collect(),
        };

        self.created.borrow_mut().clear();
        self.updated.borrow_mut().clear();
        self.deleted.borrow_mut().clear();
        self.head.borrow_mut().take();

        MetricsCollector::global().record_commit();
        Ok(report)
    }

    /// Discards all buffers, returning empty effect lists.
    pub fn rollback(&self) -> CommitReport {
        self.created.borrow_mut().clear();
        self.updated.borrow_mut().clear();
        self.deleted.borrow_mut().clear();
        self.head.borrow_mut().take();
        MetricsCollector::global().record_rollback();
        CommitReport::default()
    }
}

impl<K, V, D, Src> OverlaySource<K, V, D> for Overlay<K, V, D, Src>
where
    K: Clone,
    V: Clone,
    D: Clone,
    Src: OverlaySource<K, V, D>,
{
    fn read(&self, id: &NodeId) -> IxResult<Option<Node<K, V>>> {
        Overlay::read(self, id)
    }
    fn write(&self, id: &NodeId, node: &Node<K, V>) -> IxResult<()> {
        Overlay::write(self, id.clone(), node.clone());
        Ok(())
    }
    fn delete(&self, id: &NodeId) -> IxResult<()> {
        Overlay::delete(self, id.clone());
        Ok(())
    }
    fn id(&self, leaf: bool) -> IxResult<NodeId> {
        Overlay::id(self, leaf)
    }
    fn read_head(&self) -> IxResult<Option<Head<D>>> {
        Overlay::read_head(self)
    }
    fn write_head(&self, head: &Head<D>) -> IxResult<()> {
        Overlay::write_head(self, head.clone());
        Ok(())
    }
    fn auto_increment(&self, counter: &str, step: u64) -> IxResult<u64> {
        Overlay::auto_increment(self, counter, step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;

    #[test]
    fn read_serves_buffered_create_before_source() {
        let storage: MemoryStorage<String, i32, ()> = MemoryStorage::new();
        let overlay = Overlay::new(storage);
        let node = Node::new_leaf("n1".to_string(), None);
        overlay.create("n1".to_string(), node);

        let read = overlay.read(&"n1".to_string()).unwrap();
        assert!(read.is_some());
        // Not yet visible to a fresh read of the underlying storage.
        assert!(overlay.source().read(&"n1".to_string()).unwrap().is_none());
    }

    #[test]
    fn commit_flushes_buffers_and_clears_them() {
        let storage: MemoryStorage<String, i32, ()> = MemoryStorage::new();
        let overlay = Overlay::new(storage);
        overlay.create("n1".to_string(), Node::new_leaf("n1".to_string(), None));

        let report = overlay.commit(Some("t1")).unwrap();
        assert_eq!(report.created, vec!["n1".to_string()]);
        assert_eq!(report.label.as_deref(), Some("t1"));
        assert!(overlay.source().read(&"n1".to_string()).unwrap().is_some());
        assert_eq!(overlay.pending_counts(), (0, 0, 0));
    }

    #[test]
    fn rollback_discards_buffers() {
        let storage: MemoryStorage<String, i32, ()> = MemoryStorage::new();
        let overlay = Overlay::new(storage);
        overlay.create("n1".to_string(), Node::new_leaf("n1".to_string(), None));
        let report = overlay.rollback();
        assert!(report.is_empty());
        assert!(overlay.source().read(&"n1".to_string()).unwrap().is_none());
    }

    #[test]
    fn delete_of_uncommitted_create_cancels_it() {
        let storage: MemoryStorage<String, i32, ()> = MemoryStorage::new();
        let overlay = Overlay::new(storage);
        overlay.create("n1".to_string(), Node::new_leaf("n1".to_string(), None));
        overlay.delete("n1".to_string());

        assert!(overlay.read(&"n1".to_string()).unwrap().is_none());
        let report = overlay.commit(None).unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn nested_overlay_commit_flushes_into_parent_buffers() {
        let storage: MemoryStorage<String, i32, ()> = MemoryStorage::new();
        let root = Overlay::new(storage);
        let nested = Overlay::new(root);
        nested.create("n1".to_string(), Node::new_leaf("n1".to_string(), None));

        nested.commit(None).unwrap();
        // Visible to the root overlay, not yet to physical storage.
        assert!(nested.source().read(&"n1".to_string()).unwrap().is_some());
        assert!(nested.source().source().read(&"n1".to_string()).unwrap().is_none());

        let root = nested.into_source();
        root.commit(None).unwrap();
        assert!(root.source().read(&"n1".to_string()).unwrap().is_some());
    }
}
