// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Cooperative mirror of [`crate::mvcc`].
//!
//! Same buffering semantics as the blocking [`crate::mvcc::Overlay`] —
//! `created`/`updated`/`deleted` maps flushed atomically on
//! [`AsyncOverlay::commit`] — against an [`AsyncOverlaySource`] instead of a
//! [`crate::storage::Storage`]. Nesting works the same way: an
//! `AsyncOverlay<K, V, D, AsyncOverlay<K, V, D, S>>` recovers its source via
//! [`AsyncOverlay::into_source`] once its own commit has flushed.

use crate::error::IxResult;
use crate::metrics::MetricsCollector;
use crate::mvcc::CommitReport;
use crate::node::{Head, Node, NodeId};
use crate::storage_async::AsyncStorage;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

/// Anything an [`AsyncOverlay`] can read through to and flush into: either a
/// real cooperative storage backend or another `AsyncOverlay`.
pub trait AsyncOverlaySource<K, V, D> {
    fn read(&self, id: &NodeId) -> impl std::future::Future<Output = IxResult<Option<Node<K, V>>>> + Send;
    fn write(&self, id: &NodeId, node: &Node<K, V>) -> impl std::future::Future<Output = IxResult<()>> + Send;
    fn delete(&self, id: &NodeId) -> impl std::future::Future<Output = IxResult<()>> + Send;
    fn id(&self, leaf: bool) -> impl std::future::Future<Output = IxResult<NodeId>> + Send;
    fn read_head(&self) -> impl std::future::Future<Output = IxResult<Option<Head<D>>>> + Send;
    fn write_head(&self, head: &Head<D>) -> impl std::future::Future<Output = IxResult<()>> + Send;
    fn auto_increment(&self, counter: &str, step: u64) -> impl std::future::Future<Output = IxResult<u64>> + Send;
}

impl<K, V, D, S> AsyncOverlaySource<K, V, D> for S
where
    S: AsyncStorage<K, V, D>,
{
    async fn read(&self, id: &NodeId) -> IxResult<Option<Node<K, V>>> {
        AsyncStorage::read(self, id).await
    }
    async fn write(&self, id: &NodeId, node: &Node<K, V>) -> IxResult<()> {
        AsyncStorage::write(self, id, node).await
    }
    async fn delete(&self, id: &NodeId) -> IxResult<()> {
        AsyncStorage::delete(self, id).await
    }
    async fn id(&self, leaf: bool) -> IxResult<NodeId> {
        AsyncStorage::id(self, leaf).await
    }
    async fn read_head(&self) -> IxResult<Option<Head<D>>> {
        AsyncStorage::read_head(self).await
    }
    async fn write_head(&self, head: &Head<D>) -> IxResult<()> {
        AsyncStorage::write_head(self, head).await
    }
    async fn auto_increment(&self, counter: &str, step: u64) -> IxResult<u64> {
        AsyncStorage::auto_increment(self, counter, step).await
    }
}

/// Cooperative mirror of [`crate::mvcc::Overlay`].
pub struct AsyncOverlay<K, V, D, Src> {
    source: Src,
    created: RefCell<HashMap<NodeId, Node<K, V>>>,
    updated: RefCell<HashMap<NodeId, Node<K, V>>>,
    deleted: RefCell<HashSet<NodeId>>,
    head: RefCell<Option<Head<D>>>,
}

impl<K, V, D, Src> AsyncOverlay<K, V, D, Src>
where
    K: Clone,
    V: Clone,
    D: Clone,
    Src: AsyncOverlaySource<K, V, D>,
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

    pub fn source(&self) -> &Src {
        &self.source
    }

    pub fn into_source(self) -> Src {
        self.source
    }

    pub async fn read(&self, id: &NodeId) -> IxResult<Option<Node<K, V>>> {
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
        self.source.read(id).await
    }

    pub fn create(&self, id: NodeId, node: Node<K, V>) {
        self.deleted.borrow_mut().remove(&id);
        self.created.borrow_mut().insert(id, node);
    }

    pub fn write(&self, id: NodeId, node: Node<K, V>) {
        if self.created.borrow_mut().contains_key(&id) {
            self.created.borrow_mut().insert(id, node);
        } else {
            self.updated.borrow_mut().insert(id, node);
        }
    }

    pub fn delete(&self, id: NodeId) {
        if self.created.borrow_mut().remove(&id).is_some() {
            return;
        }
        self.updated.borrow_mut().remove(&id);
        self.deleted.borrow_mut().insert(id);
    }

    pub async fn exists(&self, id: &NodeId) -> IxResult<bool> {
        Ok(self.read(id).await?.is_some())
    }

    pub async fn id(&self, leaf: bool) -> IxResult<NodeId> {
        self.source.id(leaf).await
    }

    pub async fn auto_increment(&self, counter: &str, step: u64) -> IxResult<u64> {
        self.source.auto_increment(counter, step).await
    }

    pub async fn read_head(&self) -> IxResult<Option<Head<D>>> {
        if let Some(head) = self.head.borrow().as_ref() {
            return Ok(Some(head.clone()));
        }
        self.source.read_head().await
    }

    pub fn write_head(&self, head: Head<D>) {
        *self.head.borrow_mut() = Some(head);
    }

    pub fn pending_counts(&self) -> (usize, usize, usize) {
        (
            self.created.borrow().len(),
            self.updated.borrow().len(),
            self.deleted.borrow().len(),
        )
    }

    pub async fn commit(&self, label: Option<&str>) -> IxResult<CommitReport> {
        if let Some(head) = self.head.borrow().as_ref() {
            self.source.write_head(head).await?;
        }
        for (id, node) in self.created.borrow().iter() {
            self.source.write(id, node).await?;
            MetricsCollector::global().record_node_write();
        }
        for (id, node) in self.updated.borrow().iter() {
            self.source.write(id, node).await?;
            MetricsCollector::global().record_node_write();
        }
        for id in self.deleted.borrow().iter() {
            self.source.delete(id).await?;
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

    pub fn rollback(&self) -> CommitReport {
        self.created.borrow_mut().clear();
        self.updated.borrow_mut().clear();
        self.deleted.borrow_mut().clear();
        self.head.borrow_mut().take();
        MetricsCollector::global().record_rollback();
        CommitReport::default()
    }
}

impl<K, V, D, Src> AsyncOverlaySource<K, V, D> for AsyncOverlay<K, V, D, Src>
where
    K: Clone,
    V: Clone,
    D: Clone,
    Src: AsyncOverlaySource<K, V, D>,
{
    async fn read(&self, id: &NodeId) -> IxResult<Option<Node<K, V>>> {
        AsyncOverlay::read(self, id).await
    }
    async fn write(&self, id: &NodeId, node: &Node<K, V>) -> IxResult<()> {
        AsyncOverlay::write(self, id.clone(), node.clone());
        Ok(())
    }
    async fn delete(&self, id: &NodeId) -> IxResult<()> {
        AsyncOverlay::delete(self, id.clone());
        Ok(())
    }
    async fn id(&self, leaf: bool) -> IxResult<NodeId> {
        AsyncOverlay::id(self, leaf).await
    }
    async fn read_head(&self) -> IxResult<Option<Head<D>>> {
        AsyncOverlay::read_head(self).await
    }
    async fn write_head(&self, head: &Head<D>) -> IxResult<()> {
        AsyncOverlay::write_head(self, head.clone());
        Ok(())
    }
    async fn auto_increment(&self, counter: &str, step: u64) -> IxResult<u64> {
        AsyncOverlay::auto_increment(self, counter, step).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;

    #[tokio::test]
    async fn read_serves_buffered_create_before_source() {
        let storage: MemoryStorage<String, i32, ()> = MemoryStorage::new();
        let overlay = AsyncOverlay::new(storage);
        overlay.create("n1".to_string(), Node::new_leaf("n1".to_string(), None));

        let read = overlay.read(&"n1".to_string()).await.unwrap();
        assert!(read.is_some());
        assert!(overlay.source().read(&"n1".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_flushes_buffers_and_clears_them() {
        let storage: MemoryStorage<String, i32, ()> = MemoryStorage::new();
        let overlay = AsyncOverlay::new(storage);
        overlay.create("n1".to_string(), Node::new_leaf("n1".to_string(), None));

        let report = overlay.commit(Some("t1")).await.unwrap();
        assert_eq!(report.created, vec!["n1".to_string()]);
        assert!(overlay.source().read(&"n1".to_string()).await.unwrap().is_some());
        assert_eq!(overlay.pending_counts(), (0, 0, 0));
    }

    #[tokio::test]
    async fn rollback_discards_buffers() {
        let storage: MemoryStorage<String, i32, ()> = MemoryStorage::new();
        let overlay = AsyncOverlay::new(storage);
        overlay.create("n1".to_string(), Node::new_leaf("n1".to_string(), None));
        let report = overlay.rollback();
        assert!(report.is_empty());
        assert!(overlay.source().read(&"n1".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn nested_overlay_commit_flushes_into_parent_buffers() {
        let storage: MemoryStorage<String, i32, ()> = MemoryStorage::new();
        let root = AsyncOverlay::new(storage);
        let nested = AsyncOverlay::new(root);
        nested.create("n1".to_string(), Node::new_leaf("n1".to_string(), None));

        nested.commit(None).await.unwrap();
        assert!(nested.source().read(&"n1".to_string()).await.unwrap().is_some());
        assert!(nested.source().source().read(&"n1".to_string()).await.unwrap().is_none());

        let root = nested.into_source();
        root.commit(None).await.unwrap();
        assert!(root.source().read(&"n1".to_string()).await.unwrap().is_some());
    }
}
