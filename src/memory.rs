// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! In-memory reference [`Storage`] implementation.
//!
//! Not part of the core engine — a pluggable backend is an external
//! collaborator the engine only talks to through [`Storage`]. This impl
//! exists so the engine's own tests, benches, and doctests have something
//! concrete to run against.

use crate::error::IxResult;
use crate::node::{Head, Node, NodeId};
use crate::storage::Storage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// A `Storage` backed by an in-process `HashMap`, guarded by `RwLock`s so
/// it satisfies `Send + Sync` the same way a real shared backend would.
pub struct MemoryStorage<K, V, D> {
    nodes: RwLock<HashMap<NodeId, Node<K, V>>>,
    head: RwLock<Option<Head<D>>>,
    counters: RwLock<HashMap<String, u64>>,
    next_id: AtomicU64,
}

impl<K, V, D> Default for MemoryStorage<K, V, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, D> MemoryStorage<K, V, D> {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            head: RwLock::new(None),
            counters: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Number of nodes currently stored, for test assertions.
    pub fn node_count(&self) -> usize {
        self.nodes.read().expect("memory storage lock poisoned").len()
    }
}

impl<K, V, D> Storage<K, V, D> for MemoryStorage<K, V, D>
where
    K: Clone + Send + Sync,
    V: Clone + Send + Sync,
    D: Clone + Send + Sync,
{
    fn read(&self, id: &NodeId) -> IxResult<Option<Node<K, V>>> {
        Ok(self
            .nodes
            .read()
            .expect("memory storage lock poisoned")
            .get(id)
            .cloned())
    }

    fn write(&self, id: &NodeId, node: &Node<K, V>) -> IxResult<()> {
        self.nodes
            .write()
            .expect("memory storage lock poisoned")
            .insert(id.clone(), node.clone());
        Ok(())
    }

    fn delete(&self, id: &NodeId) -> IxResult<()> {
        self.nodes
            .write()
            .expect("memory storage lock poisoned")
            .remove(id);
        Ok(())
    }

    fn id(&self, leaf: bool) -> IxResult<NodeId> {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let prefix = if leaf { "leaf" } else { "node" };
        Ok(format!("{}-{}", prefix, n))
    }

    fn read_head(&self) -> IxResult<Option<Head<D>>> {
        Ok(self.head.read().expect("memory storage lock poisoned").clone())
    }

    fn write_head(&self, head: &Head<D>) -> IxResult<()> {
        *self.head.write().expect("memory storage lock poisoned") = Some(head.clone());
        Ok(())
    }

    fn auto_increment(&self, counter: &str, step: u64) -> IxResult<u64> {
        let mut counters = self.counters.write().expect("memory storage lock poisoned");
        let value = counters.entry(counter.to_string()).or_insert(0);
        *value += step;
        Ok(*value)
    }
}

#[cfg(feature = "async")]
impl<K, V, D> crate::storage_async::AsyncStorage<K, V, D> for MemoryStorage<K, V, D>
where
    K: Clone + Send + Sync,
    V: Clone + Send + Sync,
    D: Clone + Send + Sync,
{
    async fn read(&self, id: &NodeId) -> IxResult<Option<Node<K, V>>> {
        Storage::read(self, id)
    }

    async fn write(&self, id: &NodeId, node: &Node<K, V>) -> IxResult<()> {
        Storage::write(self, id, node)
    }

    async fn delete(&self, id: &NodeId) -> IxResult<()> {
        Storage::delete(self, id)
    }

    async fn id(&self, leaf: bool) -> IxResult<NodeId> {
        Storage::id(self, leaf)
    }

    async fn read_head(&self) -> IxResult<Option<Head<D>>> {
        Storage::read_head(self)
    }

    async fn write_head(&self, head: &Head<D>) -> IxResult<()> {
        Storage::write_head(self, head)
    }

    async fn auto_increment(&self, counter: &str, step: u64) -> IxResult<u64> {
        Storage::auto_increment(self, counter, step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_node() {
        let storage: MemoryStorage<String, i32, ()> = MemoryStorage::new();
        let node: Node<String, i32> = Node::new_leaf("n1".to_string(), None);
        storage.write(&"n1".to_string(), &node).unwrap();

        let read = storage.read(&"n1".to_string()).unwrap().unwrap();
        assert_eq!(read.id, "n1");
        assert_eq!(storage.node_count(), 1);
    }

    #[test]
    fn delete_removes_node() {
        let storage: MemoryStorage<String, i32, ()> = MemoryStorage::new();
        storage
            .write(&"n1".to_string(), &Node::new_leaf("n1".to_string(), None))
            .unwrap();
        storage.delete(&"n1".to_string()).unwrap();
        assert!(storage.read(&"n1".to_string()).unwrap().is_none());
    }

    #[test]
    fn ids_are_unique_and_tagged_by_kind() {
        let storage: MemoryStorage<String, i32, ()> = MemoryStorage::new();
        let leaf_id = storage.id(true).unwrap();
        let internal_id = storage.id(false).unwrap();
        assert_ne!(leaf_id, internal_id);
        assert!(leaf_id.starts_with("leaf-"));
        assert!(internal_id.starts_with("node-"));
    }

    #[test]
    fn auto_increment_accumulates_per_counter() {
        let storage: MemoryStorage<String, i32, ()> = MemoryStorage::new();
        assert_eq!(storage.auto_increment("users", 1).unwrap(), 1);
        assert_eq!(storage.auto_increment("users", 1).unwrap(), 2);
        assert_eq!(storage.auto_increment("other", 5).unwrap(), 5);
    }

    #[test]
    fn head_round_trips() {
        let storage: MemoryStorage<String, i32, String> = MemoryStorage::new();
        assert!(storage.read_head().unwrap().is_none());
        let head = Head {
            root: "root-1".to_string(),
            order: 4,
            data: "payload".to_string(),
        };
        storage.write_head(&head).unwrap();
        assert_eq!(storage.read_head().unwrap().unwrap().data, "payload");
    }
}
