// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Blocking storage backend protocol.
//!
//! `ixbase` never implements physical persistence itself — a `Storage` is
//! supplied by the embedder (a file, a key-value store, an in-memory map;
//! see [`crate::memory::MemoryStorage`] for a reference implementation used
//! in tests and doctests). The engine is written once against this trait
//! and is agnostic to what's behind it.

use crate::error::IxResult;
use crate::node::{Head, Node, NodeId};

/// Synchronous storage protocol required of a backend.
///
/// ## Contract
/// - `id(leaf)` must return an id not currently in use by any live node.
/// - The head record is addressed separately from node ids
///   ([`Storage::read_head`]/[`Storage::write_head`]) so a backend is never
///   forced to colocate it in the same id space as nodes under the
///   reserved literal [`crate::node::HEAD_ID`] — see the open question in
///   `spec.md` §9.
/// - `auto_increment` gives backends a way to hand out monotonically
///   increasing counters (e.g. for id generation schemes that want a
///   dense sequence) without the engine needing to know how ids are
///   actually minted.
pub trait Storage<K, V, D>: Send + Sync {
    /// Reads the node stored under `id`, or `Ok(None)` if it does not
    /// exist.
    fn read(&self, id: &NodeId) -> IxResult<Option<Node<K, V>>>;

    /// Persists `node` under its own id, creating or overwriting it.
    fn write(&self, id: &NodeId, node: &Node<K, V>) -> IxResult<()>;

    /// Removes the node stored under `id`. A delete of a nonexistent id is
    /// not an error.
    fn delete(&self, id: &NodeId) -> IxResult<()>;

    /// Mints a fresh, unused node id.
    fn id(&self, leaf: bool) -> IxResult<NodeId>;

    /// Reads the head record, or `Ok(None)` if the tree has never been
    /// initialized.
    fn read_head(&self) -> IxResult<Option<Head<D>>>;

    /// Persists the head record.
    fn write_head(&self, head: &Head<D>) -> IxResult<()>;

    /// Atomically advances `counter` by `step` and returns its new value.
    /// Used by id-generation schemes that want a dense numeric sequence
    /// rather than e.g. random ids.
    fn auto_increment(&self, counter: &str, step: u64) -> IxResult<u64>;

    /// Whether `id` currently names a live node. The default
    /// implementation delegates to [`Storage::read`]; backends with a
    /// cheaper existence check may override it.
    fn exists(&self, id: &NodeId) -> IxResult<bool> {
        Ok(self.read(id)?.is_some())
    }
}
