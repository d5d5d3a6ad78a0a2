// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Cooperative (single-threaded, `async`) storage backend protocol.
//!
//! Structurally identical to [`crate::storage::Storage`] — same methods,
//! same semantics — except every call is an awaitable completion. This is
//! one of the two suspension-point boundaries named in `spec.md` §5; the
//! other is the executor's leaf-chain read-ahead
//! ([`crate::query::executor_async`]).

use crate::error::IxResult;
use crate::node::{Head, Node, NodeId};

/// Cooperative storage protocol required of a backend, mirroring
/// [`crate::storage::Storage`] one-for-one.
pub trait AsyncStorage<K, V, D>: Send + Sync {
    fn read(&self, id: &NodeId) -> impl std::future::Future<Output = IxResult<Option<Node<K, V>>>> + Send;

    fn write(&self, id: &NodeId, node: &Node<K, V>) -> impl std::future::Future<Output = IxResult<()>> + Send;

    fn delete(&self, id: &NodeId) -> impl std::future::Future<Output = IxResult<()>> + Send;

    fn id(&self, leaf: bool) -> impl std::future::Future<Output = IxResult<NodeId>> + Send;

    fn read_head(&self) -> impl std::future::Future<Output = IxResult<Option<Head<D>>>> + Send;

    fn write_head(&self, head: &Head<D>) -> impl std::future::Future<Output = IxResult<()>> + Send;

    fn auto_increment(&self, counter: &str, step: u64) -> impl std::future::Future<Output = IxResult<u64>> + Send;

    /// Whether `id` currently names a live node. Implementors with a
    /// cheaper existence check may override the default, which delegates
    /// to [`AsyncStorage::read`].
    fn exists(&self, id: &NodeId) -> impl std::future::Future<Output = IxResult<bool>> + Send {
        async move { Ok(self.read(id).await?.is_some()) }
    }
}
