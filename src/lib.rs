// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! `ixbase`: an embeddable, serializable, transactional B+Tree index engine.
//!
//! A tree maps externally-supplied keys `K` to ordered values `V`, grouping
//! keys that share a value into a bucket at a single leaf slot. Every
//! mutation is buffered in an MVCC overlay ([`mvcc`]) until [`tree::Tree::commit`]
//! flushes it through a pluggable [`storage::Storage`] backend; [`memory::MemoryStorage`]
//! is the reference in-process backend. Range and predicate queries are
//! planned and executed by the [`query`] module against the leaf chain
//! directly, without materializing the whole tree.
//!
//! Enable the `async` feature for the cooperative mirrors: [`storage_async::AsyncStorage`],
//! [`mvcc_async::AsyncOverlay`], [`tree_async::AsyncTree`], and
//! [`query::executor_async::AsyncScan`].

pub mod algo;
pub mod cache;
pub mod comparator;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod mvcc;
pub mod node;
pub mod options;
pub mod pattern;
pub mod query;
pub mod storage;
pub mod tree;

#[cfg(feature = "async")]
pub mod mvcc_async;
#[cfg(feature = "async")]
pub mod storage_async;
#[cfg(feature = "async")]
pub mod tree_async;

pub use comparator::{Comparator, NaturalComparator};
pub use error::{IxError, IxResult};
pub use memory::MemoryStorage;
pub use mvcc::{CommitReport, Overlay, OverlaySource};
pub use node::{Bucket, Head, Node, NodeId, NodeKeys};
pub use options::Options;
pub use query::{choose_driver, Condition, LeafSource, Order, Predicate, Scan, Tag};
pub use storage::Storage;
pub use tree::{PendingEntries, Tree};

#[cfg(feature = "async")]
pub use mvcc_async::{AsyncOverlay, AsyncOverlaySource};
#[cfg(feature = "async")]
pub use query::{AsyncLeafSource, AsyncScan};
#[cfg(feature = "async")]
pub use storage_async::AsyncStorage;
#[cfg(feature = "async")]
pub use tree_async::AsyncTree;
