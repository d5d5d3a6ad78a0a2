// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Persisted node and head-record types.
//!
//! Nodes never hold owning references to their parent, children, or leaf
//! siblings — those are ids looked up through the node cache / MVCC overlay.
//! This keeps the type trivially `Serialize`/`Deserialize` and avoids any
//! ownership cycle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Opaque node identifier assigned by the storage backend.
pub type NodeId = String;

/// The reserved id under which the head record is stored. Backends that
/// colocate head storage in the same id space as nodes must treat this id
/// as reserved; backends are free to isolate head storage entirely (see
/// [`crate::storage::Storage::read_head`]).
pub const HEAD_ID: &str = "__HEAD__";

/// A single leaf slot: the set of external keys mapped to one value.
///
/// Kept as a `BTreeSet<K>` rather than a `Vec<K>` so repeated inserts of the
/// same key are idempotent by construction (invariant 2 in the data model).
pub type Bucket<K> = BTreeSet<K>;

/// A persisted B+Tree node.
///
/// In an internal node, `keys[i]` is the id of the `i`-th child and
/// `values[i]` is the separator between child `i` and child `i+1`
/// (`keys.len() == values.len() + 1`). In a leaf node, `keys[i]` is the
/// bucket of external keys sharing `values[i]` (`keys.len() == values.len()`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node<K, V> {
    pub id: NodeId,
    pub leaf: bool,
    pub parent: Option<NodeId>,
    /// Internal: child node ids. Leaf: per-slot key buckets.
    pub keys: Vec<NodeKeys<K>>,
    pub values: Vec<V>,
    /// Leaf only: id of the next leaf in ascending order.
    #[serde(default)]
    pub next: Option<NodeId>,
    /// Leaf only: id of the previous leaf in ascending order.
    #[serde(default)]
    pub prev: Option<NodeId>,
}

/// Discriminates the two interpretations of `Node::keys`. Serialized
/// `#[serde(untagged)]`: a `Child` is a JSON string (a `NodeId`) and a
/// `Bucket` is a JSON array, so the two variants never collide on the wire
/// and no discriminant tag is needed to tell them apart on deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeKeys<K> {
    Child(NodeId),
    Bucket(Bucket<K>),
}

impl<K> NodeKeys<K> {
    pub fn as_child(&self) -> Option<&NodeId> {
        match self {
            Self::Child(id) => Some(id),
            Self::Bucket(_) => None,
        }
    }

    pub fn as_bucket(&self) -> Option<&Bucket<K>> {
        match self {
            Self::Bucket(b) => Some(b),
            Self::Child(_) => None,
        }
    }

    pub fn as_bucket_mut(&mut self) -> Option<&mut Bucket<K>> {
        match self {
            Self::Bucket(b) => Some(b),
            Self::Child(_) => None,
        }
    }
}

impl<K, V> Node<K, V> {
    /// Builds an empty leaf node, unlinked from any chain.
    pub fn new_leaf(id: NodeId, parent: Option<NodeId>) -> Self {
        Self {
            id,
            leaf: true,
            parent,
            keys: Vec::new(),
            values: Vec::new(),
            next: None,
            prev: None,
        }
    }

    /// Builds an empty internal node.
    pub fn new_internal(id: NodeId, parent: Option<NodeId>) -> Self {
        Self {
            id,
            leaf: false,
            parent,
            keys: Vec::new(),
            values: Vec::new(),
            next: None,
            prev: None,
        }
    }

    /// Number of separators in an internal node, or slots in a leaf node.
    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    /// Number of children in an internal node. Undefined (but harmless) on
    /// a leaf, where `keys.len() == values.len()`.
    pub fn child_count(&self) -> usize {
        self.keys.len()
    }

    pub fn child_id(&self, index: usize) -> Option<&NodeId> {
        self.keys.get(index).and_then(NodeKeys::as_child)
    }

    pub fn bucket(&self, index: usize) -> Option<&Bucket<K>> {
        self.keys.get(index).and_then(NodeKeys::as_bucket)
    }

    pub fn bucket_mut(&mut self, index: usize) -> Option<&mut Bucket<K>> {
        self.keys.get_mut(index).and_then(NodeKeys::as_bucket_mut)
    }

    /// Position of `child` among this internal node's children, if present.
    pub fn child_index(&self, child: &NodeId) -> Option<usize> {
        self.keys.iter().position(|k| k.as_child() == Some(child))
    }
}

/// The singleton head descriptor, stored under [`HEAD_ID`].
///
/// `data` is an opaque, user-controlled payload round-tripped verbatim
/// through [`crate::tree::Tree::set_head_data`]/[`crate::tree::Tree::head_data`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Head<D> {
    pub root: NodeId,
    pub order: u32,
    pub data: D,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_bucket_round_trips_through_json() {
        let mut node: Node<String, i32> = Node::new_leaf("leaf-1".to_string(), None);
        node.values.push(20);
        node.keys.push(NodeKeys::Bucket(BTreeSet::from(["t".to_string()])));

        let json = serde_json::to_string(&node).unwrap();
        let back: Node<String, i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.bucket(0).unwrap(), &BTreeSet::from(["t".to_string()]));
    }

    #[test]
    fn internal_child_round_trips_through_json() {
        let mut node: Node<String, i32> = Node::new_internal("root".to_string(), None);
        node.values.push(10);
        node.keys.push(NodeKeys::Child("left".to_string()));
        node.keys.push(NodeKeys::Child("right".to_string()));

        let json = serde_json::to_string(&node).unwrap();
        let back: Node<String, i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.child_id(0).unwrap(), "left");
        assert_eq!(back.child_index(&"right".to_string()), Some(1));
    }
}
