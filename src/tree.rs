// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! The blocking B+Tree engine (C5): descent, split, merge/borrow, leaf
//! chain maintenance, and head-of-tree management, all driven through the
//! MVCC overlay (C3) and node cache (C4).
//!
//! See `tree_async.rs` for the cooperative mirror. Both share
//! [`crate::algo`] for every pure calculation; this file and its mirror
//! differ only in whether a storage call suspends.

use crate::algo::{
    can_merge_internal, can_merge_leaves, descend_index, internal_min_children, leaf_min_values, leaf_slot_search,
    split_mid, DescentMode,
};
use crate::cache::LruCache;
use crate::comparator::Comparator;
use crate::error::{IxError, IxResult};
use crate::metrics::MetricsCollector;
use crate::mvcc::{CommitReport, Overlay};
use crate::node::{Bucket, Head, Node, NodeId, NodeKeys};
use crate::options::Options;
use crate::pattern::PatternCache;
use crate::query::condition::{Condition, Order};
use crate::query::executor::{LeafSource, Scan};
use crate::storage::Storage;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::hash::Hash;

/// Counts of buffered creates/updates/deletes not yet flushed by
/// [`Tree::commit`], as returned by [`Tree::result_entries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingEntries {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

fn structural(detail: impl Into<String>) -> IxError {
    IxError::StructuralInconsistency { detail: detail.into() }
}

/// An embeddable B+Tree index over values `V` keyed externally by `K`,
/// ordered by comparator `C`, persisted through storage backend `S`.
pub struct Tree<K, V, D, C, S> {
    overlay: Overlay<K, V, D, S>,
    comparator: C,
    cache: RefCell<LruCache<NodeId, Node<K, V>>>,
    patterns: RefCell<PatternCache>,
    options: Options,
}

impl<K, V, D, C, S> Tree<K, V, D, C, S>
where
    K: Clone + Ord,
    V: Clone,
    D: Clone,
    C: Comparator<V>,
    S: Storage<K, V, D>,
{
    /// Reads the existing head record, or initializes a fresh empty tree
    /// (a single empty leaf root) if none exists yet.
    ///
    /// ## Error Conditions
    /// - `IxError::InvalidOrder`: no head exists yet and `order < 3`.
    /// - `IxError::Backend`: the underlying storage call failed.
    pub fn init(storage: S, comparator: C, options: Options, order: u32, default_data: D) -> IxResult<Self> {
        let overlay = Overlay::new(storage);
        let existing_head = overlay.read_head()?;
        let tree = Self {
            overlay,
            comparator,
            cache: RefCell::new(LruCache::new(options.capacity)),
            patterns: RefCell::new(PatternCache::new(options.capacity)),
            options,
        };

        if existing_head.is_none() {
            if order < 3 {
                return Err(IxError::InvalidOrder { order });
            }
            let root_id = tree.overlay.id(true)?;
            let root = Node::new_leaf(root_id.clone(), None);
            tree.create_node(root)?;
            tree.overlay.write_head(Head {
                root: root_id,
                order,
                data: default_data,
            });
            tree.commit(Some("init"))?;
        }

        Ok(tree)
    }

    /// Capacities and read-ahead flag this tree was built with.
    pub fn options(&self) -> Options {
        self.options
    }

    fn root_id(&self) -> IxResult<NodeId> {
        Ok(self.overlay.read_head()?.ok_or(IxError::MissingHead)?.root)
    }

    fn order(&self) -> IxResult<u32> {
        Ok(self.overlay.read_head()?.ok_or(IxError::MissingHead)?.order)
    }

    fn set_root(&self, root: NodeId) -> IxResult<()> {
        let head = self.overlay.read_head()?.ok_or(IxError::MissingHead)?;
        self.overlay.write_head(Head {
            root,
            order: head.order,
            data: head.data,
        });
        Ok(())
    }

    fn read_node(&self, id: &NodeId) -> IxResult<Node<K, V>> {
        if let Some(node) = self.cache.borrow_mut().get(id) {
            MetricsCollector::global().record_cache_hit();
            return Ok(node.clone());
        }
        MetricsCollector::global().record_cache_miss();
        let node = self
            .overlay
            .read(id)?
            .ok_or_else(|| structural(format!("node {} not found", id)))?;
        self.cache.borrow_mut().put(id.clone(), node.clone());
        Ok(node)
    }

    fn create_node(&self, node: Node<K, V>) -> IxResult<()> {
        self.cache.borrow_mut().put(node.id.clone(), node.clone());
        self.overlay.create(node.id.clone(), node);
        Ok(())
    }

    fn write_node(&self, node: Node<K, V>) -> IxResult<()> {
        self.cache.borrow_mut().put(node.id.clone(), node.clone());
        self.overlay.write(node.id.clone(), node);
        Ok(())
    }

    fn delete_node(&self, id: &NodeId) -> IxResult<()> {
        self.cache.borrow_mut().remove(id);
        self.overlay.delete(id.clone());
        Ok(())
    }

    fn descend(&self, target: &V, mode: DescentMode) -> IxResult<NodeId> {
        let mut node_id = self.root_id()?;
        loop {
            let node = self.read_node(&node_id)?;
            if node.leaf {
                return Ok(node_id);
            }
            let index = descend_index(&node.values, target, &self.comparator, mode);
            node_id = node
                .child_id(index)
                .cloned()
                .ok_or_else(|| structural("descent landed on a missing child index"))?;
        }
    }

    fn leftmost_leaf_id(&self) -> IxResult<NodeId> {
        let mut node_id = self.root_id()?;
        loop {
            let node = self.read_node(&node_id)?;
            if node.leaf {
                return Ok(node_id);
            }
            node_id = node
                .child_id(0)
                .cloned()
                .ok_or_else(|| structural("internal node has no children"))?;
        }
    }

    fn rightmost_leaf_id(&self) -> IxResult<NodeId> {
        let mut node_id = self.root_id()?;
        loop {
            let node = self.read_node(&node_id)?;
            if node.leaf {
                return Ok(node_id);
            }
            let last = node.child_count().checked_sub(1).ok_or_else(|| structural("internal node has no children"))?;
            node_id = node
                .child_id(last)
                .cloned()
                .ok_or_else(|| structural("internal node has no children"))?;
        }
    }

    /// Inserts `(k, v)`. Idempotent: inserting the same pair twice is a
    /// no-op the second time.
    pub fn insert(&self, k: K, v: V) -> IxResult<()> {
        let leaf_id = self.descend(&v, DescentMode::Insertion)?;
        let mut leaf = self.read_node(&leaf_id)?;
        match leaf_slot_search(&leaf.values, &v, &self.comparator) {
            Ok(index) => {
                let bucket = leaf
                    .bucket_mut(index)
                    .ok_or_else(|| structural("leaf slot is not a bucket"))?;
                if bucket.contains(&k) {
                    return Ok(());
                }
                bucket.insert(k);
                self.write_node(leaf)
            }
            Err(index) => {
                leaf.values.insert(index, v.clone());
                let bucket: Bucket<K> = std::iter::once(k).collect();
                leaf.keys.insert(index, NodeKeys::Bucket(bucket));
                let order = self.order()?;
                if leaf.value_count() as u32 == order {
                    self.split_leaf(leaf)
                } else {
                    self.write_node(leaf)
                }
            }
        }
    }

    fn split_leaf(&self, mut leaf: Node<K, V>) -> IxResult<()> {
        let order = self.order()?;
        let mid = split_mid(order);
        let right_id = self.overlay.id(true)?;

        let mut right = Node::new_leaf(right_id.clone(), leaf.parent.clone());
        right.values = leaf.values.split_off(mid + 1);
        right.keys = leaf.keys.split_off(mid + 1);
        right.next = leaf.next.clone();
        right.prev = Some(leaf.id.clone());
        leaf.next = Some(right.id.clone());

        if let Some(old_next_id) = right.next.clone() {
            let mut old_next = self.read_node(&old_next_id)?;
            old_next.prev = Some(right.id.clone());
            self.write_node(old_next)?;
        }

        let separator = right
            .values
            .first()
            .cloned()
            .ok_or_else(|| structural("freshly split leaf has no values"))?;

        let left_id = leaf.id.clone();
        self.write_node(leaf)?;
        self.create_node(right.clone())?;
        self.insert_in_parent(&left_id, separator, right)
    }

    /// Splices a fresh right-hand node `p` in after `n_id`, creating a new
    /// root if `n_id` was the root, or recursing upward through a parent
    /// split otherwise.
    fn insert_in_parent(&self, n_id: &NodeId, separator: V, p: Node<K, V>) -> IxResult<()> {
        let n = self.read_node(n_id)?;
        match n.parent.clone() {
            None => {
                let root_id = self.overlay.id(false)?;
                let mut root = Node::new_internal(root_id.clone(), None);
                root.values.push(separator);
                root.keys.push(NodeKeys::Child(n.id.clone()));
                root.keys.push(NodeKeys::Child(p.id.clone()));

                let mut n = n;
                n.parent = Some(root_id.clone());
                let mut p = p;
                p.parent = Some(root_id.clone());

                self.write_node(n)?;
                self.create_node(p)?;
                self.create_node(root)?;
                self.set_root(root_id)
            }
            Some(parent_id) => {
                let mut parent = self.read_node(&parent_id)?;
                let node_index = parent
                    .child_index(n_id)
                    .ok_or_else(|| structural("split child not found in its claimed parent"))?;
                parent.values.insert(node_index, separator);
                parent.keys.insert(node_index + 1, NodeKeys::Child(p.id.clone()));

                let mut p = p;
                p.parent = Some(parent_id.clone());
                self.create_node(p)?;

                let order = self.order()?;
                if parent.child_count() as u32 > order {
                    self.split_internal(parent)
                } else {
                    self.write_node(parent)
                }
            }
        }
    }

    fn split_internal(&self, mut parent: Node<K, V>) -> IxResult<()> {
        let order = self.order()?;
        let mid = split_mid(order);
        let promote = parent
            .values
            .get(mid)
            .cloned()
            .ok_or_else(|| structural("overflowing internal node has no middle separator"))?;

        let right_id = self.overlay.id(false)?;
        let mut right = Node::new_internal(right_id.clone(), parent.parent.clone());
        right.values = parent.values.split_off(mid + 1);
        right.keys = parent.keys.split_off(mid + 1);
        parent.values.pop(); // drop the promoted separator from the left half

        for key in right.keys.clone() {
            if let Some(child_id) = key.as_child() {
                let mut child = self.read_node(child_id)?;
                child.parent = Some(right.id.clone());
                self.write_node(child)?;
            }
        }

        let left_id = parent.id.clone();
        self.write_node(parent)?;
        self.create_node(right.clone())?;
        self.insert_in_parent(&left_id, promote, right)
    }

    /// Removes `(k, v)`. A no-op if the pair is not present.
    pub fn delete(&self, k: K, v: V) -> IxResult<()> {
        let mut leaf_id = self.descend(&v, DescentMode::PrimaryOnly)?;
        loop {
            let leaf = self.read_node(&leaf_id)?;
            if let Ok(index) = leaf_slot_search(&leaf.values, &v, &self.comparator) {
                let mut leaf = leaf;
                let removed = leaf.bucket_mut(index).map(|bucket| bucket.remove(&k)).unwrap_or(false);
                if !removed {
                    return Ok(());
                }
                let emptied = leaf.bucket(index).map(|bucket| bucket.is_empty()).unwrap_or(false);
                if emptied {
                    leaf.values.remove(index);
                    leaf.keys.remove(index);
                    let id = leaf.id.clone();
                    self.write_node(leaf)?;
                    return self.delete_entry(id, None);
                }
                return self.write_node(leaf);
            }
            match leaf.next.clone() {
                Some(next_id) => leaf_id = next_id,
                None => return Ok(()),
            }
        }
    }

    fn can_merge(&self, left: &Node<K, V>, right: &Node<K, V>, order: u32) -> bool {
        if left.leaf {
            can_merge_leaves(left.value_count(), right.value_count(), order)
        } else {
            can_merge_internal(left.child_count(), right.child_count(), order)
        }
    }

    /// Removes the now-obsolete parent entry for `removed_child` (if any)
    /// from `node_id`, then rebalances `node_id` if it has fallen under
    /// the min-occupancy invariant, recursing upward as needed.
    fn delete_entry(&self, node_id: NodeId, removed_child: Option<NodeId>) -> IxResult<()> {
        let mut node = self.read_node(&node_id)?;

        if let Some(child_id) = &removed_child {
            if !node.leaf {
                if let Some(child_index) = node.child_index(child_id) {
                    node.keys.remove(child_index);
                    let separator_index = child_index.saturating_sub(1);
                    if separator_index < node.values.len() {
                        node.values.remove(separator_index);
                    }
                }
            }
        }

        if node.parent.is_none() {
            if !node.leaf && node.child_count() == 1 {
                let only_child_id = node
                    .child_id(0)
                    .cloned()
                    .ok_or_else(|| structural("collapsed root claims a child it does not have"))?;
                let mut child = self.read_node(&only_child_id)?;
                child.parent = None;
                self.write_node(child)?;
                self.delete_node(&node.id)?;
                return self.set_root(only_child_id);
            }
            return self.write_node(node);
        }

        let order = self.order()?;
        let min_required = if node.leaf {
            leaf_min_values(order)
        } else {
            internal_min_children(order)
        };
        let occupancy = if node.leaf { node.value_count() } else { node.child_count() };

        if occupancy >= min_required {
            return self.write_node(node);
        }

        let parent_id = node.parent.clone().expect("checked above");
        let parent = self.read_node(&parent_id)?;
        let node_index = parent
            .child_index(&node.id)
            .ok_or_else(|| structural("underflowing node not found in its own parent"))?;
        let left_sibling = if node_index > 0 {
            parent.child_id(node_index - 1).cloned()
        } else {
            None
        };
        let right_sibling = if node_index + 1 < parent.child_count() {
            parent.child_id(node_index + 1).cloned()
        } else {
            None
        };

        self.write_node(node.clone())?;

        if let Some(left_id) = &left_sibling {
            let left = self.read_node(left_id)?;
            if self.can_merge(&left, &node, order) {
                return self.merge_into_left(left_id, &node.id, &parent);
            }
        }
        if let Some(right_id) = &right_sibling {
            let right = self.read_node(right_id)?;
            if self.can_merge(&node, &right, order) {
                return self.merge_into_left(&node.id, right_id, &parent);
            }
        }
        if let Some(left_id) = &left_sibling {
            return self.borrow_from_left(left_id, &node.id, &parent_id);
        }
        if let Some(right_id) = &right_sibling {
            return self.borrow_from_right(&node.id, right_id, &parent_id);
        }

        Ok(())
    }

    /// Concatenates `right_id` into `left_id`, deletes `right_id`, and
    /// recurses `delete_entry` on `parent` to drop its now-dangling
    /// separator/child entry.
    fn merge_into_left(&self, left_id: &NodeId, right_id: &NodeId, parent: &Node<K, V>) -> IxResult<()> {
        let mut left = self.read_node(left_id)?;
        let right = self.read_node(right_id)?;

        if left.leaf {
            left.values.extend(right.values.clone());
            left.keys.extend(right.keys.clone());
            left.next = right.next.clone();
            if let Some(next_id) = left.next.clone() {
                let mut next_node = self.read_node(&next_id)?;
                next_node.prev = Some(left.id.clone());
                self.write_node(next_node)?;
            }
        } else {
            let right_index = parent
                .child_index(right_id)
                .ok_or_else(|| structural("merge sibling not found in parent"))?;
            let separator_index = right_index
                .checked_sub(1)
                .ok_or_else(|| structural("merge right sibling has no separator to its left"))?;
            let separator = parent
                .values
                .get(separator_index)
                .cloned()
                .ok_or_else(|| structural("missing separator for internal merge"))?;
            left.values.push(separator);
            left.values.extend(right.values.clone());
            left.keys.extend(right.keys.clone());
            for key in right.keys.clone() {
                if let Some(child_id) = key.as_child() {
                    let mut child = self.read_node(child_id)?;
                    child.parent = Some(left.id.clone());
                    self.write_node(child)?;
                }
            }
        }

        self.write_node(left)?;
        self.delete_node(right_id)?;
        self.delete_entry(parent.id.clone(), Some(right_id.clone()))
    }

    /// Borrows the last slot/child of `left_id` into the front of `node_id`.
    fn borrow_from_left(&self, left_id: &NodeId, node_id: &NodeId, parent_id: &NodeId) -> IxResult<()> {
        let mut left = self.read_node(left_id)?;
        let mut node = self.read_node(node_id)?;
        let mut parent = self.read_node(parent_id)?;
        let node_index = parent
            .child_index(node_id)
            .ok_or_else(|| structural("borrowing node not found in parent"))?;
        let separator_index = node_index
            .checked_sub(1)
            .ok_or_else(|| structural("left borrow with no left separator"))?;

        if node.leaf {
            let moved_value = left.values.pop().ok_or_else(|| structural("left sibling has nothing to lend"))?;
            let moved_key = left.keys.pop().ok_or_else(|| structural("left sibling has nothing to lend"))?;
            node.values.insert(0, moved_value.clone());
            node.keys.insert(0, moved_key);
            parent.values[separator_index] = moved_value;
        } else {
            let demoted = parent.values[separator_index].clone();
            let moved_child = left.keys.pop().ok_or_else(|| structural("left sibling has no child to lend"))?;
            let ascended = left.values.pop().ok_or_else(|| structural("left sibling has no separator to lend"))?;
            if let Some(child_id) = moved_child.as_child() {
                let mut child = self.read_node(child_id)?;
                child.parent = Some(node.id.clone());
                self.write_node(child)?;
            }
            node.values.insert(0, demoted);
            node.keys.insert(0, moved_child);
            parent.values[separator_index] = ascended;
        }

        self.write_node(left)?;
        self.write_node(node)?;
        self.write_node(parent)
    }

    /// Borrows the first slot/child of `right_id` into the back of `node_id`.
    fn borrow_from_right(&self, node_id: &NodeId, right_id: &NodeId, parent_id: &NodeId) -> IxResult<()> {
        let mut node = self.read_node(node_id)?;
        let mut right = self.read_node(right_id)?;
        let mut parent = self.read_node(parent_id)?;
        let right_index = parent
            .child_index(right_id)
            .ok_or_else(|| structural("borrow donor not found in parent"))?;
        let separator_index = right_index
            .checked_sub(1)
            .ok_or_else(|| structural("right borrow with no separator"))?;

        if node.leaf {
            let moved_value = right.values.remove(0);
            let moved_key = right.keys.remove(0);
            node.values.push(moved_value);
            node.keys.push(moved_key);
            let new_boundary = right
                .values
                .first()
                .cloned()
                .ok_or_else(|| structural("right sibling emptied by borrow"))?;
            parent.values[separator_index] = new_boundary;
        } else {
            let demoted = parent.values[separator_index].clone();
            let moved_child = right.keys.remove(0);
            let ascended = right.values.remove(0);
            if let Some(child_id) = moved_child.as_child() {
                let mut child = self.read_node(child_id)?;
                child.parent = Some(node.id.clone());
                self.write_node(child)?;
            }
            node.values.push(demoted);
            node.keys.push(moved_child);
            parent.values[separator_index] = ascended;
        }

        self.write_node(node)?;
        self.write_node(right)?;
        self.write_node(parent)
    }

    /// `true` if `(k, v)` is present.
    pub fn exists(&self, k: &K, v: &V) -> IxResult<bool> {
        let leaf_id = self.descend(v, DescentMode::Insertion)?;
        let leaf = self.read_node(&leaf_id)?;
        match leaf_slot_search(&leaf.values, v, &self.comparator) {
            Ok(index) => Ok(leaf.bucket(index).map(|bucket| bucket.contains(k)).unwrap_or(false)),
            Err(_) => Ok(false),
        }
    }

    /// Looks up the value associated with `k` by scanning the leaf chain.
    pub fn get(&self, k: &K) -> IxResult<Option<V>> {
        let mut current = Some(self.leftmost_leaf_id()?);
        while let Some(id) = current {
            let node = self.read_node(&id)?;
            for (index, value) in node.values.iter().enumerate() {
                if node.bucket(index).map(|bucket| bucket.contains(k)).unwrap_or(false) {
                    return Ok(Some(value.clone()));
                }
            }
            current = node.next.clone();
        }
        Ok(None)
    }

    /// Builds a lazy pair stream over `condition`, applying `order` and
    /// an optional `limit`.
    pub fn stream<'a>(&'a self, condition: &Condition<V>, order: Order, limit: Option<usize>) -> IxResult<Scan<'a, K, V, D, Self>> {
        Scan::new(self, condition, order, limit)
    }

    /// Collects [`Tree::stream`] eagerly into a key-ordered map.
    pub fn where_(&self, condition: &Condition<V>, order: Order) -> IxResult<BTreeMap<K, V>> {
        self.stream(condition, order, None)?.collect()
    }

    /// Collects the projected key set for `condition`, optionally
    /// intersected with `filter`.
    pub fn keys(&self, condition: &Condition<V>, filter: Option<&HashSet<K>>, order: Order) -> IxResult<BTreeSet<K>>
    where
        K: Hash + Eq,
    {
        let pairs = self.where_(condition, order)?;
        Ok(pairs
            .into_keys()
            .filter(|k| filter.map(|set| set.contains(k)).unwrap_or(true))
            .collect())
    }

    /// Overwrites the head's opaque user payload.
    pub fn set_head_data(&self, data: D) -> IxResult<()> {
        let head = self.overlay.read_head()?.ok_or(IxError::MissingHead)?;
        self.overlay.write_head(Head {
            root: head.root,
            order: head.order,
            data,
        });
        Ok(())
    }

    /// Reads the head's opaque user payload.
    pub fn head_data(&self) -> IxResult<D> {
        Ok(self.overlay.read_head()?.ok_or(IxError::MissingHead)?.data)
    }

    /// Evicts and re-reads either one node id, or the entire cache if
    /// `id` is `None`. Used to resynchronize against a backend touched by
    /// an external writer.
    pub fn force_update(&self, id: Option<&NodeId>) -> IxResult<()> {
        match id {
            Some(id) => {
                self.cache.borrow_mut().remove(id);
                self.read_node(id)?;
            }
            None => {
                self.cache.borrow_mut().clear();
            }
        }
        Ok(())
    }

    /// Flushes the pending transaction to storage.
    pub fn commit(&self, label: Option<&str>) -> IxResult<CommitReport> {
        self.overlay.commit(label)
    }

    /// Discards the pending transaction.
    pub fn rollback(&self) -> CommitReport {
        self.overlay.rollback()
    }

    /// Counts of the pending (uncommitted) transaction's buffered effects.
    pub fn result_entries(&self) -> PendingEntries {
        let (created, updated, deleted) = self.overlay.pending_counts();
        PendingEntries { created, updated, deleted }
    }

    /// Drops the node cache and the pattern cache.
    pub fn clear(&self) {
        self.cache.borrow_mut().clear();
        self.patterns.borrow_mut().clear();
    }
}

impl<K, V, D, C, S> LeafSource<K, V, D> for Tree<K, V, D, C, S>
where
    K: Clone + Ord,
    V: Clone,
    D: Clone,
    C: Comparator<V>,
    S: Storage<K, V, D>,
{
    fn comparator(&self) -> &dyn Comparator<V> {
        &self.comparator
    }

    fn patterns(&self) -> &RefCell<PatternCache> {
        &self.patterns
    }

    fn leftmost_leaf(&self) -> IxResult<Option<NodeId>> {
        self.leftmost_leaf_id().map(Some)
    }

    fn rightmost_leaf(&self) -> IxResult<Option<NodeId>> {
        self.rightmost_leaf_id().map(Some)
    }

    fn descend_to_leaf(&self, target: &V, mode: DescentMode) -> IxResult<Option<NodeId>> {
        self.descend(target, mode).map(Some)
    }

    fn read_leaf(&self, id: &NodeId) -> IxResult<Node<K, V>> {
        self.read_node(id)
    }

    fn read_ahead(&self) -> bool {
        self.options.read_ahead
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::NaturalComparator;
    use crate::memory::MemoryStorage;

    type TestTree = Tree<String, i32, (), NaturalComparator, MemoryStorage<String, i32, ()>>;

    fn build_tree(order: u32) -> TestTree {
        let storage: MemoryStorage<String, i32, ()> = MemoryStorage::new();
        Tree::init(storage, NaturalComparator, Options::default(), order, ()).unwrap()
    }

    #[test]
    fn insert_then_get_round_trips() {
        let tree = build_tree(4);
        tree.insert("a".to_string(), 1).unwrap();
        tree.insert("b".to_string(), 2).unwrap();
        tree.commit(None).unwrap();

        assert_eq!(tree.get(&"a".to_string()).unwrap(), Some(1));
        assert_eq!(tree.get(&"z".to_string()).unwrap(), None);
    }

    #[test]
    fn duplicate_values_share_a_bucket() {
        let tree = build_tree(4);
        tree.insert("a".to_string(), 1).unwrap();
        tree.insert("b".to_string(), 1).unwrap();
        tree.commit(None).unwrap();

        assert!(tree.exists(&"a".to_string(), &1).unwrap());
        assert!(tree.exists(&"b".to_string(), &1).unwrap());
    }

    #[test]
    fn insert_is_idempotent() {
        let tree = build_tree(4);
        tree.insert("a".to_string(), 1).unwrap();
        tree.insert("a".to_string(), 1).unwrap();
        let report = tree.commit(None).unwrap();
        assert!(!report.is_empty());

        assert_eq!(tree.get(&"a".to_string()).unwrap(), Some(1));
    }

    #[test]
    fn scenario_s1_numeric_insert_and_range_order_4() {
        let tree = build_tree(4);
        let alphabet = "abcdefghijklmnopqrstuvwxyz";
        for (i, ch) in alphabet.chars().enumerate() {
            tree.insert(ch.to_string(), (i + 1) as i32).unwrap();
        }
        tree.insert("\u{3141}".to_string(), 20).unwrap();
        tree.insert("\u{314e}".to_string(), 2).unwrap();
        tree.insert("\u{314d}".to_string(), 4).unwrap();
        tree.insert("\u{314c}".to_string(), 6).unwrap();
        tree.commit(None).unwrap();

        let equal20 = tree.where_(&Condition::new().equal(20), Order::Asc).unwrap();
        let mut expected_equal20 = BTreeMap::new();
        expected_equal20.insert("t".to_string(), 20);
        expected_equal20.insert("\u{3141}".to_string(), 20);
        assert_eq!(equal20, expected_equal20);

        let lt5 = tree.where_(&Condition::new().lt(5), Order::Asc).unwrap();
        assert_eq!(lt5.values().min(), Some(&1));
        assert_eq!(lt5.values().max(), Some(&4));

        let combo = tree.where_(&Condition::new().gte(5).lt(10).equal(6), Order::Asc).unwrap();
        let values: Vec<i32> = combo.iter().map(|(_, v)| *v).collect();
        assert!(values.iter().all(|v| *v == 6));
    }

    #[test]
    fn scenario_s3_delete_and_query_order_4() {
        let tree = build_tree(4);
        for i in 1..=10 {
            tree.insert(('a' as u8 + i as u8 - 1) as char, i).unwrap();
        }
        tree.commit(None).unwrap();

        tree.delete('d', 5).unwrap(); // no-op, wrong value for 'd'
        assert_eq!(tree.get(&'d').unwrap(), Some(4));

        tree.delete('d', 4).unwrap();
        tree.commit(None).unwrap();

        assert_eq!(tree.get(&'d').unwrap(), None);
        let equal4 = tree.where_(&Condition::new().equal(4), Order::Asc).unwrap();
        assert!(equal4.is_empty());

        let gt3 = tree.where_(&Condition::new().gt(3), Order::Asc).unwrap();
        let values: Vec<i32> = gt3.into_iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec![5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn scenario_s4_not_equal() {
        let tree = build_tree(4);
        tree.insert('a', 1).unwrap();
        tree.insert('b', 2).unwrap();
        tree.insert('c', 3).unwrap();
        tree.commit(None).unwrap();

        let result = tree.where_(&Condition::new().not_equal(2), Order::Asc).unwrap();
        let mut expected = BTreeMap::new();
        expected.insert('a', 1);
        expected.insert('c', 3);
        assert_eq!(result, expected);
    }

    #[test]
    fn scenario_s6_persisted_backend_50_inserts_order_6() {
        let tree = build_tree(6);
        for i in 1..=49 {
            tree.insert(format!("k{}", i), i).unwrap();
        }
        tree.commit(None).unwrap();

        for i in (3..=49).step_by(3) {
            tree.delete(format!("k{}", i), i).unwrap();
        }
        tree.commit(None).unwrap();

        for i in (3..=49).step_by(3) {
            let result = tree.where_(&Condition::new().equal(i), Order::Asc).unwrap();
            assert!(result.is_empty(), "expected {} to be gone", i);
        }

        tree.set_head_data(()).unwrap();
        assert_eq!(tree.head_data().unwrap(), ());
    }

    #[test]
    fn rollback_discards_uncommitted_inserts() {
        let tree = build_tree(4);
        tree.insert("a".to_string(), 1).unwrap();
        tree.rollback();
        assert_eq!(tree.get(&"a".to_string()).unwrap(), None);
    }

    #[test]
    fn delete_of_missing_pair_is_a_noop() {
        let tree = build_tree(4);
        tree.insert("a".to_string(), 1).unwrap();
        tree.commit(None).unwrap();
        tree.delete("z".to_string(), 99).unwrap();
        assert_eq!(tree.get(&"a".to_string()).unwrap(), Some(1));
    }
}
