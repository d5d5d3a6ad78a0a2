// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Cooperative mirror of [`crate::tree`].
//!
//! Structurally parallel to the blocking engine: same function names, same
//! order of operations, `.await` inserted at exactly the points where a
//! [`crate::storage_async::AsyncStorage`] call or a leaf-chain read-ahead
//! would suspend. See `tree.rs` for the algorithms themselves; this file's
//! doc comments stay terse where the logic is identical.

use crate::algo::{
    can_merge_internal, can_merge_leaves, descend_index, internal_min_children, leaf_min_values, leaf_slot_search,
    split_mid, DescentMode,
};
use crate::cache::LruCache;
use crate::comparator::Comparator;
use crate::error::{IxError, IxResult};
use crate::metrics::MetricsCollector;
use crate::mvcc::CommitReport;
use crate::mvcc_async::AsyncOverlay;
use crate::node::{Bucket, Head, Node, NodeId, NodeKeys};
use crate::options::Options;
use crate::pattern::PatternCache;
use crate::query::condition::{Condition, Order};
use crate::query::executor_async::{AsyncLeafSource, AsyncScan};
use crate::storage_async::AsyncStorage;
use crate::tree::PendingEntries;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::hash::Hash;

fn structural(detail: impl Into<String>) -> IxError {
    IxError::StructuralInconsistency { detail: detail.into() }
}

/// Cooperative mirror of [`crate::tree::Tree`].
pub struct AsyncTree<K, V, D, C, S> {
    overlay: AsyncOverlay<K, V, D, S>,
    comparator: C,
    cache: RefCell<LruCache<NodeId, Node<K, V>>>,
    patterns: RefCell<PatternCache>,
    options: Options,
}

impl<K, V, D, C, S> AsyncTree<K, V, D, C, S>
where
    K: Clone + Ord,
    V: Clone,
    D: Clone,
    C: Comparator<V>,
    S: AsyncStorage<K, V, D>,
{
    pub async fn init(storage: S, comparator: C, options: Options, order: u32, default_data: D) -> IxResult<Self> {
        let overlay = AsyncOverlay::new(storage);
        let existing_head = overlay.read_head().await?;
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
            let root_id = tree.overlay.id(true).await?;
            let root = Node::new_leaf(root_id.clone(), None);
            tree.create_node(root)?;
            tree.overlay.write_head(Head {
                root: root_id,
                order,
                data: default_data,
            });
            tree.commit(Some("init")).await?;
        }

        Ok(tree)
    }

    pub fn options(&self) -> Options {
        self.options
    }

    async fn root_id(&self) -> IxResult<NodeId> {
        Ok(self.overlay.read_head().await?.ok_or(IxError::MissingHead)?.root)
    }

    async fn order(&self) -> IxResult<u32> {
        Ok(self.overlay.read_head().await?.ok_or(IxError::MissingHead)?.order)
    }

    async fn set_root(&self, root: NodeId) -> IxResult<()> {
        let head = self.overlay.read_head().await?.ok_or(IxError::MissingHead)?;
        self.overlay.write_head(Head {
            root,
            order: head.order,
            data: head.data,
        });
        Ok(())
    }

    async fn read_node(&self, id: &NodeId) -> IxResult<Node<K, V>> {
        if let Some(node) = self.cache.borrow_mut().get(id) {
            MetricsCollector::global().record_cache_hit();
            return Ok(node.clone());
        }
        MetricsCollector::global().record_cache_miss();
        let node = self
            .overlay
            .read(id)
            .await?
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

    async fn descend(&self, target: &V, mode: DescentMode) -> IxResult<NodeId> {
        let mut node_id = self.root_id().await?;
        loop {
            let node = self.read_node(&node_id).await?;
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

    async fn leftmost_leaf_id(&self) -> IxResult<NodeId> {
        let mut node_id = self.root_id().await?;
        loop {
            let node = self.read_node(&node_id).await?;
            if node.leaf {
                return Ok(node_id);
            }
            node_id = node
                .child_id(0)
                .cloned()
                .ok_or_else(|| structural("internal node has no children"))?;
        }
    }

    async fn rightmost_leaf_id(&self) -> IxResult<NodeId> {
        let mut node_id = self.root_id().await?;
        loop {
            let node = self.read_node(&node_id).await?;
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

    pub async fn insert(&self, k: K, v: V) -> IxResult<()> {
        let leaf_id = self.descend(&v, DescentMode::Insertion).await?;
        let mut leaf = self.read_node(&leaf_id).await?;
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
                let order = self.order().await?;
                if leaf.value_count() as u32 == order {
                    self.split_leaf(leaf).await
                } else {
                    self.write_node(leaf)
                }
            }
        }
    }

    async fn split_leaf(&self, mut leaf: Node<K, V>) -> IxResult<()> {
        let order = self.order().await?;
        let mid = split_mid(order);
        let right_id = self.overlay.id(true).await?;

        let mut right = Node::new_leaf(right_id.clone(), leaf.parent.clone());
        right.values = leaf.values.split_off(mid + 1);
        right.keys = leaf.keys.split_off(mid + 1);
        right.next = leaf.next.clone();
        right.prev = Some(leaf.id.clone());
        leaf.next = Some(right.id.clone());

        if let Some(old_next_id) = right.next.clone() {
            let mut old_next = self.read_node(&old_next_id).await?;
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
        self.insert_in_parent(&left_id, separator, right).await
    }

    async fn insert_in_parent(&self, n_id: &NodeId, separator: V, p: Node<K, V>) -> IxResult<()> {
        let n = self.read_node(n_id).await?;
        match n.parent.clone() {
            None => {
                let root_id = self.overlay.id(false).await?;
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
                self.set_root(root_id).await
            }
            Some(parent_id) => {
                let mut parent = self.read_node(&parent_id).await?;
                let node_index = parent
                    .child_index(n_id)
                    .ok_or_else(|| structural("split child not found in its claimed parent"))?;
                parent.values.insert(node_index, separator);
                parent.keys.insert(node_index + 1, NodeKeys::Child(p.id.clone()));

                let mut p = p;
                p.parent = Some(parent_id.clone());
                self.create_node(p)?;

                let order = self.order().await?;
                if parent.child_count() as u32 > order {
                    self.split_internal(parent).await
                } else {
                    self.write_node(parent)
                }
            }
        }
    }

    async fn split_internal(&self, mut parent: Node<K, V>) -> IxResult<()> {
        let order = self.order().await?;
        let mid = split_mid(order);
        let promote = parent
            .values
            .get(mid)
            .cloned()
            .ok_or_else(|| structural("overflowing internal node has no middle separator"))?;

        let right_id = self.overlay.id(false).await?;
        let mut right = Node::new_internal(right_id.clone(), parent.parent.clone());
        right.values = parent.values.split_off(mid + 1);
        right.keys = parent.keys.split_off(mid + 1);
        parent.values.pop();

        for key in right.keys.clone() {
            if let Some(child_id) = key.as_child() {
                let mut child = self.read_node(child_id).await?;
                child.parent = Some(right.id.clone());
                self.write_node(child)?;
            }
        }

        let left_id = parent.id.clone();
        self.write_node(parent)?;
        self.create_node(right.clone())?;
        self.insert_in_parent(&left_id, promote, right).await
    }

    pub async fn delete(&self, k: K, v: V) -> IxResult<()> {
        let mut leaf_id = self.descend(&v, DescentMode::PrimaryOnly).await?;
        loop {
            let leaf = self.read_node(&leaf_id).await?;
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
                    return self.delete_entry(id, None).await;
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

    async fn delete_entry(&self, node_id: NodeId, removed_child: Option<NodeId>) -> IxResult<()> {
        let mut node = self.read_node(&node_id).await?;

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
                let mut child = self.read_node(&only_child_id).await?;
                child.parent = None;
                self.write_node(child)?;
                self.delete_node(&node.id)?;
                return self.set_root(only_child_id).await;
            }
            return self.write_node(node);
        }

        let order = self.order().await?;
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
        let parent = self.read_node(&parent_id).await?;
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
            let left = self.read_node(left_id).await?;
            if self.can_merge(&left, &node, order) {
                return self.merge_into_left(left_id, &node.id, &parent).await;
            }
        }
        if let Some(right_id) = &right_sibling {
            let right = self.read_node(right_id).await?;
            if self.can_merge(&node, &right, order) {
                return self.merge_into_left(&node.id, right_id, &parent).await;
            }
        }
        if let Some(left_id) = &left_sibling {
            return self.borrow_from_left(left_id, &node.id, &parent_id).await;
        }
        if let Some(right_id) = &right_sibling {
            return self.borrow_from_right(&node.id, right_id, &parent_id).await;
        }

        Ok(())
    }

    async fn merge_into_left(&self, left_id: &NodeId, right_id: &NodeId, parent: &Node<K, V>) -> IxResult<()> {
        let mut left = self.read_node(left_id).await?;
        let right = self.read_node(right_id).await?;

        if left.leaf {
            left.values.extend(right.values.clone());
            left.keys.extend(right.keys.clone());
            left.next = right.next.clone();
            if let Some(next_id) = left.next.clone() {
                let mut next_node = self.read_node(&next_id).await?;
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
                    let mut child = self.read_node(child_id).await?;
                    child.parent = Some(left.id.clone());
                    self.write_node(child)?;
                }
            }
        }

        self.write_node(left)?;
        self.delete_node(right_id)?;
        self.delete_entry(parent.id.clone(), Some(right_id.clone())).await
    }

    async fn borrow_from_left(&self, left_id: &NodeId, node_id: &NodeId, parent_id: &NodeId) -> IxResult<()> {
        let mut left = self.read_node(left_id).await?;
        let mut node = self.read_node(node_id).await?;
        let mut parent = self.read_node(parent_id).await?;
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
                let mut child = self.read_node(child_id).await?;
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

    async fn borrow_from_right(&self, node_id: &NodeId, right_id: &NodeId, parent_id: &NodeId) -> IxResult<()> {
        let mut node = self.read_node(node_id).await?;
        let mut right = self.read_node(right_id).await?;
        let mut parent = self.read_node(parent_id).await?;
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
                let mut child = self.read_node(child_id).await?;
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

    pub async fn exists(&self, k: &K, v: &V) -> IxResult<bool> {
        let leaf_id = self.descend(v, DescentMode::Insertion).await?;
        let leaf = self.read_node(&leaf_id).await?;
        match leaf_slot_search(&leaf.values, v, &self.comparator) {
            Ok(index) => Ok(leaf.bucket(index).map(|bucket| bucket.contains(k)).unwrap_or(false)),
            Err(_) => Ok(false),
        }
    }

    pub async fn get(&self, k: &K) -> IxResult<Option<V>> {
        let mut current = Some(self.leftmost_leaf_id().await?);
        while let Some(id) = current {
            let node = self.read_node(&id).await?;
            for (index, value) in node.values.iter().enumerate() {
                if node.bucket(index).map(|bucket| bucket.contains(k)).unwrap_or(false) {
                    return Ok(Some(value.clone()));
                }
            }
            current = node.next.clone();
        }
        Ok(None)
    }

    /// Builds a cooperative pair stream; drive it with `while let Some(pair)
    /// = scan.next().await`.
    pub async fn stream<'a>(
        &'a self,
        condition: &Condition<V>,
        order: Order,
        limit: Option<usize>,
    ) -> IxResult<AsyncScan<'a, K, V, D, Self>> {
        AsyncScan::new(self, condition, order, limit).await
    }

    pub async fn where_(&self, condition: &Condition<V>, order: Order) -> IxResult<BTreeMap<K, V>> {
        let mut scan = self.stream(condition, order, None).await?;
        let mut result = BTreeMap::new();
        while let Some(pair) = scan.next().await {
            let (k, v) = pair?;
            result.insert(k, v);
        }
        Ok(result)
    }

    pub async fn keys(&self, condition: &Condition<V>, filter: Option<&HashSet<K>>, order: Order) -> IxResult<BTreeSet<K>>
    where
        K: Hash + Eq,
    {
        let pairs = self.where_(condition, order).await?;
        Ok(pairs
            .into_keys()
            .filter(|k| filter.map(|set| set.contains(k)).unwrap_or(true))
            .collect())
    }

    pub async fn set_head_data(&self, data: D) -> IxResult<()> {
        let head = self.overlay.read_head().await?.ok_or(IxError::MissingHead)?;
        self.overlay.write_head(Head {
            root: head.root,
            order: head.order,
            data,
        });
        Ok(())
    }

    pub async fn head_data(&self) -> IxResult<D> {
        Ok(self.overlay.read_head().await?.ok_or(IxError::MissingHead)?.data)
    }

    pub async fn force_update(&self, id: Option<&NodeId>) -> IxResult<()> {
        match id {
            Some(id) => {
                self.cache.borrow_mut().remove(id);
                self.read_node(id).await?;
            }
            None => {
                self.cache.borrow_mut().clear();
            }
        }
        Ok(())
    }

    pub async fn commit(&self, label: Option<&str>) -> IxResult<CommitReport> {
        self.overlay.commit(label).await
    }

    pub fn rollback(&self) -> CommitReport {
        self.overlay.rollback()
    }

    pub fn result_entries(&self) -> PendingEntries {
        let (created, updated, deleted) = self.overlay.pending_counts();
        PendingEntries { created, updated, deleted }
    }

    pub fn clear(&self) {
        self.cache.borrow_mut().clear();
        self.patterns.borrow_mut().clear();
    }
}

impl<K, V, D, C, S> AsyncLeafSource<K, V, D> for AsyncTree<K, V, D, C, S>
where
    K: Clone + Ord + Send + Sync,
    V: Clone + Send + Sync,
    D: Clone + Send + Sync,
    C: Comparator<V>,
    S: AsyncStorage<K, V, D>,
{
    fn comparator(&self) -> &dyn Comparator<V> {
        &self.comparator
    }

    fn patterns(&self) -> &RefCell<PatternCache> {
        &self.patterns
    }

    async fn leftmost_leaf(&self) -> IxResult<Option<NodeId>> {
        self.leftmost_leaf_id().await.map(Some)
    }

    async fn rightmost_leaf(&self) -> IxResult<Option<NodeId>> {
        self.rightmost_leaf_id().await.map(Some)
    }

    async fn descend_to_leaf(&self, target: &V, mode: DescentMode) -> IxResult<Option<NodeId>> {
        self.descend(target, mode).await.map(Some)
    }

    async fn read_leaf(&self, id: &NodeId) -> IxResult<Node<K, V>> {
        self.read_node(id).await
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

    type TestTree = AsyncTree<String, i32, (), NaturalComparator, MemoryStorage<String, i32, ()>>;

    async fn build_tree(order: u32) -> TestTree {
        let storage: MemoryStorage<String, i32, ()> = MemoryStorage::new();
        AsyncTree::init(storage, NaturalComparator, Options::default(), order, ()).await.unwrap()
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let tree = build_tree(4).await;
        tree.insert("a".to_string(), 1).await.unwrap();
        tree.insert("b".to_string(), 2).await.unwrap();
        tree.commit(None).await.unwrap();

        assert_eq!(tree.get(&"a".to_string()).await.unwrap(), Some(1));
        assert_eq!(tree.get(&"z".to_string()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn split_and_delete_converge_like_the_blocking_engine() {
        let tree = build_tree(4).await;
        for i in 1..=10 {
            let key = (('a' as u8 + i as u8 - 1) as char).to_string();
            tree.insert(key, i).await.unwrap();
        }
        tree.commit(None).await.unwrap();

        tree.delete("d".to_string(), 4).await.unwrap();
        tree.commit(None).await.unwrap();

        assert_eq!(tree.get(&"d".to_string()).await.unwrap(), None);
        let gt3 = tree.where_(&Condition::new().gt(3), Order::Asc).await.unwrap();
        let values: Vec<i32> = gt3.into_values().collect();
        assert_eq!(values, vec![5, 6, 7, 8, 9, 10]);
    }

    #[tokio::test]
    async fn rollback_discards_uncommitted_inserts() {
        let tree = build_tree(4).await;
        tree.insert("a".to_string(), 1).await.unwrap();
        tree.rollback();
        assert_eq!(tree.get(&"a".to_string()).await.unwrap(), None);
    }
}
