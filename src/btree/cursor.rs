//! Ordered iteration over a B+Tree's leaf chain.
//!
//! An `IndexIterator` never holds a page pinned between steps: each
//! `next()` call pins exactly the one leaf it needs, reads out the
//! current pair, and releases the pin before returning. This trades a
//! little throughput for the invariant that an open iterator can never
//! starve the buffer pool or deadlock against a concurrent writer.

use crate::btree::tree::BPlusTree;
use crate::error::Result;
use crate::page::LeafPageView;
use crate::types::{PageId, RowId};

/// A forward cursor over `(key, RowId)` pairs in ascending key order.
pub struct IndexIterator<'a> {
    tree: &'a BPlusTree,
    leaf_id: PageId,
    slot: u32,
}

impl<'a> IndexIterator<'a> {
    /// Position at the first entry of the leftmost leaf.
    pub fn begin(tree: &'a BPlusTree) -> Result<Self> {
        if tree.is_empty() {
            return Ok(Self::end(tree));
        }
        let leaf_id = tree.leftmost_leaf()?;
        Ok(Self { tree, leaf_id, slot: 0 })
    }

    /// Position at the first entry whose key is `>= key`.
    pub fn seek(tree: &'a BPlusTree, key: &[u8]) -> Result<Self> {
        if tree.is_empty() {
            return Ok(Self::end(tree));
        }
        let (leaf_id, slot) = tree.seek_leaf(key)?;
        Ok(Self { tree, leaf_id, slot })
    }

    /// The sentinel "one past the end" position.
    pub fn end(tree: &'a BPlusTree) -> Self {
        Self {
            tree,
            leaf_id: PageId::INVALID,
            slot: 0,
        }
    }

    pub fn is_end(&self) -> bool {
        !self.leaf_id.is_valid()
    }

    /// Current `(key, row_id)` pair, or `None` at the end sentinel.
    pub fn current(&self) -> Result<Option<(Vec<u8>, RowId)>> {
        if self.is_end() {
            return Ok(None);
        }
        let guard = self.tree.buffer_pool().fetch_page(self.leaf_id)?;
        let mut data = *guard.read();
        let leaf = LeafPageView::new(&mut data);
        if self.slot >= leaf.size() {
            return Ok(None);
        }
        Ok(Some((leaf.key_at(self.slot).to_vec(), leaf.value_at(self.slot))))
    }

    /// Advance to the next entry, crossing into the next leaf via its
    /// `next_page_id` link when the current one is exhausted.
    pub fn advance(&mut self) -> Result<()> {
        if self.is_end() {
            return Ok(());
        }
        let (size, next_leaf) = {
            let guard = self.tree.buffer_pool().fetch_page(self.leaf_id)?;
            let mut data = *guard.read();
            let leaf = LeafPageView::new(&mut data);
            (leaf.size(), leaf.next_page_id())
        };
        if self.slot + 1 < size {
            self.slot += 1;
        } else if next_leaf.is_valid() {
            self.leaf_id = next_leaf;
            self.slot = 0;
        } else {
            self.leaf_id = PageId::INVALID;
            self.slot = 0;
        }
        Ok(())
    }
}

impl BPlusTree {
    fn leftmost_leaf(&self) -> Result<PageId> {
        let mut current = self.root_page_id();
        loop {
            let guard = self.buffer_pool().fetch_page(current)?;
            let mut data = *guard.read();
            match crate::page::b_plus_tree_page_type(&data) {
                crate::types::BPlusTreePageType::Leaf => return Ok(current),
                crate::types::BPlusTreePageType::Internal => {
                    let internal = crate::page::InternalPageView::new(&mut data);
                    current = internal.child_at(0);
                }
                crate::types::BPlusTreePageType::Invalid => {
                    return Err(crate::error::StorageError::corruption("invalid page type while descending to leftmost leaf"))
                }
            }
        }
    }

    /// Find the leaf and slot holding the smallest key `>= key`. If every
    /// key in the found leaf is smaller, the slot is the leaf's `size()`
    /// (one past its last entry) and the caller must cross to the next
    /// leaf to find the true successor.
    fn seek_leaf(&self, key: &[u8]) -> Result<(PageId, u32)> {
        let mut current = self.root_page_id();
        loop {
            let guard = self.buffer_pool().fetch_page(current)?;
            let mut data = *guard.read();
            match crate::page::b_plus_tree_page_type(&data) {
                crate::types::BPlusTreePageType::Leaf => {
                    let leaf = crate::page::LeafPageView::new(&mut data);
                    let slot = leaf.lookup(key, |a, b| self.keys().compare(a, b)).unwrap_or_else(|i| i);
                    if slot >= leaf.size() {
                        let next = leaf.next_page_id();
                        if next.is_valid() {
                            return Ok((next, 0));
                        }
                    }
                    return Ok((current, slot));
                }
                crate::types::BPlusTreePageType::Internal => {
                    let internal = crate::page::InternalPageView::new(&mut data);
                    current = internal.lookup(key, |a, b| self.keys().compare(a, b));
                }
                crate::types::BPlusTreePageType::Invalid => {
                    return Err(crate::error::StorageError::corruption("invalid page type while seeking"))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferPool, BufferPoolImpl};
    use crate::record::{Column, Field, FieldType, Row, Schema};
    use crate::storage::DiskManagerImpl;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn tree_of(capacity: usize) -> (tempfile::TempDir, BPlusTree) {
        let dir = tempdir().unwrap();
        let dm = Arc::new(DiskManagerImpl::open(dir.path().join("t.db"), true).unwrap());
        let pool: Arc<dyn BufferPool> = Arc::new(BufferPoolImpl::new(dm, capacity));
        let schema = Arc::new(Schema::new(vec![Column::new("k", FieldType::Int32, 0, false, true)]));
        let keys = crate::btree::key::KeyManager::new(schema);
        (dir, BPlusTree::new(pool, keys))
    }

    /// Tree with a small, explicit `leaf_max`/`internal_max` so a handful
    /// of inserts is enough to force real splits across leaves.
    fn small_tree_of(capacity: usize, leaf_max: u32, internal_max: u32) -> (tempfile::TempDir, BPlusTree) {
        let dir = tempdir().unwrap();
        let dm = Arc::new(DiskManagerImpl::open(dir.path().join("t.db"), true).unwrap());
        let pool: Arc<dyn BufferPool> = Arc::new(BufferPoolImpl::new(dm, capacity));
        let schema = Arc::new(Schema::new(vec![Column::new("k", FieldType::Int32, 0, false, true)]));
        let keys = crate::btree::key::KeyManager::new(schema);
        (dir, BPlusTree::with_max_sizes(pool, keys, leaf_max, internal_max))
    }

    fn key(tree: &BPlusTree, v: i32) -> Vec<u8> {
        tree.keys().encode(&Row::new(vec![Field::Int32(v)]))
    }

    #[test]
    fn iterates_in_ascending_order() {
        let (_dir, tree) = tree_of(64);
        for i in (1..=30i32).rev() {
            tree.insert(&key(&tree, i), RowId::new(PageId::new(0), i as u32)).unwrap();
        }

        let mut it = IndexIterator::begin(&tree).unwrap();
        let mut seen = Vec::new();
        while let Some((k, _rid)) = it.current().unwrap() {
            let row = tree.keys().decode(&k).unwrap();
            if let Field::Int32(v) = row.fields[0] {
                seen.push(v);
            }
            it.advance().unwrap();
        }
        assert_eq!(seen, (1..=30).collect::<Vec<_>>());
    }

    #[test]
    fn iterates_in_ascending_order_across_real_leaf_splits() {
        let (_dir, tree) = small_tree_of(64, 4, 4);
        for i in (1..=30i32).rev() {
            tree.insert(&key(&tree, i), RowId::new(PageId::new(0), i as u32)).unwrap();
        }

        let mut it = IndexIterator::begin(&tree).unwrap();
        let mut seen = Vec::new();
        while let Some((k, _rid)) = it.current().unwrap() {
            let row = tree.keys().decode(&k).unwrap();
            if let Field::Int32(v) = row.fields[0] {
                seen.push(v);
            }
            it.advance().unwrap();
        }
        assert_eq!(seen, (1..=30).collect::<Vec<_>>());
    }

    #[test]
    fn seek_positions_at_first_key_not_less() {
        let (_dir, tree) = tree_of(64);
        for i in [1, 3, 5, 7, 9] {
            tree.insert(&key(&tree, i), RowId::new(PageId::new(0), i as u32)).unwrap();
        }
        let it = IndexIterator::seek(&tree, &key(&tree, 4)).unwrap();
        let (k, _) = it.current().unwrap().unwrap();
        let row = tree.keys().decode(&k).unwrap();
        assert_eq!(row.fields[0], Field::Int32(5));
    }

    #[test]
    fn empty_tree_iterator_is_immediately_at_end() {
        let (_dir, tree) = tree_of(16);
        let it = IndexIterator::begin(&tree).unwrap();
        assert!(it.is_end());
    }

    #[test]
    fn range_scan_between_two_keys() {
        let (_dir, tree) = tree_of(64);
        for i in 1..=10i32 {
            tree.insert(&key(&tree, i), RowId::new(PageId::new(0), i as u32)).unwrap();
        }

        let mut it = IndexIterator::seek(&tree, &key(&tree, 3)).unwrap();
        let stop = key(&tree, 8);
        let mut seen = Vec::new();
        while let Some((k, rid)) = it.current().unwrap() {
            if tree.keys().compare(&k, &stop) != std::cmp::Ordering::Less {
                break;
            }
            seen.push(rid.slot_num as i32);
            it.advance().unwrap();
        }
        assert_eq!(seen, vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn range_scan_between_two_keys_across_real_leaf_splits() {
        let (_dir, tree) = small_tree_of(64, 4, 4);
        for i in 1..=10i32 {
            tree.insert(&key(&tree, i), RowId::new(PageId::new(0), i as u32)).unwrap();
        }

        assert_eq!(tree.get_value(&key(&tree, 7)).unwrap(), Some(RowId::new(PageId::new(0), 7)));

        let mut it = IndexIterator::seek(&tree, &key(&tree, 3)).unwrap();
        let stop = key(&tree, 8);
        let mut seen = Vec::new();
        while let Some((k, rid)) = it.current().unwrap() {
            if tree.keys().compare(&k, &stop) != std::cmp::Ordering::Less {
                break;
            }
            seen.push(rid.slot_num as i32);
            it.advance().unwrap();
        }
        assert_eq!(seen, vec![3, 4, 5, 6, 7]);
    }
}
