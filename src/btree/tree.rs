//! B+Tree index: search/insert/remove with split/merge/redistribute over
//! the buffer pool, keyed by a schema-aware `GenericKey`.

use crate::btree::key::KeyManager;
use crate::buffer::BufferPool;
use crate::error::{Result, StorageError};
use crate::page::{InternalPageView, LeafPageView};
use crate::types::{BPlusTreePageType, PageId, RowId};
use parking_lot::Mutex;
use std::sync::Arc;

/// A disk-backed B+Tree mapping `GenericKey` bytes to `RowId`s.
pub struct BPlusTree {
    buffer_pool: Arc<dyn BufferPool>,
    keys: KeyManager,
    root_page_id: Mutex<PageId>,
    leaf_max_size: u32,
    internal_max_size: u32,
}

impl BPlusTree {
    /// Build a tree over an empty or not-yet-created index.
    pub fn new(buffer_pool: Arc<dyn BufferPool>, keys: KeyManager) -> Self {
        Self::with_root(buffer_pool, keys, PageId::INVALID)
    }

    /// Load a tree whose root already exists (catalog reload path).
    pub fn with_root(buffer_pool: Arc<dyn BufferPool>, keys: KeyManager, root_page_id: PageId) -> Self {
        let key_size = keys.key_size() as u32;
        let leaf_max_size = LeafPageView::max_entries(key_size);
        let internal_max_size = InternalPageView::max_entries(key_size);
        Self {
            buffer_pool,
            keys,
            root_page_id: Mutex::new(root_page_id),
            leaf_max_size,
            internal_max_size,
        }
    }

    /// Build a tree with explicit, small max sizes so splits, merges, and
    /// redistribution can be exercised without inserting hundreds of real
    /// keys to reach the page-derived capacity.
    #[cfg(test)]
    pub(crate) fn with_max_sizes(buffer_pool: Arc<dyn BufferPool>, keys: KeyManager, leaf_max_size: u32, internal_max_size: u32) -> Self {
        Self {
            buffer_pool,
            keys,
            root_page_id: Mutex::new(PageId::INVALID),
            leaf_max_size,
            internal_max_size,
        }
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.lock()
    }

    pub fn is_empty(&self) -> bool {
        !self.root_page_id().is_valid()
    }

    fn cmp<'a>(&'a self) -> impl FnMut(&[u8], &[u8]) -> std::cmp::Ordering + 'a {
        move |a, b| self.keys.compare(a, b)
    }

    // ---- search -----------------------------------------------------

    pub fn get_value(&self, key: &[u8]) -> Result<Option<RowId>> {
        if self.is_empty() {
            return Ok(None);
        }
        let leaf_id = self.find_leaf(key)?;
        let guard = self.buffer_pool.fetch_page(leaf_id)?;
        let mut data = *guard.read();
        let leaf = LeafPageView::new(&mut data);
        match leaf.lookup(key, self.cmp()) {
            Ok(idx) => Ok(Some(leaf.value_at(idx))),
            Err(_) => Ok(None),
        }
    }

    /// Descend from the root to the leaf that should hold `key`. Each
    /// hop pins its node only long enough to read the child pointer;
    /// parents are unpinned before moving to children (no crabbing).
    fn find_leaf(&self, key: &[u8]) -> Result<PageId> {
        let mut current = self.root_page_id();
        loop {
            let guard = self.buffer_pool.fetch_page(current)?;
            let mut data = *guard.read();
            let page_type = crate::page::b_plus_tree_page_type(&data);
            drop(guard);
            match page_type {
                BPlusTreePageType::Leaf => return Ok(current),
                BPlusTreePageType::Internal => {
                    let internal = InternalPageView::new(&mut data);
                    current = internal.lookup(key, self.cmp());
                }
                BPlusTreePageType::Invalid => {
                    return Err(StorageError::corruption("invalid page type while descending tree"))
                }
            }
        }
    }

    // ---- insert -------------------------------------------------------

    pub fn insert(&self, key: &[u8], rid: RowId) -> Result<bool> {
        if self.is_empty() {
            self.start_new_tree(key, rid)?;
            return Ok(true);
        }

        let leaf_id = self.find_leaf(key)?;
        let needs_split = {
            let guard = self.buffer_pool.fetch_page(leaf_id)?;
            let mut data = *guard.read();
            let leaf = LeafPageView::new(&mut data);
            if leaf.lookup(key, self.cmp()).is_ok() {
                return Ok(false);
            }
            leaf.is_full()
        };

        if needs_split {
            self.insert_and_split_leaf(leaf_id, key, rid)?;
            return Ok(true);
        }

        let mut guard = self.buffer_pool.fetch_page_mut(leaf_id)?;
        let mut data = *guard.read();
        let mut leaf = LeafPageView::new(&mut data);
        let pos = leaf.lookup(key, self.cmp()).unwrap_err();
        leaf.insert_at(pos, key, rid);
        let new_size = leaf.size();
        *guard.write() = data;
        log::trace!("btree insert key into leaf {leaf_id}, size now {new_size}");
        Ok(true)
    }

    fn start_new_tree(&self, key: &[u8], rid: RowId) -> Result<()> {
        let (page_id, mut guard) = self.buffer_pool.new_page()?;
        let mut data = *guard.read();
        let mut leaf = LeafPageView::new(&mut data);
        leaf.init(page_id, PageId::INVALID, self.leaf_max_size, self.keys.key_size() as u32);
        leaf.insert_at(0, key, rid);
        *guard.write() = data;
        *self.root_page_id.lock() = page_id;
        log::info!("btree started new tree with root leaf {page_id}");
        Ok(())
    }

    /// Insert `(key, rid)` into `leaf_id`, which is already full, by
    /// splitting it and threading the new sibling into the leaf chain.
    fn insert_and_split_leaf(&self, leaf_id: PageId, key: &[u8], rid: RowId) -> Result<()> {
        let key_size = self.keys.key_size() as u32;
        let (new_id, mut new_guard) = self.buffer_pool.new_page()?;

        let (parent_id, first_key_of_new) = {
            let mut guard = self.buffer_pool.fetch_page_mut(leaf_id)?;
            let mut data = *guard.read();
            let mut leaf = LeafPageView::new(&mut data);

            let pos = leaf.lookup(key, self.cmp()).unwrap_err();
            leaf.insert_at(pos, key, rid);

            let mid = leaf.size() / 2;
            let moved: Vec<(Vec<u8>, RowId)> = (mid..leaf.size()).map(|i| (leaf.key_at(i).to_vec(), leaf.value_at(i))).collect();
            for i in (mid..leaf.size()).rev() {
                leaf.remove_at(i);
            }
            let old_next = leaf.next_page_id();
            leaf.set_next_page_id(new_id);
            let parent = leaf.parent_page_id();
            *guard.write() = data;
            drop(guard);

            let mut new_data = *new_guard.read();
            let mut new_leaf = LeafPageView::new(&mut new_data);
            new_leaf.init(new_id, parent, self.leaf_max_size, key_size);
            new_leaf.set_next_page_id(old_next);
            for (i, (k, v)) in moved.iter().enumerate() {
                new_leaf.insert_at(i as u32, k, *v);
            }
            let first_key = new_leaf.key_at(0).to_vec();
            *new_guard.write() = new_data;
            (parent, first_key)
        };
        drop(new_guard);

        self.insert_into_parent(leaf_id, parent_id, &first_key_of_new, new_id)
    }

    /// Attach `new_child` into `old_child`'s parent after `old_child`,
    /// splitting the parent recursively if it overflows. If `old_child`
    /// has no parent (it was the root), a fresh internal root is
    /// allocated.
    fn insert_into_parent(&self, old_child: PageId, parent_id: PageId, key: &[u8], new_child: PageId) -> Result<()> {
        let key_size = self.keys.key_size() as u32;

        if !parent_id.is_valid() {
            let (new_root_id, mut guard) = self.buffer_pool.new_page()?;
            let mut data = *guard.read();
            let mut root = InternalPageView::new(&mut data);
            root.init(new_root_id, PageId::INVALID, self.internal_max_size, key_size);
            root.populate_new_root(old_child, key, new_child);
            *guard.write() = data;
            drop(guard);

            self.set_parent(old_child, new_root_id)?;
            self.set_parent(new_child, new_root_id)?;
            *self.root_page_id.lock() = new_root_id;
            log::info!("btree grew a new root {new_root_id}");
            return Ok(());
        }

        let overflowed = {
            let mut guard = self.buffer_pool.fetch_page_mut(parent_id)?;
            let mut data = *guard.read();
            let mut parent = InternalPageView::new(&mut data);
            parent.insert_after(old_child, key, new_child);
            let over = parent.size() > self.internal_max_size;
            *guard.write() = data;
            over
        };
        self.set_parent(new_child, parent_id)?;

        if overflowed {
            self.split_internal(parent_id)?;
        }
        Ok(())
    }

    fn split_internal(&self, node_id: PageId) -> Result<()> {
        let key_size = self.keys.key_size() as u32;
        let (new_id, mut new_guard) = self.buffer_pool.new_page()?;

        let (parent_id, separator_key, moved_children) = {
            let mut guard = self.buffer_pool.fetch_page_mut(node_id)?;
            let mut data = *guard.read();
            let mut node = InternalPageView::new(&mut data);

            let mid = node.size() / 2;
            let separator = node.key_at(mid).to_vec();
            // moved pairs include the separator's own slot at index 0; its
            // key becomes a placeholder in the new node (the separator
            // itself moves up into the parent, not sideways).
            let moved: Vec<(Vec<u8>, PageId)> = (mid..node.size()).map(|i| (node.key_at(i).to_vec(), node.child_at(i))).collect();
            while node.size() > mid {
                node.remove_at(node.size() - 1);
            }
            let parent = node.parent_page_id();
            *guard.write() = data;
            (parent, separator, moved)
        };

        {
            let dummy = vec![0u8; key_size as usize];
            let mut load = moved_children.clone();
            load[0].0 = dummy;

            let mut new_data = *new_guard.read();
            let mut new_node = InternalPageView::new(&mut new_data);
            new_node.init(new_id, parent_id, self.internal_max_size, key_size);
            new_node.load_pairs(&load);
            *new_guard.write() = new_data;
        }
        drop(new_guard);

        for &(_, child) in &moved_children {
            self.set_parent(child, new_id)?;
        }

        self.insert_into_parent(node_id, parent_id, &separator_key, new_id)
    }

    fn set_parent(&self, child: PageId, parent: PageId) -> Result<()> {
        let mut guard = self.buffer_pool.fetch_page_mut(child)?;
        let mut data = *guard.read();
        let page_type = crate::page::b_plus_tree_page_type(&data);
        match page_type {
            BPlusTreePageType::Leaf => {
                let mut leaf = LeafPageView::new(&mut data);
                leaf.set_parent_page_id(parent);
            }
            BPlusTreePageType::Internal => {
                let mut internal = InternalPageView::new(&mut data);
                internal.set_parent_page_id(parent);
            }
            BPlusTreePageType::Invalid => return Err(StorageError::corruption("invalid child page type")),
        }
        *guard.write() = data;
        Ok(())
    }

    // ---- remove ---------------------------------------------------------

    pub fn remove(&self, key: &[u8]) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let leaf_id = self.find_leaf(key)?;
        let below_min = {
            let mut guard = self.buffer_pool.fetch_page_mut(leaf_id)?;
            let mut data = *guard.read();
            let mut leaf = LeafPageView::new(&mut data);
            let idx = match leaf.lookup(key, self.cmp()) {
                Ok(i) => i,
                Err(_) => return Ok(()),
            };
            leaf.remove_at(idx);
            let below = leaf.size() < leaf.min_size();
            *guard.write() = data;
            below
        };
        if below_min {
            self.coalesce_or_redistribute_leaf(leaf_id)?;
        }
        Ok(())
    }

    fn coalesce_or_redistribute_leaf(&self, node_id: PageId) -> Result<()> {
        if node_id == self.root_page_id() {
            return self.adjust_root();
        }

        let (parent_id, size, min_size, max_size) = {
            let guard = self.buffer_pool.fetch_page(node_id)?;
            let mut data = *guard.read();
            let leaf = LeafPageView::new(&mut data);
            (leaf.parent_page_id(), leaf.size(), leaf.min_size(), leaf.max_size())
        };
        let _ = max_size;
        if size >= min_size {
            return Ok(());
        }

        let (left_sibling, right_sibling, node_index) = self.siblings_of(parent_id, node_id)?;

        // try left first, then right, for coalesce; redistribute only if
        // neither can absorb.
        if let Some(left) = left_sibling {
            let can_merge = {
                let g1 = self.buffer_pool.fetch_page(left)?;
                let mut d1 = *g1.read();
                let l = LeafPageView::new(&mut d1);
                let g2 = self.buffer_pool.fetch_page(node_id)?;
                let mut d2 = *g2.read();
                let n = LeafPageView::new(&mut d2);
                l.size() + n.size() <= l.max_size()
            };
            if can_merge {
                return self.merge_leaves(left, node_id, parent_id);
            }
        }
        if let Some(right) = right_sibling {
            let can_merge = {
                let g1 = self.buffer_pool.fetch_page(node_id)?;
                let mut d1 = *g1.read();
                let n = LeafPageView::new(&mut d1);
                let g2 = self.buffer_pool.fetch_page(right)?;
                let mut d2 = *g2.read();
                let r = LeafPageView::new(&mut d2);
                n.size() + r.size() <= n.max_size()
            };
            if can_merge {
                return self.merge_leaves(node_id, right, parent_id);
            }
        }

        if let Some(left) = left_sibling {
            return self.redistribute_leaf_from_left(left, node_id, parent_id);
        }
        if let Some(right) = right_sibling {
            return self.redistribute_leaf_from_right(node_id, right, parent_id);
        }
        let _ = node_index;
        Ok(())
    }

    fn siblings_of(&self, parent_id: PageId, node_id: PageId) -> Result<(Option<PageId>, Option<PageId>, u32)> {
        let guard = self.buffer_pool.fetch_page(parent_id)?;
        let mut data = *guard.read();
        let parent = InternalPageView::new(&mut data);
        let idx = parent.value_index(node_id).ok_or_else(|| StorageError::corruption("node missing from parent"))?;
        let left = if idx > 0 { Some(parent.child_at(idx - 1)) } else { None };
        let right = if idx + 1 < parent.size() { Some(parent.child_at(idx + 1)) } else { None };
        Ok((left, right, idx))
    }

    fn merge_leaves(&self, left_id: PageId, right_id: PageId, parent_id: PageId) -> Result<()> {
        {
            let mut left_guard = self.buffer_pool.fetch_page_mut(left_id)?;
            let mut left_data = *left_guard.read();
            let mut left = LeafPageView::new(&mut left_data);

            let right_guard = self.buffer_pool.fetch_page(right_id)?;
            let mut right_data = *right_guard.read();
            let right = LeafPageView::new(&mut right_data);
            left.append_from(&right);
            *left_guard.write() = left_data;
        }
        self.buffer_pool.delete_page(right_id)?;

        let parent_below_min = {
            let mut guard = self.buffer_pool.fetch_page_mut(parent_id)?;
            let mut data = *guard.read();
            let mut parent = InternalPageView::new(&mut data);
            let idx = parent.value_index(right_id);
            if let Some(idx) = idx {
                parent.remove_at(idx);
            }
            let below = parent.size() < parent.min_size();
            *guard.write() = data;
            below
        };
        if parent_below_min {
            self.coalesce_or_redistribute_internal(parent_id)?;
        }
        Ok(())
    }

    fn redistribute_leaf_from_left(&self, left_id: PageId, node_id: PageId, parent_id: PageId) -> Result<()> {
        let new_key = {
            let mut left_guard = self.buffer_pool.fetch_page_mut(left_id)?;
            let mut left_data = *left_guard.read();
            let mut left = LeafPageView::new(&mut left_data);

            let mut node_guard = self.buffer_pool.fetch_page_mut(node_id)?;
            let mut node_data = *node_guard.read();
            let mut node = LeafPageView::new(&mut node_data);

            let key = left.pop_back_to(&mut node);
            *left_guard.write() = left_data;
            *node_guard.write() = node_data;
            key
        };
        let mut guard = self.buffer_pool.fetch_page_mut(parent_id)?;
        let mut data = *guard.read();
        let mut parent = InternalPageView::new(&mut data);
        if let Some(idx) = parent.value_index(node_id) {
            parent.set_separator_key(idx, &new_key);
        }
        *guard.write() = data;
        Ok(())
    }

    fn redistribute_leaf_from_right(&self, node_id: PageId, right_id: PageId, parent_id: PageId) -> Result<()> {
        let new_key = {
            let mut node_guard = self.buffer_pool.fetch_page_mut(node_id)?;
            let mut node_data = *node_guard.read();
            let mut node = LeafPageView::new(&mut node_data);

            let mut right_guard = self.buffer_pool.fetch_page_mut(right_id)?;
            let mut right_data = *right_guard.read();
            let mut right = LeafPageView::new(&mut right_data);

            let key = right.pop_front_to(&mut node);
            *node_guard.write() = node_data;
            *right_guard.write() = right_data;
            key
        };
        let mut guard = self.buffer_pool.fetch_page_mut(parent_id)?;
        let mut data = *guard.read();
        let mut parent = InternalPageView::new(&mut data);
        if let Some(idx) = parent.value_index(right_id) {
            parent.set_separator_key(idx, &new_key);
        }
        *guard.write() = data;
        Ok(())
    }

    fn coalesce_or_redistribute_internal(&self, node_id: PageId) -> Result<()> {
        if node_id == self.root_page_id() {
            return self.adjust_root();
        }

        let (parent_id, size, min_size) = {
            let guard = self.buffer_pool.fetch_page(node_id)?;
            let mut data = *guard.read();
            let node = InternalPageView::new(&mut data);
            (node.parent_page_id(), node.size(), node.min_size())
        };
        if size >= min_size {
            return Ok(());
        }

        let (left_sibling, right_sibling, _idx) = self.siblings_of(parent_id, node_id)?;

        if let Some(left) = left_sibling {
            let can_merge = {
                let g1 = self.buffer_pool.fetch_page(left)?;
                let mut d1 = *g1.read();
                let l = InternalPageView::new(&mut d1);
                let g2 = self.buffer_pool.fetch_page(node_id)?;
                let mut d2 = *g2.read();
                let n = InternalPageView::new(&mut d2);
                l.size() + n.size() <= l.max_size()
            };
            if can_merge {
                return self.merge_internal(left, node_id, parent_id);
            }
        }
        if let Some(right) = right_sibling {
            let can_merge = {
                let g1 = self.buffer_pool.fetch_page(node_id)?;
                let mut d1 = *g1.read();
                let n = InternalPageView::new(&mut d1);
                let g2 = self.buffer_pool.fetch_page(right)?;
                let mut d2 = *g2.read();
                let r = InternalPageView::new(&mut d2);
                n.size() + r.size() <= n.max_size()
            };
            if can_merge {
                return self.merge_internal(node_id, right, parent_id);
            }
        }

        if let Some(left) = left_sibling {
            return self.redistribute_internal_from_left(left, node_id, parent_id);
        }
        if let Some(right) = right_sibling {
            return self.redistribute_internal_from_right(node_id, right, parent_id);
        }
        Ok(())
    }

    fn merge_internal(&self, left_id: PageId, right_id: PageId, parent_id: PageId) -> Result<()> {
        let separator = {
            let guard = self.buffer_pool.fetch_page(parent_id)?;
            let mut data = *guard.read();
            let parent = InternalPageView::new(&mut data);
            let idx = parent.value_index(right_id).ok_or_else(|| StorageError::corruption("node missing from parent"))?;
            parent.key_at(idx).to_vec()
        };

        let moved_children = {
            let mut left_guard = self.buffer_pool.fetch_page_mut(left_id)?;
            let mut left_data = *left_guard.read();
            let mut left = InternalPageView::new(&mut left_data);

            let right_guard = self.buffer_pool.fetch_page(right_id)?;
            let mut right_data = *right_guard.read();
            let right = InternalPageView::new(&mut right_data);

            let children: Vec<PageId> = (0..right.size()).map(|i| right.child_at(i)).collect();
            left.append_from(&right, &separator);
            *left_guard.write() = left_data;
            children
        };
        for child in moved_children {
            self.set_parent(child, left_id)?;
        }
        self.buffer_pool.delete_page(right_id)?;

        let parent_below_min = {
            let mut guard = self.buffer_pool.fetch_page_mut(parent_id)?;
            let mut data = *guard.read();
            let mut parent = InternalPageView::new(&mut data);
            if let Some(idx) = parent.value_index(right_id) {
                parent.remove_at(idx);
            }
            let below = parent.size() < parent.min_size();
            *guard.write() = data;
            below
        };
        if parent_below_min {
            self.coalesce_or_redistribute_internal(parent_id)?;
        }
        Ok(())
    }

    fn redistribute_internal_from_left(&self, left_id: PageId, node_id: PageId, parent_id: PageId) -> Result<()> {
        let parent_key = {
            let guard = self.buffer_pool.fetch_page(parent_id)?;
            let mut data = *guard.read();
            let parent = InternalPageView::new(&mut data);
            let idx = parent.value_index(node_id).ok_or_else(|| StorageError::corruption("node missing from parent"))?;
            parent.key_at(idx).to_vec()
        };
        let (new_key, moved_child) = {
            let mut left_guard = self.buffer_pool.fetch_page_mut(left_id)?;
            let mut left_data = *left_guard.read();
            let mut left = InternalPageView::new(&mut left_data);

            let mut node_guard = self.buffer_pool.fetch_page_mut(node_id)?;
            let mut node_data = *node_guard.read();
            let mut node = InternalPageView::new(&mut node_data);

            let moved_child = left.child_at(left.size() - 1);
            let new_key = left.pop_back_to(&mut node, &parent_key);
            *left_guard.write() = left_data;
            *node_guard.write() = node_data;
            (new_key, moved_child)
        };
        self.set_parent(moved_child, node_id)?;

        let mut guard = self.buffer_pool.fetch_page_mut(parent_id)?;
        let mut data = *guard.read();
        let mut parent = InternalPageView::new(&mut data);
        if let Some(idx) = parent.value_index(node_id) {
            parent.set_separator_key(idx, &new_key);
        }
        *guard.write() = data;
        Ok(())
    }

    fn redistribute_internal_from_right(&self, node_id: PageId, right_id: PageId, parent_id: PageId) -> Result<()> {
        let parent_key = {
            let guard = self.buffer_pool.fetch_page(parent_id)?;
            let mut data = *guard.read();
            let parent = InternalPageView::new(&mut data);
            let idx = parent.value_index(right_id).ok_or_else(|| StorageError::corruption("node missing from parent"))?;
            parent.key_at(idx).to_vec()
        };
        let (new_key, moved_child) = {
            let mut right_guard = self.buffer_pool.fetch_page_mut(right_id)?;
            let mut right_data = *right_guard.read();
            let mut right = InternalPageView::new(&mut right_data);

            let mut node_guard = self.buffer_pool.fetch_page_mut(node_id)?;
            let mut node_data = *node_guard.read();
            let mut node = InternalPageView::new(&mut node_data);

            let moved_child = right.child_at(0);
            let new_key = right.pop_front_to(&mut node, &parent_key);
            *right_guard.write() = right_data;
            *node_guard.write() = node_data;
            (new_key, moved_child)
        };
        self.set_parent(moved_child, node_id)?;

        let mut guard = self.buffer_pool.fetch_page_mut(parent_id)?;
        let mut data = *guard.read();
        let mut parent = InternalPageView::new(&mut data);
        if let Some(idx) = parent.value_index(right_id) {
            parent.set_separator_key(idx, &new_key);
        }
        *guard.write() = data;
        Ok(())
    }

    /// Root shrank below minimum: promote the sole child of an internal
    /// root, or accept an empty leaf root as a valid empty tree.
    fn adjust_root(&self) -> Result<()> {
        let root_id = self.root_page_id();
        let (page_type, size) = {
            let guard = self.buffer_pool.fetch_page(root_id)?;
            let mut data = *guard.read();
            let t = crate::page::b_plus_tree_page_type(&data);
            let size = match t {
                BPlusTreePageType::Internal => InternalPageView::new(&mut data).size(),
                BPlusTreePageType::Leaf => LeafPageView::new(&mut data).size(),
                BPlusTreePageType::Invalid => 0,
            };
            (t, size)
        };

        match page_type {
            BPlusTreePageType::Internal if size == 1 => {
                let only_child = {
                    let guard = self.buffer_pool.fetch_page(root_id)?;
                    let mut data = *guard.read();
                    InternalPageView::new(&mut data).child_at(0)
                };
                self.set_parent(only_child, PageId::INVALID)?;
                self.buffer_pool.delete_page(root_id)?;
                *self.root_page_id.lock() = only_child;
                log::info!("btree root collapsed to {only_child}");
            }
            BPlusTreePageType::Leaf if size == 0 => {
                self.buffer_pool.delete_page(root_id)?;
                *self.root_page_id.lock() = PageId::INVALID;
                log::info!("btree is now empty");
            }
            _ => {}
        }
        Ok(())
    }

    // ---- destroy ------------------------------------------------------

    /// Walk the tree depth-first, deleting every page. Leaves the tree
    /// empty (`root_page_id == INVALID`).
    pub fn destroy(&self) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        self.destroy_subtree(self.root_page_id())?;
        *self.root_page_id.lock() = PageId::INVALID;
        Ok(())
    }

    fn destroy_subtree(&self, page_id: PageId) -> Result<()> {
        let children: Vec<PageId> = {
            let guard = self.buffer_pool.fetch_page(page_id)?;
            let mut data = *guard.read();
            match crate::page::b_plus_tree_page_type(&data) {
                BPlusTreePageType::Internal => {
                    let node = InternalPageView::new(&mut data);
                    (0..node.size()).map(|i| node.child_at(i)).collect()
                }
                _ => Vec::new(),
            }
        };
        for child in children {
            self.destroy_subtree(child)?;
        }
        self.buffer_pool.delete_page(page_id)
    }

    pub(crate) fn keys(&self) -> &KeyManager {
        &self.keys
    }

    pub(crate) fn buffer_pool(&self) -> &Arc<dyn BufferPool> {
        &self.buffer_pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolImpl;
    use crate::record::{Column, FieldType, Row, Schema};
    use crate::storage::DiskManagerImpl;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn tree_of(capacity: usize) -> (tempfile::TempDir, BPlusTree) {
        let dir = tempdir().unwrap();
        let dm = Arc::new(DiskManagerImpl::open(dir.path().join("t.db"), true).unwrap());
        let pool: Arc<dyn BufferPool> = Arc::new(BufferPoolImpl::new(dm, capacity));
        let schema = Arc::new(Schema::new(vec![Column::new("k", FieldType::Int32, 0, false, true)]));
        let keys = KeyManager::new(schema);
        (dir, BPlusTree::new(pool, keys))
    }

    /// Tree with a small, explicit `leaf_max`/`internal_max` so a handful
    /// of inserts is enough to force real splits/merges.
    fn small_tree_of(capacity: usize, leaf_max: u32, internal_max: u32) -> (tempfile::TempDir, BPlusTree) {
        let dir = tempdir().unwrap();
        let dm = Arc::new(DiskManagerImpl::open(dir.path().join("t.db"), true).unwrap());
        let pool: Arc<dyn BufferPool> = Arc::new(BufferPoolImpl::new(dm, capacity));
        let schema = Arc::new(Schema::new(vec![Column::new("k", FieldType::Int32, 0, false, true)]));
        let keys = KeyManager::new(schema);
        (dir, BPlusTree::with_max_sizes(pool, keys, leaf_max, internal_max))
    }

    fn root_page_type(tree: &BPlusTree) -> BPlusTreePageType {
        let guard = tree.buffer_pool().fetch_page(tree.root_page_id()).unwrap();
        let data = *guard.read();
        crate::page::b_plus_tree_page_type(&data)
    }

    fn key(tree: &BPlusTree, v: i32) -> Vec<u8> {
        tree.keys().encode(&Row::new(vec![crate::record::Field::Int32(v)]))
    }

    #[test]
    fn insert_and_get_single_key() {
        let (_dir, tree) = tree_of(16);
        let k = key(&tree, 1);
        assert!(tree.insert(&k, RowId::new(PageId::new(0), 1)).unwrap());
        assert_eq!(tree.get_value(&k).unwrap(), Some(RowId::new(PageId::new(0), 1)));
    }

    #[test]
    fn duplicate_insert_rejected() {
        let (_dir, tree) = tree_of(16);
        let k = key(&tree, 1);
        assert!(tree.insert(&k, RowId::new(PageId::new(0), 1)).unwrap());
        assert!(!tree.insert(&k, RowId::new(PageId::new(0), 2)).unwrap());
    }

    #[test]
    fn insert_many_keys_and_lookup_all() {
        let (_dir, tree) = tree_of(64);
        for i in 1..=40i32 {
            let k = key(&tree, i);
            assert!(tree.insert(&k, RowId::new(PageId::new(0), i as u32)).unwrap());
        }
        for i in 1..=40i32 {
            let k = key(&tree, i);
            assert_eq!(tree.get_value(&k).unwrap(), Some(RowId::new(PageId::new(0), i as u32)));
        }
    }

    #[test]
    fn small_max_forces_real_leaf_and_internal_splits() {
        let (_dir, tree) = small_tree_of(64, 4, 4);
        for i in 1..=10i32 {
            let k = key(&tree, i);
            assert!(tree.insert(&k, RowId::new(PageId::new(0), i as u32)).unwrap());
        }
        // ten keys at leaf_max=4 cannot fit in one leaf, and the resulting
        // leaf splits cannot fit in one internal_max=4 root either.
        assert_eq!(root_page_type(&tree), BPlusTreePageType::Internal);
        for i in 1..=10i32 {
            let k = key(&tree, i);
            assert_eq!(tree.get_value(&k).unwrap(), Some(RowId::new(PageId::new(0), i as u32)));
        }
        assert_eq!(tree.get_value(&key(&tree, 7)).unwrap(), Some(RowId::new(PageId::new(0), 7)));
    }

    #[test]
    fn small_max_forces_merge_on_delete() {
        let (_dir, tree) = small_tree_of(64, 4, 4);
        for i in 1..=10i32 {
            tree.insert(&key(&tree, i), RowId::new(PageId::new(0), i as u32)).unwrap();
        }
        assert_eq!(root_page_type(&tree), BPlusTreePageType::Internal);

        for i in [5, 6, 7, 8] {
            tree.remove(&key(&tree, i)).unwrap();
        }
        for i in [1, 2, 3, 4, 9, 10] {
            assert_eq!(tree.get_value(&key(&tree, i)).unwrap(), Some(RowId::new(PageId::new(0), i as u32)));
        }
        for i in [5, 6, 7, 8] {
            assert!(tree.get_value(&key(&tree, i)).unwrap().is_none());
        }
    }

    #[test]
    fn remove_then_reinsert() {
        let (_dir, tree) = tree_of(64);
        for i in 1..=20i32 {
            let k = key(&tree, i);
            tree.insert(&k, RowId::new(PageId::new(0), i as u32)).unwrap();
        }
        for i in [5, 6, 7, 8] {
            tree.remove(&key(&tree, i)).unwrap();
        }
        for i in [1, 2, 3, 4, 9, 10] {
            assert!(tree.get_value(&key(&tree, i)).unwrap().is_some());
        }
        for i in [5, 6, 7, 8] {
            assert!(tree.get_value(&key(&tree, i)).unwrap().is_none());
        }
    }

    #[test]
    fn destroy_empties_tree() {
        let (_dir, tree) = tree_of(64);
        for i in 1..=10i32 {
            tree.insert(&key(&tree, i), RowId::new(PageId::new(0), i as u32)).unwrap();
        }
        tree.destroy().unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn random_order_insert_and_delete_survives_splits_and_merges() {
        use rand::seq::SliceRandom;
        let (_dir, tree) = small_tree_of(64, 4, 4);

        let mut keys: Vec<i32> = (1..=60).collect();
        let mut rng = rand::thread_rng();
        keys.shuffle(&mut rng);
        for &i in &keys {
            assert!(tree.insert(&key(&tree, i), RowId::new(PageId::new(0), i as u32)).unwrap());
        }
        for &i in &keys {
            assert_eq!(tree.get_value(&key(&tree, i)).unwrap(), Some(RowId::new(PageId::new(0), i as u32)));
        }

        let mut to_remove = keys.clone();
        to_remove.shuffle(&mut rng);
        let (removed, kept) = to_remove.split_at(30);
        for &i in removed {
            tree.remove(&key(&tree, i)).unwrap();
        }
        for &i in removed {
            assert!(tree.get_value(&key(&tree, i)).unwrap().is_none());
        }
        for &i in kept {
            assert_eq!(tree.get_value(&key(&tree, i)).unwrap(), Some(RowId::new(PageId::new(0), i as u32)));
        }
    }
}
