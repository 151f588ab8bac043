//! B+Tree internal page: header + `(key, child_page_id)` pairs.
//!
//! Key 0 is a dummy, never compared; a lookup binary-searches `[1, size)`.
//! `child_at(i)` is the subtree holding keys in `[key_at(i), key_at(i+1))`
//! (unbounded below at `i == 0`, unbounded above at `i == size - 1`).

use super::b_plus_tree_page as hdr;
use crate::types::{BPlusTreePageType, PageId, PAGE_SIZE};
use std::cmp::Ordering;

const PAIR_CHILD_SIZE: usize = 4;

pub struct InternalPageView<'a> {
    data: &'a mut [u8; PAGE_SIZE],
}

impl<'a> InternalPageView<'a> {
    pub fn new(data: &'a mut [u8; PAGE_SIZE]) -> Self {
        Self { data }
    }

    pub fn init(&mut self, page_id: PageId, parent: PageId, max_size: u32, key_size: u32) {
        self.data.fill(0);
        hdr::set_page_type(self.data, BPlusTreePageType::Internal);
        hdr::set_size(self.data, 0);
        hdr::set_max_size(self.data, max_size);
        hdr::set_parent_page_id(self.data, parent);
        hdr::set_page_id(self.data, page_id);
        hdr::set_key_size(self.data, key_size);
    }

    pub fn page_id(&self) -> PageId {
        hdr::page_id(self.data)
    }

    pub fn parent_page_id(&self) -> PageId {
        hdr::parent_page_id(self.data)
    }

    pub fn set_parent_page_id(&mut self, id: PageId) {
        hdr::set_parent_page_id(self.data, id);
    }

    pub fn size(&self) -> u32 {
        hdr::size(self.data)
    }

    fn set_size(&mut self, v: u32) {
        hdr::set_size(self.data, v);
    }

    pub fn max_size(&self) -> u32 {
        hdr::max_size(self.data)
    }

    pub fn min_size(&self) -> u32 {
        hdr::min_size(self.data)
    }

    pub fn key_size(&self) -> u32 {
        hdr::key_size(self.data)
    }

    pub fn is_full(&self) -> bool {
        self.size() > self.max_size()
    }

    /// Usable `max_size` for an internal node of this key size: one pair
    /// fewer than the page's raw physical capacity. `insert_into_parent`
    /// writes the overflowing `(key, child)` pair into the page before
    /// checking whether it needs to split, and the page buffer has no
    /// slack beyond `PAGE_SIZE`, so the tree must never let a node fill to
    /// full capacity before that happens.
    pub fn max_entries(key_size: u32) -> u32 {
        let pair_size = key_size as usize + PAIR_CHILD_SIZE;
        ((PAGE_SIZE - hdr::HEADER_SIZE) / pair_size) as u32 - 1
    }

    fn pair_size(&self) -> usize {
        self.key_size() as usize + PAIR_CHILD_SIZE
    }

    fn pair_offset(&self, index: u32) -> usize {
        hdr::HEADER_SIZE + index as usize * self.pair_size()
    }

    pub fn key_at(&self, index: u32) -> &[u8] {
        let off = self.pair_offset(index);
        let ks = self.key_size() as usize;
        &self.data[off..off + ks]
    }

    fn set_key_at(&mut self, index: u32, key: &[u8]) {
        let off = self.pair_offset(index);
        let ks = self.key_size() as usize;
        self.data[off..off + ks].copy_from_slice(key);
    }

    pub fn child_at(&self, index: u32) -> PageId {
        let off = self.pair_offset(index) + self.key_size() as usize;
        PageId::new(i32::from_le_bytes(self.data[off..off + 4].try_into().unwrap()))
    }

    fn set_child_at(&mut self, index: u32, child: PageId) {
        let off = self.pair_offset(index) + self.key_size() as usize;
        self.data[off..off + 4].copy_from_slice(&child.value().to_le_bytes());
    }

    /// Populate a brand-new root with two children and one separator key.
    pub fn populate_new_root(&mut self, old_child: PageId, key: &[u8], new_child: PageId) {
        self.set_size(2);
        self.set_child_at(0, old_child);
        self.set_key_at(1, key);
        self.set_child_at(1, new_child);
    }

    /// Index of `child`, or `None` if not present.
    pub fn value_index(&self, child: PageId) -> Option<u32> {
        (0..self.size()).find(|&i| self.child_at(i) == child)
    }

    /// Overwrite the separator key at `index` in place (used when a
    /// redistribution shifts the boundary between two siblings).
    pub fn set_separator_key(&mut self, index: u32, key: &[u8]) {
        self.set_key_at(index, key);
    }

    /// Replace this (freshly `init`ed) page's contents with `pairs` in
    /// order. Pair 0's key is a placeholder and never compared.
    pub fn load_pairs(&mut self, pairs: &[(Vec<u8>, PageId)]) {
        self.set_size(pairs.len() as u32);
        for (i, (key, child)) in pairs.iter().enumerate() {
            self.set_key_at(i as u32, key);
            self.set_child_at(i as u32, *child);
        }
    }

    /// Binary search `[1, size)` for `key` using `cmp`; returns the child
    /// that should hold it.
    pub fn lookup(&self, key: &[u8], mut cmp: impl FnMut(&[u8], &[u8]) -> Ordering) -> PageId {
        let size = self.size();
        if size == 0 {
            return PageId::INVALID;
        }
        let mut lo = 1u32;
        let mut hi = size;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if cmp(self.key_at(mid), key) == Ordering::Greater {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        // `lo` is the first index whose key is > key; the answer is child
        // at lo - 1.
        self.child_at(lo - 1)
    }

    /// Insert `(key, child)` immediately after `after_child`. Caller is
    /// responsible for checking the page isn't already full.
    pub fn insert_after(&mut self, after_child: PageId, key: &[u8], child: PageId) {
        let at = self.value_index(after_child).expect("after_child must be present") + 1;
        let size = self.size();
        for i in (at..size).rev() {
            let k = self.key_at(i).to_vec();
            let c = self.child_at(i);
            self.set_key_at(i + 1, &k);
            self.set_child_at(i + 1, c);
        }
        self.set_key_at(at, key);
        self.set_child_at(at, child);
        self.set_size(size + 1);
    }

    /// Remove the pair at `index` (which must be >= 1).
    pub fn remove_at(&mut self, index: u32) {
        let size = self.size();
        for i in index..size - 1 {
            let k = self.key_at(i + 1).to_vec();
            let c = self.child_at(i + 1);
            self.set_key_at(i, &k);
            self.set_child_at(i, c);
        }
        self.set_size(size - 1);
    }

    /// Move the first `count` pairs of `src` onto the end of `self`
    /// (used when merging `src` into `self`, `src` being the right
    /// sibling). `first_key` replaces the dummy key of the moved pair 0.
    pub fn append_from(&mut self, src: &InternalPageView<'_>, first_key: &[u8]) {
        let my_size = self.size();
        let src_size = src.size();
        for i in 0..src_size {
            let key = if i == 0 { first_key } else { src.key_at(i) };
            self.set_key_at(my_size + i, key);
            self.set_child_at(my_size + i, src.child_at(i));
        }
        self.set_size(my_size + src_size);
    }

    /// Move the last pair of `self` to the front of `recipient` (used for
    /// right-to-left redistribution when `recipient` is the left
    /// sibling receiving from this, the right sibling). `parent_key`
    /// becomes the separator the parent already holds for `recipient`;
    /// returns the new separator key the parent must store for `self`.
    pub fn pop_front_to(&mut self, recipient: &mut InternalPageView<'_>, parent_key: &[u8]) -> Vec<u8> {
        let moved_child = self.child_at(0);
        let new_first_key = self.key_at(1).to_vec();
        self.remove_at(0);
        // after remove_at(0), what was index 1 is now index 0; overwrite
        // its key with a dummy marker (unused in comparisons).
        let dummy = vec![0u8; self.key_size() as usize];
        self.set_key_at(0, &dummy);

        let r_size = recipient.size();
        recipient.set_key_at(r_size, parent_key);
        recipient.set_child_at(r_size, moved_child);
        recipient.set_size(r_size + 1);
        new_first_key
    }

    /// Move the last pair of `self` (the left sibling) onto the front of
    /// `recipient` (the right sibling), shifting `recipient`'s existing
    /// pairs over by one. `parent_key` becomes the separator `recipient`
    /// stores between the moved child and its own former first child;
    /// returns the new separator the parent must store between `self`
    /// and `recipient`.
    pub fn pop_back_to(&mut self, recipient: &mut InternalPageView<'_>, parent_key: &[u8]) -> Vec<u8> {
        let last = self.size() - 1;
        let moved_child = self.child_at(last);
        let new_last_key = self.key_at(last).to_vec();
        self.remove_at(last);

        let r_size = recipient.size();
        for i in (0..r_size).rev() {
            let k = recipient.key_at(i).to_vec();
            let c = recipient.child_at(i);
            recipient.set_key_at(i + 1, &k);
            recipient.set_child_at(i + 1, c);
        }
        let dummy = vec![0u8; recipient.key_size() as usize];
        recipient.set_key_at(0, &dummy);
        recipient.set_child_at(0, moved_child);
        recipient.set_key_at(1, parent_key);
        recipient.set_size(r_size + 1);
        new_last_key
    }

    pub fn all_pairs(&self) -> Vec<(Vec<u8>, PageId)> {
        (0..self.size())
            .map(|i| (self.key_at(i).to_vec(), self.child_at(i)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    #[test]
    fn root_of_two_children_lookup() {
        let mut buf = [0u8; PAGE_SIZE];
        let mut page = InternalPageView::new(&mut buf);
        page.init(PageId::new(0), PageId::INVALID, 4, 4);
        page.populate_new_root(PageId::new(1), &5i32.to_le_bytes(), PageId::new(2));

        assert_eq!(page.lookup(&3i32.to_le_bytes(), cmp), PageId::new(1));
        assert_eq!(page.lookup(&5i32.to_le_bytes(), cmp), PageId::new(2));
        assert_eq!(page.lookup(&9i32.to_le_bytes(), cmp), PageId::new(2));
    }

    #[test]
    fn insert_after_and_remove() {
        let mut buf = [0u8; PAGE_SIZE];
        let mut page = InternalPageView::new(&mut buf);
        page.init(PageId::new(0), PageId::INVALID, 4, 4);
        page.populate_new_root(PageId::new(1), &5i32.to_le_bytes(), PageId::new(2));
        page.insert_after(PageId::new(2), &9i32.to_le_bytes(), PageId::new(3));
        assert_eq!(page.size(), 3);
        assert_eq!(page.lookup(&9i32.to_le_bytes(), cmp), PageId::new(3));

        page.remove_at(1);
        assert_eq!(page.size(), 2);
        assert_eq!(page.lookup(&100i32.to_le_bytes(), cmp), PageId::new(3));
    }
}
