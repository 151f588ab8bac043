//! B+Tree leaf page: header + `(key, row_id)` pairs + `next_page_id`
//! threading. Unlike internal pages, every key participates in
//! comparisons.

use super::b_plus_tree_page as hdr;
use crate::types::{BPlusTreePageType, PageId, RowId, PAGE_SIZE};
use std::cmp::Ordering;

const VALUE_SIZE: usize = 8; // RowId: page_id(i32) + slot_num(u32)

pub struct LeafPageView<'a> {
    data: &'a mut [u8; PAGE_SIZE],
}

impl<'a> LeafPageView<'a> {
    pub fn new(data: &'a mut [u8; PAGE_SIZE]) -> Self {
        Self { data }
    }

    pub fn init(&mut self, page_id: PageId, parent: PageId, max_size: u32, key_size: u32) {
        self.data.fill(0);
        hdr::set_page_type(self.data, BPlusTreePageType::Leaf);
        hdr::set_size(self.data, 0);
        hdr::set_max_size(self.data, max_size);
        hdr::set_parent_page_id(self.data, parent);
        hdr::set_page_id(self.data, page_id);
        hdr::set_key_size(self.data, key_size);
        self.set_next_page_id(PageId::INVALID);
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
        self.size() >= self.max_size()
    }

    /// Usable `max_size` for a leaf of this key size: one pair fewer than
    /// the page's raw physical capacity. The insert path writes the
    /// overflowing pair into the page before splitting it out, and the
    /// page buffer has no slack beyond `PAGE_SIZE`, so the tree must never
    /// let a leaf fill to full capacity before that happens.
    pub fn max_entries(key_size: u32) -> u32 {
        let pair_size = key_size as usize + VALUE_SIZE;
        ((PAGE_SIZE - hdr::LEAF_HEADER_SIZE) / pair_size) as u32 - 1
    }

    pub fn next_page_id(&self) -> PageId {
        PageId::new(i32::from_le_bytes(
            self.data[hdr::HEADER_SIZE..hdr::HEADER_SIZE + 4].try_into().unwrap(),
        ))
    }

    pub fn set_next_page_id(&mut self, id: PageId) {
        self.data[hdr::HEADER_SIZE..hdr::HEADER_SIZE + 4].copy_from_slice(&id.value().to_le_bytes());
    }

    fn pair_size(&self) -> usize {
        self.key_size() as usize + VALUE_SIZE
    }

    fn pair_offset(&self, index: u32) -> usize {
        hdr::LEAF_HEADER_SIZE + index as usize * self.pair_size()
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

    pub fn value_at(&self, index: u32) -> RowId {
        let off = self.pair_offset(index) + self.key_size() as usize;
        let page_id = PageId::new(i32::from_le_bytes(self.data[off..off + 4].try_into().unwrap()));
        let slot_num = u32::from_le_bytes(self.data[off + 4..off + 8].try_into().unwrap());
        RowId::new(page_id, slot_num)
    }

    fn set_value_at(&mut self, index: u32, rid: RowId) {
        let off = self.pair_offset(index) + self.key_size() as usize;
        self.data[off..off + 4].copy_from_slice(&rid.page_id.value().to_le_bytes());
        self.data[off + 4..off + 8].copy_from_slice(&rid.slot_num.to_le_bytes());
    }

    /// Binary search for `key`. `Ok(i)` if found at index `i`, `Err(i)`
    /// for the insertion point that keeps keys sorted.
    pub fn lookup(&self, key: &[u8], mut cmp: impl FnMut(&[u8], &[u8]) -> Ordering) -> std::result::Result<u32, u32> {
        let mut lo = 0u32;
        let mut hi = self.size();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match cmp(self.key_at(mid), key) {
                Ordering::Equal => return Ok(mid),
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
            }
        }
        Err(lo)
    }

    /// Insert `(key, rid)` at `index`, shifting later pairs right. Caller
    /// must have already checked for room and duplicate keys.
    pub fn insert_at(&mut self, index: u32, key: &[u8], rid: RowId) {
        let size = self.size();
        for i in (index..size).rev() {
            let k = self.key_at(i).to_vec();
            let v = self.value_at(i);
            self.set_key_at(i + 1, &k);
            self.set_value_at(i + 1, v);
        }
        self.set_key_at(index, key);
        self.set_value_at(index, rid);
        self.set_size(size + 1);
    }

    pub fn remove_at(&mut self, index: u32) {
        let size = self.size();
        for i in index..size - 1 {
            let k = self.key_at(i + 1).to_vec();
            let v = self.value_at(i + 1);
            self.set_key_at(i, &k);
            self.set_value_at(i, v);
        }
        self.set_size(size - 1);
    }

    /// Move all pairs of `src` onto the end of `self` (merge `src`, the
    /// right sibling, into `self`).
    pub fn append_from(&mut self, src: &LeafPageView<'_>) {
        let my_size = self.size();
        let src_size = src.size();
        for i in 0..src_size {
            self.set_key_at(my_size + i, src.key_at(i));
            self.set_value_at(my_size + i, src.value_at(i));
        }
        self.set_size(my_size + src_size);
        self.set_next_page_id(src.next_page_id());
    }

    /// Move the first pair of `self` to the end of `recipient` (left
    /// sibling pulling from the right). Returns the new first key of
    /// `self`, which becomes the parent's updated separator.
    pub fn pop_front_to(&mut self, recipient: &mut LeafPageView<'_>) -> Vec<u8> {
        let key = self.key_at(0).to_vec();
        let val = self.value_at(0);
        self.remove_at(0);
        let r_size = recipient.size();
        recipient.set_key_at(r_size, &key);
        recipient.set_value_at(r_size, val);
        recipient.set_size(r_size + 1);
        self.key_at(0).to_vec()
    }

    /// Move the last pair of `self` to the front of `recipient` (right
    /// sibling pulling from the left). Returns the moved key, which
    /// becomes the parent's updated separator for `recipient`.
    pub fn pop_back_to(&mut self, recipient: &mut LeafPageView<'_>) -> Vec<u8> {
        let last = self.size() - 1;
        let key = self.key_at(last).to_vec();
        let val = self.value_at(last);
        self.remove_at(last);
        recipient.insert_at(0, &key, val);
        key
    }

    pub fn all_pairs(&self) -> Vec<(Vec<u8>, RowId)> {
        (0..self.size())
            .map(|i| (self.key_at(i).to_vec(), self.value_at(i)))
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
    fn insert_keeps_sorted_order() {
        let mut buf = [0u8; PAGE_SIZE];
        let mut page = LeafPageView::new(&mut buf);
        page.init(PageId::new(0), PageId::INVALID, 4, 4);

        for k in [3i32, 1, 4, 2] {
            let pos = page.lookup(&k.to_le_bytes(), cmp).unwrap_err();
            page.insert_at(pos, &k.to_le_bytes(), RowId::new(PageId::new(0), k as u32));
        }
        let keys: Vec<i32> = (0..page.size())
            .map(|i| i32::from_le_bytes(page.key_at(i).try_into().unwrap()))
            .collect();
        assert_eq!(keys, vec![1, 2, 3, 4]);
    }

    #[test]
    fn lookup_duplicate_returns_ok() {
        let mut buf = [0u8; PAGE_SIZE];
        let mut page = LeafPageView::new(&mut buf);
        page.init(PageId::new(0), PageId::INVALID, 4, 4);
        page.insert_at(0, &5i32.to_le_bytes(), RowId::new(PageId::new(0), 5));
        assert_eq!(page.lookup(&5i32.to_le_bytes(), cmp), Ok(0));
    }

    #[test]
    fn redistribute_front_to_back() {
        let mut bufa = [0u8; PAGE_SIZE];
        let mut bufb = [0u8; PAGE_SIZE];
        let mut a = LeafPageView::new(&mut bufa);
        a.init(PageId::new(0), PageId::INVALID, 4, 4);
        let mut b = LeafPageView::new(&mut bufb);
        b.init(PageId::new(1), PageId::INVALID, 4, 4);

        a.insert_at(0, &1i32.to_le_bytes(), RowId::new(PageId::new(0), 1));
        a.insert_at(1, &2i32.to_le_bytes(), RowId::new(PageId::new(0), 2));
        b.insert_at(0, &10i32.to_le_bytes(), RowId::new(PageId::new(0), 10));

        let new_key = a.pop_back_to(&mut b);
        assert_eq!(new_key, 2i32.to_le_bytes());
        assert_eq!(a.size(), 1);
        assert_eq!(b.size(), 2);
        assert_eq!(b.key_at(0), &2i32.to_le_bytes());
    }
}
