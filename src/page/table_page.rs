//! Table page: slotted storage for variable-length tuples.
//!
//! Layout: `page_id(i32) | prev(i32) | next(i32) | free_space_ptr(u32) |
//! tuple_count(u32) | lsn(u32)` followed by a slot directory that grows
//! forward from the header, one `(offset: u32, size: u32)` entry per slot.
//! Tuple bytes grow backward from `free_space_ptr`. A slot's `size` field
//! carries the tombstone bit in its high bit: `size == 0` means the slot is
//! applied-deleted (no tuple present); `size & 0x8000_0000 != 0` means the
//! tuple is marked-deleted but its bytes are still present for rollback.

use crate::error::{Result, StorageError};
use crate::types::{PageId, PAGE_SIZE};

pub const HEADER_SIZE: usize = 24;
const SLOT_SIZE: usize = 8;
const DELETED_BIT: u32 = 0x8000_0000;

/// One slot directory entry, decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TupleSlot {
    pub offset: u32,
    pub len: u32,
    pub deleted: bool,
}

/// A view over one page buffer, interpreted as a table page.
pub struct TablePageView<'a> {
    data: &'a mut [u8; PAGE_SIZE],
}

impl<'a> TablePageView<'a> {
    pub fn new(data: &'a mut [u8; PAGE_SIZE]) -> Self {
        Self { data }
    }

    /// Initialise a freshly allocated page.
    pub fn init(&mut self, page_id: PageId, prev: PageId, next: PageId) {
        self.data.fill(0);
        self.set_page_id(page_id);
        self.set_prev_page_id(prev);
        self.set_next_page_id(next);
        self.set_free_space_ptr(PAGE_SIZE as u32);
        self.set_tuple_count(0);
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(i32::from_le_bytes(self.data[0..4].try_into().unwrap()))
    }

    pub fn set_page_id(&mut self, id: PageId) {
        self.data[0..4].copy_from_slice(&id.value().to_le_bytes());
    }

    pub fn prev_page_id(&self) -> PageId {
        PageId::new(i32::from_le_bytes(self.data[4..8].try_into().unwrap()))
    }

    pub fn set_prev_page_id(&mut self, id: PageId) {
        self.data[4..8].copy_from_slice(&id.value().to_le_bytes());
    }

    pub fn next_page_id(&self) -> PageId {
        PageId::new(i32::from_le_bytes(self.data[8..12].try_into().unwrap()))
    }

    pub fn set_next_page_id(&mut self, id: PageId) {
        self.data[8..12].copy_from_slice(&id.value().to_le_bytes());
    }

    fn free_space_ptr(&self) -> u32 {
        u32::from_le_bytes(self.data[12..16].try_into().unwrap())
    }

    fn set_free_space_ptr(&mut self, v: u32) {
        self.data[12..16].copy_from_slice(&v.to_le_bytes());
    }

    pub fn tuple_count(&self) -> u32 {
        u32::from_le_bytes(self.data[16..20].try_into().unwrap())
    }

    fn set_tuple_count(&mut self, v: u32) {
        self.data[16..20].copy_from_slice(&v.to_le_bytes());
    }

    pub fn lsn(&self) -> u32 {
        u32::from_le_bytes(self.data[20..24].try_into().unwrap())
    }

    fn bump_lsn(&mut self) {
        let v = self.lsn().wrapping_add(1);
        self.data[20..24].copy_from_slice(&v.to_le_bytes());
    }

    fn slot_offset(slot_num: u32) -> usize {
        HEADER_SIZE + slot_num as usize * SLOT_SIZE
    }

    pub fn slot(&self, slot_num: u32) -> Option<TupleSlot> {
        if slot_num >= self.tuple_count() {
            return None;
        }
        let off = Self::slot_offset(slot_num);
        let offset = u32::from_le_bytes(self.data[off..off + 4].try_into().unwrap());
        let raw_size = u32::from_le_bytes(self.data[off + 4..off + 8].try_into().unwrap());
        Some(TupleSlot {
            offset,
            len: raw_size & !DELETED_BIT,
            deleted: raw_size & DELETED_BIT != 0,
        })
    }

    fn set_slot(&mut self, slot_num: u32, offset: u32, len: u32, deleted: bool) {
        let off = Self::slot_offset(slot_num);
        let raw_size = len | if deleted { DELETED_BIT } else { 0 };
        self.data[off..off + 4].copy_from_slice(&offset.to_le_bytes());
        self.data[off + 4..off + 8].copy_from_slice(&raw_size.to_le_bytes());
    }

    fn free_space(&self) -> usize {
        let directory_end = Self::slot_offset(self.tuple_count());
        (self.free_space_ptr() as usize).saturating_sub(directory_end)
    }

    /// Insert a new tuple, returning its slot number. Fails with
    /// `PageFull` if there isn't room for the bytes plus one more slot.
    pub fn insert_tuple(&mut self, bytes: &[u8]) -> Result<u32> {
        let needed = bytes.len() + SLOT_SIZE;
        if self.free_space() < needed {
            return Err(StorageError::PageFull {
                page_id: self.page_id(),
                needed,
                available: self.free_space(),
            });
        }
        let new_ptr = self.free_space_ptr() as usize - bytes.len();
        self.data[new_ptr..new_ptr + bytes.len()].copy_from_slice(bytes);
        self.set_free_space_ptr(new_ptr as u32);

        let slot_num = self.tuple_count();
        self.set_slot(slot_num, new_ptr as u32, bytes.len() as u32, false);
        self.set_tuple_count(slot_num + 1);
        self.bump_lsn();
        Ok(slot_num)
    }

    /// Overwrite the tuple at `slot_num` in place. Fails with
    /// `NotEnoughSpace` if `bytes` is larger than the slot's current
    /// allocation; the caller must relocate in that case.
    pub fn update_tuple(&mut self, slot_num: u32, bytes: &[u8]) -> Result<()> {
        let slot = self
            .slot(slot_num)
            .ok_or_else(|| StorageError::invalid_operation("update of out-of-range slot"))?;
        if slot.len == 0 {
            return Err(StorageError::invalid_operation("update of deleted slot"));
        }
        if bytes.len() > slot.len as usize {
            return Err(StorageError::NotEnoughSpace(self.page_id()));
        }
        let off = slot.offset as usize;
        self.data[off..off + bytes.len()].copy_from_slice(bytes);
        self.set_slot(slot_num, slot.offset, bytes.len() as u32, slot.deleted);
        self.bump_lsn();
        Ok(())
    }

    pub fn mark_delete(&mut self, slot_num: u32) -> Result<()> {
        let slot = self
            .slot(slot_num)
            .ok_or_else(|| StorageError::invalid_operation("mark_delete of out-of-range slot"))?;
        if slot.len == 0 {
            return Err(StorageError::invalid_operation("mark_delete of empty slot"));
        }
        self.set_slot(slot_num, slot.offset, slot.len, true);
        self.bump_lsn();
        Ok(())
    }

    pub fn rollback_delete(&mut self, slot_num: u32) -> Result<()> {
        let slot = self.slot(slot_num).ok_or_else(|| {
            StorageError::invalid_operation("rollback_delete of out-of-range slot")
        })?;
        self.set_slot(slot_num, slot.offset, slot.len, false);
        self.bump_lsn();
        Ok(())
    }

    /// Permanently remove a marked-deleted tuple. The slot's space is not
    /// compacted; its entry becomes an applied-delete tombstone.
    pub fn apply_delete(&mut self, slot_num: u32) -> Result<()> {
        let slot = self
            .slot(slot_num)
            .ok_or_else(|| StorageError::invalid_operation("apply_delete of out-of-range slot"))?;
        if !slot.deleted {
            return Err(StorageError::invalid_operation(
                "apply_delete of a slot that was not mark_delete'd",
            ));
        }
        self.set_slot(slot_num, 0, 0, false);
        self.bump_lsn();
        Ok(())
    }

    /// Tuple bytes at `slot_num`, or `None` if deleted or out of range.
    pub fn get_tuple(&self, slot_num: u32) -> Option<&[u8]> {
        let slot = self.slot(slot_num)?;
        if slot.len == 0 || slot.deleted {
            return None;
        }
        let off = slot.offset as usize;
        Some(&self.data[off..off + slot.len as usize])
    }

    /// First visible tuple's slot number, if any.
    pub fn get_first_tuple_slot(&self) -> Option<u32> {
        (0..self.tuple_count()).find(|&s| self.get_tuple(s).is_some())
    }

    /// Next visible tuple's slot number after `slot_num`, if any.
    pub fn get_next_tuple_slot(&self, slot_num: u32) -> Option<u32> {
        (slot_num + 1..self.tuple_count()).find(|&s| self.get_tuple(s).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank() -> [u8; PAGE_SIZE] {
        [0u8; PAGE_SIZE]
    }

    #[test]
    fn insert_and_get() {
        let mut buf = blank();
        let mut page = TablePageView::new(&mut buf);
        page.init(PageId::new(0), PageId::INVALID, PageId::INVALID);

        let a = page.insert_tuple(b"hello").unwrap();
        let b = page.insert_tuple(b"world!").unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(page.get_tuple(a), Some(&b"hello"[..]));
        assert_eq!(page.get_tuple(b), Some(&b"world!"[..]));
    }

    #[test]
    fn mark_delete_hides_then_rollback_restores() {
        let mut buf = blank();
        let mut page = TablePageView::new(&mut buf);
        page.init(PageId::new(0), PageId::INVALID, PageId::INVALID);
        let s = page.insert_tuple(b"x").unwrap();

        page.mark_delete(s).unwrap();
        assert_eq!(page.get_tuple(s), None);

        page.rollback_delete(s).unwrap();
        assert_eq!(page.get_tuple(s), Some(&b"x"[..]));

        page.mark_delete(s).unwrap();
        page.apply_delete(s).unwrap();
        assert_eq!(page.get_tuple(s), None);
        assert_eq!(page.slot(s).unwrap().len, 0);
    }

    #[test]
    fn update_in_place_within_budget() {
        let mut buf = blank();
        let mut page = TablePageView::new(&mut buf);
        page.init(PageId::new(0), PageId::INVALID, PageId::INVALID);
        let s = page.insert_tuple(b"abcdef").unwrap();
        page.update_tuple(s, b"xyz").unwrap();
        assert_eq!(page.get_tuple(s), Some(&b"xyz"[..]));
    }

    #[test]
    fn update_that_grows_fails_with_not_enough_space() {
        let mut buf = blank();
        let mut page = TablePageView::new(&mut buf);
        page.init(PageId::new(0), PageId::INVALID, PageId::INVALID);
        let s = page.insert_tuple(b"abc").unwrap();
        assert!(matches!(
            page.update_tuple(s, b"abcdefghij"),
            Err(StorageError::NotEnoughSpace(_))
        ));
    }

    #[test]
    fn scan_skips_deleted_slots() {
        let mut buf = blank();
        let mut page = TablePageView::new(&mut buf);
        page.init(PageId::new(0), PageId::INVALID, PageId::INVALID);
        let a = page.insert_tuple(b"1").unwrap();
        let b = page.insert_tuple(b"2").unwrap();
        let c = page.insert_tuple(b"3").unwrap();
        page.mark_delete(b).unwrap();

        assert_eq!(page.get_first_tuple_slot(), Some(a));
        assert_eq!(page.get_next_tuple_slot(a), Some(c));
        assert_eq!(page.get_next_tuple_slot(c), None);
    }

    #[test]
    fn page_full_reports_available_space() {
        let mut buf = blank();
        let mut page = TablePageView::new(&mut buf);
        page.init(PageId::new(0), PageId::INVALID, PageId::INVALID);
        let big = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            page.insert_tuple(&big),
            Err(StorageError::PageFull { .. })
        ));
    }
}
