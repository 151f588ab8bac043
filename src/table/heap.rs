//! Table heap: first-fit tuple placement over a chain of table pages.

use crate::buffer::BufferPool;
use crate::error::{Result, StorageError};
use crate::page::TablePageView;
use crate::types::{PageId, RowId};
use std::sync::Arc;

/// An unordered collection of a table's rows, stored as a singly-threaded
/// chain of slotted table pages.
pub struct TableHeap {
    buffer_pool: Arc<dyn BufferPool>,
    first_page_id: PageId,
}

impl TableHeap {
    /// Create a fresh heap: allocates its one starting page.
    pub fn new(buffer_pool: Arc<dyn BufferPool>) -> Result<Self> {
        let (page_id, guard) = buffer_pool.new_page()?;
        let mut data = *guard.read();
        TablePageView::new(&mut data).init(page_id, PageId::INVALID, PageId::INVALID);
        *guard.write() = data;
        log::debug!("table heap created, first page {page_id}");
        Ok(Self {
            buffer_pool,
            first_page_id: page_id,
        })
    }

    /// Re-open a heap whose first page already exists on disk.
    pub fn with_first_page(buffer_pool: Arc<dyn BufferPool>, first_page_id: PageId) -> Self {
        Self {
            buffer_pool,
            first_page_id,
        }
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    pub(crate) fn buffer_pool(&self) -> &Arc<dyn BufferPool> {
        &self.buffer_pool
    }

    /// First-fit insert: walk the chain, trying each page in turn; splice
    /// a new page onto the end if every existing page is full.
    pub fn insert_tuple(&self, bytes: &[u8]) -> Result<RowId> {
        let mut current = self.first_page_id;
        loop {
            let guard = self.buffer_pool.fetch_page_mut(current)?;
            let mut data = *guard.read();
            let mut page = TablePageView::new(&mut data);
            match page.insert_tuple(bytes) {
                Ok(slot) => {
                    *guard.write() = data;
                    log::trace!("inserted tuple into page {current} slot {slot}");
                    return Ok(RowId::new(current, slot));
                }
                Err(StorageError::PageFull { .. }) => {
                    let next = page.next_page_id();
                    drop(guard);
                    if next.is_valid() {
                        current = next;
                        continue;
                    }
                    return self.splice_and_insert(current, bytes);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn splice_and_insert(&self, tail: PageId, bytes: &[u8]) -> Result<RowId> {
        let (new_id, new_guard) = self.buffer_pool.new_page()?;
        let mut data = *new_guard.read();
        TablePageView::new(&mut data).init(new_id, tail, PageId::INVALID);
        let slot = TablePageView::new(&mut data).insert_tuple(bytes)?;
        *new_guard.write() = data;
        drop(new_guard);

        let tail_guard = self.buffer_pool.fetch_page_mut(tail)?;
        let mut tail_data = *tail_guard.read();
        TablePageView::new(&mut tail_data).set_next_page_id(new_id);
        *tail_guard.write() = tail_data;

        log::debug!("spliced new table page {new_id} after {tail}");
        Ok(RowId::new(new_id, slot))
    }

    /// Attempt an in-place update; if the new payload doesn't fit in the
    /// existing slot, the row is relocated and its `RowId` changes.
    pub fn update_tuple(&self, rid: RowId, bytes: &[u8]) -> Result<RowId> {
        let guard = self.buffer_pool.fetch_page_mut(rid.page_id)?;
        let mut data = *guard.read();
        let mut page = TablePageView::new(&mut data);
        match page.update_tuple(rid.slot_num, bytes) {
            Ok(()) => {
                *guard.write() = data;
                Ok(rid)
            }
            Err(StorageError::NotEnoughSpace(_)) => {
                page.mark_delete(rid.slot_num)?;
                page.apply_delete(rid.slot_num)?;
                *guard.write() = data;
                drop(guard);
                let new_rid = self.insert_tuple(bytes)?;
                log::debug!("relocated tuple {rid} to {new_rid} on update");
                Ok(new_rid)
            }
            Err(e) => Err(e),
        }
    }

    pub fn mark_delete(&self, rid: RowId) -> Result<()> {
        let guard = self.buffer_pool.fetch_page_mut(rid.page_id)?;
        let mut data = *guard.read();
        TablePageView::new(&mut data).mark_delete(rid.slot_num)?;
        *guard.write() = data;
        Ok(())
    }

    pub fn rollback_delete(&self, rid: RowId) -> Result<()> {
        let guard = self.buffer_pool.fetch_page_mut(rid.page_id)?;
        let mut data = *guard.read();
        TablePageView::new(&mut data).rollback_delete(rid.slot_num)?;
        *guard.write() = data;
        Ok(())
    }

    pub fn apply_delete(&self, rid: RowId) -> Result<()> {
        let guard = self.buffer_pool.fetch_page_mut(rid.page_id)?;
        let mut data = *guard.read();
        TablePageView::new(&mut data).apply_delete(rid.slot_num)?;
        *guard.write() = data;
        Ok(())
    }

    pub fn get_tuple(&self, rid: RowId) -> Result<Option<Vec<u8>>> {
        let guard = self.buffer_pool.fetch_page(rid.page_id)?;
        let mut data = *guard.read();
        let page = TablePageView::new(&mut data);
        Ok(page.get_tuple(rid.slot_num).map(|b| b.to_vec()))
    }

    pub fn begin(&self) -> Result<TableIterator<'_>> {
        TableIterator::begin(self)
    }

    /// Walk the chain, deleting every page. Used when the owning table is
    /// dropped.
    pub fn delete_table(&self) -> Result<()> {
        let mut current = self.first_page_id;
        while current.is_valid() {
            let next = {
                let guard = self.buffer_pool.fetch_page(current)?;
                let mut data = *guard.read();
                TablePageView::new(&mut data).next_page_id()
            };
            self.buffer_pool.delete_page(current)?;
            current = next;
        }
        Ok(())
    }

    fn first_tuple_in_or_after(&self, mut page_id: PageId) -> Result<RowId> {
        loop {
            if !page_id.is_valid() {
                return Ok(RowId::INVALID);
            }
            let guard = self.buffer_pool.fetch_page(page_id)?;
            let mut data = *guard.read();
            let page = TablePageView::new(&mut data);
            if let Some(slot) = page.get_first_tuple_slot() {
                return Ok(RowId::new(page_id, slot));
            }
            page_id = page.next_page_id();
        }
    }
}

/// A forward cursor over a table heap's visible tuples. Pins at most one
/// page at a time; no pin is held between steps.
pub struct TableIterator<'a> {
    heap: &'a TableHeap,
    rid: RowId,
}

impl<'a> TableIterator<'a> {
    fn begin(heap: &'a TableHeap) -> Result<Self> {
        let rid = heap.first_tuple_in_or_after(heap.first_page_id)?;
        Ok(Self { heap, rid })
    }

    pub fn end(heap: &'a TableHeap) -> Self {
        Self {
            heap,
            rid: RowId::INVALID,
        }
    }

    pub fn is_end(&self) -> bool {
        !self.rid.is_valid()
    }

    pub fn current(&self) -> Result<Option<(RowId, Vec<u8>)>> {
        if self.is_end() {
            return Ok(None);
        }
        Ok(self.heap.get_tuple(self.rid)?.map(|bytes| (self.rid, bytes)))
    }

    /// Advance to the next visible tuple, following `next_page_id` links
    /// across page boundaries as needed.
    pub fn advance(&mut self) -> Result<()> {
        if self.is_end() {
            return Ok(());
        }
        let (next_in_page, next_page) = {
            let guard = self.heap.buffer_pool.fetch_page(self.rid.page_id)?;
            let mut data = *guard.read();
            let page = TablePageView::new(&mut data);
            (page.get_next_tuple_slot(self.rid.slot_num), page.next_page_id())
        };
        self.rid = match next_in_page {
            Some(slot) => RowId::new(self.rid.page_id, slot),
            None => self.heap.first_tuple_in_or_after(next_page)?,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolImpl;
    use crate::storage::DiskManagerImpl;
    use tempfile::tempdir;

    fn heap_of(capacity: usize) -> (tempfile::TempDir, TableHeap) {
        let dir = tempdir().unwrap();
        let dm = Arc::new(DiskManagerImpl::open(dir.path().join("t.db"), true).unwrap());
        let pool: Arc<dyn BufferPool> = Arc::new(BufferPoolImpl::new(dm, capacity));
        let heap = TableHeap::new(pool).unwrap();
        (dir, heap)
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let (_dir, heap) = heap_of(8);
        let rid = heap.insert_tuple(b"hello").unwrap();
        assert_eq!(heap.get_tuple(rid).unwrap(), Some(b"hello".to_vec()));
    }

    #[test]
    fn insert_splices_new_page_when_full() {
        let (_dir, heap) = heap_of(8);
        let big = vec![b'x'; 2000];
        let first = heap.insert_tuple(&big).unwrap();
        let second = heap.insert_tuple(&big).unwrap();
        assert_ne!(first.page_id, second.page_id);
        assert_eq!(heap.get_tuple(second).unwrap(), Some(big));
    }

    #[test]
    fn update_in_place_keeps_row_id() {
        let (_dir, heap) = heap_of(8);
        let rid = heap.insert_tuple(b"abcdef").unwrap();
        let new_rid = heap.update_tuple(rid, b"xyz").unwrap();
        assert_eq!(new_rid, rid);
        assert_eq!(heap.get_tuple(rid).unwrap(), Some(b"xyz".to_vec()));
    }

    #[test]
    fn update_that_outgrows_slot_relocates() {
        let (_dir, heap) = heap_of(8);
        let rid = heap.insert_tuple(b"short").unwrap();
        let big = vec![b'y'; 3000];
        let new_rid = heap.update_tuple(rid, &big).unwrap();
        assert_ne!(new_rid, rid);
        assert_eq!(heap.get_tuple(rid).unwrap(), None);
        assert_eq!(heap.get_tuple(new_rid).unwrap(), Some(big));
    }

    #[test]
    fn iterator_skips_deleted_and_crosses_pages() {
        let (_dir, heap) = heap_of(8);
        let big = vec![b'z'; 2000];
        let a = heap.insert_tuple(b"1").unwrap();
        let _b = heap.insert_tuple(&big).unwrap();
        let c = heap.insert_tuple(&big).unwrap();
        heap.mark_delete(_b).unwrap();

        let mut it = heap.begin().unwrap();
        let mut seen = Vec::new();
        while let Some((rid, _bytes)) = it.current().unwrap() {
            seen.push(rid);
            it.advance().unwrap();
        }
        assert_eq!(seen, vec![a, c]);
    }

    #[test]
    fn delete_table_frees_every_page() {
        let (_dir, heap) = heap_of(8);
        let big = vec![b'w'; 2000];
        heap.insert_tuple(&big).unwrap();
        heap.insert_tuple(&big).unwrap();
        heap.delete_table().unwrap();
    }
}
