//! Buffer pool manager.
//!
//! Owns a fixed number of page frames. `page_table`, `free_list`, and the
//! LRU replacer live behind one mutex and are always updated together;
//! each frame's content (and pin/dirty bookkeeping) is guarded
//! independently so concurrent readers of different pages don't contend
//! on the central lock.

use crate::buffer::lru::LruReplacer;
use crate::error::{Result, StorageError};
use crate::storage::DiskManager;
use crate::types::{PageId, PAGE_SIZE};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::sync::Arc;

type FrameId = usize;

/// Trait for buffer pool operations.
pub trait BufferPool: Send + Sync {
    /// Pin and return a page for read access, loading it from disk if
    /// necessary.
    fn fetch_page(&self, page_id: PageId) -> Result<PageGuard<'_>>;

    /// Pin and return a page for write access.
    fn fetch_page_mut(&self, page_id: PageId) -> Result<PageGuardMut<'_>>;

    /// Allocate a new logical page and pin it for write access.
    fn new_page(&self) -> Result<(PageId, PageGuardMut<'_>)>;

    /// Write a page back to disk if dirty. A no-op if the page isn't
    /// currently resident.
    fn flush_page(&self, page_id: PageId) -> Result<()>;

    /// Flush every dirty resident page.
    fn flush_all(&self) -> Result<()>;

    /// Deallocate a page. Errors with `PinnedPageInUse` if it is
    /// currently pinned.
    fn delete_page(&self, page_id: PageId) -> Result<()>;

    /// Number of frames in the pool.
    fn capacity(&self) -> usize;

    /// Number of frames currently holding a resident page.
    fn occupied(&self) -> usize;
}

struct Frame {
    page_id: PageId,
    pin_count: u32,
    dirty: bool,
    data: [u8; PAGE_SIZE],
}

impl Frame {
    fn empty() -> Self {
        Self {
            page_id: PageId::INVALID,
            pin_count: 0,
            dirty: false,
            data: [0u8; PAGE_SIZE],
        }
    }
}

struct Central {
    page_table: HashMap<PageId, FrameId>,
    free_list: Vec<FrameId>,
    replacer: LruReplacer,
}

/// Fixed-size frame-array buffer pool manager.
pub struct BufferPoolImpl {
    disk_manager: Arc<dyn DiskManager>,
    frames: Vec<RwLock<Frame>>,
    central: Mutex<Central>,
    capacity: usize,
}

impl BufferPoolImpl {
    pub fn new(disk_manager: Arc<dyn DiskManager>, capacity: usize) -> Self {
        let frames = (0..capacity).map(|_| RwLock::new(Frame::empty())).collect();
        let free_list = (0..capacity).collect();
        Self {
            disk_manager,
            frames,
            central: Mutex::new(Central {
                page_table: HashMap::with_capacity(capacity),
                free_list,
                replacer: LruReplacer::new(capacity),
            }),
            capacity,
        }
    }

    #[cfg(test)]
    fn is_resident(&self, page_id: PageId) -> bool {
        self.central.lock().page_table.contains_key(&page_id)
    }

    /// Pick a frame to populate: a never-used slot first, then an LRU
    /// victim. Flushes the victim if dirty and drops its page-table entry.
    fn acquire_frame(&self, central: &mut Central) -> Result<FrameId> {
        if let Some(fid) = central.free_list.pop() {
            return Ok(fid);
        }
        let fid = central.replacer.victim().ok_or(StorageError::BufferPoolExhausted)?;
        let mut frame = self.frames[fid].write();
        if frame.dirty {
            self.disk_manager.write_page(frame.page_id, &frame.data)?;
        }
        central.page_table.remove(&frame.page_id);
        frame.dirty = false;
        Ok(fid)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) {
        let frame_id = {
            let central = self.central.lock();
            match central.page_table.get(&page_id) {
                Some(&f) => f,
                None => return,
            }
        };
        let now_unpinned = {
            let mut frame = self.frames[frame_id].write();
            frame.pin_count = frame.pin_count.saturating_sub(1);
            frame.dirty = frame.dirty || is_dirty;
            frame.pin_count == 0
        };
        if now_unpinned {
            self.central.lock().replacer.unpin(frame_id);
        }
    }
}

impl BufferPool for BufferPoolImpl {
    fn fetch_page(&self, page_id: PageId) -> Result<PageGuard<'_>> {
        let frame_id = self.pin_for_fetch(page_id)?;
        log::debug!("fetch_page {page_id} -> frame {frame_id}");
        Ok(PageGuard {
            page_id,
            frame_id,
            pool: self,
        })
    }

    fn fetch_page_mut(&self, page_id: PageId) -> Result<PageGuardMut<'_>> {
        let frame_id = self.pin_for_fetch(page_id)?;
        log::debug!("fetch_page_mut {page_id} -> frame {frame_id}");
        Ok(PageGuardMut {
            page_id,
            frame_id,
            pool: self,
        })
    }

    fn new_page(&self) -> Result<(PageId, PageGuardMut<'_>)> {
        let page_id = self.disk_manager.allocate_page()?;
        let frame_id = {
            let mut central = self.central.lock();
            let fid = self.acquire_frame(&mut central)?;
            central.page_table.insert(page_id, fid);
            central.replacer.pin(fid);
            fid
        };
        {
            let mut frame = self.frames[frame_id].write();
            frame.data = [0u8; PAGE_SIZE];
            frame.page_id = page_id;
            frame.pin_count = 1;
            frame.dirty = true;
        }
        log::debug!("new_page {page_id} -> frame {frame_id}");
        Ok((
            page_id,
            PageGuardMut {
                page_id,
                frame_id,
                pool: self,
            },
        ))
    }

    fn flush_page(&self, page_id: PageId) -> Result<()> {
        let frame_id = {
            let central = self.central.lock();
            match central.page_table.get(&page_id) {
                Some(&f) => f,
                None => return Ok(()),
            }
        };
        let mut frame = self.frames[frame_id].write();
        if frame.dirty {
            self.disk_manager.write_page(page_id, &frame.data)?;
            frame.dirty = false;
        }
        Ok(())
    }

    fn flush_all(&self) -> Result<()> {
        let central = self.central.lock();
        for (&page_id, &frame_id) in central.page_table.iter() {
            let mut frame = self.frames[frame_id].write();
            if frame.dirty {
                self.disk_manager.write_page(page_id, &frame.data)?;
                frame.dirty = false;
            }
        }
        Ok(())
    }

    fn delete_page(&self, page_id: PageId) -> Result<()> {
        {
            let mut central = self.central.lock();
            if let Some(&frame_id) = central.page_table.get(&page_id) {
                let pin_count = self.frames[frame_id].read().pin_count;
                if pin_count > 0 {
                    return Err(StorageError::PinnedPageInUse(page_id));
                }
                central.page_table.remove(&page_id);
                central.replacer.remove(frame_id);
                central.free_list.push(frame_id);
                let mut frame = self.frames[frame_id].write();
                frame.page_id = PageId::INVALID;
                frame.dirty = false;
            }
        }
        self.disk_manager.deallocate_page(page_id)
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn occupied(&self) -> usize {
        self.central.lock().page_table.len()
    }
}

impl BufferPoolImpl {
    fn pin_for_fetch(&self, page_id: PageId) -> Result<FrameId> {
        let mut central = self.central.lock();
        if let Some(&fid) = central.page_table.get(&page_id) {
            central.replacer.pin(fid);
            drop(central);
            self.frames[fid].write().pin_count += 1;
            return Ok(fid);
        }

        let fid = self.acquire_frame(&mut central)?;
        {
            let mut frame = self.frames[fid].write();
            self.disk_manager.read_page(page_id, &mut frame.data)?;
            frame.page_id = page_id;
            frame.pin_count = 1;
            frame.dirty = false;
        }
        central.page_table.insert(page_id, fid);
        central.replacer.pin(fid);
        Ok(fid)
    }
}

/// RAII guard for read access to a page. Unpins on drop without marking
/// the page dirty.
pub struct PageGuard<'a> {
    page_id: PageId,
    frame_id: FrameId,
    pool: &'a BufferPoolImpl,
}

impl<'a> PageGuard<'a> {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn read(&self) -> PageRef<'_> {
        PageRef {
            guard: self.pool.frames[self.frame_id].read(),
        }
    }
}

impl<'a> Drop for PageGuard<'a> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, false);
    }
}

/// Reference to page content through a read lock.
pub struct PageRef<'a> {
    guard: RwLockReadGuard<'a, Frame>,
}

impl<'a> std::ops::Deref for PageRef<'a> {
    type Target = [u8; PAGE_SIZE];

    fn deref(&self) -> &Self::Target {
        &self.guard.data
    }
}

/// RAII guard for write access to a page. Unpins on drop, always marking
/// the page dirty: the dirty flag is additive and never cleared except
/// by a flush.
pub struct PageGuardMut<'a> {
    page_id: PageId,
    frame_id: FrameId,
    pool: &'a BufferPoolImpl,
}

impl<'a> PageGuardMut<'a> {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn write(&self) -> PageRefMut<'_> {
        let mut guard = self.pool.frames[self.frame_id].write();
        guard.dirty = true;
        PageRefMut { guard }
    }

    pub fn read(&self) -> PageRef<'_> {
        PageRef {
            guard: self.pool.frames[self.frame_id].read(),
        }
    }
}

impl<'a> Drop for PageGuardMut<'a> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, true);
    }
}

/// Mutable reference to page content through a write lock.
pub struct PageRefMut<'a> {
    guard: RwLockWriteGuard<'a, Frame>,
}

impl<'a> std::ops::Deref for PageRefMut<'a> {
    type Target = [u8; PAGE_SIZE];

    fn deref(&self) -> &Self::Target {
        &self.guard.data
    }
}

impl<'a> std::ops::DerefMut for PageRefMut<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DiskManagerImpl;
    use tempfile::tempdir;

    fn pool_of(capacity: usize) -> (tempfile::TempDir, BufferPoolImpl) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let dm = Arc::new(DiskManagerImpl::open(&path, true).unwrap());
        let pool = BufferPoolImpl::new(dm, capacity);
        (dir, pool)
    }

    #[test]
    fn new_page_roundtrips_through_flush() {
        let (_dir, pool) = pool_of(4);
        let (page_id, guard) = pool.new_page().unwrap();
        {
            let mut page = guard.write();
            page[0] = 7;
        }
        drop(guard);
        pool.flush_all().unwrap();

        let guard = pool.fetch_page(page_id).unwrap();
        assert_eq!(guard.read()[0], 7);
    }

    #[test]
    fn eviction_flushes_dirty_victim() {
        let (_dir, pool) = pool_of(2);
        let (id_a, guard_a) = pool.new_page().unwrap();
        {
            let mut page = guard_a.write();
            page[0] = 1;
        }
        drop(guard_a);

        let (id_b, guard_b) = pool.new_page().unwrap();
        drop(guard_b);

        // both frames now unpinned; fetching a third page must evict one.
        let (_id_c, guard_c) = pool.new_page().unwrap();
        drop(guard_c);

        let guard = pool.fetch_page(id_a).unwrap();
        assert_eq!(guard.read()[0], 1);
        drop(guard);
        let _ = pool.fetch_page(id_b).unwrap();
    }

    #[test]
    fn lru_eviction_picks_least_recently_used() {
        let (_dir, pool) = pool_of(3);
        let (p1, g1) = pool.new_page().unwrap();
        let (p2, g2) = pool.new_page().unwrap();
        let (p3, g3) = pool.new_page().unwrap();
        drop(g1);
        drop(g2);
        drop(g3);

        // p1 was unpinned first, so it's the LRU victim when a fourth page needs a frame.
        let (p4, g4) = pool.new_page().unwrap();
        drop(g4);
        assert!(pool.is_resident(p2));
        assert!(pool.is_resident(p3));
        assert!(pool.is_resident(p4));
        assert!(!pool.is_resident(p1));

        // p2 is now the LRU victim; fetching p1 back in evicts it.
        let g1 = pool.fetch_page(p1).unwrap();
        drop(g1);
        assert!(pool.is_resident(p1));
        assert!(pool.is_resident(p3));
        assert!(pool.is_resident(p4));
        assert!(!pool.is_resident(p2));
    }

    #[test]
    fn pinned_page_cannot_be_evicted() {
        let (_dir, pool) = pool_of(1);
        let (_id_a, guard_a) = pool.new_page().unwrap();
        // only frame is pinned; a second allocation has nowhere to go.
        assert!(pool.new_page().is_err());
        drop(guard_a);
    }

    #[test]
    fn delete_page_rejects_pinned() {
        let (_dir, pool) = pool_of(2);
        let (page_id, guard) = pool.new_page().unwrap();
        assert!(matches!(
            pool.delete_page(page_id),
            Err(StorageError::PinnedPageInUse(_))
        ));
        drop(guard);
        pool.delete_page(page_id).unwrap();
    }
}
