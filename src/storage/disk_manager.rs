//! Disk manager: maps a logical page-id space onto a single file using
//! bitmap-extent allocation.
//!
//! Physical layout: `[meta | (bitmap_0, data_0..data_{B-1}) | (bitmap_1, data…) | …]`.
//! Logical page-id `L` maps to physical id `1 + (L/B)*(B+1) + 1 + (L mod B)`.

use crate::error::{Result, StorageError};
use crate::storage::bitmap_page::BitmapPage;
use crate::storage::file_header::DiskMeta;
use crate::types::{PageId, BITMAP_SIZE, MAX_VALID_PAGE_ID, PAGE_SIZE};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Disk-level page I/O and logical page-id allocation.
pub trait DiskManager: Send + Sync {
    fn read_page(&self, page_id: PageId, out: &mut [u8; PAGE_SIZE]) -> Result<()>;
    fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()>;
    fn allocate_page(&self) -> Result<PageId>;
    fn deallocate_page(&self, page_id: PageId) -> Result<()>;
    fn is_page_free(&self, page_id: PageId) -> Result<bool>;
    /// Total number of logical pages currently allocated, for reporting.
    fn allocated_page_count(&self) -> Result<u32>;
    fn close(&self) -> Result<()>;
}

struct DiskState {
    file: File,
    meta: DiskMeta,
}

/// Default `DiskManager` backed by a single host file.
pub struct DiskManagerImpl {
    state: Mutex<DiskState>,
}

impl DiskManagerImpl {
    pub fn open(path: impl AsRef<Path>, create_if_missing: bool) -> Result<Self> {
        let path = path.as_ref();
        let existed = path.exists();
        if !existed && !create_if_missing {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("database file does not exist: {}", path.display()),
            )));
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create_if_missing)
            .open(path)?;

        let meta = if existed {
            let mut buf = [0u8; PAGE_SIZE];
            Self::read_physical_raw(&mut file, 0, &mut buf)?;
            DiskMeta::read(&buf)?
        } else {
            let meta = DiskMeta::new();
            let mut buf = [0u8; PAGE_SIZE];
            meta.write(&mut buf);
            Self::write_physical_raw(&mut file, 0, &buf)?;
            file.sync_all()?;
            meta
        };

        log::debug!(
            "opened disk manager at {} ({} pages allocated, {} extents)",
            path.display(),
            meta.num_allocated_pages,
            meta.num_extents()
        );

        Ok(Self {
            state: Mutex::new(DiskState { file, meta }),
        })
    }

    fn physical_of_logical(logical: u32) -> u64 {
        let extent = logical as u64 / BITMAP_SIZE as u64;
        let offset = logical as u64 % BITMAP_SIZE as u64;
        1 + extent * (BITMAP_SIZE as u64 + 1) + 1 + offset
    }

    fn physical_of_bitmap(extent: u64) -> u64 {
        1 + extent * (BITMAP_SIZE as u64 + 1)
    }

    fn read_physical_raw(file: &mut File, physical: u64, out: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let offset = physical * PAGE_SIZE as u64;
        let file_len = file.metadata()?.len();
        if offset >= file_len {
            out.fill(0);
            return Ok(());
        }
        file.seek(SeekFrom::Start(offset))?;
        out.fill(0);
        let mut n = 0;
        while n < PAGE_SIZE {
            match file.read(&mut out[n..]) {
                Ok(0) => break,
                Ok(read) => n += read,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn write_physical_raw(file: &mut File, physical: u64, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let offset = physical * PAGE_SIZE as u64;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    fn flush_meta(state: &mut DiskState) -> Result<()> {
        let mut buf = [0u8; PAGE_SIZE];
        state.meta.write(&mut buf);
        Self::write_physical_raw(&mut state.file, 0, &buf)
    }
}

impl DiskManager for DiskManagerImpl {
    fn read_page(&self, page_id: PageId, out: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let mut state = self.state.lock();
        let physical = Self::physical_of_logical(page_id.value() as u32);
        log::debug!("read_page {page_id} (physical {physical})");
        Self::read_physical_raw(&mut state.file, physical, out)
    }

    fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut state = self.state.lock();
        let physical = Self::physical_of_logical(page_id.value() as u32);
        log::debug!("write_page {page_id} (physical {physical})");
        Self::write_physical_raw(&mut state.file, physical, data)
    }

    fn allocate_page(&self) -> Result<PageId> {
        let mut state = self.state.lock();
        if state.meta.num_allocated_pages >= MAX_VALID_PAGE_ID {
            return Err(StorageError::OutOfSpace);
        }

        // Scan existing extents for the first with spare capacity.
        let mut target_extent = None;
        for (e, used) in state.meta.extent_used.iter().enumerate() {
            if (*used as usize) < BITMAP_SIZE {
                target_extent = Some(e as u64);
                break;
            }
        }

        let extent = match target_extent {
            Some(e) => e,
            None => {
                // Every existing extent is full; carve out a new one.
                let e = state.meta.extent_used.len() as u64;
                let mut zeroed = [0u8; PAGE_SIZE];
                let mut bitmap = BitmapPage::new(&mut zeroed);
                bitmap.init();
                let physical = Self::physical_of_bitmap(e);
                Self::write_physical_raw(&mut state.file, physical, &zeroed)?;
                state.meta.extent_used.push(0);
                e
            }
        };

        let bitmap_physical = Self::physical_of_bitmap(extent);
        let mut buf = [0u8; PAGE_SIZE];
        Self::read_physical_raw(&mut state.file, bitmap_physical, &mut buf)?;
        let offset = {
            let mut bitmap = BitmapPage::new(&mut buf);
            bitmap.allocate()
        };
        let offset = match offset {
            Some(o) => o,
            None => {
                return Err(StorageError::corruption(
                    "bitmap reported spare capacity but allocate failed",
                ))
            }
        };
        Self::write_physical_raw(&mut state.file, bitmap_physical, &buf)?;

        state.meta.extent_used[extent as usize] += 1;
        state.meta.num_allocated_pages += 1;
        Self::flush_meta(&mut state)?;

        let logical = extent as u32 * BITMAP_SIZE as u32 + offset as u32;
        log::debug!("allocate_page -> {logical}");
        Ok(PageId::new(logical as i32))
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        let mut state = self.state.lock();
        let logical = page_id.value() as u32;
        let extent = (logical as usize) / BITMAP_SIZE;
        let offset = (logical as usize) % BITMAP_SIZE;
        if extent >= state.meta.extent_used.len() {
            return Ok(());
        }

        let bitmap_physical = Self::physical_of_bitmap(extent as u64);
        let mut buf = [0u8; PAGE_SIZE];
        Self::read_physical_raw(&mut state.file, bitmap_physical, &mut buf)?;
        let freed = {
            let mut bitmap = BitmapPage::new(&mut buf);
            bitmap.deallocate(offset)
        };
        if !freed {
            return Ok(());
        }
        Self::write_physical_raw(&mut state.file, bitmap_physical, &buf)?;

        state.meta.extent_used[extent] -= 1;
        state.meta.num_allocated_pages -= 1;
        if extent + 1 == state.meta.extent_used.len() && state.meta.extent_used[extent] == 0 {
            state.meta.extent_used.pop();
        }
        Self::flush_meta(&mut state)?;
        log::debug!("deallocate_page {page_id}");
        Ok(())
    }

    fn is_page_free(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.state.lock();
        let logical = page_id.value() as u32;
        let extent = (logical as usize) / BITMAP_SIZE;
        let offset = (logical as usize) % BITMAP_SIZE;
        if extent >= state.meta.extent_used.len() {
            return Ok(true);
        }
        let bitmap_physical = Self::physical_of_bitmap(extent as u64);
        let mut buf = [0u8; PAGE_SIZE];
        Self::read_physical_raw(&mut state.file, bitmap_physical, &mut buf)?;
        let bitmap = BitmapPage::new(&mut buf);
        Ok(bitmap.is_page_free(offset))
    }

    fn allocated_page_count(&self) -> Result<u32> {
        Ok(self.state.lock().meta.num_allocated_pages)
    }

    fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        Self::flush_meta(&mut state)?;
        state.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn allocate_free_cycle() {
        let dir = tempdir().unwrap();
        let dm = DiskManagerImpl::open(dir.path().join("test.db"), true).unwrap();

        let ids: Vec<PageId> = (0..5).map(|_| dm.allocate_page().unwrap()).collect();
        assert_eq!(
            ids,
            vec![0, 1, 2, 3, 4]
                .into_iter()
                .map(PageId::new)
                .collect::<Vec<_>>()
        );

        dm.deallocate_page(PageId::new(2)).unwrap();
        assert!(dm.is_page_free(PageId::new(2)).unwrap());

        let reused = dm.allocate_page().unwrap();
        assert_eq!(reused, PageId::new(2));
        assert!(!dm.is_page_free(PageId::new(2)).unwrap());
    }

    #[test]
    fn read_write_roundtrip() {
        let dir = tempdir().unwrap();
        let dm = DiskManagerImpl::open(dir.path().join("test.db"), true).unwrap();

        let id = dm.allocate_page().unwrap();
        let mut data = [0u8; PAGE_SIZE];
        data[0] = 42;
        dm.write_page(id, &data).unwrap();

        let mut out = [0u8; PAGE_SIZE];
        dm.read_page(id, &mut out).unwrap();
        assert_eq!(out[0], 42);
    }

    #[test]
    fn reopen_preserves_allocation_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        {
            let dm = DiskManagerImpl::open(&path, true).unwrap();
            dm.allocate_page().unwrap();
            dm.allocate_page().unwrap();
            dm.close().unwrap();
        }
        let dm = DiskManagerImpl::open(&path, false).unwrap();
        let next = dm.allocate_page().unwrap();
        assert_eq!(next, PageId::new(2));
    }
}
