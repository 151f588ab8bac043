//! Index Roots Page: a fixed page at `INDEX_ROOTS_PAGE_ID` mapping
//! `index_id -> root_page_id`. Serialised as `[count(u32) |
//! (index_id, root_page_id)[]]`.

use crate::error::{Result, StorageError};
use crate::types::{PageId, PAGE_SIZE};

const ENTRY_SIZE: usize = 8;

pub struct IndexRootsPage<'a> {
    data: &'a mut [u8; PAGE_SIZE],
}

impl<'a> IndexRootsPage<'a> {
    pub fn new(data: &'a mut [u8; PAGE_SIZE]) -> Self {
        Self { data }
    }

    pub fn init(&mut self) {
        self.data.fill(0);
    }

    fn count(&self) -> u32 {
        u32::from_le_bytes(self.data[0..4].try_into().unwrap())
    }

    fn set_count(&mut self, v: u32) {
        self.data[0..4].copy_from_slice(&v.to_le_bytes());
    }

    fn entry_offset(index: u32) -> usize {
        4 + index as usize * ENTRY_SIZE
    }

    pub fn get(&self, index_id: u32) -> Option<PageId> {
        for i in 0..self.count() {
            let off = Self::entry_offset(i);
            let id = u32::from_le_bytes(self.data[off..off + 4].try_into().unwrap());
            if id == index_id {
                let root = i32::from_le_bytes(self.data[off + 4..off + 8].try_into().unwrap());
                return Some(PageId::new(root));
            }
        }
        None
    }

    pub fn insert(&mut self, index_id: u32, root_page_id: PageId) -> Result<()> {
        if self.get(index_id).is_some() {
            return Err(StorageError::already_exists(
                crate::error::EntityKind::Index,
                index_id.to_string(),
            ));
        }
        let count = self.count();
        let off = Self::entry_offset(count);
        if off + ENTRY_SIZE > PAGE_SIZE {
            return Err(StorageError::PageFull {
                page_id: PageId::INVALID,
                needed: ENTRY_SIZE,
                available: PAGE_SIZE.saturating_sub(off),
            });
        }
        self.data[off..off + 4].copy_from_slice(&index_id.to_le_bytes());
        self.data[off + 4..off + 8].copy_from_slice(&root_page_id.value().to_le_bytes());
        self.set_count(count + 1);
        Ok(())
    }

    pub fn update(&mut self, index_id: u32, root_page_id: PageId) -> Result<()> {
        for i in 0..self.count() {
            let off = Self::entry_offset(i);
            let id = u32::from_le_bytes(self.data[off..off + 4].try_into().unwrap());
            if id == index_id {
                self.data[off + 4..off + 8].copy_from_slice(&root_page_id.value().to_le_bytes());
                return Ok(());
            }
        }
        Err(StorageError::not_found(
            crate::error::EntityKind::Index,
            index_id.to_string(),
        ))
    }

    pub fn remove(&mut self, index_id: u32) -> Result<()> {
        let count = self.count();
        for i in 0..count {
            let off = Self::entry_offset(i);
            let id = u32::from_le_bytes(self.data[off..off + 4].try_into().unwrap());
            if id == index_id {
                for j in i..count - 1 {
                    let src = Self::entry_offset(j + 1);
                    let dst = Self::entry_offset(j);
                    let entry: [u8; ENTRY_SIZE] = self.data[src..src + ENTRY_SIZE].try_into().unwrap();
                    self.data[dst..dst + ENTRY_SIZE].copy_from_slice(&entry);
                }
                self.set_count(count - 1);
                return Ok(());
            }
        }
        Err(StorageError::not_found(
            crate::error::EntityKind::Index,
            index_id.to_string(),
        ))
    }

    pub fn all(&self) -> Vec<(u32, PageId)> {
        (0..self.count())
            .map(|i| {
                let off = Self::entry_offset(i);
                let id = u32::from_le_bytes(self.data[off..off + 4].try_into().unwrap());
                let root = i32::from_le_bytes(self.data[off + 4..off + 8].try_into().unwrap());
                (id, PageId::new(root))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_update_remove() {
        let mut buf = [0u8; PAGE_SIZE];
        let mut page = IndexRootsPage::new(&mut buf);
        page.init();

        page.insert(1, PageId::new(10)).unwrap();
        page.insert(2, PageId::new(20)).unwrap();
        assert_eq!(page.get(1), Some(PageId::new(10)));

        page.update(1, PageId::new(11)).unwrap();
        assert_eq!(page.get(1), Some(PageId::new(11)));

        page.remove(1).unwrap();
        assert_eq!(page.get(1), None);
        assert_eq!(page.get(2), Some(PageId::new(20)));
    }

    #[test]
    fn duplicate_insert_rejected() {
        let mut buf = [0u8; PAGE_SIZE];
        let mut page = IndexRootsPage::new(&mut buf);
        page.init();
        page.insert(1, PageId::new(10)).unwrap();
        assert!(page.insert(1, PageId::new(99)).is_err());
    }
}
