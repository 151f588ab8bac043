//! Catalog Meta Page: a fixed page at `CATALOG_META_PAGE_ID` storing the
//! `(table_id -> meta_page_id)` and `(index_id -> meta_page_id)` maps the
//! catalog manager uses to locate every table/index's own meta page.
//!
//! Serialised as `[magic(u32) | table_count(u32) | index_count(u32) |
//! (table_id, page_id)[] | (index_id, page_id)[]]`.

use crate::error::{Result, StorageError};
use crate::types::{PageId, PAGE_SIZE};

const MAGIC: u32 = 0x4341_5430; // "CAT0"
const ENTRY_SIZE: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct CatalogMeta {
    pub tables: Vec<(u32, PageId)>,
    pub indexes: Vec<(u32, PageId)>,
}

impl CatalogMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(data: &[u8; PAGE_SIZE]) -> Result<Self> {
        let magic = u32::from_le_bytes(data[0..4].try_into().unwrap());
        if magic != MAGIC {
            // A never-initialised meta page (fresh database) reads as all
            // zero; treat that as an empty catalog rather than corruption.
            if data.iter().all(|&b| b == 0) {
                return Ok(Self::new());
            }
            return Err(StorageError::corruption("bad catalog meta page magic"));
        }
        let table_count = u32::from_le_bytes(data[4..8].try_into().unwrap()) as usize;
        let index_count = u32::from_le_bytes(data[8..12].try_into().unwrap()) as usize;
        let mut off = 12;
        let mut tables = Vec::with_capacity(table_count);
        for _ in 0..table_count {
            let id = u32::from_le_bytes(data[off..off + 4].try_into().unwrap());
            let page = i32::from_le_bytes(data[off + 4..off + 8].try_into().unwrap());
            tables.push((id, PageId::new(page)));
            off += ENTRY_SIZE;
        }
        let mut indexes = Vec::with_capacity(index_count);
        for _ in 0..index_count {
            let id = u32::from_le_bytes(data[off..off + 4].try_into().unwrap());
            let page = i32::from_le_bytes(data[off + 4..off + 8].try_into().unwrap());
            indexes.push((id, PageId::new(page)));
            off += ENTRY_SIZE;
        }
        Ok(Self { tables, indexes })
    }

    pub fn write(&self, data: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let needed = 12 + (self.tables.len() + self.indexes.len()) * ENTRY_SIZE;
        if needed > PAGE_SIZE {
            return Err(StorageError::PageFull {
                page_id: PageId::INVALID,
                needed,
                available: PAGE_SIZE,
            });
        }
        data.fill(0);
        data[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        data[4..8].copy_from_slice(&(self.tables.len() as u32).to_le_bytes());
        data[8..12].copy_from_slice(&(self.indexes.len() as u32).to_le_bytes());
        let mut off = 12;
        for &(id, page) in &self.tables {
            data[off..off + 4].copy_from_slice(&id.to_le_bytes());
            data[off + 4..off + 8].copy_from_slice(&page.value().to_le_bytes());
            off += ENTRY_SIZE;
        }
        for &(id, page) in &self.indexes {
            data[off..off + 4].copy_from_slice(&id.to_le_bytes());
            data[off + 4..off + 8].copy_from_slice(&page.value().to_le_bytes());
            off += ENTRY_SIZE;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let meta = CatalogMeta {
            tables: vec![(0, PageId::new(5)), (1, PageId::new(7))],
            indexes: vec![(0, PageId::new(9))],
        };
        let mut buf = [0u8; PAGE_SIZE];
        meta.write(&mut buf).unwrap();
        let restored = CatalogMeta::read(&buf).unwrap();
        assert_eq!(restored.tables, meta.tables);
        assert_eq!(restored.indexes, meta.indexes);
    }

    #[test]
    fn fresh_zeroed_page_is_empty_catalog() {
        let buf = [0u8; PAGE_SIZE];
        let meta = CatalogMeta::read(&buf).unwrap();
        assert!(meta.tables.is_empty());
        assert!(meta.indexes.is_empty());
    }
}
