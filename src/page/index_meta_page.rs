//! Index Meta Page: an index's own meta page, holding the `(index_id,
//! name, table_id, key_map)` tuple the catalog needs to rebuild an
//! `IndexInfo` given its owning `TableInfo` and the B+Tree root stored in
//! the Index Roots Page.
//!
//! Serialised as `[magic(u32) | index_id(u32) | table_id(u32) |
//! name_len(u32) | name | key_map_len(u32) | key_map[u32]]`.

use crate::error::{Result, StorageError};
use crate::types::PAGE_SIZE;

const MAGIC: u32 = 0x4958_4D54; // "IXMT"

#[derive(Debug, Clone)]
pub struct IndexMetaPage {
    pub index_id: u32,
    pub table_id: u32,
    pub name: String,
    pub key_map: Vec<u32>,
}

impl IndexMetaPage {
    pub fn read(data: &[u8; PAGE_SIZE]) -> Result<Self> {
        let magic = u32::from_le_bytes(data[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(StorageError::corruption("bad index meta page magic"));
        }
        let index_id = u32::from_le_bytes(data[4..8].try_into().unwrap());
        let table_id = u32::from_le_bytes(data[8..12].try_into().unwrap());
        let name_len = u32::from_le_bytes(data[12..16].try_into().unwrap()) as usize;
        let mut off = 16;
        let name = String::from_utf8(data[off..off + name_len].to_vec())
            .map_err(|_| StorageError::corruption("index name is not valid utf8"))?;
        off += name_len;
        let map_len = u32::from_le_bytes(data[off..off + 4].try_into().unwrap()) as usize;
        off += 4;
        let mut key_map = Vec::with_capacity(map_len);
        for _ in 0..map_len {
            key_map.push(u32::from_le_bytes(data[off..off + 4].try_into().unwrap()));
            off += 4;
        }
        Ok(Self {
            index_id,
            table_id,
            name,
            key_map,
        })
    }

    pub fn write(&self, data: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let needed = 20 + self.name.len() + self.key_map.len() * 4;
        if needed > PAGE_SIZE {
            return Err(StorageError::PageFull {
                page_id: crate::types::PageId::INVALID,
                needed,
                available: PAGE_SIZE,
            });
        }
        data.fill(0);
        data[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        data[4..8].copy_from_slice(&self.index_id.to_le_bytes());
        data[8..12].copy_from_slice(&self.table_id.to_le_bytes());
        data[12..16].copy_from_slice(&(self.name.len() as u32).to_le_bytes());
        let mut off = 16;
        data[off..off + self.name.len()].copy_from_slice(self.name.as_bytes());
        off += self.name.len();
        data[off..off + 4].copy_from_slice(&(self.key_map.len() as u32).to_le_bytes());
        off += 4;
        for &idx in &self.key_map {
            data[off..off + 4].copy_from_slice(&idx.to_le_bytes());
            off += 4;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let meta = IndexMetaPage {
            index_id: 1,
            table_id: 3,
            name: "by_label".to_string(),
            key_map: vec![1],
        };
        let mut buf = [0u8; PAGE_SIZE];
        meta.write(&mut buf).unwrap();
        let restored = IndexMetaPage::read(&buf).unwrap();
        assert_eq!(restored.index_id, meta.index_id);
        assert_eq!(restored.table_id, meta.table_id);
        assert_eq!(restored.name, meta.name);
        assert_eq!(restored.key_map, meta.key_map);
    }
}
