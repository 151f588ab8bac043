//! Table Meta Page: a table's own meta page, holding everything the
//! catalog needs to rebuild a `TableInfo` without consulting anything
//! else on disk.
//!
//! Serialised as `[magic(u32) | table_id(u32) | first_page_id(i32) |
//! name_len(u32) | name | schema]`.

use crate::error::{Result, StorageError};
use crate::record::Schema;
use crate::types::{PageId, PAGE_SIZE};

const MAGIC: u32 = 0x7441_424C; // "tABL"

#[derive(Debug, Clone)]
pub struct TableMetaPage {
    pub table_id: u32,
    pub first_page_id: PageId,
    pub name: String,
    pub schema: Schema,
}

impl TableMetaPage {
    pub fn read(data: &[u8; PAGE_SIZE]) -> Result<Self> {
        let magic = u32::from_le_bytes(data[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(StorageError::corruption("bad table meta page magic"));
        }
        let table_id = u32::from_le_bytes(data[4..8].try_into().unwrap());
        let first_page_id = PageId::new(i32::from_le_bytes(data[8..12].try_into().unwrap()));
        let name_len = u32::from_le_bytes(data[12..16].try_into().unwrap()) as usize;
        let mut off = 16;
        let name = String::from_utf8(data[off..off + name_len].to_vec())
            .map_err(|_| StorageError::corruption("table name is not valid utf8"))?;
        off += name_len;
        let (schema, _) = Schema::deserialize(&data[off..])?;
        Ok(Self {
            table_id,
            first_page_id,
            name,
            schema,
        })
    }

    pub fn write(&self, data: &mut [u8; PAGE_SIZE]) -> Result<()> {
        let needed = 16 + self.name.len() + self.schema.serialized_size();
        if needed > PAGE_SIZE {
            return Err(StorageError::PageFull {
                page_id: self.first_page_id,
                needed,
                available: PAGE_SIZE,
            });
        }
        data.fill(0);
        data[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        data[4..8].copy_from_slice(&self.table_id.to_le_bytes());
        data[8..12].copy_from_slice(&self.first_page_id.value().to_le_bytes());
        data[12..16].copy_from_slice(&(self.name.len() as u32).to_le_bytes());
        let mut off = 16;
        data[off..off + self.name.len()].copy_from_slice(self.name.as_bytes());
        off += self.name.len();
        let mut schema_buf = Vec::new();
        self.schema.serialize_to(&mut schema_buf);
        data[off..off + schema_buf.len()].copy_from_slice(&schema_buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Column, FieldType};

    #[test]
    fn roundtrip() {
        let meta = TableMetaPage {
            table_id: 3,
            first_page_id: PageId::new(42),
            name: "accounts".to_string(),
            schema: Schema::new(vec![
                Column::new("id", FieldType::Int32, 0, false, true),
                Column::new_char("label", 8, 1, true, false),
            ]),
        };
        let mut buf = [0u8; PAGE_SIZE];
        meta.write(&mut buf).unwrap();
        let restored = TableMetaPage::read(&buf).unwrap();
        assert_eq!(restored.table_id, meta.table_id);
        assert_eq!(restored.first_page_id, meta.first_page_id);
        assert_eq!(restored.name, meta.name);
        assert_eq!(restored.schema, meta.schema);
    }
}
