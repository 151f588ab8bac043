//! Ordered sequence of columns describing a table's row layout, or a
//! derived key schema over a subset of a table's columns.

use crate::error::{Result, StorageError};
use crate::record::column::Column;

const SCHEMA_MAGIC: u32 = 0x5C4E_7A00;

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn serialized_size(&self) -> usize {
        8 + self.columns.iter().map(Column::serialized_size).sum::<usize>()
    }

    pub fn serialize_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&SCHEMA_MAGIC.to_le_bytes());
        buf.extend_from_slice(&(self.columns.len() as u32).to_le_bytes());
        for col in &self.columns {
            col.serialize_to(buf);
        }
    }

    pub fn deserialize(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < 8 {
            return Err(StorageError::corruption("truncated schema"));
        }
        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if magic != SCHEMA_MAGIC {
            return Err(StorageError::corruption("bad schema magic"));
        }
        let count = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        let mut off = 8;
        let mut columns = Vec::with_capacity(count);
        for _ in 0..count {
            let (col, consumed) = Column::deserialize(&bytes[off..])?;
            off += consumed;
            columns.push(col);
        }
        Ok((Self { columns }, off))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::field::FieldType;

    #[test]
    fn roundtrip() {
        let schema = Schema::new(vec![
            Column::new("a", FieldType::Int32, 0, false, true),
            Column::new_char("b", 8, 1, true, false),
        ]);
        let mut buf = Vec::new();
        schema.serialize_to(&mut buf);
        let (decoded, consumed) = Schema::deserialize(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, schema);
        assert_eq!(decoded.index_of("b"), Some(1));
    }
}
