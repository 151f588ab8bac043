//! Column metadata: name, type, position, and constraints.

use crate::error::{Result, StorageError};
use crate::record::field::FieldType;

const COLUMN_MAGIC: u32 = 0x0337_5A10;

/// Describes one column of a table schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub column_type: FieldType,
    /// Fixed length in bytes; meaningful only for `Char`.
    pub len: u32,
    /// Position of this column within its schema.
    pub table_ind: u32,
    pub nullable: bool,
    pub unique: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: FieldType, table_ind: u32, nullable: bool, unique: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            len: 0,
            table_ind,
            nullable,
            unique,
        }
    }

    pub fn new_char(name: impl Into<String>, len: u32, table_ind: u32, nullable: bool, unique: bool) -> Self {
        Self {
            name: name.into(),
            column_type: FieldType::Char,
            len,
            table_ind,
            nullable,
            unique,
        }
    }

    pub fn serialized_size(&self) -> usize {
        4 + 4 + self.name.len() + 4 + 4 + 4 + 4 + 4
    }

    pub fn serialize_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&COLUMN_MAGIC.to_le_bytes());
        buf.extend_from_slice(&(self.name.len() as u32).to_le_bytes());
        buf.extend_from_slice(self.name.as_bytes());
        buf.extend_from_slice(&self.column_type.to_u32().to_le_bytes());
        buf.extend_from_slice(&self.len.to_le_bytes());
        buf.extend_from_slice(&self.table_ind.to_le_bytes());
        buf.extend_from_slice(&(self.nullable as u32).to_le_bytes());
        buf.extend_from_slice(&(self.unique as u32).to_le_bytes());
    }

    /// Decode one column starting at `bytes[0]`, returning it and the
    /// number of bytes consumed.
    pub fn deserialize(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut off = 0;
        let read_u32 = |b: &[u8], at: usize| -> Result<u32> {
            b.get(at..at + 4)
                .map(|s| u32::from_le_bytes(s.try_into().unwrap()))
                .ok_or_else(|| StorageError::corruption("truncated column record"))
        };

        let magic = read_u32(bytes, off)?;
        off += 4;
        if magic != COLUMN_MAGIC {
            return Err(StorageError::corruption("bad column magic"));
        }
        let name_len = read_u32(bytes, off)? as usize;
        off += 4;
        let name = String::from_utf8(
            bytes
                .get(off..off + name_len)
                .ok_or_else(|| StorageError::corruption("truncated column name"))?
                .to_vec(),
        )
        .map_err(|_| StorageError::corruption("column name is not valid utf8"))?;
        off += name_len;

        let column_type = FieldType::from_u32(read_u32(bytes, off)?)?;
        off += 4;
        let len = read_u32(bytes, off)?;
        off += 4;
        let table_ind = read_u32(bytes, off)?;
        off += 4;
        let nullable = read_u32(bytes, off)? != 0;
        off += 4;
        let unique = read_u32(bytes, off)? != 0;
        off += 4;

        Ok((
            Self {
                name,
                column_type,
                len,
                table_ind,
                nullable,
                unique,
            },
            off,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_char_column() {
        let col = Column::new_char("b", 8, 1, true, false);
        let mut buf = Vec::new();
        col.serialize_to(&mut buf);
        assert_eq!(buf.len(), col.serialized_size());
        let (decoded, consumed) = Column::deserialize(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, col);
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = [0u8; 32];
        assert!(Column::deserialize(&bytes).is_err());
    }
}
