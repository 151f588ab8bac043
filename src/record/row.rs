//! A tuple: an ordered list of `Field`s plus (once inserted) the `RowId`
//! addressing it in a table heap.

use crate::error::{Result, StorageError};
use crate::record::field::Field;
use crate::record::schema::Schema;
use crate::types::RowId;

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub fields: Vec<Field>,
    pub rid: RowId,
}

impl Row {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            rid: RowId::INVALID,
        }
    }

    pub fn with_rid(fields: Vec<Field>, rid: RowId) -> Self {
        Self { fields, rid }
    }

    pub fn serialized_size(&self, schema: &Schema) -> usize {
        let mut size = 4 + 4;
        for (field, col) in self.fields.iter().zip(schema.columns.iter()) {
            size += field.serialized_size(col.len);
        }
        size
    }

    pub fn serialize_to(&self, schema: &Schema, buf: &mut Vec<u8>) -> Result<()> {
        if self.fields.len() != schema.column_count() {
            return Err(StorageError::invalid_operation(
                "row field count does not match schema",
            ));
        }
        let field_count = self.fields.len() as u32;
        buf.extend_from_slice(&field_count.to_le_bytes());

        let mut null_bitmap: u32 = 0;
        for (i, field) in self.fields.iter().enumerate() {
            if field.is_null() {
                null_bitmap |= 1 << (self.fields.len() - 1 - i);
            }
        }
        buf.extend_from_slice(&null_bitmap.to_le_bytes());

        for (field, col) in self.fields.iter().zip(schema.columns.iter()) {
            field.serialize_to(buf, col.len);
        }
        Ok(())
    }

    pub fn deserialize(bytes: &[u8], schema: &Schema) -> Result<Self> {
        if bytes.len() < 8 {
            return Err(StorageError::corruption("truncated row"));
        }
        let field_count = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let null_bitmap = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        if field_count != schema.column_count() {
            return Err(StorageError::corruption(
                "row field count does not match schema",
            ));
        }

        let mut off = 8;
        let mut fields = Vec::with_capacity(field_count);
        for i in 0..field_count {
            let is_null = null_bitmap & (1 << (field_count - 1 - i)) != 0;
            let col = schema
                .column(i)
                .ok_or_else(|| StorageError::corruption("schema column index out of range"))?;
            if is_null {
                fields.push(Field::Null);
                continue;
            }
            let (field, consumed) = Field::deserialize(&bytes[off..], col.column_type, col.len)?;
            off += consumed;
            fields.push(field);
        }
        Ok(Self {
            fields,
            rid: RowId::INVALID,
        })
    }

    /// Project this row (described by `schema`) onto `key_schema`, looking
    /// up each key column by name in `schema`.
    pub fn get_key_from_row(&self, schema: &Schema, key_schema: &Schema) -> Result<Row> {
        let mut fields = Vec::with_capacity(key_schema.column_count());
        for key_col in &key_schema.columns {
            let idx = schema.index_of(&key_col.name).ok_or_else(|| {
                StorageError::invalid_operation(format!(
                    "key column '{}' not present in row schema",
                    key_col.name
                ))
            })?;
            fields.push(self.fields[idx].clone());
        }
        Ok(Row::new(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::column::Column;
    use crate::record::field::FieldType;

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("a", FieldType::Int32, 0, false, true),
            Column::new_char("b", 8, 1, true, false),
        ])
    }

    #[test]
    fn roundtrip_with_null() {
        let schema = schema();
        let row = Row::new(vec![Field::Int32(7), Field::Null]);
        let mut buf = Vec::new();
        row.serialize_to(&schema, &mut buf).unwrap();
        assert_eq!(buf.len(), row.serialized_size(&schema));

        let decoded = Row::deserialize(&buf, &schema).unwrap();
        assert_eq!(decoded.fields, row.fields);
    }

    #[test]
    fn get_key_from_row_projects_by_name() {
        let schema = schema();
        let key_schema = Schema::new(vec![Column::new_char("b", 8, 0, true, false)]);
        let row = Row::new(vec![Field::Int32(1), Field::Char("hello".to_string())]);
        let key = row.get_key_from_row(&schema, &key_schema).unwrap();
        assert_eq!(key.fields, vec![Field::Char("hello".to_string())]);
    }
}
