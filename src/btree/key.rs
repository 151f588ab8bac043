//! `GenericKey`: a packed byte prefix representing one or more indexed
//! column values, plus the externally provided comparator that
//! interprets those bytes.
//!
//! The encoding reuses the record layer's `Row` wire format (field count +
//! null bitmap + field payloads) over the index's key `Schema`. Because
//! every column in a key schema has a fixed wire width, this gives every
//! key for a given index a fixed byte length — exactly what the B+Tree
//! needs to compute `max_size` from `PAGE_SIZE`.

use crate::record::{Field, Row, Schema};
use std::cmp::Ordering;
use std::sync::Arc;

/// Encodes rows into fixed-width key bytes and compares them, schema-aware.
#[derive(Clone)]
pub struct KeyManager {
    schema: Arc<Schema>,
}

impl KeyManager {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Fixed size in bytes of any key encoded by this manager.
    pub fn key_size(&self) -> usize {
        8 + self
            .schema
            .columns
            .iter()
            .map(|c| match c.column_type {
                crate::record::FieldType::Char => c.len as usize,
                _ => 4,
            })
            .sum::<usize>()
    }

    /// Encode a key row (already projected onto the key schema, e.g. via
    /// `Row::get_key_from_row`) into fixed-width bytes.
    pub fn encode(&self, key_row: &Row) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.key_size());
        key_row
            .serialize_to(&self.schema, &mut buf)
            .expect("key row must match key schema");
        buf
    }

    /// Decode key bytes back into fields for comparison or display.
    pub fn decode(&self, bytes: &[u8]) -> crate::error::Result<Row> {
        Row::deserialize(bytes, &self.schema)
    }

    /// Compare two encoded keys by decoding and comparing field-by-field
    /// in schema column order.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let ra = self.decode(a).expect("corrupt key bytes");
        let rb = self.decode(b).expect("corrupt key bytes");
        for (fa, fb) in ra.fields.iter().zip(rb.fields.iter()) {
            match fa.compare(fb) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }

    /// Build a single-field key directly from one `Field` (used by tests
    /// and by query planners doing point lookups on a single-column key).
    pub fn encode_field(&self, field: Field) -> Vec<u8> {
        self.encode(&Row::new(vec![field]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Column;

    fn mgr() -> KeyManager {
        KeyManager::new(Arc::new(Schema::new(vec![Column::new(
            "a",
            crate::record::FieldType::Int32,
            0,
            false,
            false,
        )])))
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mgr = mgr();
        let bytes = mgr.encode_field(Field::Int32(42));
        assert_eq!(bytes.len(), mgr.key_size());
        let decoded = mgr.decode(&bytes).unwrap();
        assert_eq!(decoded.fields[0], Field::Int32(42));
    }

    #[test]
    fn compare_orders_numerically() {
        let mgr = mgr();
        let a = mgr.encode_field(Field::Int32(3));
        let b = mgr.encode_field(Field::Int32(30));
        assert_eq!(mgr.compare(&a, &b), Ordering::Less);
    }
}
