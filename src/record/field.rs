//! Field values. A `Field`'s wire representation carries no type tag of its
//! own — the owning `Column`'s type decides how to decode it, and a null
//! field occupies zero payload bytes.

use crate::error::{Result, StorageError};
use std::cmp::Ordering;

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Null,
    Int32(i32),
    Float32(f32),
    Char(String),
}

impl Field {
    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    /// Number of bytes this field occupies on the wire given a fixed
    /// `char_len` (ignored for non-Char fields). Null fields are 0 bytes.
    pub fn serialized_size(&self, char_len: u32) -> usize {
        match self {
            Field::Null => 0,
            Field::Int32(_) => 4,
            Field::Float32(_) => 4,
            Field::Char(_) => char_len as usize,
        }
    }

    pub fn serialize_to(&self, buf: &mut Vec<u8>, char_len: u32) {
        match self {
            Field::Null => {}
            Field::Int32(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Field::Float32(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Field::Char(s) => {
                let mut bytes = s.as_bytes().to_vec();
                bytes.resize(char_len as usize, 0);
                buf.extend_from_slice(&bytes);
            }
        }
    }

    /// Decode a non-null field of `type_name` from `bytes`, returning the
    /// field and how many bytes were consumed. Caller is responsible for
    /// checking the null bitmap before calling this.
    pub fn deserialize(bytes: &[u8], type_name: FieldType, char_len: u32) -> Result<(Self, usize)> {
        match type_name {
            FieldType::Int32 => {
                if bytes.len() < 4 {
                    return Err(StorageError::corruption("truncated int32 field"));
                }
                let v = i32::from_le_bytes(bytes[0..4].try_into().unwrap());
                Ok((Field::Int32(v), 4))
            }
            FieldType::Float32 => {
                if bytes.len() < 4 {
                    return Err(StorageError::corruption("truncated float32 field"));
                }
                let v = f32::from_le_bytes(bytes[0..4].try_into().unwrap());
                Ok((Field::Float32(v), 4))
            }
            FieldType::Char => {
                let len = char_len as usize;
                if bytes.len() < len {
                    return Err(StorageError::corruption("truncated char field"));
                }
                let raw = &bytes[0..len];
                let nul = raw.iter().position(|&b| b == 0).unwrap_or(len);
                let s = String::from_utf8_lossy(&raw[0..nul]).into_owned();
                Ok((Field::Char(s), len))
            }
        }
    }

    pub fn type_id(&self) -> Option<FieldType> {
        match self {
            Field::Null => None,
            Field::Int32(_) => Some(FieldType::Int32),
            Field::Float32(_) => Some(FieldType::Float32),
            Field::Char(_) => Some(FieldType::Char),
        }
    }

    /// Ordering used by B+Tree key comparisons. Fields must be the same
    /// variant; mismatched types are a programming error upstream.
    pub fn compare(&self, other: &Field) -> Ordering {
        match (self, other) {
            (Field::Null, Field::Null) => Ordering::Equal,
            (Field::Null, _) => Ordering::Less,
            (_, Field::Null) => Ordering::Greater,
            (Field::Int32(a), Field::Int32(b)) => a.cmp(b),
            (Field::Float32(a), Field::Float32(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Field::Char(a), Field::Char(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

/// The type discriminator stored in a `Column`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int32,
    Float32,
    Char,
}

impl FieldType {
    pub fn to_u32(self) -> u32 {
        match self {
            FieldType::Int32 => 0,
            FieldType::Float32 => 1,
            FieldType::Char => 2,
        }
    }

    pub fn from_u32(v: u32) -> Result<Self> {
        match v {
            0 => Ok(FieldType::Int32),
            1 => Ok(FieldType::Float32),
            2 => Ok(FieldType::Char),
            _ => Err(StorageError::corruption(format!("unknown field type tag {v}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_field_roundtrips_with_padding() {
        let f = Field::Char("hi".to_string());
        let mut buf = Vec::new();
        f.serialize_to(&mut buf, 8);
        assert_eq!(buf.len(), 8);
        let (decoded, consumed) = Field::deserialize(&buf, FieldType::Char, 8).unwrap();
        assert_eq!(consumed, 8);
        assert_eq!(decoded, Field::Char("hi".to_string()));
    }

    #[test]
    fn int32_field_roundtrips() {
        let f = Field::Int32(-42);
        let mut buf = Vec::new();
        f.serialize_to(&mut buf, 0);
        let (decoded, consumed) = Field::deserialize(&buf, FieldType::Int32, 0).unwrap();
        assert_eq!(consumed, 4);
        assert_eq!(decoded, Field::Int32(-42));
    }

    #[test]
    fn null_ordering() {
        assert_eq!(Field::Null.compare(&Field::Int32(1)), Ordering::Less);
    }
}
