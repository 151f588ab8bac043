//! B+Tree index implementation.
//!
//! Disk-backed B+Tree over the buffer pool, keyed by schema-aware
//! `GenericKey` bytes (see [`key::KeyManager`]). Supports point lookups,
//! insertion with recursive split, deletion with coalesce/redistribute,
//! and ordered iteration via [`cursor::IndexIterator`].

mod cursor;
mod key;
mod tree;

pub use cursor::IndexIterator;
pub use key::KeyManager;
pub use tree::BPlusTree;
