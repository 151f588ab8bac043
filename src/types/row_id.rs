//! Row identifier type: the address of one tuple in a table heap.

use crate::types::PageId;
use std::fmt;

/// Uniquely identifies a tuple stored in a table heap: the page that holds it
/// plus its slot number within that page's slot directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RowId {
    pub page_id: PageId,
    pub slot_num: u32,
}

impl RowId {
    /// Sentinel row id used by `TableHeap::end()` and `IndexIterator::end()`.
    pub const INVALID: RowId = RowId {
        page_id: PageId::INVALID,
        slot_num: 0,
    };

    pub const fn new(page_id: PageId, slot_num: u32) -> Self {
        Self { page_id, slot_num }
    }

    pub fn is_valid(&self) -> bool {
        self.page_id.is_valid()
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot_num)
    }
}
