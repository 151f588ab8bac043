//! Metadata the catalog keeps for one table: its schema and its heap.

use crate::record::Schema;
use crate::table::TableHeap;
use std::sync::Arc;

/// A registered table: the schema the catalog owns a copy of, and the
/// heap holding its rows.
pub struct TableInfo {
    pub table_id: u32,
    pub name: String,
    pub schema: Arc<Schema>,
    pub heap: TableHeap,
}
