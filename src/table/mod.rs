//! Table heap: an unordered chain of slotted table pages holding one
//! table's rows.

mod heap;

pub use heap::{TableHeap, TableIterator};
