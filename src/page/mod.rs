//! Page-framed structures: typed views over an opaque `[u8; PAGE_SIZE]`
//! buffer borrowed from a buffer-pool frame.
//!
//! Every page kind below decodes its header fields on demand rather than
//! materialising a parsed struct, so a view borrows its backing buffer for
//! exactly as long as the caller holds the frame guard.

mod b_plus_tree_page;
mod catalog_meta_page;
mod index_meta_page;
mod index_roots_page;
mod internal_page;
mod leaf_page;
mod table_meta_page;
mod table_page;

pub use b_plus_tree_page::page_type as b_plus_tree_page_type;
pub use catalog_meta_page::CatalogMeta;
pub use index_meta_page::IndexMetaPage;
pub use index_roots_page::IndexRootsPage;
pub use internal_page::InternalPageView;
pub use leaf_page::LeafPageView;
pub use table_meta_page::TableMetaPage;
pub use table_page::{TablePageView, TupleSlot};
