//! Storage layer: disk I/O, bitmap-extent allocation, and the disk meta
//! page.

mod bitmap_page;
mod disk_manager;
mod file_header;

pub use bitmap_page::BitmapPage;
pub use disk_manager::{DiskManager, DiskManagerImpl};
pub use file_header::DiskMeta;
