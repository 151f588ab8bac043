//! Common header shared by B+Tree internal and leaf pages.
//!
//! `page_type(u32) | lsn(u32) | size(u32) | max_size(u32) | parent(i32) |
//! page_id(i32) | key_size(u32)`, followed by `next_page_id(i32)` for leaf
//! pages only, then the key/value pairs.

use crate::types::{BPlusTreePageType, PageId, PAGE_SIZE};

pub const HEADER_SIZE: usize = 28;
pub const LEAF_HEADER_SIZE: usize = HEADER_SIZE + 4;

pub fn page_type(data: &[u8; PAGE_SIZE]) -> BPlusTreePageType {
    BPlusTreePageType::from_u32(u32::from_le_bytes(data[0..4].try_into().unwrap()))
}

pub fn set_page_type(data: &mut [u8; PAGE_SIZE], t: BPlusTreePageType) {
    data[0..4].copy_from_slice(&(t as u32).to_le_bytes());
}

pub fn lsn(data: &[u8; PAGE_SIZE]) -> u32 {
    u32::from_le_bytes(data[4..8].try_into().unwrap())
}

pub fn bump_lsn(data: &mut [u8; PAGE_SIZE]) {
    // LSN is an opaque, never-interpreted counter; bumping just records
    // that the page was touched.
    let v = lsn(data).wrapping_add(1);
    data[4..8].copy_from_slice(&v.to_le_bytes());
}

pub fn size(data: &[u8; PAGE_SIZE]) -> u32 {
    u32::from_le_bytes(data[8..12].try_into().unwrap())
}

pub fn set_size(data: &mut [u8; PAGE_SIZE], v: u32) {
    data[8..12].copy_from_slice(&v.to_le_bytes());
}

pub fn max_size(data: &[u8; PAGE_SIZE]) -> u32 {
    u32::from_le_bytes(data[12..16].try_into().unwrap())
}

pub fn set_max_size(data: &mut [u8; PAGE_SIZE], v: u32) {
    data[12..16].copy_from_slice(&v.to_le_bytes());
}

pub fn parent_page_id(data: &[u8; PAGE_SIZE]) -> PageId {
    PageId::new(i32::from_le_bytes(data[16..20].try_into().unwrap()))
}

pub fn set_parent_page_id(data: &mut [u8; PAGE_SIZE], id: PageId) {
    data[16..20].copy_from_slice(&id.value().to_le_bytes());
}

pub fn page_id(data: &[u8; PAGE_SIZE]) -> PageId {
    PageId::new(i32::from_le_bytes(data[20..24].try_into().unwrap()))
}

pub fn set_page_id(data: &mut [u8; PAGE_SIZE], id: PageId) {
    data[20..24].copy_from_slice(&id.value().to_le_bytes());
}

pub fn key_size(data: &[u8; PAGE_SIZE]) -> u32 {
    u32::from_le_bytes(data[24..28].try_into().unwrap())
}

pub fn set_key_size(data: &mut [u8; PAGE_SIZE], v: u32) {
    data[24..28].copy_from_slice(&v.to_le_bytes());
}

pub fn is_root(data: &[u8; PAGE_SIZE]) -> bool {
    !parent_page_id(data).is_valid()
}

/// Minimum occupancy for a node of this page's type.
pub fn min_size(data: &[u8; PAGE_SIZE]) -> u32 {
    let max = max_size(data);
    match page_type(data) {
        BPlusTreePageType::Leaf => {
            if is_root(data) {
                1
            } else {
                (max - 1).div_ceil(2)
            }
        }
        BPlusTreePageType::Internal => {
            if is_root(data) {
                2
            } else {
                max.div_ceil(2)
            }
        }
        BPlusTreePageType::Invalid => 0,
    }
}
