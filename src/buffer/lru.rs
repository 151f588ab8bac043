//! LRU replacer: selects an unpinned frame for eviction.
//!
//! Tracks frame ids, not page ids — the buffer pool's page table maps page
//! ids to frames, and the replacer only ever deals in the latter. Backed by
//! an intrusive doubly linked list plus a hash map for O(1) `pin`/`unpin`.

use std::collections::HashMap;

type FrameId = usize;

#[derive(Clone, Copy)]
struct Node {
    frame_id: FrameId,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Capacity-bounded LRU victim selector operating on buffer-pool frame ids.
pub struct LruReplacer {
    capacity: usize,
    positions: HashMap<FrameId, usize>,
    nodes: Vec<Node>,
    /// Most-recently-unpinned end.
    head: Option<usize>,
    /// Least-recently-unpinned end; `victim()` removes from here.
    tail: Option<usize>,
    free_slots: Vec<usize>,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            positions: HashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            head: None,
            tail: None,
            free_slots: Vec::new(),
        }
    }

    /// Returns and removes the least-recently-unpinned frame.
    pub fn victim(&mut self) -> Option<FrameId> {
        let pos = self.tail?;
        let frame_id = self.nodes[pos].frame_id;
        self.unlink_and_free(pos);
        Some(frame_id)
    }

    /// Removes `frame_id` from the replacer, if present, without returning it.
    pub fn pin(&mut self, frame_id: FrameId) {
        if let Some(pos) = self.positions.remove(&frame_id) {
            self.unlink(pos);
            self.free_slots.push(pos);
        }
    }

    /// Marks `frame_id` as eligible for eviction; inserts at the MRU end if
    /// not already tracked. A no-op once the replacer is already at
    /// capacity and the frame isn't present — mirrors the reference
    /// implementation's saturation guard.
    pub fn unpin(&mut self, frame_id: FrameId) {
        if self.positions.contains_key(&frame_id) {
            return;
        }
        if self.positions.len() >= self.capacity {
            return;
        }
        let pos = if let Some(pos) = self.free_slots.pop() {
            self.nodes[pos] = Node {
                frame_id,
                prev: None,
                next: self.head,
            };
            pos
        } else {
            let pos = self.nodes.len();
            self.nodes.push(Node {
                frame_id,
                prev: None,
                next: self.head,
            });
            pos
        };

        if let Some(old_head) = self.head {
            self.nodes[old_head].prev = Some(pos);
        }
        self.head = Some(pos);
        if self.tail.is_none() {
            self.tail = Some(pos);
        }
        self.positions.insert(frame_id, pos);
    }

    /// Explicitly drop a frame from tracking (used by `delete_page`).
    pub fn remove(&mut self, frame_id: FrameId) {
        self.pin(frame_id);
    }

    pub fn size(&self) -> usize {
        self.positions.len()
    }

    fn unlink(&mut self, pos: usize) {
        let node = self.nodes[pos];
        match node.prev {
            Some(prev) => self.nodes[prev].next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.nodes[next].prev = node.prev,
            None => self.tail = node.prev,
        }
    }

    fn unlink_and_free(&mut self, pos: usize) {
        let frame_id = self.nodes[pos].frame_id;
        self.unlink(pos);
        self.positions.remove(&frame_id);
        self.free_slots.push(pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn true_lru_order() {
        let mut r = LruReplacer::new(3);
        r.unpin(1);
        r.unpin(2);
        r.unpin(3);
        assert_eq!(r.size(), 3);
        assert_eq!(r.victim(), Some(1));
        assert_eq!(r.victim(), Some(2));
        assert_eq!(r.victim(), Some(3));
        assert_eq!(r.victim(), None);
    }

    #[test]
    fn pin_removes_candidate() {
        let mut r = LruReplacer::new(3);
        r.unpin(1);
        r.unpin(2);
        r.pin(1);
        assert_eq!(r.victim(), Some(2));
        assert_eq!(r.size(), 0);
    }

    #[test]
    fn unpin_past_capacity_is_noop_for_new_frames() {
        let mut r = LruReplacer::new(2);
        r.unpin(1);
        r.unpin(2);
        r.unpin(3);
        assert_eq!(r.size(), 2);
    }

    #[test]
    fn re_unpinning_does_not_duplicate() {
        let mut r = LruReplacer::new(3);
        r.unpin(1);
        r.unpin(2);
        r.unpin(1);
        assert_eq!(r.size(), 2);
    }
}
