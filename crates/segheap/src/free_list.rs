//! Segregated free lists.
//!
//! Free blocks are kept in [`CLASS_COUNT`] unordered, doubly-linked lists,
//! one per power-of-two size class. The links live inside the payload of
//! the free blocks themselves (see [`codec`](crate::codec)); this module
//! only owns the list heads.
//!
//! A block of size `s` belongs to class `min(floor(log2(s - 1)),
//! CLASS_COUNT - 1)`. With the 16-byte minimum block size, classes 0 to 2
//! are never used.
//!
//! # Invariants
//!
//! - A block is linked in exactly one list iff its allocated bit is 0.
//! - Every link points to the payload of a free block of the same class.

use log::warn;

use crate::{
    codec::{self, MIN_BLOCK_SIZE},
    config::FitPolicy,
};

/// Number of size classes.
pub const CLASS_COUNT: usize = 20;

/// Returns the size class of a block of `size` bytes.
#[must_use]
pub fn class_of(size: u32) -> usize {
    debug_assert!(size >= MIN_BLOCK_SIZE);
    let class = (size - 1).ilog2() as usize;
    class.min(CLASS_COUNT - 1)
}

/// Heads of the segregated free lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeLists {
    heads: [Option<u32>; CLASS_COUNT],
}

impl Default for FreeLists {
    fn default() -> Self {
        Self::new()
    }
}

impl FreeLists {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            heads: [None; CLASS_COUNT],
        }
    }

    /// Forgets every list. The blocks themselves are not touched.
    pub fn clear(&mut self) {
        self.heads = [None; CLASS_COUNT];
    }

    #[must_use]
    pub fn head(&self, class: usize) -> Option<u32> {
        self.heads[class]
    }

    /// Pushes the free block at `bp` onto the head of its class list.
    ///
    /// The block's tags must already mark it free and it must not be
    /// linked yet.
    pub fn insert(&mut self, bytes: &mut [u8], bp: u32) {
        let tag = codec::read_tag(bytes, codec::header(bp));
        debug_assert!(!tag.is_allocated(), "inserting allocated block {bp:#x}");

        let class = class_of(tag.size());
        let next = self.heads[class];
        codec::write_next_link(bytes, bp, next);
        codec::write_prev_link(bytes, bp, None);
        if let Some(next) = next {
            codec::write_prev_link(bytes, next, Some(bp));
        }
        self.heads[class] = Some(bp);
    }

    /// Unlinks the free block at `bp` from its class list.
    ///
    /// Returns `false` and leaves every list untouched if the block is
    /// allocated or is not linked.
    pub fn remove(&mut self, bytes: &mut [u8], bp: u32) -> bool {
        let tag = codec::read_tag(bytes, codec::header(bp));
        if tag.is_allocated() {
            warn!("refusing to unlink allocated block {bp:#x}");
            return false;
        }

        let class = class_of(tag.size());
        let prev = codec::read_prev_link(bytes, bp);
        let next = codec::read_next_link(bytes, bp);
        match prev {
            Some(prev) => codec::write_next_link(bytes, prev, next),
            None => {
                if self.heads[class] != Some(bp) {
                    warn!("block {bp:#x} is not linked in free list {class}");
                    return false;
                }
                self.heads[class] = next;
            }
        }
        if let Some(next) = next {
            codec::write_prev_link(bytes, next, prev);
        }
        codec::write_next_link(bytes, bp, None);
        codec::write_prev_link(bytes, bp, None);
        true
    }

    /// Searches for a free block of at least `asize` bytes.
    ///
    /// An exact-size block always wins over larger ones seen in the same
    /// scan. See [`FitPolicy`] for how far the search goes.
    #[must_use]
    pub fn find_fit(&self, bytes: &[u8], asize: u32, policy: FitPolicy) -> Option<u32> {
        let mut best: Option<(u32, u32)> = None;
        for class in class_of(asize)..CLASS_COUNT {
            for bp in self.iter_class(bytes, class) {
                let size = codec::block_size(bytes, bp);
                if size == asize {
                    return Some(bp);
                }
                if size < asize {
                    continue;
                }
                if policy == FitPolicy::FirstFit {
                    return Some(bp);
                }
                if best.is_none_or(|(_, best_size)| size < best_size) {
                    best = Some((bp, size));
                }
            }
            if policy == FitPolicy::ClassLocal && best.is_some() {
                break;
            }
        }
        best.map(|(bp, _)| bp)
    }

    /// Iterates over the blocks linked in `class`, head first.
    #[must_use]
    pub fn iter_class<'a>(&self, bytes: &'a [u8], class: usize) -> ClassIter<'a> {
        ClassIter {
            bytes,
            cursor: self.heads[class],
        }
    }
}

/// Iterator over the payload offsets of one free list.
///
/// A link pointing outside the region ends the iteration after yielding
/// the bad offset, so corrupted lists can be inspected without panicking.
#[derive(Debug, Clone)]
pub struct ClassIter<'a> {
    bytes: &'a [u8],
    cursor: Option<u32>,
}

impl Iterator for ClassIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        let bp = self.cursor?;
        self.cursor = codec::try_read_word(self.bytes, bp).filter(|&next| next != 0);
        Some(bp)
    }
}
