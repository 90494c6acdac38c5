//! Typed views over blocks inside the heap region.

use derive_more::{Display, IsVariant};

use crate::codec::{self, OVERHEAD};

/// Handle to an allocated payload: its byte offset inside the heap region.
///
/// Offsets stay valid across heap growth, since regions only ever append
/// bytes.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("{_0:#x}")]
pub struct HeapPtr(u32);

impl HeapPtr {
    /// Creates a handle from a raw payload offset.
    ///
    /// Handles that were not returned by the heap are rejected by every heap
    /// operation that validates its argument.
    #[must_use]
    pub const fn from_offset(offset: u32) -> Self {
        Self(offset)
    }

    #[must_use]
    pub const fn offset(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// A block decoded from its boundary tags.
///
/// The payload of a free block doubles as storage for its free-list links;
/// the two variants make that aliasing explicit. Links are only meaningful
/// in the `Free` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IsVariant)]
pub enum Block {
    Free {
        ptr: HeapPtr,
        size: u32,
        prev: Option<HeapPtr>,
        next: Option<HeapPtr>,
    },
    Allocated {
        ptr: HeapPtr,
        size: u32,
    },
}

impl Block {
    /// Decodes the block whose payload starts at `bp`.
    pub(crate) fn decode(bytes: &[u8], bp: u32) -> Self {
        let tag = codec::read_tag(bytes, codec::header(bp));
        let ptr = HeapPtr(bp);
        let size = tag.size();
        if tag.is_allocated() {
            Self::Allocated { ptr, size }
        } else {
            Self::Free {
                ptr,
                size,
                prev: codec::read_prev_link(bytes, bp).map(HeapPtr),
                next: codec::read_next_link(bytes, bp).map(HeapPtr),
            }
        }
    }

    #[must_use]
    pub const fn ptr(&self) -> HeapPtr {
        match self {
            Self::Free { ptr, .. } | Self::Allocated { ptr, .. } => *ptr,
        }
    }

    /// Full footprint of the block, including its boundary tags.
    #[must_use]
    pub const fn size(&self) -> u32 {
        match self {
            Self::Free { size, .. } | Self::Allocated { size, .. } => *size,
        }
    }

    /// Number of payload bytes usable by the caller.
    #[must_use]
    pub const fn payload_len(&self) -> u32 {
        self.size() - OVERHEAD
    }
}

/// Iterator over the blocks between the prologue and the epilogue.
///
/// Created by [`Heap::blocks`](crate::heap::Heap::blocks).
#[derive(Debug, Clone)]
pub struct Blocks<'a> {
    bytes: &'a [u8],
    cursor: u32,
    end: u32,
}

impl<'a> Blocks<'a> {
    pub(crate) fn new(bytes: &'a [u8], first: u32, end: u32) -> Self {
        Self {
            bytes,
            cursor: first,
            end,
        }
    }
}

impl Iterator for Blocks<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.end {
            return None;
        }
        let block = Block::decode(self.bytes, self.cursor);
        if block.size() == 0 {
            // corrupted tag; stop instead of spinning in place
            self.cursor = self.end;
        } else {
            self.cursor += block.size();
        }
        Some(block)
    }
}
